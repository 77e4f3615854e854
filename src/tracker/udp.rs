use std::net::SocketAddr;
use std::time::{Duration, Instant};

use bytes::{Buf, BufMut};
use rand::Rng as _;
use tokio::net::UdpSocket;
use tokio::time::timeout_at;

use super::error::TrackerError;
use super::response::{parse_compact_peers_until_zero, AnnounceRequest, AnnounceResponse};
use super::state::TrackerState;
use crate::constants::{
    UDP_ACTION_ANNOUNCE, UDP_ACTION_CONNECT, UDP_ACTION_ERROR, UDP_ANNOUNCE_LEN, UDP_CONNECT_LEN,
    UDP_PEERS_OFFSET, UDP_TRACKER_ATTEMPTS, UDP_TRACKER_PROTOCOL_ID, UDP_TRACKER_TIMEOUT,
};

/// BEP-15 tracker client.
///
/// The connection id from the connect exchange is reused until it expires.
/// Each request draws a new transaction id, and datagrams carrying any other
/// transaction id are dropped while waiting for the real answer.
pub struct UdpTracker {
    socket: UdpSocket,
    addr: SocketAddr,
    url: String,
    state: TrackerState,
    attempt_timeout: Duration,
}

impl UdpTracker {
    /// Resolves the tracker host and binds a local socket. No packet is sent
    /// until the first announce.
    pub async fn connect(url: &str) -> Result<Self, TrackerError> {
        let host = parse_udp_url(url)?;
        let addr = tokio::net::lookup_host(host)
            .await?
            .find(SocketAddr::is_ipv4)
            .ok_or_else(|| TrackerError::InvalidUrl(url.to_string()))?;

        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(addr).await?;

        Ok(Self {
            socket,
            addr,
            url: url.to_string(),
            state: TrackerState::new(),
            attempt_timeout: UDP_TRACKER_TIMEOUT,
        })
    }

    /// Overrides the per-attempt read deadline.
    pub fn with_timeout(mut self, attempt_timeout: Duration) -> Self {
        self.attempt_timeout = attempt_timeout;
        self
    }

    pub async fn announce(
        &mut self,
        request: &AnnounceRequest,
    ) -> Result<AnnounceResponse, TrackerError> {
        let connection_id = self.connection_id().await?;

        let transaction_id = self.state.next_transaction();
        let key: u32 = rand::rng().random();
        let packet = encode_announce_request(connection_id, transaction_id, key, request);

        let result = self
            .exchange(&packet, transaction_id, decode_announce_response)
            .await;

        match &result {
            Ok(response) => self.state.record(response),
            Err(TrackerError::Timeout) => self.state.clear_connection_id(),
            Err(_) => {}
        }
        result
    }

    async fn connection_id(&mut self) -> Result<u64, TrackerError> {
        if let Some(id) = self.state.connection_id(Instant::now()) {
            return Ok(id);
        }

        let transaction_id = self.state.next_transaction();
        let packet = encode_connect_request(transaction_id);
        let id = self
            .exchange(&packet, transaction_id, decode_connect_response)
            .await?;

        tracing::trace!(tracker = %self.url, "udp tracker connected");
        self.state.set_connection_id(id, Instant::now());
        Ok(id)
    }

    /// Sends `packet` and waits for a datagram that `decode` accepts,
    /// resending once per attempt deadline.
    async fn exchange<T>(
        &self,
        packet: &[u8],
        transaction_id: u32,
        decode: fn(&[u8], u32) -> Result<Option<T>, TrackerError>,
    ) -> Result<T, TrackerError> {
        let mut buf = vec![0u8; 2048];

        for attempt in 0..UDP_TRACKER_ATTEMPTS {
            self.socket.send(packet).await?;
            let deadline = tokio::time::Instant::now() + self.attempt_timeout;

            loop {
                let n = match timeout_at(deadline, self.socket.recv(&mut buf)).await {
                    Ok(received) => received?,
                    Err(_) => break,
                };

                match decode(&buf[..n], transaction_id)? {
                    Some(value) => return Ok(value),
                    None => {
                        tracing::debug!(tracker = %self.url, len = n, "discarding mismatched udp tracker response");
                    }
                }
            }

            tracing::debug!(tracker = %self.url, attempt, "udp tracker attempt timed out");
        }

        Err(TrackerError::Timeout)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> &TrackerState {
        &self.state
    }
}

/// Strips the scheme and path: `udp://host:port/announce` → `host:port`.
fn parse_udp_url(url: &str) -> Result<&str, TrackerError> {
    let rest = url
        .strip_prefix("udp://")
        .ok_or_else(|| TrackerError::InvalidUrl(url.to_string()))?;

    let host = rest.split('/').next().unwrap_or(rest);
    if host.is_empty() || !host.contains(':') {
        return Err(TrackerError::InvalidUrl(url.to_string()));
    }
    Ok(host)
}

pub fn encode_connect_request(transaction_id: u32) -> [u8; UDP_CONNECT_LEN] {
    let mut packet = [0u8; UDP_CONNECT_LEN];
    let mut buf = &mut packet[..];
    buf.put_u64(UDP_TRACKER_PROTOCOL_ID);
    buf.put_u32(UDP_ACTION_CONNECT);
    buf.put_u32(transaction_id);
    packet
}

pub fn encode_announce_request(
    connection_id: u64,
    transaction_id: u32,
    key: u32,
    request: &AnnounceRequest,
) -> [u8; UDP_ANNOUNCE_LEN] {
    let mut packet = [0u8; UDP_ANNOUNCE_LEN];
    let mut buf = &mut packet[..];
    buf.put_u64(connection_id);
    buf.put_u32(UDP_ACTION_ANNOUNCE);
    buf.put_u32(transaction_id);
    buf.put_slice(&request.info_hash);
    buf.put_slice(&request.peer_id);
    buf.put_u64(request.downloaded);
    buf.put_u64(request.left);
    buf.put_u64(request.uploaded);
    buf.put_u32(request.event.as_udp_id());
    buf.put_u32(0); // IP address (0 = sender)
    buf.put_u32(key);
    buf.put_i32(request.num_want.map_or(-1, |n| n as i32));
    buf.put_u16(request.port);
    packet
}

/// Splits the common 8-byte header. `None` when the datagram is too short
/// or answers another transaction.
fn header(mut data: &[u8], transaction_id: u32) -> Option<(u32, &[u8])> {
    if data.len() < 8 {
        return None;
    }
    let action = data.get_u32();
    if data.get_u32() != transaction_id {
        return None;
    }
    Some((action, data))
}

fn error_message(body: &[u8]) -> TrackerError {
    TrackerError::Failure(String::from_utf8_lossy(body).into_owned())
}

/// Returns the connection id, or `None` for a datagram to discard.
pub fn decode_connect_response(
    data: &[u8],
    transaction_id: u32,
) -> Result<Option<u64>, TrackerError> {
    let Some((action, mut body)) = header(data, transaction_id) else {
        return Ok(None);
    };

    match action {
        UDP_ACTION_ERROR => Err(error_message(body)),
        UDP_ACTION_CONNECT if body.len() >= 8 => Ok(Some(body.get_u64())),
        _ => Ok(None),
    }
}

/// Parses an announce answer, or `None` for a datagram to discard.
///
/// The peer list starts at byte 20 and ends at the end of the datagram or
/// at the first all-zero entry, whichever comes first.
pub fn decode_announce_response(
    data: &[u8],
    transaction_id: u32,
) -> Result<Option<AnnounceResponse>, TrackerError> {
    let Some((action, mut body)) = header(data, transaction_id) else {
        return Ok(None);
    };

    match action {
        UDP_ACTION_ERROR => return Err(error_message(body)),
        UDP_ACTION_ANNOUNCE => {}
        _ => return Ok(None),
    }

    if data.len() < UDP_PEERS_OFFSET {
        return Err(TrackerError::InvalidResponse(format!(
            "announce response is {} bytes",
            data.len()
        )));
    }

    let mut response = AnnounceResponse::new(body.get_u32());
    response.incomplete = Some(body.get_u32());
    response.complete = Some(body.get_u32());
    response.peers = parse_compact_peers_until_zero(&data[UDP_PEERS_OFFSET..]);

    Ok(Some(response))
}
