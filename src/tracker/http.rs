use super::error::TrackerError;
use super::response::{parse_compact_peers, AnnounceRequest, AnnounceResponse};
use super::state::TrackerState;
use crate::bencode::{decode_prefix, Value};
use crate::constants::{HTTP_TRACKER_TIMEOUT, USER_AGENT};
use reqwest::Client;
use std::net::{IpAddr, SocketAddr};

pub struct HttpTracker {
    client: Client,
    url: String,
    state: TrackerState,
}

impl HttpTracker {
    pub fn new(url: &str) -> Result<Self, TrackerError> {
        match url.split_once("://") {
            Some(("http" | "https", _)) => {}
            Some((scheme, _)) => return Err(TrackerError::UnsupportedProtocol(scheme.to_string())),
            None => return Err(TrackerError::InvalidUrl(url.to_string())),
        }

        let client = Client::builder()
            .timeout(HTTP_TRACKER_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(TrackerError::Http)?;

        Ok(Self {
            client,
            url: url.to_string(),
            state: TrackerState::new(),
        })
    }

    pub async fn announce(
        &mut self,
        request: &AnnounceRequest,
    ) -> Result<AnnounceResponse, TrackerError> {
        let url = self.announce_url(request);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        let parsed = match parse_announce_body(&body) {
            Err(TrackerError::Bencode(_)) if !status.is_success() => {
                return Err(TrackerError::InvalidResponse(format!("http status {}", status)));
            }
            other => other?,
        };

        self.state.record(&parsed);
        Ok(parsed)
    }

    /// Full GET URL for `request`. Binary fields are percent-encoded byte by
    /// byte.
    pub fn announce_url(&self, request: &AnnounceRequest) -> String {
        let separator = if self.url.contains('?') { '&' } else { '?' };
        let mut url = format!(
            "{}{}info_hash={}&peer_id={}&port={}&uploaded={}&downloaded={}&left={}&compact=1",
            self.url,
            separator,
            url_encode(&request.info_hash),
            url_encode(&request.peer_id),
            request.port,
            request.uploaded,
            request.downloaded,
            request.left
        );

        let event = request.event.as_str();
        if !event.is_empty() {
            url.push_str(&format!("&event={}", event));
        }
        if let Some(n) = request.num_want {
            url.push_str(&format!("&numwant={}", n));
        }
        if let Some(id) = &self.state.tracker_id {
            url.push_str(&format!("&trackerid={}", url_encode(id.as_bytes())));
        }
        url
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> &TrackerState {
        &self.state
    }
}

/// Parses a bencoded announce response. Bytes after the dictionary are
/// ignored.
pub fn parse_announce_body(body: &[u8]) -> Result<AnnounceResponse, TrackerError> {
    let (value, _) = decode_prefix(body)?;
    if value.as_dict().is_none() {
        return Err(TrackerError::InvalidResponse("expected dict".into()));
    }

    if let Some(failure) = value.get(b"failure reason") {
        let reason = failure
            .as_bytes()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .unwrap_or_default();
        return Err(TrackerError::Failure(reason));
    }

    let interval = value
        .get_int(b"interval")
        .ok_or_else(|| TrackerError::InvalidResponse("missing interval".into()))?;

    let mut response = AnnounceResponse::new(interval.max(0) as u32);
    response.min_interval = value.get_int(b"min interval").map(|v| v.max(0) as u32);
    response.complete = value.get_int(b"complete").map(|v| v.max(0) as u32);
    response.incomplete = value.get_int(b"incomplete").map(|v| v.max(0) as u32);
    response.warning_message = value.get_str(b"warning message").map(String::from);
    response.tracker_id = value.get_str(b"tracker id").map(String::from);

    match value.get(b"peers") {
        Some(Value::Bytes(compact)) => response.peers = parse_compact_peers(compact),
        Some(Value::List(list)) => response.peers = list.iter().filter_map(dict_peer).collect(),
        _ => {}
    }

    Ok(response)
}

/// A `{ip, port}` entry of the non-compact peer list.
fn dict_peer(peer: &Value) -> Option<SocketAddr> {
    let ip: IpAddr = peer.get_str(b"ip")?.parse().ok()?;
    let port = u16::try_from(peer.get_int(b"port")?).ok()?;
    Some(SocketAddr::new(ip, port))
}

fn url_encode(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| {
            if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'.' || b == b'~' {
                format!("{}", b as char)
            } else {
                format!("%{:02X}", b)
            }
        })
        .collect()
}
