use super::*;
use crate::bencode::{encode, Value};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};

fn request(event: TrackerEvent) -> AnnounceRequest {
    AnnounceRequest {
        info_hash: [0xAB; 20],
        peer_id: *b"-SW0100-abcdefghijkl",
        port: 6881,
        uploaded: 1,
        downloaded: 2,
        left: 3,
        event,
        num_want: None,
    }
}

fn announce_reply(transaction_id: u32, interval: u32, peers: &[u8]) -> Vec<u8> {
    let mut reply = Vec::new();
    reply.extend_from_slice(&1u32.to_be_bytes());
    reply.extend_from_slice(&transaction_id.to_be_bytes());
    reply.extend_from_slice(&interval.to_be_bytes());
    reply.extend_from_slice(&5u32.to_be_bytes()); // leechers
    reply.extend_from_slice(&9u32.to_be_bytes()); // seeders
    reply.extend_from_slice(peers);
    reply
}

const TWO_PEERS: [u8; 12] = [
    192, 168, 1, 1, 0x1A, 0xE1, // 192.168.1.1:6881
    10, 0, 0, 5, 0xC8, 0xD5, // 10.0.0.5:51413
];

#[test]
fn test_tracker_event() {
    assert_eq!(TrackerEvent::Started.as_str(), "started");
    assert_eq!(TrackerEvent::Stopped.as_str(), "stopped");
    assert_eq!(TrackerEvent::Completed.as_str(), "completed");
    assert_eq!(TrackerEvent::None.as_str(), "");

    assert_eq!(TrackerEvent::None.as_udp_id(), 0);
    assert_eq!(TrackerEvent::Completed.as_udp_id(), 1);
    assert_eq!(TrackerEvent::Started.as_udp_id(), 2);
    assert_eq!(TrackerEvent::Stopped.as_udp_id(), 3);
}

#[test]
fn test_parse_compact_peers() {
    let peers = parse_compact_peers(&TWO_PEERS);
    assert_eq!(peers, vec![
        "192.168.1.1:6881".parse::<SocketAddr>().unwrap(),
        "10.0.0.5:51413".parse::<SocketAddr>().unwrap(),
    ]);

    // trailing partial entry
    assert_eq!(parse_compact_peers(&TWO_PEERS[..10]).len(), 1);
}

#[test]
fn test_parse_compact_peers_stops_at_zero_entry() {
    let mut data = Vec::new();
    data.extend_from_slice(&TWO_PEERS[..6]);
    data.extend_from_slice(&[0, 0, 0, 0, 0, 0]);
    data.extend_from_slice(&TWO_PEERS[6..]);

    let peers = parse_compact_peers_until_zero(&data);
    assert_eq!(peers, vec!["192.168.1.1:6881".parse::<SocketAddr>().unwrap()]);
}

#[test]
fn test_connect_request_layout() {
    let packet = encode_connect_request(0xDEADBEEF);
    assert_eq!(&packet[..8], &0x41727101980u64.to_be_bytes());
    assert_eq!(&packet[8..12], &[0, 0, 0, 0]);
    assert_eq!(&packet[12..], &[0xDE, 0xAD, 0xBE, 0xEF]);
}

#[test]
fn test_announce_request_layout() {
    let packet = encode_announce_request(7, 9, 11, &request(TrackerEvent::Started));
    assert_eq!(packet.len(), 98);
    assert_eq!(&packet[..8], &7u64.to_be_bytes());
    assert_eq!(&packet[8..12], &1u32.to_be_bytes());
    assert_eq!(&packet[12..16], &9u32.to_be_bytes());
    assert_eq!(&packet[16..36], &[0xAB; 20]);
    assert_eq!(&packet[36..56], b"-SW0100-abcdefghijkl");
    assert_eq!(&packet[56..64], &2u64.to_be_bytes()); // downloaded
    assert_eq!(&packet[64..72], &3u64.to_be_bytes()); // left
    assert_eq!(&packet[72..80], &1u64.to_be_bytes()); // uploaded
    assert_eq!(&packet[80..84], &2u32.to_be_bytes()); // started
    assert_eq!(&packet[88..92], &11u32.to_be_bytes()); // key
    assert_eq!(&packet[92..96], &(-1i32).to_be_bytes());
    assert_eq!(&packet[96..], &6881u16.to_be_bytes());
}

#[test]
fn test_decode_connect_response() {
    let mut reply = Vec::new();
    reply.extend_from_slice(&0u32.to_be_bytes());
    reply.extend_from_slice(&42u32.to_be_bytes());
    reply.extend_from_slice(&0x1122334455667788u64.to_be_bytes());

    assert_eq!(
        decode_connect_response(&reply, 42).unwrap(),
        Some(0x1122334455667788)
    );
    assert_eq!(decode_connect_response(&reply, 43).unwrap(), None);
    assert_eq!(decode_connect_response(&reply[..6], 42).unwrap(), None);
}

#[test]
fn test_decode_announce_response() {
    let reply = announce_reply(77, 1800, &TWO_PEERS);
    let response = decode_announce_response(&reply, 77).unwrap().unwrap();

    assert_eq!(response.interval, 1800);
    assert_eq!(response.incomplete, Some(5));
    assert_eq!(response.complete, Some(9));
    assert_eq!(response.peers.len(), 2);
    assert_eq!(response.peers[1], "10.0.0.5:51413".parse().unwrap());
}

#[test]
fn test_decode_announce_response_wrong_transaction() {
    let reply = announce_reply(77, 1800, &TWO_PEERS);
    assert!(decode_announce_response(&reply, 78).unwrap().is_none());
}

#[test]
fn test_decode_announce_response_error_action() {
    let mut reply = Vec::new();
    reply.extend_from_slice(&3u32.to_be_bytes());
    reply.extend_from_slice(&77u32.to_be_bytes());
    reply.extend_from_slice(b"torrent not registered");

    match decode_announce_response(&reply, 77) {
        Err(TrackerError::Failure(msg)) => assert_eq!(msg, "torrent not registered"),
        other => panic!("expected failure, got {:?}", other),
    }
}

#[test]
fn test_parse_announce_body() {
    let body = encode(&Value::dict([
        ("interval", Value::Integer(900)),
        ("min interval", Value::Integer(60)),
        ("complete", Value::Integer(3)),
        ("tracker id", Value::string("abc")),
        ("peers", Value::from(&TWO_PEERS[..])),
    ]));

    let response = parse_announce_body(&body).unwrap();
    assert_eq!(response.interval, 900);
    assert_eq!(response.min_interval, Some(60));
    assert_eq!(response.complete, Some(3));
    assert_eq!(response.tracker_id.as_deref(), Some("abc"));
    assert_eq!(response.peers.len(), 2);
}

#[test]
fn test_parse_announce_body_peer_dicts_and_trailing_bytes() {
    let mut body = encode(&Value::dict([
        ("interval", Value::Integer(900)),
        (
            "peers",
            Value::List(vec![
                Value::dict([
                    ("ip", Value::string("10.1.2.3")),
                    ("port", Value::Integer(6882)),
                ]),
                Value::dict([("ip", Value::string("bogus")), ("port", Value::Integer(1))]),
            ]),
        ),
    ]));
    body.extend_from_slice(b"\n");

    let response = parse_announce_body(&body).unwrap();
    assert_eq!(response.peers, vec!["10.1.2.3:6882".parse::<SocketAddr>().unwrap()]);
}

#[test]
fn test_parse_announce_body_failure() {
    let body = encode(&Value::dict([("failure reason", Value::string("banned"))]));
    match parse_announce_body(&body) {
        Err(TrackerError::Failure(reason)) => assert_eq!(reason, "banned"),
        other => panic!("expected failure, got {:?}", other),
    }
    assert!(parse_announce_body(b"not bencode").is_err());
}

#[test]
fn test_http_announce_url() {
    let tracker = HttpTracker::new("http://tracker.example.com/announce?passkey=x").unwrap();
    let url = tracker.announce_url(&request(TrackerEvent::Completed));

    assert!(url.starts_with("http://tracker.example.com/announce?passkey=x&info_hash="));
    assert!(url.contains(&"%AB".repeat(20)));
    assert!(url.contains("peer_id=-SW0100-abcdefghijkl"));
    assert!(url.contains("&left=3&compact=1&event=completed"));
}

#[test]
fn test_http_tracker_invalid_url() {
    assert!(matches!(
        HttpTracker::new("ftp://tracker.example.com"),
        Err(TrackerError::UnsupportedProtocol(scheme)) if scheme == "ftp"
    ));
    assert!(matches!(
        HttpTracker::new("tracker.example.com/announce"),
        Err(TrackerError::InvalidUrl(_))
    ));
}

#[test]
fn test_tracker_state_connection_expiry() {
    let mut state = TrackerState::new();
    let now = Instant::now();
    assert_eq!(state.connection_id(now), None);

    state.set_connection_id(99, now);
    assert_eq!(state.connection_id(now + Duration::from_secs(59)), Some(99));
    assert_eq!(state.connection_id(now + Duration::from_secs(60)), None);

    let mut response = AnnounceResponse::new(120);
    response.tracker_id = Some("t".into());
    state.record(&response);
    assert_eq!(state.interval, Some(Duration::from_secs(120)));
    assert_eq!(state.tracker_id.as_deref(), Some("t"));
}

#[test]
fn test_error_retryable() {
    assert!(TrackerError::Timeout.is_retryable());
    assert!(TrackerError::Io(std::io::Error::other("x")).is_retryable());
    assert!(!TrackerError::Failure("no".into()).is_retryable());
    assert!(!TrackerError::NoTrackers.is_retryable());
}

/// Answers one connect and one announce. Before the real announce answer it
/// sends one with a wrong transaction id.
async fn fake_udp_tracker() -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();

    tokio::spawn(async move {
        let mut buf = [0u8; 2048];

        let (n, from) = socket.recv_from(&mut buf).await.unwrap();
        assert_eq!(n, 16);
        let tid = u32::from_be_bytes(buf[12..16].try_into().unwrap());
        let mut reply = Vec::new();
        reply.extend_from_slice(&0u32.to_be_bytes());
        reply.extend_from_slice(&tid.to_be_bytes());
        reply.extend_from_slice(&555u64.to_be_bytes());
        socket.send_to(&reply, from).await.unwrap();

        let (n, from) = socket.recv_from(&mut buf).await.unwrap();
        assert_eq!(n, 98);
        assert_eq!(u64::from_be_bytes(buf[..8].try_into().unwrap()), 555);
        let tid = u32::from_be_bytes(buf[12..16].try_into().unwrap());

        let stale = announce_reply(tid.wrapping_add(1), 60, &TWO_PEERS[..6]);
        socket.send_to(&stale, from).await.unwrap();
        let real = announce_reply(tid, 1800, &TWO_PEERS);
        socket.send_to(&real, from).await.unwrap();
    });

    addr
}

#[tokio::test]
async fn test_udp_announce_against_fake_tracker() {
    let addr = fake_udp_tracker().await;
    let url = format!("udp://{}/announce", addr);

    let mut tracker = UdpTracker::connect(&url).await.unwrap();
    let response = tracker
        .announce(&request(TrackerEvent::Started))
        .await
        .unwrap();

    assert_eq!(response.interval, 1800);
    assert_eq!(response.peers.len(), 2);
    assert_eq!(tracker.state().interval, Some(Duration::from_secs(1800)));
}

#[tokio::test]
async fn test_udp_announce_times_out_on_silence() {
    let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let url = format!("udp://{}", silent.local_addr().unwrap());

    let mut tracker = UdpTracker::connect(&url)
        .await
        .unwrap()
        .with_timeout(Duration::from_millis(50));
    let result = tracker.announce(&request(TrackerEvent::Started)).await;
    assert!(matches!(result, Err(TrackerError::Timeout)));
}

#[tokio::test]
async fn test_udp_url_validation() {
    assert!(matches!(
        UdpTracker::connect("http://example.com").await,
        Err(TrackerError::InvalidUrl(_))
    ));
    assert!(matches!(
        UdpTracker::connect("udp://noport/announce").await,
        Err(TrackerError::InvalidUrl(_))
    ));
}

/// Serves one HTTP request with `body` and hands back the request line.
async fn fake_http_tracker(body: Vec<u8>) -> (String, tokio::task::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/announce", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = stream.read(&mut buf).await.unwrap();
            assert!(n > 0);
            request.extend_from_slice(&buf[..n]);
        }

        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        stream.write_all(head.as_bytes()).await.unwrap();
        stream.write_all(&body).await.unwrap();

        let text = String::from_utf8_lossy(&request).into_owned();
        text.lines().next().unwrap_or_default().to_string()
    });

    (url, handle)
}

#[tokio::test]
async fn test_http_announce_against_fake_tracker() {
    let body = encode(&Value::dict([
        ("interval", Value::Integer(600)),
        ("peers", Value::from(&TWO_PEERS[..])),
    ]));
    let (url, server) = fake_http_tracker(body).await;

    let mut tracker = HttpTracker::new(&url).unwrap();
    let response = tracker
        .announce(&request(TrackerEvent::Started))
        .await
        .unwrap();
    assert_eq!(response.interval, 600);
    assert_eq!(response.peers.len(), 2);

    let line = server.await.unwrap();
    assert!(line.starts_with("GET /announce?info_hash=%AB%AB"));
    assert!(line.contains("event=started"));
}

#[tokio::test]
async fn test_client_falls_back_to_next_tracker() {
    let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let body = encode(&Value::dict([
        ("interval", Value::Integer(600)),
        ("peers", Value::from(&TWO_PEERS[..6])),
    ]));
    let (http_url, _server) = fake_http_tracker(body).await;

    let mut client = TrackerClient::new([
        format!("udp://{}", silent.local_addr().unwrap()),
        "wss://unsupported.example.com".to_string(),
        http_url,
    ])
    .with_udp_timeout(Duration::from_millis(50));
    assert_eq!(client.urls().count(), 2);

    let response = client
        .announce_any(&request(TrackerEvent::Started))
        .await
        .unwrap();
    assert_eq!(response.peers, vec!["192.168.1.1:6881".parse::<SocketAddr>().unwrap()]);
}

#[tokio::test]
async fn test_client_without_trackers() {
    let mut client = TrackerClient::new(Vec::<String>::new());
    assert!(client.is_empty());
    assert!(matches!(
        client.announce_any(&request(TrackerEvent::Started)).await,
        Err(TrackerError::NoTrackers)
    ));
}
