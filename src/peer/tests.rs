use super::*;
use crate::config::ClientConfig;
use bytes::Bytes;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[test]
fn test_peer_id_generate() {
    let id1 = PeerId::generate();
    let id2 = PeerId::generate();
    assert_ne!(id1.0, id2.0);
    assert_eq!(&id1.0[..8], b"-SW0100-");
    assert_eq!(id1.client_id(), Some("SW0100"));
}

#[test]
fn test_peer_id_display_escapes() {
    let mut raw = [b'a'; 20];
    raw[0] = 0xff;
    raw[1] = b' ';
    let id = PeerId::from(raw);
    assert!(id.to_string().starts_with("%ff%20aa"));
    assert!(PeerId::from_bytes(&raw[..19]).is_none());
}

#[test]
fn test_bitfield() {
    let mut bf = Bitfield::new(10);
    assert!(bf.is_empty());
    assert!(!bf.has(0));

    assert!(bf.set(0));
    assert!(bf.set(9));
    assert!(!bf.set(10));
    assert!(bf.has(0));
    assert!(bf.has(9));
    assert!(!bf.has(10));
    assert_eq!(bf.count(), 2);
    assert_eq!(bf.as_bytes(), &[0x80, 0x40]);
}

#[test]
fn test_bitfield_full_clears_spare_bits() {
    let bf = Bitfield::full(10);
    assert!(bf.is_complete());
    assert_eq!(bf.as_bytes(), &[0xff, 0xc0]);
}

#[test]
fn test_bitfield_from_payload() {
    let bf = Bitfield::from_payload(&[0b1010_0000], 3).unwrap();
    assert!(bf.has(0));
    assert!(!bf.has(1));
    assert!(bf.has(2));

    // wrong length
    assert!(Bitfield::from_payload(&[0, 0], 3).is_err());
    // spare bit set
    assert!(Bitfield::from_payload(&[0b0001_0000], 3).is_err());
}

#[test]
fn test_bitfield_has_missing_from() {
    let mut ours = Bitfield::new(4);
    let mut theirs = Bitfield::new(4);
    assert!(!theirs.has_missing_from(&ours));

    theirs.set(2);
    assert!(theirs.has_missing_from(&ours));

    ours.set(2);
    assert!(!theirs.has_missing_from(&ours));
}

#[test]
fn test_handshake_encode_decode() {
    let handshake = Handshake::new([1u8; 20], [2u8; 20]);
    let encoded = handshake.encode();

    assert_eq!(encoded.len(), 68);
    assert_eq!(encoded[0], 19);
    assert_eq!(&encoded[1..20], b"BitTorrent protocol");
    assert_eq!(&encoded[20..28], &[0u8; 8]);

    let decoded = Handshake::decode(&encoded).unwrap();
    assert_eq!(decoded, handshake);
}

#[test]
fn test_handshake_ignores_remote_reserved_bytes() {
    let mut encoded = Handshake::new([1u8; 20], [2u8; 20]).encode().to_vec();
    encoded[25] = 0x10;
    encoded[27] = 0x05;
    let decoded = Handshake::decode(&encoded).unwrap();
    assert_eq!(decoded.info_hash, [1u8; 20]);
}

#[test]
fn test_handshake_rejects_bad_protocol() {
    let mut encoded = Handshake::new([1u8; 20], [2u8; 20]).encode().to_vec();
    encoded[1] = b'X';
    assert!(matches!(
        Handshake::decode(&encoded),
        Err(PeerError::InvalidHandshake)
    ));
    assert!(Handshake::decode(&encoded[..67]).is_err());
}

#[test]
fn test_message_framing() {
    assert_eq!(Message::KeepAlive.encode().as_ref(), &[0, 0, 0, 0]);
    assert_eq!(Message::Interested.encode().as_ref(), &[0, 0, 0, 1, 2]);
    assert_eq!(
        Message::Have { piece: 7 }.encode().as_ref(),
        &[0, 0, 0, 5, 4, 0, 0, 0, 7]
    );
    assert_eq!(
        Message::Request(BlockRequest::new(1, 16384, 16384))
            .encode()
            .as_ref(),
        &[0, 0, 0, 13, 6, 0, 0, 0, 1, 0, 0, 0x40, 0, 0, 0, 0x40, 0]
    );
}

#[test]
fn test_message_decode_body() {
    let messages = vec![
        Message::Choke,
        Message::Unchoke,
        Message::Interested,
        Message::NotInterested,
        Message::Have { piece: 42 },
        Message::Bitfield(Bytes::from_static(&[0xf0])),
        Message::Request(BlockRequest::new(1, 0, 16384)),
        Message::Cancel(BlockRequest::new(1, 0, 16384)),
        Message::Piece {
            index: 3,
            begin: 16384,
            data: Bytes::from_static(b"hello world"),
        },
    ];

    for msg in messages {
        let frame = msg.encode();
        let decoded = Message::decode(frame.slice(4..)).unwrap();
        assert_eq!(decoded, msg);
    }

    assert_eq!(Message::decode(Bytes::new()).unwrap(), Message::KeepAlive);
}

#[test]
fn test_message_decode_rejects_bad_payloads() {
    assert!(matches!(
        Message::decode(Bytes::from_static(&[20])),
        Err(PeerError::InvalidMessageId(20))
    ));
    // have with a 3-byte payload
    assert!(Message::decode(Bytes::from_static(&[4, 0, 0, 1])).is_err());
    // choke with a payload
    assert!(Message::decode(Bytes::from_static(&[0, 1])).is_err());
    // piece without begin
    assert!(Message::decode(Bytes::from_static(&[7, 0, 0, 0, 1])).is_err());
}

#[test]
fn test_block_layout() {
    assert_eq!(block_count(32768), 2);
    assert_eq!(block_count(40000), 3);
    assert_eq!(block_length(40000, 0), 16384);
    assert_eq!(block_length(40000, 2), 40000 - 32768);
    assert_eq!(BlockRequest::new(0, 16384, 100).end(), 16484);
}

#[test]
fn test_choking_state_default() {
    let state = ChokingState::default();
    assert!(state.am_choking);
    assert!(!state.am_interested);
    assert!(state.peer_choking);
    assert!(!state.peer_interested);
    assert!(!state.can_request());
}

#[test]
fn test_upload_slots() {
    let mut slots = UploadSlots::new(2);
    assert!(slots.acquire(1u32));
    assert!(slots.acquire(1u32));
    assert!(slots.acquire(2u32));
    assert!(!slots.acquire(3u32));
    assert_eq!(slots.in_use(), 2);

    assert!(slots.release(1));
    assert!(!slots.release(1));
    assert!(slots.acquire(3));
}

async fn pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (client, server) = tokio::join!(TcpStream::connect(addr), listener.accept());
    (client.unwrap(), server.unwrap().0)
}

#[tokio::test]
async fn test_transport_frames_over_tcp() {
    let (a, b) = pair().await;
    let mut left = PeerTransport::new(a);
    let mut right = PeerTransport::new(b);

    left.send_handshake(&Handshake::new([9u8; 20], [8u8; 20]))
        .await
        .unwrap();
    left.send(&Message::Unchoke).await.unwrap();
    left.send(&Message::KeepAlive).await.unwrap();
    left.send(&Message::Have { piece: 5 }).await.unwrap();

    let hs = right.receive_handshake().await.unwrap();
    assert_eq!(hs.info_hash, [9u8; 20]);
    assert_eq!(right.receive().await.unwrap(), Message::Unchoke);
    assert_eq!(right.receive().await.unwrap(), Message::KeepAlive);
    assert_eq!(right.receive().await.unwrap(), Message::Have { piece: 5 });
}

#[tokio::test]
async fn test_transport_truncated_frame() {
    let (mut a, b) = pair().await;
    let mut right = PeerTransport::new(b);

    // length says 5, only 3 bytes follow
    a.write_all(&[0, 0, 0, 5, 4, 0, 0]).await.unwrap();
    drop(a);

    assert!(matches!(
        right.receive().await,
        Err(PeerError::ConnectionClosed)
    ));
}

#[tokio::test]
async fn test_transport_read_timeout() {
    let (_a, b) = pair().await;
    let mut right =
        PeerTransport::with_timeouts(b, Duration::from_millis(50), Duration::from_secs(1));
    assert!(matches!(right.receive().await, Err(PeerError::Timeout)));
}

#[tokio::test]
async fn test_connect_handshake_and_bitfield_first() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let info_hash = [3u8; 20];

    let remote = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 68];
        stream.read_exact(&mut buf).await.unwrap();
        let theirs = Handshake::decode(&buf).unwrap();
        assert_eq!(theirs.info_hash, info_hash);
        assert_eq!(&buf[20..28], &[0u8; 8]);

        stream
            .write_all(&Handshake::new(info_hash, [7u8; 20]).encode())
            .await
            .unwrap();
        stream
            .write_all(&Message::Bitfield(Bytes::from_static(&[0x80])).encode())
            .await
            .unwrap();
        stream.write_all(&Message::Unchoke.encode()).await.unwrap();
        stream
            .write_all(&Message::Bitfield(Bytes::from_static(&[0x80])).encode())
            .await
            .unwrap();
        stream
    });

    let config = ClientConfig::default();
    let mut conn = PeerConnection::connect(addr, info_hash, PeerId::generate(), &config)
        .await
        .unwrap();
    assert_eq!(conn.state, ConnectionState::Active);
    assert_eq!(conn.peer_id, PeerId::from([7u8; 20]));

    assert!(matches!(conn.receive().await.unwrap(), Message::Bitfield(_)));
    assert_eq!(conn.receive().await.unwrap(), Message::Unchoke);
    assert!(conn.choking.can_request());
    assert!(matches!(
        conn.receive().await,
        Err(PeerError::Protocol(_))
    ));

    let _stream = remote.await.unwrap();
}

#[tokio::test]
async fn test_connect_rejects_wrong_info_hash() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 68];
        stream.read_exact(&mut buf).await.unwrap();
        stream
            .write_all(&Handshake::new([0xee; 20], [7u8; 20]).encode())
            .await
            .unwrap();
    });

    let result =
        PeerConnection::connect(addr, [3u8; 20], PeerId::generate(), &ClientConfig::default())
            .await;
    assert!(matches!(result, Err(PeerError::InfoHashMismatch)));
}

#[tokio::test]
async fn test_accept_replies_with_handshake() {
    let (mut a, b) = pair().await;
    let info_hash = [5u8; 20];
    a.write_all(&Handshake::new(info_hash, [1u8; 20]).encode())
        .await
        .unwrap();

    let mut transport = PeerTransport::new(b);
    let theirs = transport.receive_handshake().await.unwrap();
    let ours = PeerId::generate();
    let conn = PeerConnection::accept(transport, theirs, ours, &ClientConfig::default())
        .await
        .unwrap();
    assert!(conn.is_active());

    let mut buf = [0u8; 68];
    a.read_exact(&mut buf).await.unwrap();
    let reply = Handshake::decode(&buf).unwrap();
    assert_eq!(reply.info_hash, info_hash);
    assert_eq!(reply.peer_id, *ours.as_bytes());
}
