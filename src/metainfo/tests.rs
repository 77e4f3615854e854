use super::*;
use crate::bencode::{encode, Value};
use sha1::{Digest, Sha1};

fn single_file_descriptor(piece_length: i64, length: i64, pieces: &[u8]) -> Vec<u8> {
    let info = Value::dict([
        ("name", Value::string("payload.bin")),
        ("piece length", Value::Integer(piece_length)),
        ("pieces", Value::from(pieces)),
        ("length", Value::Integer(length)),
    ]);
    encode(&Value::dict([
        ("announce", Value::string("udp://tracker.example.com:6969/announce")),
        (
            "announce-list",
            Value::List(vec![
                Value::List(vec![Value::string("udp://tracker.example.com:6969/announce")]),
                Value::List(vec![Value::string("http://backup.example.com/announce")]),
            ]),
        ),
        ("info", info),
    ]))
}

#[test]
fn test_info_hash_from_hex() {
    let hex = "0123456789abcdef0123456789abcdef01234567";
    let hash = InfoHash::from_hex(hex).unwrap();
    assert_eq!(hash.to_hex(), hex);
    assert_eq!(hash.to_string(), hex);
    assert!(InfoHash::from_hex("abcd").is_err());
    assert!(InfoHash::from_hex("zz23456789abcdef0123456789abcdef01234567").is_err());
}

#[test]
fn test_parse_single_file() {
    let data = single_file_descriptor(32768, 65536, &[7u8; 40]);
    let meta = Metainfo::from_bytes(&data).unwrap();

    assert_eq!(meta.info.name, "payload.bin");
    assert_eq!(meta.info.piece_length, 32768);
    assert_eq!(meta.info.piece_count(), 2);
    assert_eq!(meta.info.total_length, 65536);
    assert_eq!(meta.info.files.len(), 1);
    assert_eq!(meta.info.pieces[1], [7u8; 20]);
}

#[test]
fn test_info_hash_covers_only_info_dict() {
    let data = single_file_descriptor(32768, 65536, &[7u8; 40]);
    let meta = Metainfo::from_bytes(&data).unwrap();

    let info = crate::bencode::decode(&data).unwrap().get(b"info").cloned().unwrap();
    let expected: [u8; 20] = Sha1::digest(encode(&info)).into();
    assert_eq!(meta.info_hash.0, expected);
}

#[test]
fn test_trackers_deduplicated_in_order() {
    let data = single_file_descriptor(32768, 65536, &[0u8; 40]);
    let meta = Metainfo::from_bytes(&data).unwrap();

    assert_eq!(
        meta.trackers(),
        vec![
            "udp://tracker.example.com:6969/announce".to_string(),
            "http://backup.example.com/announce".to_string(),
        ]
    );
}

#[test]
fn test_trailing_piece_is_shorter() {
    let data = single_file_descriptor(32768, 40000, &[0u8; 40]);
    let meta = Metainfo::from_bytes(&data).unwrap();

    assert_eq!(meta.info.piece_len(0), 32768);
    assert_eq!(meta.info.piece_len(1), 40000 - 32768);
    assert_eq!(meta.info.piece_len(2), 0);
}

#[test]
fn test_multi_file_offsets() {
    let files = Value::List(vec![
        Value::dict([
            ("length", Value::Integer(100)),
            ("path", Value::List(vec![Value::string("a.txt")])),
        ]),
        Value::dict([
            ("length", Value::Integer(50)),
            ("path", Value::List(vec![Value::string("sub"), Value::string("b.txt")])),
        ]),
    ]);
    let info = Value::dict([
        ("name", Value::string("dir")),
        ("piece length", Value::Integer(16384)),
        ("pieces", Value::from(&[1u8; 20][..])),
        ("files", files),
    ]);
    let data = encode(&Value::dict([("info", info)]));

    let meta = Metainfo::from_bytes(&data).unwrap();
    assert_eq!(meta.info.total_length, 150);
    assert_eq!(meta.info.files[1].offset, 100);
    assert_eq!(meta.info.files[1].path, std::path::PathBuf::from("dir/sub/b.txt"));
    assert!(meta.trackers().is_empty());
}

#[test]
fn test_rejects_bad_pieces() {
    let data = single_file_descriptor(32768, 65536, &[0u8; 30]);
    assert!(matches!(
        Metainfo::from_bytes(&data),
        Err(MetainfoError::InvalidField("pieces"))
    ));

    // Two digests cannot describe three pieces' worth of data.
    let data = single_file_descriptor(32768, 70000, &[0u8; 40]);
    assert!(matches!(
        Metainfo::from_bytes(&data),
        Err(MetainfoError::PieceCountMismatch {
            expected: 3,
            actual: 2
        })
    ));

    let data = single_file_descriptor(1 << 33, 1 << 33, &[0u8; 20]);
    assert!(matches!(
        Metainfo::from_bytes(&data),
        Err(MetainfoError::InvalidField("piece length"))
    ));
}

#[test]
fn test_missing_info() {
    let data = encode(&Value::dict([("announce", Value::string("x"))]));
    assert!(matches!(
        Metainfo::from_bytes(&data),
        Err(MetainfoError::MissingField("info"))
    ));
}
