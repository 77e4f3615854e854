//! Fixtures shared by the unit tests.

use crate::bencode::{encode, Value};
use crate::metainfo::Metainfo;
use sha1::{Digest, Sha1};

/// Deterministic, non-repeating-per-block payload of `len` bytes.
pub(crate) fn content(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8 ^ (i / 4096) as u8).collect()
}

/// Builds and parses a single-file descriptor for `data`.
pub(crate) fn descriptor(data: &[u8], piece_length: usize, announce: Option<&str>) -> Metainfo {
    let pieces: Vec<u8> = data
        .chunks(piece_length)
        .flat_map(|chunk| Sha1::digest(chunk).to_vec())
        .collect();

    let info = Value::dict([
        ("name", Value::string("payload.bin")),
        ("piece length", Value::Integer(piece_length as i64)),
        ("pieces", Value::from(pieces.as_slice())),
        ("length", Value::Integer(data.len() as i64)),
    ]);

    let mut root = vec![("info", info)];
    if let Some(url) = announce {
        root.push(("announce", Value::string(url)));
    }

    Metainfo::from_bytes(&encode(&Value::dict(root))).expect("fixture descriptor parses")
}
