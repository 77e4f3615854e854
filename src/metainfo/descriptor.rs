use super::error::MetainfoError;
use super::info_hash::InfoHash;
use crate::bencode::{decode, encode, Value};
use std::path::PathBuf;

/// A parsed torrent descriptor.
#[derive(Debug, Clone)]
pub struct Metainfo {
    /// The info dictionary containing file and piece layout.
    pub info: Info,
    /// SHA-1 of the re-encoded info dictionary.
    pub info_hash: InfoHash,
    /// Primary tracker URL.
    pub announce: Option<String>,
    /// Tiers of alternate tracker URLs.
    pub announce_list: Vec<Vec<String>>,
    pub comment: Option<String>,
    pub created_by: Option<String>,
}

/// The info dictionary: everything the info-hash covers.
#[derive(Debug, Clone)]
pub struct Info {
    /// Suggested name for the file or directory.
    pub name: String,
    /// Bytes per piece. Only the final piece may be shorter.
    pub piece_length: u64,
    /// Expected SHA-1 digest of each piece.
    pub pieces: Vec<[u8; 20]>,
    pub files: Vec<File>,
    pub total_length: u64,
    pub private: bool,
}

/// A file within the transfer, addressed by its offset in the
/// concatenated piece data.
#[derive(Debug, Clone)]
pub struct File {
    pub path: PathBuf,
    pub length: u64,
    pub offset: u64,
}

impl Metainfo {
    /// Parses a descriptor from raw bytes.
    ///
    /// # Errors
    ///
    /// Fails if the data is not bencode, a required field is missing, the
    /// `pieces` string is not a multiple of 20 bytes, or the piece count does
    /// not cover the total length.
    pub fn from_bytes(data: &[u8]) -> Result<Self, MetainfoError> {
        let root = decode(data)?;
        if root.as_dict().is_none() {
            return Err(MetainfoError::InvalidField("root"));
        }

        let info_value = root.get(b"info").ok_or(MetainfoError::MissingField("info"))?;
        let info = parse_info(info_value)?;
        let info_hash = InfoHash::of(&encode(info_value));

        let announce = root.get_str(b"announce").map(String::from);

        let announce_list = root
            .get_list(b"announce-list")
            .map(|tiers| {
                tiers
                    .iter()
                    .filter_map(|tier| tier.as_list())
                    .map(|urls| {
                        urls.iter()
                            .filter_map(|u| u.as_str().map(String::from))
                            .collect::<Vec<_>>()
                    })
                    .filter(|tier| !tier.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            info,
            info_hash,
            announce,
            announce_list,
            comment: root.get_str(b"comment").map(String::from),
            created_by: root.get_str(b"created by").map(String::from),
        })
    }

    /// Reads and parses a descriptor file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, MetainfoError> {
        let data = std::fs::read(path)?;
        Self::from_bytes(&data)
    }

    /// Every tracker URL: `announce` first, then the `announce-list` tiers in
    /// order, without duplicates.
    pub fn trackers(&self) -> Vec<String> {
        let mut trackers: Vec<String> = self.announce.iter().cloned().collect();

        for url in self.announce_list.iter().flatten() {
            if !trackers.contains(url) {
                trackers.push(url.clone());
            }
        }

        trackers
    }
}

impl Info {
    pub fn piece_count(&self) -> usize {
        self.pieces.len()
    }

    /// Length of piece `index`; the final piece holds the remainder.
    pub fn piece_len(&self, index: usize) -> u64 {
        let start = index as u64 * self.piece_length;
        self.total_length
            .saturating_sub(start)
            .min(self.piece_length)
    }
}

fn parse_info(value: &Value) -> Result<Info, MetainfoError> {
    if value.as_dict().is_none() {
        return Err(MetainfoError::InvalidField("info"));
    }

    let name = value
        .get_str(b"name")
        .ok_or(MetainfoError::MissingField("name"))?
        .to_string();

    let piece_length = value
        .get_int(b"piece length")
        .ok_or(MetainfoError::MissingField("piece length"))?;
    // pieces are addressed with 32-bit offsets on the wire
    if piece_length <= 0 || piece_length > u32::MAX as i64 {
        return Err(MetainfoError::InvalidField("piece length"));
    }
    let piece_length = piece_length as u64;

    let digests = value
        .get_bytes(b"pieces")
        .ok_or(MetainfoError::MissingField("pieces"))?;
    if digests.is_empty() || digests.len() % 20 != 0 {
        return Err(MetainfoError::InvalidField("pieces"));
    }
    let pieces: Vec<[u8; 20]> = digests
        .chunks_exact(20)
        .map(|chunk| {
            let mut arr = [0u8; 20];
            arr.copy_from_slice(chunk);
            arr
        })
        .collect();

    let private = value.get_int(b"private") == Some(1);

    let (files, total_length) = if let Some(length) = value.get_int(b"length") {
        if length < 0 {
            return Err(MetainfoError::InvalidField("length"));
        }
        let file = File {
            path: PathBuf::from(&name),
            length: length as u64,
            offset: 0,
        };
        (vec![file], length as u64)
    } else if let Some(entries) = value.get_list(b"files") {
        let mut files = Vec::with_capacity(entries.len());
        let mut offset = 0u64;

        for entry in entries {
            let length = entry
                .get_int(b"length")
                .filter(|&l| l >= 0)
                .ok_or(MetainfoError::MissingField("file length"))? as u64;

            let components = entry
                .get_list(b"path")
                .ok_or(MetainfoError::MissingField("file path"))?;

            let path: PathBuf = std::iter::once(name.as_str())
                .chain(components.iter().filter_map(|c| c.as_str()))
                .collect();

            files.push(File {
                path,
                length,
                offset,
            });
            offset += length;
        }

        (files, offset)
    } else {
        return Err(MetainfoError::MissingField("length or files"));
    };

    let expected = total_length.div_ceil(piece_length);
    if expected != pieces.len() as u64 {
        return Err(MetainfoError::PieceCountMismatch {
            expected,
            actual: pieces.len() as u64,
        });
    }

    Ok(Info {
        name,
        piece_length,
        pieces,
        files,
        total_length,
        private,
    })
}
