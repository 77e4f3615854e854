//! Bencode encoding and decoding.
//!
//! Bencode is the structured encoding used by torrent descriptors and by
//! HTTP tracker responses. It has four types:
//!
//! | Type | Format | Example |
//! |------|--------|---------|
//! | Integer | `i<number>e` | `i42e` |
//! | Byte string | `<length>:<data>` | `4:spam` |
//! | List | `l<items>e` | `l4:spami42ee` |
//! | Dictionary | `d<key><value>...e` | `d3:foo3:bare` |
//!
//! ```
//! use swarmer::bencode::{decode, encode, Value};
//!
//! let value = decode(b"d3:foo3:bar3:numi7ee").unwrap();
//! assert_eq!(value.get_str(b"foo"), Some("bar"));
//! assert_eq!(value.get_int(b"num"), Some(7));
//! assert_eq!(encode(&value), b"d3:foo3:bar3:numi7ee");
//! ```

mod decode;
mod encode;
mod error;
mod value;

pub use decode::{decode, decode_prefix};
pub use encode::encode;
pub use error::BencodeError;
pub use value::Value;
