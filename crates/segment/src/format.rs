//! On-disk record framing.
//!
//! ```text
//! [key_len: u32 BE][key bytes][value_len: u32 BE][value bytes]
//! ```
//!
//! `key_len` is always at least 1. A `value_len` of [`TOMBSTONE_LEN`] marks
//! a deletion and carries no value bytes, which leaves `value_len = 0` free
//! to encode a genuinely empty value.

use byteorder::{BigEndian, WriteBytesExt};
use memtable::Stored;
use std::io;

/// Length marker for a tombstone record. Real values are capped well below
/// this, so the marker can never collide with a value length.
pub const TOMBSTONE_LEN: u32 = u32::MAX;

/// Fixed framing overhead per record: two u32 length fields.
pub const RECORD_HEADER_BYTES: u64 = 8;

/// Total encoded size of a record for the given key and entry.
#[must_use]
pub fn encoded_len(key: &str, stored: &Stored) -> u64 {
    RECORD_HEADER_BYTES + key.len() as u64 + stored.value_len() as u64
}

/// Serializes one record into `buf`.
pub fn encode_record(buf: &mut Vec<u8>, key: &str, stored: &Stored) -> io::Result<()> {
    buf.write_u32::<BigEndian>(key.len() as u32)?;
    buf.extend_from_slice(key.as_bytes());
    match stored {
        Stored::Value(v) => {
            buf.write_u32::<BigEndian>(v.len() as u32)?;
            buf.extend_from_slice(v);
        }
        Stored::Tombstone => {
            buf.write_u32::<BigEndian>(TOMBSTONE_LEN)?;
        }
    }
    Ok(())
}
