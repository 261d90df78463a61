//! Encoding and decoding for the wire protocol.
//!
//! All integers are big-endian. Every frame is a 1-byte opcode/status, a
//! 4-byte payload length, and the payload. See the crate docs for the
//! payload layout per operation.

use std::collections::BTreeMap;
use std::io::{Read, Write};

use crate::{Command, NetError, Response, Status};

/// Frame header: 1 opcode/status byte + 4 length bytes.
pub const HEADER_SIZE: usize = 5;

/// Maximum accepted payload (16 MiB).
pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

/// Sequential reader over a payload slice with protocol-level errors.
struct PayloadReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn read_u8(&mut self, what: &str) -> Result<u8, NetError> {
        if self.remaining() < 1 {
            return Err(NetError::Protocol(format!("truncated payload: {what}")));
        }
        let b = self.buf[self.pos];
        self.pos += 1;
        Ok(b)
    }

    fn read_u32(&mut self, what: &str) -> Result<u32, NetError> {
        if self.remaining() < 4 {
            return Err(NetError::Protocol(format!("truncated payload: {what}")));
        }
        let bytes = [
            self.buf[self.pos],
            self.buf[self.pos + 1],
            self.buf[self.pos + 2],
            self.buf[self.pos + 3],
        ];
        self.pos += 4;
        Ok(u32::from_be_bytes(bytes))
    }

    fn read_bytes(&mut self, len: usize, what: &str) -> Result<&'a [u8], NetError> {
        if self.remaining() < len {
            return Err(NetError::Protocol(format!(
                "truncated payload: {what} ({len} bytes declared, {} left)",
                self.remaining()
            )));
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_str(&mut self, what: &str) -> Result<String, NetError> {
        let len = self.read_u32(what)? as usize;
        let bytes = self.read_bytes(len, what)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| NetError::Protocol(format!("{what} is not valid utf-8")))
    }

    /// Everything after the current position.
    fn rest(&mut self) -> &'a [u8] {
        let slice = &self.buf[self.pos..];
        self.pos = self.buf.len();
        slice
    }

    fn expect_done(&self, what: &str) -> Result<(), NetError> {
        if self.remaining() != 0 {
            return Err(NetError::Protocol(format!(
                "{} trailing bytes after {what}",
                self.remaining()
            )));
        }
        Ok(())
    }
}

fn put_str(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u32).to_be_bytes());
    buf.extend_from_slice(s.as_bytes());
}

// =============================================================================
// Command encoding / decoding
// =============================================================================

/// Serializes a command into a full frame (header + payload).
#[must_use]
pub fn encode_command(command: &Command) -> Vec<u8> {
    let mut payload = Vec::new();
    match command {
        Command::Get { key } | Command::Delete { key } => {
            put_str(&mut payload, key);
        }
        Command::Put { key, value } => {
            put_str(&mut payload, key);
            match value {
                Some(v) => {
                    payload.push(1);
                    payload.extend_from_slice(v);
                }
                None => payload.push(0),
            }
        }
        Command::ReadRange { start, end } => {
            put_str(&mut payload, start);
            payload.extend_from_slice(end.as_bytes());
        }
        Command::BatchPut { pairs } => {
            payload.extend_from_slice(&(pairs.len() as u32).to_be_bytes());
            for (key, value) in pairs {
                put_str(&mut payload, key);
                match value {
                    Some(v) => {
                        payload.push(1);
                        payload.extend_from_slice(&(v.len() as u32).to_be_bytes());
                        payload.extend_from_slice(v);
                    }
                    None => payload.push(0),
                }
            }
        }
        Command::Ping => {}
    }

    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame.push(command.opcode() as u8);
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&payload);
    frame
}

/// Parses a full command frame.
pub fn decode_command(bytes: &[u8]) -> Result<Command, NetError> {
    let (op, payload) = split_frame(bytes)?;
    let mut r = PayloadReader::new(payload);

    let command = match op {
        0x01 => Command::Get {
            key: r.read_str("GET key")?,
        },
        0x02 => {
            let key = r.read_str("PUT key")?;
            let present = r.read_u8("PUT value flag")?;
            let value = match present {
                0 => None,
                1 => Some(r.rest().to_vec()),
                other => {
                    return Err(NetError::Protocol(format!(
                        "PUT value flag must be 0 or 1, got {other}"
                    )))
                }
            };
            Command::Put { key, value }
        }
        0x03 => Command::Delete {
            key: r.read_str("DELETE key")?,
        },
        0x04 => {
            let start = r.read_str("range start key")?;
            let end = String::from_utf8(r.rest().to_vec())
                .map_err(|_| NetError::Protocol("range end key is not valid utf-8".into()))?;
            Command::ReadRange { start, end }
        }
        0x05 => {
            let count = r.read_u32("batch count")?;
            let mut pairs = Vec::with_capacity(count.min(1024) as usize);
            for _ in 0..count {
                let key = r.read_str("batch key")?;
                let present = r.read_u8("batch value flag")?;
                let value = match present {
                    0 => None,
                    1 => {
                        let len = r.read_u32("batch value length")? as usize;
                        Some(r.read_bytes(len, "batch value")?.to_vec())
                    }
                    other => {
                        return Err(NetError::Protocol(format!(
                            "batch value flag must be 0 or 1, got {other}"
                        )))
                    }
                };
                pairs.push((key, value));
            }
            r.expect_done("batch pairs")?;
            Command::BatchPut { pairs }
        }
        0x06 => {
            r.expect_done("PING")?;
            Command::Ping
        }
        other => {
            return Err(NetError::Protocol(format!(
                "unknown opcode: 0x{other:02x}"
            )))
        }
    };

    Ok(command)
}

// =============================================================================
// Response encoding / decoding
// =============================================================================

/// Serializes a response into a full frame (header + payload).
#[must_use]
pub fn encode_response(response: &Response) -> Vec<u8> {
    let payload = response.payload.as_deref().unwrap_or(&[]);
    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame.push(response.status as u8);
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Parses a full response frame.
pub fn decode_response(bytes: &[u8]) -> Result<Response, NetError> {
    let (status_byte, payload) = split_frame(bytes)?;
    let status = match status_byte {
        0x00 => Status::Ok,
        0x01 => Status::NotFound,
        0x02 => Status::Error,
        other => {
            return Err(NetError::Protocol(format!(
                "unknown response status: 0x{other:02x}"
            )))
        }
    };
    let payload = if payload.is_empty() {
        None
    } else {
        Some(payload.to_vec())
    };
    Ok(Response { status, payload })
}

fn split_frame(bytes: &[u8]) -> Result<(u8, &[u8]), NetError> {
    if bytes.len() < HEADER_SIZE {
        return Err(NetError::Protocol(format!(
            "incomplete header: expected {HEADER_SIZE} bytes, got {}",
            bytes.len()
        )));
    }
    let tag = bytes[0];
    let payload_len =
        u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]) as usize;
    if payload_len > MAX_PAYLOAD_SIZE as usize {
        return Err(NetError::Protocol(format!(
            "payload too large: {payload_len} bytes (max {MAX_PAYLOAD_SIZE})"
        )));
    }
    if bytes.len() != HEADER_SIZE + payload_len {
        return Err(NetError::Protocol(format!(
            "frame length mismatch: header declares {payload_len} payload bytes, frame has {}",
            bytes.len() - HEADER_SIZE
        )));
    }
    Ok((tag, &bytes[HEADER_SIZE..]))
}

// =============================================================================
// Range entry list payloads
// =============================================================================

/// Encodes a range-scan result: `count (4)` then
/// `key_len (4) + key + val_len (4) + val` per entry.
#[must_use]
pub fn encode_entries(entries: &BTreeMap<String, Vec<u8>>) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&(entries.len() as u32).to_be_bytes());
    for (key, value) in entries {
        put_str(&mut payload, key);
        payload.extend_from_slice(&(value.len() as u32).to_be_bytes());
        payload.extend_from_slice(value);
    }
    payload
}

/// Decodes a range-scan result payload.
pub fn decode_entries(payload: &[u8]) -> Result<BTreeMap<String, Vec<u8>>, NetError> {
    let mut r = PayloadReader::new(payload);
    let count = r.read_u32("entry count")?;
    let mut entries = BTreeMap::new();
    for _ in 0..count {
        let key = r.read_str("entry key")?;
        let len = r.read_u32("entry value length")? as usize;
        let value = r.read_bytes(len, "entry value")?.to_vec();
        entries.insert(key, value);
    }
    r.expect_done("entries")?;
    Ok(entries)
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Reads one complete command frame from a stream. Blocks until the frame
/// arrives; an EOF at a frame boundary surfaces as `NetError::Io` with
/// `UnexpectedEof`.
pub fn read_command<R: Read>(reader: &mut R) -> Result<Command, NetError> {
    let frame = read_frame(reader)?;
    decode_command(&frame)
}

/// Writes one command frame to a stream.
pub fn write_command<W: Write>(writer: &mut W, command: &Command) -> Result<(), NetError> {
    writer.write_all(&encode_command(command))?;
    writer.flush()?;
    Ok(())
}

/// Reads one complete response frame from a stream.
pub fn read_response<R: Read>(reader: &mut R) -> Result<Response, NetError> {
    let frame = read_frame(reader)?;
    decode_response(&frame)
}

/// Writes one response frame to a stream.
pub fn write_response<W: Write>(writer: &mut W, response: &Response) -> Result<(), NetError> {
    writer.write_all(&encode_response(response))?;
    writer.flush()?;
    Ok(())
}

fn read_frame<R: Read>(reader: &mut R) -> Result<Vec<u8>, NetError> {
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header)?;

    let payload_len =
        u32::from_be_bytes([header[1], header[2], header[3], header[4]]) as usize;
    if payload_len > MAX_PAYLOAD_SIZE as usize {
        return Err(NetError::Protocol(format!(
            "payload too large: {payload_len} bytes (max {MAX_PAYLOAD_SIZE})"
        )));
    }

    let mut frame = vec![0u8; HEADER_SIZE + payload_len];
    frame[..HEADER_SIZE].copy_from_slice(&header);
    reader.read_exact(&mut frame[HEADER_SIZE..])?;
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(command: Command) {
        let encoded = encode_command(&command);
        assert_eq!(decode_command(&encoded).unwrap(), command);
    }

    #[test]
    fn command_round_trips() {
        round_trip(Command::Get {
            key: "user:1001".into(),
        });
        round_trip(Command::Put {
            key: "k".into(),
            value: Some(b"hello".to_vec()),
        });
        round_trip(Command::Put {
            key: "k".into(),
            value: None,
        });
        round_trip(Command::Put {
            key: "k".into(),
            value: Some(Vec::new()),
        });
        round_trip(Command::Delete { key: "gone".into() });
        round_trip(Command::ReadRange {
            start: "a".into(),
            end: "z".into(),
        });
        round_trip(Command::BatchPut {
            pairs: vec![
                ("a".into(), Some(b"1".to_vec())),
                ("b".into(), None),
                ("c".into(), Some(Vec::new())),
            ],
        });
        round_trip(Command::Ping);
    }

    #[test]
    fn response_round_trips() {
        for response in [
            Response::ok(),
            Response::ok_with(b"payload".to_vec()),
            Response::not_found(),
            Response::error("boom"),
        ] {
            let encoded = encode_response(&response);
            assert_eq!(decode_response(&encoded).unwrap(), response);
        }
    }

    #[test]
    fn entries_round_trip() {
        let mut entries = BTreeMap::new();
        entries.insert("a".to_string(), b"1".to_vec());
        entries.insert("b".to_string(), Vec::new());
        entries.insert("user:1003".to_string(), b"{\"n\":1}".to_vec());

        let payload = encode_entries(&entries);
        assert_eq!(decode_entries(&payload).unwrap(), entries);
    }

    #[test]
    fn empty_entry_list_round_trips() {
        let entries = BTreeMap::new();
        let payload = encode_entries(&entries);
        assert_eq!(decode_entries(&payload).unwrap(), entries);
    }

    #[test]
    fn unknown_opcode_is_rejected() {
        let frame = [0xee, 0, 0, 0, 0];
        assert!(matches!(
            decode_command(&frame),
            Err(NetError::Protocol(_))
        ));
    }

    #[test]
    fn truncated_frames_are_rejected() {
        assert!(matches!(
            decode_command(&[0x01, 0, 0]),
            Err(NetError::Protocol(_))
        ));

        // header promises more payload than the frame carries
        let frame = [0x01, 0, 0, 0, 10, b'x'];
        assert!(matches!(
            decode_command(&frame),
            Err(NetError::Protocol(_))
        ));
    }

    #[test]
    fn truncated_batch_payload_is_rejected() {
        let command = Command::BatchPut {
            pairs: vec![("key".into(), Some(b"value".to_vec()))],
        };
        let mut encoded = encode_command(&command);
        // chop the tail and fix up the declared length
        encoded.truncate(encoded.len() - 3);
        let new_len = (encoded.len() - HEADER_SIZE) as u32;
        encoded[1..5].copy_from_slice(&new_len.to_be_bytes());

        assert!(matches!(
            decode_command(&encoded),
            Err(NetError::Protocol(_))
        ));
    }

    #[test]
    fn oversized_payload_is_rejected_before_allocation() {
        let mut frame = vec![0x01];
        frame.extend_from_slice(&(MAX_PAYLOAD_SIZE + 1).to_be_bytes());
        assert!(matches!(
            decode_command(&frame),
            Err(NetError::Protocol(_))
        ));
    }

    #[test]
    fn stream_helpers_round_trip() {
        let command = Command::Put {
            key: "k".into(),
            value: Some(b"v".to_vec()),
        };
        let mut buf = Vec::new();
        write_command(&mut buf, &command).unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        assert_eq!(read_command(&mut cursor).unwrap(), command);
    }
}
