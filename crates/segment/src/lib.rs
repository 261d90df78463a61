//! # Segment — append-only record file
//!
//! A segment is the unit of on-disk storage: a size-capped file holding a
//! sequence of length-prefixed records, plus an in-memory
//! index mapping each key to the absolute offset of its **value payload**
//! (the byte after the value-length prefix). The index always points at the
//! last record written for a key within this segment.
//!
//! Opening a segment rebuilds the index with a sequential scan. A record cut
//! short by a crash mid-append is truncated off so the file ends on a record
//! boundary; structurally impossible records (zero-length keys, lengths that
//! could never fit the segment, non-UTF-8 keys) fail the open instead.
//!
//! ## Lifecycle
//!
//! ```text
//! Open ──freeze()──> Frozen ──close()──> Closed
//! ```
//!
//! Only the engine's current segment is `Open`; a segment never becomes
//! writable again once frozen. Appends fsync before returning when `sync` is
//! on, which is the store's durability contract: a `true` return means the
//! record survives a crash.

mod format;

pub use format::{encode_record, encoded_len, RECORD_HEADER_BYTES, TOMBSTONE_LEN};

use byteorder::{BigEndian, ReadBytesExt};
use memtable::Stored;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Seek, SeekFrom, Write};
use std::ops::Bound::Included;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default size cap for a segment file (1 MiB).
pub const DEFAULT_MAX_SEGMENT_SIZE: u64 = 1024 * 1024;

/// Filename prefix shared by every segment in a data directory.
pub const SEGMENT_PREFIX: &str = "segment_";

/// Errors that can occur during segment operations.
#[derive(Debug, Error)]
pub enum SegmentError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A structurally invalid record or filename was found while opening.
    #[error("corrupt segment {}: {detail}", .path.display())]
    Corrupt { path: PathBuf, detail: String },

    /// The segment is frozen or closed and can no longer serve the request.
    #[error("segment is sealed")]
    Sealed,
}

/// Write-lifecycle state of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentState {
    /// Accepting appends (the engine's current segment).
    Open,
    /// Read-only; kept in the segment list for lookups.
    Frozen,
    /// Synced and out of service (engine shutdown).
    Closed,
}

/// Fields serialized behind the segment mutex: the file handle shared by
/// positional reads and appends, the offset index, and the append cursor.
struct SegmentInner {
    file: File,
    index: BTreeMap<String, u64>,
    /// End of file and next append point.
    offset: u64,
    state: SegmentState,
    /// Reusable append scratch buffer.
    buf: Vec<u8>,
}

/// An append-only segment file with an in-memory offset index.
pub struct Segment {
    path: PathBuf,
    id: u64,
    max_size: u64,
    sync: bool,
    inner: Mutex<SegmentInner>,
}

impl Segment {
    /// Opens (or creates) the segment file at `path` and rebuilds its index.
    ///
    /// The filename must be `segment_` followed by the numeric id. A
    /// truncated tail record is cut off and logged; any other malformed
    /// record fails with [`SegmentError::Corrupt`].
    pub fn open<P: AsRef<Path>>(path: P, max_size: u64, sync: bool) -> Result<Self, SegmentError> {
        let path = path.as_ref().to_path_buf();
        let id = parse_id(&path)?;

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)?;

        let (index, offset) = rebuild_index(&mut file, &path, max_size)?;

        Ok(Self {
            path,
            id,
            max_size,
            sync,
            inner: Mutex::new(SegmentInner {
                file,
                index,
                offset,
                state: SegmentState::Open,
                buf: Vec::with_capacity(256),
            }),
        })
    }

    /// Appends one record, returning `false` without writing anything if the
    /// record would push the file past the size cap.
    ///
    /// On `true`, the record bytes have been written and (when `sync` is on)
    /// fsynced, and the index points at the new value payload.
    ///
    /// # Errors
    ///
    /// [`SegmentError::Sealed`] if the segment is no longer `Open`;
    /// [`SegmentError::Io`] on write or sync failure.
    pub fn append(&self, key: &str, stored: &Stored) -> Result<bool, SegmentError> {
        let mut inner = self.inner.lock();
        if inner.state != SegmentState::Open {
            return Err(SegmentError::Sealed);
        }

        let record_len = format::encoded_len(key, stored);
        if inner.offset + record_len > self.max_size {
            return Ok(false);
        }

        let SegmentInner {
            file,
            index,
            offset,
            buf,
            ..
        } = &mut *inner;

        buf.clear();
        format::encode_record(buf, key, stored)?;

        file.seek(SeekFrom::Start(*offset))?;
        file.write_all(buf)?;
        if self.sync {
            file.sync_all()?;
        }

        // Index and cursor move only after the bytes are durable.
        index.insert(
            key.to_string(),
            *offset + RECORD_HEADER_BYTES + key.len() as u64,
        );
        *offset += record_len;

        Ok(true)
    }

    /// Looks up `key` in this segment.
    ///
    /// Tri-state result: `None` means the key was never written here,
    /// `Some(Stored::Tombstone)` means it was deleted here (and must shadow
    /// older segments), `Some(Stored::Value(_))` is a live hit.
    pub fn read(&self, key: &str) -> Result<Option<Stored>, SegmentError> {
        let mut inner = self.inner.lock();
        if inner.state == SegmentState::Closed {
            return Err(SegmentError::Sealed);
        }

        let SegmentInner { file, index, .. } = &mut *inner;
        match index.get(key) {
            Some(&offset) => Ok(Some(read_value_at(file, offset)?)),
            None => Ok(None),
        }
    }

    /// Returns every entry with `start <= key <= end`, in key order,
    /// tombstones included. Empty when `start > end`.
    pub fn read_range(&self, start: &str, end: &str) -> Result<Vec<(String, Stored)>, SegmentError> {
        if start > end {
            return Ok(Vec::new());
        }

        let mut inner = self.inner.lock();
        if inner.state == SegmentState::Closed {
            return Err(SegmentError::Sealed);
        }

        let SegmentInner { file, index, .. } = &mut *inner;
        let mut out = Vec::new();
        for (key, &offset) in index.range::<str, _>((Included(start), Included(end))) {
            out.push((key.clone(), read_value_at(file, offset)?));
        }
        Ok(out)
    }

    /// Marks the segment read-only. Idempotent; a closed segment stays
    /// closed.
    pub fn freeze(&self) {
        let mut inner = self.inner.lock();
        if inner.state == SegmentState::Open {
            inner.state = SegmentState::Frozen;
        }
    }

    /// Syncs and takes the segment out of service. Idempotent.
    pub fn close(&self) -> Result<(), SegmentError> {
        let mut inner = self.inner.lock();
        if inner.state == SegmentState::Closed {
            return Ok(());
        }
        inner.file.sync_all()?;
        inner.state = SegmentState::Closed;
        Ok(())
    }

    /// Numeric id parsed from the filename.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn state(&self) -> SegmentState {
        self.inner.lock().state
    }

    /// Number of distinct keys indexed in this segment.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().index.is_empty()
    }

    /// Current end-of-file offset, i.e. the file length.
    #[must_use]
    pub fn current_offset(&self) -> u64 {
        self.inner.lock().offset
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.lock().index.contains_key(key)
    }
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Segment")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("keys", &inner.index.len())
            .field("offset", &inner.offset)
            .field("state", &inner.state)
            .finish()
    }
}

/// Builds the canonical filename for a segment id: `segment_000042`.
#[must_use]
pub fn file_name(id: u64) -> String {
    format!("{SEGMENT_PREFIX}{id:06}")
}

fn parse_id(path: &Path) -> Result<u64, SegmentError> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| corrupt(path, "filename is not valid utf-8".to_string()))?;

    let suffix = name
        .strip_prefix(SEGMENT_PREFIX)
        .ok_or_else(|| corrupt(path, format!("filename does not start with {SEGMENT_PREFIX:?}")))?;

    suffix
        .parse::<u64>()
        .map_err(|_| corrupt(path, format!("filename suffix {suffix:?} is not a segment id")))
}

fn corrupt(path: &Path, detail: String) -> SegmentError {
    SegmentError::Corrupt {
        path: path.to_path_buf(),
        detail,
    }
}

/// Reads the value at a payload offset recorded in the index. The length
/// prefix sits in the 4 bytes just before the payload.
fn read_value_at(file: &mut File, offset: u64) -> Result<Stored, SegmentError> {
    file.seek(SeekFrom::Start(offset - 4))?;
    let value_len = file.read_u32::<BigEndian>()?;
    if value_len == TOMBSTONE_LEN {
        return Ok(Stored::Tombstone);
    }
    let mut value = vec![0u8; value_len as usize];
    std::io::Read::read_exact(file, &mut value)?;
    Ok(Stored::Value(value))
}

/// Scans the file from offset 0, indexing each complete record. Returns the
/// index and the end-of-file offset after any tail repair.
fn rebuild_index(
    file: &mut File,
    path: &Path,
    max_size: u64,
) -> Result<(BTreeMap<String, u64>, u64), SegmentError> {
    let file_len = file.metadata()?.len();
    file.seek(SeekFrom::Start(0))?;

    let mut index = BTreeMap::new();
    let mut offset = 0u64;
    let mut truncated = false;

    {
        let mut reader = BufReader::new(&mut *file);
        while offset < file_len {
            let remaining = file_len - offset;
            if remaining < 4 {
                truncated = true;
                break;
            }
            let key_len = u64::from(reader.read_u32::<BigEndian>()?);
            if key_len == 0 {
                return Err(corrupt(path, format!("zero-length key at offset {offset}")));
            }
            if key_len > max_size {
                return Err(corrupt(
                    path,
                    format!("key length {key_len} at offset {offset} exceeds the segment cap"),
                ));
            }
            if remaining < 4 + key_len {
                truncated = true;
                break;
            }

            let mut key_buf = vec![0u8; key_len as usize];
            std::io::Read::read_exact(&mut reader, &mut key_buf)?;
            let key = String::from_utf8(key_buf)
                .map_err(|_| corrupt(path, format!("key at offset {offset} is not valid utf-8")))?;

            if remaining < RECORD_HEADER_BYTES + key_len {
                truncated = true;
                break;
            }
            let value_len = reader.read_u32::<BigEndian>()?;
            let value_bytes = if value_len == TOMBSTONE_LEN {
                0
            } else {
                u64::from(value_len)
            };
            if value_bytes > max_size {
                return Err(corrupt(
                    path,
                    format!("value length {value_bytes} at offset {offset} exceeds the segment cap"),
                ));
            }
            if remaining < RECORD_HEADER_BYTES + key_len + value_bytes {
                truncated = true;
                break;
            }

            index.insert(key, offset + RECORD_HEADER_BYTES + key_len);
            reader.seek_relative(value_bytes as i64)?;
            offset += RECORD_HEADER_BYTES + key_len + value_bytes;
        }
    }

    if truncated {
        tracing::warn!(
            path = %path.display(),
            repaired_len = offset,
            original_len = file_len,
            "truncated tail record, repairing to last record boundary"
        );
        file.set_len(offset)?;
        file.sync_all()?;
    }

    Ok((index, offset))
}
