//! # Engine — StrataKV storage engine
//!
//! The central orchestrator tying the [`memtable`] and [`segment`] crates
//! into a persistent key-value store with point and range reads.
//!
//! ## Architecture
//!
//! ```text
//! Caller
//!   |
//!   v
//! ┌─────────────────────────────────────────────────┐
//! │                    ENGINE                       │
//! │                                                 │
//! │ write.rs → append to current segment (fsync)    │
//! │              |        → roll on refusal         │
//! │              v                                  │
//! │           memtable insert                       │
//! │              |  (byte budget reached?)          │
//! │              v            yes                   │
//! │           flush() → fresh segment, drain        │
//! │                     memtable in key order       │
//! │                                                 │
//! │ read.rs → memtable → segments newest→oldest     │
//! │            (first hit wins, tombstones shadow)  │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module        | Purpose                                              |
//! |---------------|------------------------------------------------------|
//! | `lib.rs`      | `Engine` struct, options, constructor, accessors, `Debug`, `Drop` |
//! | [`recovery`]  | Segment discovery, ordering and density checks at startup |
//! | [`write`]     | `put()`, `delete()`, `batch_put()`, `flush()`, `close()` |
//! | [`read`]      | `read()`, `read_range()`                             |
//! | [`error`]     | Typed error kinds                                    |
//!
//! ## Concurrency
//!
//! One reader–writer lock guards the memtable, the segment list and the
//! current-segment pointer. Point and range reads share the read lock;
//! `put`/`delete`/`batch_put`/`flush`/`close` take the write lock. Each
//! segment keeps its own mutex so concurrent readers can touch different
//! segments while positional file reads stay serialized with appends.
//!
//! ## Durability
//!
//! Every record is appended to the current segment and (with
//! [`Options::sync_writes`] on) fsynced **before** the memtable insert, so
//! the memtable only ever reflects durable state. Once a write call returns,
//! the record survives a crash; reopening the directory rebuilds every
//! segment index from the files themselves.

mod error;
mod read;
mod recovery;
mod write;

pub use error::{EngineError, Result};
pub use memtable::Stored;
pub use segment::DEFAULT_MAX_SEGMENT_SIZE;

use memtable::Memtable;
use parking_lot::RwLock;
use segment::Segment;
use std::path::{Path, PathBuf};

/// Default memtable byte budget that triggers a flush (1 MiB).
pub const DEFAULT_MEMTABLE_BUDGET: usize = 1024 * 1024;

/// Maximum allowed key size in bytes (2³¹ − 1, the record format's limit).
pub const MAX_KEY_LEN: usize = (u32::MAX >> 1) as usize;
/// Maximum allowed value size in bytes (2³¹ − 1, the record format's limit).
pub const MAX_VALUE_LEN: usize = (u32::MAX >> 1) as usize;

/// Engine configuration. All knobs are constructor arguments; there are no
/// environment variables or config files in the library.
#[derive(Debug, Clone)]
pub struct Options {
    /// Size cap per segment file. A write refused by a full segment rolls a
    /// fresh one.
    pub max_segment_size: u64,

    /// Memtable byte budget (key + value bytes) that triggers a flush.
    pub memtable_budget: usize,

    /// Fsync every appended record before acknowledging the write.
    pub sync_writes: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            max_segment_size: DEFAULT_MAX_SEGMENT_SIZE,
            memtable_budget: DEFAULT_MEMTABLE_BUDGET,
            sync_writes: true,
        }
    }
}

/// State guarded by the engine lock: the write buffer, the ordered segment
/// list (the last element is the current, write-target segment) and the
/// closed flag.
pub(crate) struct Inner {
    pub(crate) mem: Memtable,
    pub(crate) segments: Vec<Segment>,
    pub(crate) closed: bool,
}

/// The storage engine.
///
/// # Write Path
///
/// 1. Append the record to the current segment; if the segment is full,
///    freeze it, roll a new one (id = segment count) and retry once.
/// 2. Insert the entry into the memtable.
/// 3. If the memtable byte budget is reached, flush: roll a fresh segment
///    and drain the memtable into it in key order.
///
/// # Read Path
///
/// 1. Check the memtable (freshest data, includes tombstones).
/// 2. Check segments from newest to oldest; the first segment that knows the
///    key decides — a tombstone hides older values.
///
/// # Recovery
///
/// [`Engine::open`] scans the data directory for `segment_*` files, rebuilds
/// each index (repairing a crash-truncated tail), checks that ids are dense,
/// and appends new writes to the highest-id segment.
pub struct Engine {
    data_dir: PathBuf,
    opts: Options,
    inner: RwLock<Inner>,
}

impl Engine {
    /// Opens a store in `data_dir` with default [`Options`], creating the
    /// directory and an initial segment if needed.
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        Self::open_with(data_dir, Options::default())
    }

    /// Opens a store with explicit options.
    ///
    /// # Errors
    ///
    /// [`EngineError::Corrupt`] if a segment file is malformed or ids are
    /// not dense; [`EngineError::Io`] on any directory or file failure.
    pub fn open_with<P: AsRef<Path>>(data_dir: P, opts: Options) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)?;

        let engine = Self {
            data_dir,
            opts,
            inner: RwLock::new(Inner {
                mem: Memtable::new(),
                segments: Vec::new(),
                closed: false,
            }),
        };

        {
            let mut inner = engine.inner.write();
            inner.segments = recovery::load_segments(&engine.data_dir, &engine.opts)?;
            if inner.segments.is_empty() {
                engine.roll_segment(&mut inner)?;
            } else {
                // Everything but the highest id is read-only history.
                let last = inner.segments.len() - 1;
                for seg in &inner.segments[..last] {
                    seg.freeze();
                }
            }
            tracing::info!(
                data_dir = %engine.data_dir.display(),
                segments = inner.segments.len(),
                "opened store"
            );
        }

        Ok(engine)
    }

    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    #[must_use]
    pub fn options(&self) -> &Options {
        &self.opts
    }

    /// Number of segments currently on disk.
    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.inner.read().segments.len()
    }

    /// Entries currently buffered in the memtable.
    #[must_use]
    pub fn memtable_len(&self) -> usize {
        self.inner.read().mem.len()
    }

    /// Approximate bytes currently buffered in the memtable.
    #[must_use]
    pub fn memtable_bytes(&self) -> usize {
        self.inner.read().mem.approx_size()
    }

    pub(crate) fn check_open(&self, inner: &Inner) -> Result<()> {
        if inner.closed {
            Err(EngineError::Closed)
        } else {
            Ok(())
        }
    }

    /// Freezes the current segment and installs a fresh one with the next
    /// dense id. The old segment stays in the list for reads.
    pub(crate) fn roll_segment(&self, inner: &mut Inner) -> Result<()> {
        if let Some(current) = inner.segments.last() {
            current.freeze();
        }
        let id = inner.segments.len() as u64;
        let path = self.data_dir.join(segment::file_name(id));
        let seg = Segment::open(&path, self.opts.max_segment_size, self.opts.sync_writes)?;
        tracing::debug!(id, "rolled new segment");
        inner.segments.push(seg);
        Ok(())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("Engine")
            .field("data_dir", &self.data_dir)
            .field("max_segment_size", &self.opts.max_segment_size)
            .field("memtable_budget", &self.opts.memtable_budget)
            .field("sync_writes", &self.opts.sync_writes)
            .field("memtable_entries", &inner.mem.len())
            .field("memtable_bytes", &inner.mem.approx_size())
            .field("segments", &inner.segments.len())
            .field("closed", &inner.closed)
            .finish()
    }
}

/// Best-effort shutdown on drop.
///
/// Flushes the memtable and closes every segment unless [`Engine::close`]
/// already ran. Errors are discarded because `Drop` cannot propagate them;
/// every acknowledged write is already durable in a segment.
impl Drop for Engine {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests;
