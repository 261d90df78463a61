//! Write path: `put()`, `delete()`, `batch_put()`, `flush()` and `close()`.
//!
//! All mutations take the engine write lock. Each record is appended to the
//! current segment (and fsynced) before the memtable is touched, so the
//! memtable never claims a write that did not reach disk.

use crate::{Engine, EngineError, Inner, Result, MAX_KEY_LEN, MAX_VALUE_LEN};
use memtable::Stored;

impl Engine {
    /// Inserts or updates a key. A `value` of `None` means delete: it is
    /// normalized to a tombstone record.
    ///
    /// The append is durable before this call returns (with
    /// [`crate::Options::sync_writes`] on). If the current segment is full,
    /// a fresh one is rolled and the append retried once.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidArgument`] for an empty or oversized key or an
    /// oversized value; [`EngineError::TooLarge`] if the record cannot fit
    /// even an empty segment; [`EngineError::Closed`] after `close`.
    pub fn put(&self, key: &str, value: Option<&[u8]>) -> Result<()> {
        validate_key(key)?;
        validate_value(value)?;
        let stored = match value {
            Some(v) => Stored::Value(v.to_vec()),
            None => Stored::Tombstone,
        };

        let mut inner = self.inner.write();
        self.check_open(&inner)?;
        self.apply_put(&mut inner, key, stored)
    }

    /// Deletes a key by writing a tombstone through the put path, then
    /// purging the key from the memtable. The on-disk tombstone is already
    /// durable at that point and remains the authoritative signal; the purge
    /// just stops the buffer from carrying a marker a segment records.
    pub fn delete(&self, key: &str) -> Result<()> {
        validate_key(key)?;

        let mut inner = self.inner.write();
        self.check_open(&inner)?;
        self.apply_put(&mut inner, key, Stored::Tombstone)?;
        inner.mem.remove(key);
        Ok(())
    }

    /// Applies `put(keys[i], values[i])` in order under a single write-lock
    /// acquisition.
    ///
    /// The batch is **not** atomic: a failure part-way through leaves the
    /// earlier writes durable.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidArgument`] if the slices differ in length,
    /// before anything is written.
    pub fn batch_put(&self, keys: &[&str], values: &[Option<&[u8]>]) -> Result<()> {
        if keys.len() != values.len() {
            return Err(EngineError::InvalidArgument(format!(
                "batch length mismatch: {} keys, {} values",
                keys.len(),
                values.len()
            )));
        }

        let mut inner = self.inner.write();
        self.check_open(&inner)?;
        for (key, value) in keys.iter().zip(values) {
            validate_key(key)?;
            validate_value(*value)?;
            let stored = match value {
                Some(v) => Stored::Value(v.to_vec()),
                None => Stored::Tombstone,
            };
            self.apply_put(&mut inner, key, stored)?;
        }
        Ok(())
    }

    /// Drains the memtable into a fresh segment, in key order. A no-op when
    /// the memtable is empty.
    pub fn flush(&self) -> Result<()> {
        let mut inner = self.inner.write();
        self.check_open(&inner)?;
        self.flush_locked(&mut inner)
    }

    /// Flushes the memtable and closes every segment. Idempotent; all other
    /// operations fail with [`EngineError::Closed`] afterwards.
    pub fn close(&self) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.closed {
            return Ok(());
        }
        self.flush_locked(&mut inner)?;
        for seg in &inner.segments {
            seg.close()?;
        }
        inner.closed = true;
        tracing::info!(data_dir = %self.data_dir().display(), "closed store");
        Ok(())
    }

    /// Durable append + memtable insert + budget check, in that order.
    fn apply_put(&self, inner: &mut Inner, key: &str, stored: Stored) -> Result<()> {
        self.append_durable(inner, key, &stored)?;
        inner.mem.insert(key.to_string(), stored);
        if inner.mem.approx_size() >= self.options().memtable_budget {
            self.flush_locked(inner)?;
        }
        Ok(())
    }

    /// Appends one record to the current segment, rolling a fresh segment at
    /// most once if the current one refuses.
    fn append_durable(&self, inner: &mut Inner, key: &str, stored: &Stored) -> Result<()> {
        let size = segment::encoded_len(key, stored);
        let max = self.options().max_segment_size;
        if size > max {
            return Err(EngineError::TooLarge { size, max });
        }

        let accepted = match inner.segments.last() {
            Some(current) => current.append(key, stored)?,
            None => false,
        };
        if accepted {
            return Ok(());
        }

        self.roll_segment(inner)?;
        let current = inner
            .segments
            .last()
            .ok_or_else(|| EngineError::Corrupt("segment list empty after roll".to_string()))?;
        if !current.append(key, stored)? {
            return Err(EngineError::TooLarge { size, max });
        }
        Ok(())
    }

    /// Flush with the write lock already held: roll a fresh segment, then
    /// drain the memtable into it in key order, rolling again whenever a
    /// segment fills.
    pub(crate) fn flush_locked(&self, inner: &mut Inner) -> Result<()> {
        if inner.mem.is_empty() {
            return Ok(());
        }
        let entries = inner.mem.len();
        let bytes = inner.mem.approx_size();

        self.roll_segment(inner)?;
        let mem = std::mem::take(&mut inner.mem);
        for (key, stored) in mem.iter() {
            self.append_durable(inner, key, stored)?;
        }

        tracing::debug!(entries, bytes, "flushed memtable");
        Ok(())
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(EngineError::InvalidArgument(
            "key must not be empty".to_string(),
        ));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(EngineError::InvalidArgument(format!(
            "key of {} bytes exceeds the maximum of {MAX_KEY_LEN} bytes",
            key.len()
        )));
    }
    Ok(())
}

fn validate_value(value: Option<&[u8]>) -> Result<()> {
    if let Some(v) = value {
        if v.len() > MAX_VALUE_LEN {
            return Err(EngineError::InvalidArgument(format!(
                "value of {} bytes exceeds the maximum of {MAX_VALUE_LEN} bytes",
                v.len()
            )));
        }
    }
    Ok(())
}
