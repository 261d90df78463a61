//! Read path: `read()` and `read_range()`.
//!
//! Point lookups check the memtable first (freshest data, tombstones
//! included), then segments from newest to oldest. The first source that
//! knows the key decides; a tombstone hides any older value.
//!
//! Range reads merge all sources in the same priority order: once a key is
//! decided — resolved to a value or occluded by a tombstone — older segments
//! cannot change it.

use crate::{Engine, EngineError, Result};
use memtable::Stored;
use std::collections::BTreeMap;

impl Engine {
    /// Looks up a key, returning `None` when it is absent or deleted.
    ///
    /// # Errors
    ///
    /// [`EngineError::Io`] on a segment read failure;
    /// [`EngineError::Closed`] after `close`.
    pub fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let inner = self.inner.read();
        self.check_open(&inner)?;

        if let Some(stored) = inner.mem.get(key) {
            return Ok(stored.as_value().map(<[u8]>::to_vec));
        }

        for seg in inner.segments.iter().rev() {
            match seg.read(key)? {
                Some(Stored::Value(v)) => return Ok(Some(v)),
                // A tombstone terminates the search: older segments may
                // still hold a live value for this key.
                Some(Stored::Tombstone) => return Ok(None),
                None => continue,
            }
        }

        Ok(None)
    }

    /// Returns every live key in the inclusive interval `[start, end]`, in
    /// key order, with the newest value for each.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidArgument`] when `start > end`;
    /// [`EngineError::Io`] on a segment read failure;
    /// [`EngineError::Closed`] after `close`.
    pub fn read_range(&self, start: &str, end: &str) -> Result<BTreeMap<String, Vec<u8>>> {
        if start > end {
            return Err(EngineError::InvalidArgument(format!(
                "range start {start:?} is greater than range end {end:?}"
            )));
        }

        let inner = self.inner.read();
        self.check_open(&inner)?;

        // Key -> Some(newest value) or None when occluded by a tombstone.
        let mut decided: BTreeMap<String, Option<Vec<u8>>> = BTreeMap::new();

        for (key, stored) in inner.mem.range(start, end) {
            decided.insert(key.clone(), stored.as_value().map(<[u8]>::to_vec));
        }

        for seg in inner.segments.iter().rev() {
            for (key, stored) in seg.read_range(start, end)? {
                if decided.contains_key(&key) {
                    continue;
                }
                let value = match stored {
                    Stored::Value(v) => Some(v),
                    Stored::Tombstone => None,
                };
                decided.insert(key, value);
            }
        }

        Ok(decided
            .into_iter()
            .filter_map(|(key, value)| value.map(|v| (key, v)))
            .collect())
    }
}
