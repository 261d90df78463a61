//! # Memtable — in-memory write buffer
//!
//! A key-ordered buffer that absorbs recent writes before they are flushed
//! into a fresh segment. Keys map to a [`Stored`] entry, which is either a
//! live value or a tombstone; tombstones stay in the map so they can shadow
//! older on-disk values during reads.
//!
//! The buffer tracks an approximate byte size (key bytes + value bytes) that
//! the engine compares against its flush budget.

use std::collections::BTreeMap;
use std::ops::Bound::Included;

/// A buffered entry: either a live value or a deletion marker.
///
/// An empty value (`Stored::Value(vec![])`) is a real, representable value
/// and is distinct from `Stored::Tombstone`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stored {
    /// A live value.
    Value(Vec<u8>),
    /// A deletion marker that shadows older values for the same key.
    Tombstone,
}

impl Stored {
    /// Returns the value bytes, or `None` for a tombstone.
    pub fn as_value(&self) -> Option<&[u8]> {
        match self {
            Stored::Value(v) => Some(v),
            Stored::Tombstone => None,
        }
    }

    /// Returns `true` for a tombstone.
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        matches!(self, Stored::Tombstone)
    }

    /// Number of payload bytes this entry carries (0 for a tombstone).
    #[must_use]
    pub fn value_len(&self) -> usize {
        match self {
            Stored::Value(v) => v.len(),
            Stored::Tombstone => 0,
        }
    }
}

/// Key-ordered write buffer with byte accounting.
#[derive(Debug, Default)]
pub struct Memtable {
    map: BTreeMap<String, Stored>,
    approx_size: usize,
}

impl Memtable {
    pub fn new() -> Self {
        Self {
            map: BTreeMap::new(),
            approx_size: 0,
        }
    }

    /// Inserts or replaces an entry. Tombstones occupy a slot like any other
    /// write.
    pub fn insert(&mut self, key: String, stored: Stored) {
        let key_len = key.len();
        let value_len = stored.value_len();
        if let Some(old) = self.map.insert(key, stored) {
            // Replacement: the key bytes are already counted.
            self.approx_size = self.approx_size.saturating_sub(old.value_len());
            self.approx_size += value_len;
        } else {
            self.approx_size += key_len + value_len;
        }
    }

    /// Removes an entry, returning it if present.
    pub fn remove(&mut self, key: &str) -> Option<Stored> {
        let removed = self.map.remove(key);
        if let Some(ref stored) = removed {
            self.approx_size = self
                .approx_size
                .saturating_sub(key.len() + stored.value_len());
        }
        removed
    }

    /// Looks up an entry. A `Some(Stored::Tombstone)` result means the key
    /// was deleted here and must not fall through to older sources.
    pub fn get(&self, key: &str) -> Option<&Stored> {
        self.map.get(key)
    }

    /// Iterates entries with `start <= key <= end`, in key order.
    ///
    /// # Panics
    ///
    /// Panics if `start > end` (same contract as [`BTreeMap::range`]).
    pub fn range<'a>(
        &'a self,
        start: &str,
        end: &str,
    ) -> impl Iterator<Item = (&'a String, &'a Stored)> {
        self.map.range::<str, _>((Included(start), Included(end)))
    }

    /// Iterates all entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Stored)> {
        self.map.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Approximate buffered bytes: key bytes + value bytes across entries.
    #[must_use]
    pub fn approx_size(&self) -> usize {
        self.approx_size
    }

    /// Drops all entries and resets the byte accounting.
    pub fn clear(&mut self) {
        self.map.clear();
        self.approx_size = 0;
    }
}
