use crate::{Engine, Options};
use std::fs;
use std::path::Path;

/// Options with fsync off so tests stay fast; durability-specific tests opt
/// back in explicitly.
pub fn fast_opts() -> Options {
    Options {
        sync_writes: false,
        ..Options::default()
    }
}

/// Fast options with explicit sizing, for tests that force rolls/flushes.
pub fn sized_opts(max_segment_size: u64, memtable_budget: usize) -> Options {
    Options {
        max_segment_size,
        memtable_budget,
        sync_writes: false,
    }
}

pub fn open_fast(dir: &Path) -> Engine {
    Engine::open_with(dir, fast_opts()).unwrap()
}

pub fn count_segment_files(dir: &Path) -> usize {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_name()
                .to_str()
                .map(|n| n.starts_with(segment::SEGMENT_PREFIX))
                .unwrap_or(false)
        })
        .count()
}

/// Largest segment file in `dir`, in bytes.
pub fn max_segment_file_len(dir: &Path) -> u64 {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_name()
                .to_str()
                .map(|n| n.starts_with(segment::SEGMENT_PREFIX))
                .unwrap_or(false)
        })
        .map(|e| e.metadata().unwrap().len())
        .max()
        .unwrap_or(0)
}
