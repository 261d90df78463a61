//! Cold-start discovery of the segment set.

use crate::{EngineError, Options, Result};
use segment::Segment;
use std::path::Path;

/// Loads every `segment_*` file in `data_dir`, sorted by id ascending, and
/// verifies the ids form the dense sequence `0..n`.
///
/// Index rebuilding (including crash-tail repair) happens inside
/// [`Segment::open`]. A file matching the segment prefix whose suffix does
/// not parse is treated as a corrupt store, as is a gap in the ids.
pub(crate) fn load_segments(data_dir: &Path, opts: &Options) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();

    for entry in std::fs::read_dir(data_dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.starts_with(segment::SEGMENT_PREFIX) {
            continue;
        }
        segments.push(Segment::open(&path, opts.max_segment_size, opts.sync_writes)?);
    }

    segments.sort_by_key(Segment::id);

    for (expected, seg) in segments.iter().enumerate() {
        if seg.id() != expected as u64 {
            return Err(EngineError::Corrupt(format!(
                "segment ids are not dense: expected {expected}, found {} ({})",
                seg.id(),
                seg.path().display()
            )));
        }
    }

    Ok(segments)
}
