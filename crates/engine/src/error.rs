//! Error surface of the engine.

use segment::SegmentError;
use thiserror::Error;

/// Result type alias using [`EngineError`].
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A caller-supplied argument violates the API contract (empty key,
    /// mismatched batch lengths, inverted range bounds).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An underlying disk read, write, sync, or open failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A malformed segment was found while opening the store.
    #[error("corrupt store: {0}")]
    Corrupt(String),

    /// A single record is too large to fit even a fresh segment.
    #[error("record of {size} bytes exceeds the segment cap of {max} bytes")]
    TooLarge { size: u64, max: u64 },

    /// The engine has been closed.
    #[error("engine is closed")]
    Closed,
}

impl From<SegmentError> for EngineError {
    fn from(err: SegmentError) -> Self {
        match err {
            SegmentError::Io(e) => EngineError::Io(e),
            SegmentError::Corrupt { path, detail } => {
                EngineError::Corrupt(format!("{}: {detail}", path.display()))
            }
            // A sealed segment can only be reached through a closed engine.
            SegmentError::Sealed => EngineError::Closed,
        }
    }
}
