use thiserror::Error;

use crate::surface::PixelFormat;

/// Errors surfaced by the paint core.
///
/// Degenerate geometry (zero brush scale, empty dab/surface intersection,
/// coincident samples) is not an error; those cases are silent no-ops.
#[derive(Debug, Error)]
pub enum PaintError {
    #[error("No brushes available for use with this tool.")]
    NoBrush,

    #[error("No paint dynamics available for use with this tool.")]
    NoDynamics,

    #[error("Unsupported pixel format: {0:?}")]
    UnsupportedFormat(PixelFormat),

    #[error("Out of memory allocating {bytes} bytes")]
    OutOfMemory { bytes: usize },

    #[error("No stroke is active")]
    StrokeNotActive,

    #[error("A stroke is already active")]
    StrokeAlreadyActive,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Undo data corrupted: {0}")]
    Compression(String),
}

impl From<PaintError> for String {
    fn from(err: PaintError) -> Self {
        err.to_string()
    }
}

/// Allocate a buffer of `len` copies of `value`, reporting allocation
/// failure instead of aborting.
pub fn try_alloc<T: Clone>(len: usize, value: T) -> Result<Vec<T>, PaintError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| PaintError::OutOfMemory {
            bytes: len.saturating_mul(std::mem::size_of::<T>()),
        })?;
    buf.resize(len, value);
    Ok(buf)
}
