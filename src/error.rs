//! Typed errors for pixel indexing, count-table parsing and estimator setup.

use std::path::PathBuf;

/// Errors raised by the selection-function core.
///
/// File-level loading wraps these in `anyhow::Error` with context about the
/// file being read; the pure geometry and aggregation code returns them
/// directly.
#[derive(Debug, thiserror::Error)]
pub enum SelectError {
    #[error("HEALPix depth {depth} exceeds the maximum supported depth {max}")]
    DepthOutOfRange { depth: u8, max: u8 },

    #[error("cannot coarsen from depth {fine_depth} to finer depth {coarse_depth}")]
    CoarsenDepth { fine_depth: u8, coarse_depth: u8 },

    #[error("pixel {pixel} is out of range for depth {depth} ({npix} pixels)")]
    PixelOutOfRange { pixel: u64, depth: u8, npix: u64 },

    #[error("invalid sky coordinate (lon={lon_deg}, lat={lat_deg}) degrees")]
    InvalidCoordinate { lon_deg: f64, lat_deg: f64 },

    #[error("subject catalog has {subject} rows but cross-matched reference has {reference}")]
    LengthMismatch { subject: usize, reference: usize },

    #[error("per-pixel array has {found} entries, expected {expected}")]
    MapLength { expected: usize, found: usize },

    #[error("estimator base depth {config} does not match count table depth {table}")]
    DepthMismatch { config: u8, table: u8 },

    #[error("{}:{line}: {msg}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        msg: String,
    },
}

pub type Result<T> = std::result::Result<T, SelectError>;
