//! Typed configuration errors

use thiserror::Error;

/// Reasons a run configuration is rejected before training starts
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("discount must be in [0, 1], got {0}")]
    DiscountOutOfRange(f64),

    #[error("env config must not contain `device`; pass device separately")]
    DeviceInEnvConfig,

    #[error("{field} must be at least 1")]
    Zero { field: &'static str },

    #[error("{field} must be non-negative, got {value}")]
    Negative { field: &'static str, value: f64 },

    #[error("{field} must be positive, got {value}")]
    NonPositive { field: &'static str, value: f64 },

    #[error("learning_rate must be positive, got {0}")]
    LearningRate(f64),

    #[error("oversight_prob must be in [0, 1], got {0}")]
    OversightProb(f64),

    #[error("grid {nrows}x{ncols} is too small to place agent, diamond and ghost")]
    GridTooSmall { nrows: usize, ncols: usize },

    #[error("{name} location ({row}, {col}) lies outside the {nrows}x{ncols} grid")]
    LocationOutOfBounds {
        name: &'static str,
        row: usize,
        col: usize,
        nrows: usize,
        ncols: usize,
    },

    #[error("diamond and ghost visualization locations must differ")]
    OverlappingLocations,

    #[error("policy needs at least one hidden layer")]
    NoHiddenLayers,

    #[error("failed to parse config: {0}")]
    Parse(String),
}

/// Failures while writing a metrics table
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("column `{column}` has {len} rows, expected {expected}")]
    Ragged {
        column: String,
        len: usize,
        expected: usize,
    },

    #[error("index column `{0}` is missing")]
    MissingIndex(String),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failures while drawing policy snapshots or assembling the GIF
#[derive(Debug, Error)]
pub enum DiagnosticsError {
    #[error("frame {path:?} is {got:?}, expected {expected:?}")]
    FrameSize {
        path: std::path::PathBuf,
        expected: (u32, u32),
        got: (u32, u32),
    },

    #[error("frame of {width}x{height} pixels is too large for a GIF")]
    TooLarge { width: u32, height: u32 },

    #[error("oversight map has {got} cells, expected {expected}")]
    OversightMap { got: usize, expected: usize },

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Gif(#[from] gif::EncodingError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
