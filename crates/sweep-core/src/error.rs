//! Error types for the sweep pipeline.
//!
//! Only host-side orchestration fails loudly. Everything that runs per bar
//! degrades to NaN / false / no-op instead.

use thiserror::Error;

/// Shape violations detected while planning the buffer layout.
///
/// Raised before any worker starts so a bad parameter matrix never fails
/// half-way through a sweep.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LayoutError {
    /// The backtest parameter matrix has no rows.
    #[error("no configurations to run (backtest parameter matrix is empty)")]
    NoConfigurations,

    /// A parameter matrix row count disagrees with `conf_count`.
    #[error("{block}: expected {expected} rows (one per configuration), got {actual}")]
    ParamRows {
        block: String,
        expected: usize,
        actual: usize,
    },

    /// A parameter matrix column count disagrees with the declared width.
    #[error("{block}: expected {expected} parameter columns, got {actual}")]
    ParamColumns {
        block: String,
        expected: usize,
        actual: usize,
    },

    /// Flat buffer length is not `rows * cols`.
    #[error("{block}: flat buffer of {len} values cannot be shaped as [{rows}, {cols}]")]
    FlatShape {
        block: String,
        len: usize,
        rows: usize,
        cols: usize,
    },

    /// The primary market series has no bars.
    #[error("market series is empty")]
    EmptyMarket,

    /// `min_rows` exceeds the number of bars in the primary series.
    #[error("min_rows {min_rows} exceeds market rows {rows}")]
    MinRows { min_rows: usize, rows: usize },

    /// Mapping array length does not equal the primary row count.
    #[error("mapping has {actual} entries, expected {expected}")]
    MappingLength { expected: usize, actual: usize },

    /// Mapping entry points past the end of the secondary series.
    #[error("mapping[{bar}] = {target} is out of range for a secondary series of {rows} rows")]
    MappingRange {
        bar: usize,
        target: usize,
        rows: usize,
    },

    /// A scratch width is below what the pipeline writes into.
    #[error("{kind} scratch width {actual} is below the required {required}")]
    ScratchTooNarrow {
        kind: &'static str,
        required: usize,
        actual: usize,
    },
}

/// Top-level error for a sweep run.
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("layout error: {0}")]
    Layout(#[from] LayoutError),

    /// Backend was requested but is not compiled in or has no device.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Device-side failure after a successful init (alloc, copy, launch).
    #[error("device error: {0}")]
    Device(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = SweepError> = std::result::Result<T, E>;
