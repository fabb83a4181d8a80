//! Per-configuration simulation pipeline for parameter-sweep backtests.
//!
//! `layout` owns the structure-of-arrays buffers; `pipeline` runs
//! indicators, signals and the bar loop for one configuration through its
//! views; `scheduler` fans configurations out over CPU workers.

pub mod backtest;
pub mod cache;
pub mod error;
pub mod indicators;
pub mod inputs;
pub mod layout;
pub mod market;
pub mod pipeline;
pub mod scheduler;
pub mod signals;

pub use cache::{CacheOutcome, OutputCache, SharedBuffers};
pub use error::{LayoutError, Result, SweepError};
pub use inputs::{PreparedRun, RunInputs, SecondarySeries};
pub use layout::{BufferSet, IndicatorEnabled, IndicatorKind, IndicatorParams, ParamMatrix, ScratchWidths, ShapeKey};
pub use market::MarketSeries;
