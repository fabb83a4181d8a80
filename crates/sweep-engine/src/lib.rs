//! Backend dispatch, buffer reuse and run configuration.
//!
//! ```no_run
//! use sweep_engine::{Backend, Engine, RunConfig};
//! # fn market() -> sweep_core::MarketSeries { unimplemented!() }
//! let cfg = RunConfig::load("configs/sma_cross.yaml")?;
//! let inputs = cfg.build_inputs(market(), None)?;
//! let mut engine = Engine::new(cfg.engine_options());
//! let out = engine.run(cfg.backend, &inputs)?;
//! # Ok::<(), sweep_core::SweepError>(())
//! ```

pub mod backend;
pub mod config;
pub mod engine;

pub use backend::Backend;
pub use config::RunConfig;
pub use engine::{Engine, EngineOptions, RunOutput};

use tracing_subscriber::EnvFilter;

/// Install a `fmt` subscriber filtered by `RUST_LOG` (default `info`).
///
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();
}
