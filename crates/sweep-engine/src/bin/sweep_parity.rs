//! Runs one sweep on every requested backend and compares the result blocks
//! against the sequential CPU run.
//!
//! Prints one JSON line per backend and exits non-zero on any mismatch.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use serde::Serialize;
use tracing::{error, info, warn};

use sweep_core::signals::SignalTemplate;
use sweep_core::{BufferSet, MarketSeries, SweepError};
use sweep_engine::config::SweepAxis;
use sweep_engine::{init_tracing, Backend, Engine, RunConfig};

#[derive(Parser)]
#[command(
    name = "sweep-parity",
    version,
    about = "Compare sweep backends on a synthetic or configured run"
)]
struct Args {
    /// Run config YAML. Without it a built-in SMA-cross sweep is used.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bars of synthetic market data.
    #[arg(long, default_value_t = 2_000)]
    bars: usize,

    /// Seed of the synthetic random walk.
    #[arg(long, default_value_t = 7)]
    seed: u64,

    /// Backends to compare against cpu-sequential.
    #[arg(long, value_delimiter = ',', default_values_t = [Backend::CpuParallel, Backend::Gpu])]
    backends: Vec<Backend>,

    /// Relative tolerance for float columns. CPU backends must match exactly.
    #[arg(long, default_value_t = 1e-9)]
    tolerance: f64,

    /// Also run a secondary series built from every fourth bar.
    #[arg(long, default_value_t = false)]
    secondary: bool,
}

#[derive(Debug, Serialize)]
struct ParityReport {
    backend: String,
    conf_count: usize,
    status: &'static str,
    indicator_mismatches: usize,
    backtest_mismatches: usize,
    signal_mismatches: usize,
    max_abs_diff: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

/// Deterministic random walk driven by a 64-bit LCG.
fn synthetic_market(bars: usize, seed: u64) -> MarketSeries {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    let mut next = move || {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        ((state >> 11) as f64 / (1u64 << 53) as f64) - 0.5
    };
    let mut close = 100.0;
    let rows: Vec<[f64; 6]> = (0..bars)
        .map(|i| {
            let open = close;
            let drift = 0.002 * (i as f64 * 0.013).sin();
            close = (close * (1.0 + drift + 0.02 * next())).max(1.0);
            let wick = close * 0.003 * (1.0 + next().abs());
            [
                i as f64 * 60.0,
                open,
                open.max(close) + wick,
                open.min(close) - wick,
                close,
                1.0 + next().abs(),
            ]
        })
        .collect();
    MarketSeries::from_rows(&rows)
}

/// Every `step`-th bar, keeping its timestamp so the mapping lines up.
fn downsample(market: &MarketSeries, step: usize) -> MarketSeries {
    let rows: Vec<[f64; 6]> = (0..market.len())
        .step_by(step)
        .map(|i| {
            [
                market.time[i],
                market.open[i],
                market.high[i],
                market.low[i],
                market.close[i],
                market.volume[i],
            ]
        })
        .collect();
    MarketSeries::from_rows(&rows)
}

fn default_config() -> RunConfig {
    let mut cfg = RunConfig::default();
    cfg.indicators.enabled = ["sma", "sma2", "bbands", "atr", "psar"].map(String::from).to_vec();
    cfg.secondary.enabled = vec!["sma".to_string(), "sma2".to_string()];
    cfg.backtest.pct_sl_enable = true;
    cfg.backtest.atr_tsl_enable = true;
    cfg.axes = vec![
        SweepAxis {
            path: "sma.period".to_string(),
            values: vec![5.0, 8.0, 13.0, 21.0],
        },
        SweepAxis {
            path: "sma2.period".to_string(),
            values: vec![30.0, 50.0, 80.0],
        },
        SweepAxis {
            path: "backtest.pct_sl".to_string(),
            values: vec![0.01, 0.02, 0.04],
        },
        SweepAxis {
            path: "backtest.psar_enable".to_string(),
            values: vec![0.0, 1.0],
        },
    ];
    cfg
}

struct Diff {
    count: usize,
    max_abs: f64,
}

fn diff_f64(a: &[f64], b: &[f64], tolerance: f64) -> Diff {
    let mut d = Diff { count: 0, max_abs: 0.0 };
    if a.len() != b.len() {
        d.count = a.len().max(b.len());
        return d;
    }
    for (&x, &y) in a.iter().zip(b) {
        if x.is_nan() && y.is_nan() {
            continue;
        }
        let abs = (x - y).abs();
        if !(abs <= tolerance * x.abs().max(1.0)) {
            d.count += 1;
        }
        if abs.is_finite() {
            d.max_abs = d.max_abs.max(abs);
        }
    }
    d
}

fn compare(backend: Backend, reference: &BufferSet, other: &BufferSet, tolerance: f64) -> ParityReport {
    let tol = if backend == Backend::Gpu { tolerance } else { 0.0 };
    let ind = diff_f64(
        &[reference.indicators.as_slice(), reference.indicators2.as_slice()].concat(),
        &[other.indicators.as_slice(), other.indicators2.as_slice()].concat(),
        tol,
    );
    let bt = diff_f64(reference.backtest.as_slice(), other.backtest.as_slice(), tol);
    let sig = reference
        .signals
        .as_slice()
        .iter()
        .zip(other.signals.as_slice())
        .filter(|(a, b)| a != b)
        .count();
    let ok = ind.count == 0 && bt.count == 0 && sig == 0;
    ParityReport {
        backend: backend.to_string(),
        conf_count: reference.conf_count(),
        status: if ok { "ok" } else { "mismatch" },
        indicator_mismatches: ind.count,
        backtest_mismatches: bt.count,
        signal_mismatches: sig,
        max_abs_diff: ind.max_abs.max(bt.max_abs),
        detail: None,
    }
}

fn run(args: &Args) -> Result<bool, SweepError> {
    let cfg = match &args.config {
        Some(path) => RunConfig::load(path)?,
        None if args.secondary => RunConfig {
            signal: SignalTemplate::SmaCrossConfirmed,
            ..default_config()
        },
        None => default_config(),
    };
    let market = synthetic_market(args.bars, args.seed);
    let secondary = args.secondary.then(|| downsample(&market, 4));
    let inputs = cfg.build_inputs(market, secondary)?;
    info!(conf_count = inputs.conf_count(), bars = args.bars, "parity run");

    // a fresh cache per backend keeps the result sets apart
    let mut reference_engine = Engine::new(cfg.engine_options());
    let reference = reference_engine.run(Backend::CpuSequential, &inputs)?;
    let reference = reference.buffers.lock().map_err(|e| SweepError::Device(e.to_string()))?.clone();

    let mut all_ok = true;
    for &backend in &args.backends {
        let mut engine = Engine::new(cfg.engine_options());
        let report = match engine.run(backend, &inputs) {
            Ok(out) => {
                let guard = out.buffers.lock().map_err(|e| SweepError::Device(e.to_string()))?;
                let mut report = compare(backend, &reference, &guard, args.tolerance);
                if let Some(g) = out.geometry {
                    report.detail = Some(format!("threads={} blocks={}", g.threads, g.blocks));
                }
                report
            }
            Err(SweepError::BackendUnavailable(why)) => {
                warn!(%backend, %why, "backend skipped");
                ParityReport {
                    backend: backend.to_string(),
                    conf_count: reference.conf_count(),
                    status: "skipped",
                    indicator_mismatches: 0,
                    backtest_mismatches: 0,
                    signal_mismatches: 0,
                    max_abs_diff: 0.0,
                    detail: Some(why),
                }
            }
            Err(e) => return Err(e),
        };
        all_ok &= report.status != "mismatch";
        match serde_json::to_string(&report) {
            Ok(line) => println!("{line}"),
            Err(e) => error!(error = %e, "failed to serialize report"),
        }
    }
    Ok(all_ok)
}

fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();
    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => {
            error!("backends disagree");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(error = %e, "parity run failed");
            ExitCode::from(2)
        }
    }
}
