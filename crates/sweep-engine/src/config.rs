//! Run configuration loaded from YAML.
//!
//! ```yaml
//! backend: cpu-parallel
//! signal: sma_cross
//! indicators:
//!   enabled: [sma, sma2]
//!   params:
//!     sma: [10]
//!     sma2: [30]
//! backtest:
//!   pct_sl_enable: true
//!   pct_sl: 0.02
//! axes:
//!   - path: sma.period
//!     values: [5, 10, 15]
//!   - path: backtest.pct_sl
//!     values: [0.01, 0.02]
//! ```
//!
//! Every axis multiplies the configuration count; the first axis varies
//! slowest.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use sweep_core::backtest::{BacktestParams, BACKTEST_PARAM_COUNT, BACKTEST_PARAM_NAMES};
use sweep_core::indicators::psar::PsarParams;
use sweep_core::signals::SignalTemplate;
use sweep_core::{
    IndicatorEnabled, IndicatorKind, IndicatorParams, MarketSeries, ParamMatrix, Result, RunInputs, ScratchWidths,
    SecondarySeries, SweepError,
};
use sweep_gpu::{env_flag, env_u32, GpuOptions};

use crate::backend::Backend;
use crate::engine::{EngineOptions, DEFAULT_CACHE_SIZE};

// ---------------------------------------------------------------------------
// Config structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub backend: Backend,
    pub signal: SignalTemplate,
    pub min_rows: usize,
    /// CPU worker threads for the parallel backend.
    pub threads: Option<usize>,
    pub scratch: ScratchConfig,
    pub cache: CacheConfig,
    pub gpu: GpuConfig,
    pub indicators: IndicatorConfig,
    /// Indicators of the second timeframe, when one is supplied.
    pub secondary: IndicatorConfig,
    pub backtest: BacktestConfig,
    pub axes: Vec<SweepAxis>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            signal: SignalTemplate::default(),
            min_rows: 1,
            threads: None,
            scratch: ScratchConfig::default(),
            cache: CacheConfig::default(),
            gpu: GpuConfig::default(),
            indicators: IndicatorConfig::default(),
            secondary: IndicatorConfig {
                enabled: Vec::new(),
                params: KindParams::default(),
            },
            backtest: BacktestConfig::default(),
            axes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScratchConfig {
    pub ints: usize,
    pub floats: usize,
    pub bools: usize,
}

impl Default for ScratchConfig {
    fn default() -> Self {
        let w = ScratchWidths::default();
        Self {
            ints: w.ints,
            floats: w.floats,
            bools: w.bools,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub max_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_CACHE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GpuConfig {
    pub autotune: bool,
    pub threads: Option<u32>,
    pub blocks: Option<u32>,
    pub desired_threads: u32,
}

impl Default for GpuConfig {
    fn default() -> Self {
        let g = GpuOptions::default();
        Self {
            autotune: g.autotune,
            threads: g.threads,
            blocks: g.blocks,
            desired_threads: g.desired_threads,
        }
    }
}

/// Enabled kinds by name plus base parameter rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IndicatorConfig {
    pub enabled: Vec<String>,
    pub params: KindParams,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            enabled: vec!["sma".to_string(), "sma2".to_string()],
            params: KindParams::default(),
        }
    }
}

/// Base parameter row per kind. Missing kinds use their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KindParams {
    pub sma: Option<Vec<f64>>,
    pub sma2: Option<Vec<f64>>,
    pub bbands: Option<Vec<f64>>,
    pub atr: Option<Vec<f64>>,
    pub psar: Option<Vec<f64>>,
}

impl KindParams {
    fn get(&self, kind: IndicatorKind) -> Option<&Vec<f64>> {
        match kind {
            IndicatorKind::Sma => self.sma.as_ref(),
            IndicatorKind::Sma2 => self.sma2.as_ref(),
            IndicatorKind::Bbands => self.bbands.as_ref(),
            IndicatorKind::Atr => self.atr.as_ref(),
            IndicatorKind::Psar => self.psar.as_ref(),
        }
    }

    /// Base row of `kind`, checked against its parameter count.
    fn row(&self, kind: IndicatorKind, field: &str) -> Result<Vec<f64>> {
        match self.get(kind) {
            None => Ok(kind.default_params().to_vec()),
            Some(v) if v.len() == kind.param_count() => Ok(v.clone()),
            Some(v) => Err(SweepError::Config(format!(
                "{field}.params.{}: expected {} values, got {}",
                kind.name(),
                kind.param_count(),
                v.len()
            ))),
        }
    }
}

/// Backtest parameters by name. Flags are booleans here and become 0/1 in
/// the parameter matrix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BacktestConfig {
    pub pct_sl_enable: bool,
    pub pct_tp_enable: bool,
    pub pct_tsl_enable: bool,
    pub pct_sl: f64,
    pub pct_tp: f64,
    pub pct_tsl: f64,
    pub atr_sl_enable: bool,
    pub atr_tp_enable: bool,
    pub atr_tsl_enable: bool,
    pub atr_period: f64,
    pub atr_sl_mult: f64,
    pub atr_tp_mult: f64,
    pub atr_tsl_mult: f64,
    pub psar_enable: bool,
    pub psar_af0: f64,
    pub psar_af_step: f64,
    pub psar_max_af: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestParams::default().into()
    }
}

impl From<BacktestParams> for BacktestConfig {
    fn from(p: BacktestParams) -> Self {
        Self {
            pct_sl_enable: p.pct_sl_enable,
            pct_tp_enable: p.pct_tp_enable,
            pct_tsl_enable: p.pct_tsl_enable,
            pct_sl: p.pct_sl,
            pct_tp: p.pct_tp,
            pct_tsl: p.pct_tsl,
            atr_sl_enable: p.atr_sl_enable,
            atr_tp_enable: p.atr_tp_enable,
            atr_tsl_enable: p.atr_tsl_enable,
            atr_period: p.atr_period,
            atr_sl_mult: p.atr_sl_mult,
            atr_tp_mult: p.atr_tp_mult,
            atr_tsl_mult: p.atr_tsl_mult,
            psar_enable: p.psar_enable,
            psar_af0: p.psar.af0,
            psar_af_step: p.psar.step,
            psar_max_af: p.psar.max_af,
        }
    }
}

impl From<BacktestConfig> for BacktestParams {
    fn from(c: BacktestConfig) -> Self {
        Self {
            pct_sl_enable: c.pct_sl_enable,
            pct_tp_enable: c.pct_tp_enable,
            pct_tsl_enable: c.pct_tsl_enable,
            pct_sl: c.pct_sl,
            pct_tp: c.pct_tp,
            pct_tsl: c.pct_tsl,
            atr_sl_enable: c.atr_sl_enable,
            atr_tp_enable: c.atr_tp_enable,
            atr_tsl_enable: c.atr_tsl_enable,
            atr_period: c.atr_period,
            atr_sl_mult: c.atr_sl_mult,
            atr_tp_mult: c.atr_tp_mult,
            atr_tsl_mult: c.atr_tsl_mult,
            psar_enable: c.psar_enable,
            psar: PsarParams {
                af0: c.psar_af0,
                step: c.psar_af_step,
                max_af: c.psar_max_af,
            },
        }
    }
}

/// A single axis in the parameter sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SweepAxis {
    /// `backtest.<name>`, `<kind>.<param>` or `secondary.<kind>.<param>`,
    /// e.g. `backtest.pct_sl`, `bbands.mult`, `secondary.sma.period`.
    pub path: String,
    pub values: Vec<f64>,
}

// ---------------------------------------------------------------------------
// Axis paths
// ---------------------------------------------------------------------------

/// Parameter names of each kind, in matrix column order.
pub fn param_names(kind: IndicatorKind) -> &'static [&'static str] {
    match kind {
        IndicatorKind::Sma | IndicatorKind::Sma2 | IndicatorKind::Atr => &["period"],
        IndicatorKind::Bbands => &["period", "mult"],
        IndicatorKind::Psar => &["af0", "step", "max_af"],
    }
}

/// Resolved column an axis writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisTarget {
    Backtest(usize),
    Indicator {
        secondary: bool,
        kind: IndicatorKind,
        param: usize,
    },
}

impl AxisTarget {
    pub fn parse(path: &str) -> Result<Self> {
        let unknown = || SweepError::Config(format!("unknown sweep axis path '{path}'"));
        let parts: Vec<&str> = path.trim().split('.').collect();
        let (secondary, rest) = match parts.as_slice() {
            ["backtest", name] => {
                return BACKTEST_PARAM_NAMES
                    .iter()
                    .position(|n| n == name)
                    .map(AxisTarget::Backtest)
                    .ok_or_else(unknown);
            }
            ["secondary", rest @ ..] => (true, rest),
            rest => (false, rest),
        };
        let [kind, param] = rest else {
            return Err(unknown());
        };
        let kind = IndicatorKind::from_name(kind).ok_or_else(unknown)?;
        let param = param_names(kind)
            .iter()
            .position(|n| n == param)
            .ok_or_else(unknown)?;
        Ok(AxisTarget::Indicator {
            secondary,
            kind,
            param,
        })
    }
}

/// Cartesian product of the axis values, first axis slowest.
pub fn generate_combinations(axes: &[SweepAxis]) -> Vec<Vec<f64>> {
    axes.iter().fold(vec![Vec::new()], |acc, axis| {
        acc.iter()
            .flat_map(|prefix| {
                axis.values.iter().map(move |&v| {
                    let mut combo = prefix.clone();
                    combo.push(v);
                    combo
                })
            })
            .collect()
    })
}

fn parse_enabled(names: &[String], field: &str) -> Result<IndicatorEnabled> {
    let mut enabled = IndicatorEnabled::none();
    for name in names {
        let kind = IndicatorKind::from_name(name.trim())
            .ok_or_else(|| SweepError::Config(format!("{field}: unknown indicator '{name}'")))?;
        enabled.set(kind, true);
    }
    Ok(enabled)
}

// ---------------------------------------------------------------------------
// Loading and building
// ---------------------------------------------------------------------------

impl RunConfig {
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw).map_err(|e| SweepError::Config(format!("invalid run config: {e}")))
    }

    /// Read `path` and apply the environment overrides on top.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let mut cfg: Self = serde_yaml::from_str(&raw)
            .map_err(|e| SweepError::Config(format!("{}: invalid run config: {e}", path.display())))?;
        cfg.apply_env()?;
        info!(path = %path.display(), backend = %cfg.backend, axes = cfg.axes.len(), "loaded run config");
        Ok(cfg)
    }

    /// Apply `SWEEP_BACKEND`, `SWEEP_GPU_THREADS`, `SWEEP_GPU_BLOCKS` and
    /// `SWEEP_GPU_AUTOTUNE`.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(v) = std::env::var("SWEEP_BACKEND") {
            self.backend = v.parse().map_err(SweepError::Config)?;
            debug!(backend = %self.backend, "SWEEP_BACKEND override");
        }
        if let Some(t) = env_u32("SWEEP_GPU_THREADS") {
            self.gpu.threads = Some(t);
        }
        if let Some(b) = env_u32("SWEEP_GPU_BLOCKS") {
            self.gpu.blocks = Some(b);
        }
        if let Some(on) = env_flag("SWEEP_GPU_AUTOTUNE") {
            self.gpu.autotune = on;
        }
        Ok(())
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            cache_max_size: self.cache.max_size,
            threads: self.threads,
            gpu: GpuOptions {
                autotune: self.gpu.autotune,
                threads: self.gpu.threads,
                blocks: self.gpu.blocks,
                desired_threads: self.gpu.desired_threads,
            },
        }
    }

    /// Number of configurations the axes expand to.
    pub fn conf_count(&self) -> usize {
        self.axes.iter().map(|a| a.values.len()).product()
    }

    /// Expand the axes into parameter matrices over `market`.
    ///
    /// `secondary` is the second timeframe; its bar mapping is built from
    /// timestamps.
    pub fn build_inputs(&self, market: MarketSeries, secondary: Option<MarketSeries>) -> Result<RunInputs> {
        let targets = self
            .axes
            .iter()
            .map(|a| AxisTarget::parse(&a.path))
            .collect::<Result<Vec<_>>>()?;
        let combos = generate_combinations(&self.axes);
        if combos.is_empty() {
            return Err(SweepError::Config("a sweep axis has no values".to_string()));
        }

        let base_bt = BacktestParams::from(self.backtest).to_row();
        let base1 = IndicatorKind::ALL.map(|k| self.indicators.params.row(k, "indicators"));
        let base2 = IndicatorKind::ALL.map(|k| self.secondary.params.row(k, "secondary"));
        let base1 = base1.into_iter().collect::<Result<Vec<_>>>()?;
        let base2 = base2.into_iter().collect::<Result<Vec<_>>>()?;

        let mut bt_rows: Vec<Vec<f64>> = Vec::with_capacity(combos.len());
        let mut ind1: Vec<Vec<Vec<f64>>> = vec![Vec::with_capacity(combos.len()); IndicatorKind::ALL.len()];
        let mut ind2: Vec<Vec<Vec<f64>>> = vec![Vec::with_capacity(combos.len()); IndicatorKind::ALL.len()];
        for combo in &combos {
            let mut bt = base_bt.to_vec();
            let mut row1 = base1.clone();
            let mut row2 = base2.clone();
            for (target, &value) in targets.iter().zip(combo) {
                match *target {
                    AxisTarget::Backtest(col) => bt[col] = value,
                    AxisTarget::Indicator {
                        secondary: false,
                        kind,
                        param,
                    } => row1[kind.index()][param] = value,
                    AxisTarget::Indicator {
                        secondary: true,
                        kind,
                        param,
                    } => row2[kind.index()][param] = value,
                }
            }
            debug_assert_eq!(bt.len(), BACKTEST_PARAM_COUNT);
            bt_rows.push(bt);
            for (k, r) in row1.into_iter().enumerate() {
                ind1[k].push(r);
            }
            for (k, r) in row2.into_iter().enumerate() {
                ind2[k].push(r);
            }
        }

        let mut inputs = RunInputs::new(market, self.signal, ParamMatrix::from_rows(&bt_rows)?);
        inputs.indicator_params = to_params(&ind1)?;
        inputs.enabled = parse_enabled(&self.indicators.enabled, "indicators.enabled")?;
        inputs.scratch = ScratchWidths {
            ints: self.scratch.ints,
            floats: self.scratch.floats,
            bools: self.scratch.bools,
        };
        inputs.min_rows = self.min_rows;
        if let Some(market2) = secondary {
            inputs.secondary = Some(SecondarySeries {
                market: market2,
                params: to_params(&ind2)?,
                enabled: parse_enabled(&self.secondary.enabled, "secondary.enabled")?,
                mapping: None,
            });
        }
        debug!(conf_count = inputs.conf_count(), "expanded sweep axes");
        Ok(inputs)
    }
}

fn to_params(rows: &[Vec<Vec<f64>>]) -> Result<IndicatorParams> {
    let mut params = IndicatorParams::defaults(0);
    for kind in IndicatorKind::ALL {
        params.set(kind, ParamMatrix::from_rows(&rows[kind.index()])?);
    }
    Ok(params)
}
