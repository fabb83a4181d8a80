//! The per-configuration pipeline: indicators, then signals, then the bar
//! loop. Every backend runs exactly this for each configuration.

use crate::backtest;
use crate::indicators;
use crate::inputs::PreparedRun;
use crate::layout::{ConfigViewMut, BOOL_SLOT_COMPARE};
use crate::signals::templates::{self, TemplateInputs};

/// Run configuration `idx` into its own views.
pub fn run_config(run: &PreparedRun<'_>, idx: usize, view: ConfigViewMut<'_>) {
    let ConfigViewMut {
        mut indicators,
        mut indicators2,
        mut signals,
        mut backtest,
        mut scratch,
        mut scratch2,
    } = view;

    indicators::compute_series(
        run.market,
        run.params.row(idx),
        run.key.enabled,
        &mut indicators,
        &mut scratch.floats,
    );
    indicators::compute_series(
        &run.market2,
        run.params2.row(idx),
        run.key.enabled2,
        &mut indicators2,
        &mut scratch2.floats,
    );

    let inputs = TemplateInputs {
        enabled: run.key.enabled,
        enabled2: run.key.enabled2,
        indicators: indicators.each_ref().map(|c| c.as_columns()),
        indicators2: indicators2.each_ref().map(|c| c.as_columns()),
        mapping: &run.mapping,
    };
    templates::generate(
        run.signal,
        &inputs,
        &mut signals,
        scratch.bools.column_mut(BOOL_SLOT_COMPARE),
    );

    let params = run.backtest_row(idx);
    backtest::run_backtest(run.market, &params, &signals.as_columns(), &mut backtest, &mut scratch);
}
