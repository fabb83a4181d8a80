//! Column-wise indicators writing into preallocated result slices.
//!
//! Every function takes its output slices from the caller and never
//! allocates. Bad shapes or periods leave the output untouched; invalid
//! numbers come out as NaN.

pub mod atr;
pub mod bbands;
pub mod psar;
pub mod sma;

use crate::layout::{ColumnsMut, IndicatorEnabled, IndicatorKind, FLOAT_SLOT_TR, INDICATOR_KINDS};
use crate::market::MarketSeries;

/// Shared guard for windowed indicators.
///
/// Returns the integer period when the output can hold the input, the period
/// is at least 1 and the input covers a full window.
pub(crate) fn window(period: f64, input_len: usize, out_len: usize) -> Option<usize> {
    if out_len < input_len || !(period >= 1.0) {
        return None;
    }
    let p = period as usize;
    (input_len >= p).then_some(p)
}

/// Compute every enabled kind of one series into its result views.
///
/// Disabled kinds are skipped: their placeholder rows stay as the reset
/// left them. Enabled kinds are re-filled with NaN first so a reused buffer
/// never leaks a previous run's warm-up values.
pub fn compute_series(
    market: &MarketSeries,
    params: [&[f64]; INDICATOR_KINDS],
    enabled: IndicatorEnabled,
    results: &mut [ColumnsMut<'_, f64>; INDICATOR_KINDS],
    floats: &mut ColumnsMut<'_, f64>,
) {
    for kind in IndicatorKind::ALL {
        if !enabled.is_enabled(kind) {
            continue;
        }
        let p = params[kind.index()];
        let out = &mut results[kind.index()];
        for c in 0..out.cols() {
            out.column_mut(c).fill(f64::NAN);
        }
        match kind {
            IndicatorKind::Sma | IndicatorKind::Sma2 => {
                sma::sma(&market.close, p[0], out.column_mut(0));
            }
            IndicatorKind::Bbands => bbands_into(market, p, out),
            IndicatorKind::Atr => {
                let tr = floats.column_mut(FLOAT_SLOT_TR);
                atr::atr(&market.high, &market.low, &market.close, p[0], tr, out.column_mut(0));
            }
            IndicatorKind::Psar => {
                let mut cols = out.columns_mut().into_iter();
                if let (Some(long), Some(short), Some(af), Some(rev)) =
                    (cols.next(), cols.next(), cols.next(), cols.next())
                {
                    psar::psar(
                        &market.high,
                        &market.low,
                        &market.close,
                        psar::PsarParams::from_row(p),
                        psar::PsarColumns { long, short, af, reversal: rev },
                    );
                }
            }
        }
    }
}

fn bbands_into(market: &MarketSeries, p: &[f64], out: &mut ColumnsMut<'_, f64>) {
    let mut cols = out.columns_mut().into_iter();
    if let (Some(middle), Some(upper), Some(lower)) = (cols.next(), cols.next(), cols.next()) {
        bbands::bbands(&market.close, p[0], p[1], middle, upper, lower);
    }
}
