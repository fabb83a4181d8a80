//! True range, Wilder's moving average and ATR.

use super::window;

/// True range. `out[0]` is NaN because it has no previous close.
pub fn true_range(high: &[f64], low: &[f64], close: &[f64], out: &mut [f64]) {
    let n = close.len();
    if n == 0 || out.len() < n || high.len() < n || low.len() < n {
        return;
    }
    out[0] = f64::NAN;
    for i in 1..n {
        let (h, l, pc) = (high[i], low[i], close[i - 1]);
        out[i] = if h.is_nan() || l.is_nan() || pc.is_nan() {
            f64::NAN
        } else {
            (h - l).max((h - pc).abs()).max((l - pc).abs())
        };
    }
}

/// Wilder's moving average.
///
/// NaN through index `period - 1`; `out[period]` seeds with the mean of
/// `input[1..=period]` (index 0 is skipped because a true range starts NaN),
/// then `out[i] = (out[i-1] * (period - 1) + input[i]) / period`.
pub fn rma(input: &[f64], period: f64, out: &mut [f64]) {
    let Some(p) = window(period, input.len(), out.len()) else {
        return;
    };
    let n = input.len();
    out[..p].fill(f64::NAN);
    if n <= p {
        return;
    }
    let pf = p as f64;
    out[p] = input[1..=p].iter().sum::<f64>() / pf;
    for i in p + 1..n {
        out[i] = (out[i - 1] * (pf - 1.0) + input[i]) / pf;
    }
}

/// ATR = RMA(TR). `tr` is caller-provided scratch of at least the input
/// length.
pub fn atr(high: &[f64], low: &[f64], close: &[f64], period: f64, tr: &mut [f64], out: &mut [f64]) {
    if window(period, close.len(), out.len()).is_none() || tr.len() < close.len() {
        return;
    }
    true_range(high, low, close, tr);
    rma(&tr[..close.len()], period, out);
}
