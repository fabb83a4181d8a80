use super::window;

/// Simple moving average. The first `period - 1` values are NaN.
pub fn sma(input: &[f64], period: f64, out: &mut [f64]) {
    let Some(p) = window(period, input.len(), out.len()) else {
        return;
    };
    out[..p - 1].fill(f64::NAN);
    for i in p - 1..input.len() {
        out[i] = window_mean(&input[i + 1 - p..=i]);
    }
}

pub(crate) fn window_mean(w: &[f64]) -> f64 {
    w.iter().sum::<f64>() / w.len() as f64
}
