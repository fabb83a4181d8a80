use super::sma::window_mean;
use super::window;

/// Bollinger bands with population standard deviation (ddof = 0).
pub fn bbands(
    input: &[f64],
    period: f64,
    mult: f64,
    middle: &mut [f64],
    upper: &mut [f64],
    lower: &mut [f64],
) {
    let out_len = middle.len().min(upper.len()).min(lower.len());
    let Some(p) = window(period, input.len(), out_len) else {
        return;
    };
    for col in [&mut *middle, &mut *upper, &mut *lower] {
        col[..p - 1].fill(f64::NAN);
    }
    for i in p - 1..input.len() {
        let w = &input[i + 1 - p..=i];
        let mean = window_mean(w);
        let var = w.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / p as f64;
        let std = var.sqrt();
        middle[i] = mean;
        upper[i] = mean + mult * std;
        lower[i] = mean - mult * std;
    }
}
