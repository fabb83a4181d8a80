//! Parabolic stop-and-reverse.
//!
//! The state is carried bar to bar by the caller. [`PsarState::update`] is a
//! pure function of the state and the two bars it reads, which is what lets
//! the backtest re-seed and advance the indicator on its own schedule.

use super::window;

/// Trade side, used to force the initial PSAR direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Long,
    Short,
}

/// `[af0, af_step, max_af]` of one configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PsarParams {
    pub af0: f64,
    pub step: f64,
    pub max_af: f64,
}

impl PsarParams {
    pub fn from_row(row: &[f64]) -> Self {
        Self {
            af0: row[0],
            step: row[1],
            max_af: row[2],
        }
    }
}

/// One bar's high/low pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HighLow {
    pub high: f64,
    pub low: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PsarState {
    pub is_long: bool,
    pub sar: f64,
    pub ep: f64,
    pub af: f64,
}

/// Result of advancing the state by one bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PsarUpdate {
    pub state: PsarState,
    /// SAR level in force for the bar before any flip (clamped candidate).
    pub stop: f64,
    /// Active-direction value; NaN on the inactive side.
    pub long: f64,
    pub short: f64,
    pub reversal: bool,
}

impl PsarState {
    pub const INVALID: PsarState = PsarState {
        is_long: false,
        sar: f64::NAN,
        ep: f64::NAN,
        af: f64::NAN,
    };

    pub fn is_valid(&self) -> bool {
        !self.sar.is_nan()
    }

    /// `(long, short)` plot values, NaN on the inactive side.
    pub fn split(&self) -> (f64, f64) {
        if self.is_long {
            (self.sar, f64::NAN)
        } else {
            (f64::NAN, self.sar)
        }
    }

    /// Seed from two consecutive bars.
    ///
    /// Without `force` the trend is falling when the low dropped more than the
    /// high rose and that drop is positive. NaN input yields an invalid state.
    pub fn init(prev: HighLow, prev_close: f64, cur: HighLow, af0: f64, force: Option<Side>) -> Self {
        if prev_close.is_nan() {
            return Self::INVALID;
        }
        let is_long = match force {
            Some(side) => side == Side::Long,
            None => {
                let up = cur.high - prev.high;
                let down = prev.low - cur.low;
                !(down > up && down > 0.0)
            }
        };
        Self {
            is_long,
            sar: prev_close,
            ep: if is_long { prev.high } else { prev.low },
            af: af0,
        }
    }

    /// Advance by bar `cur`, with `prev` the bar before it.
    pub fn update(&self, cur: HighLow, prev: HighLow, step: f64, max_af: f64) -> PsarUpdate {
        let candidate = if self.is_long {
            self.sar + self.af * (self.ep - self.sar)
        } else {
            self.sar - self.af * (self.sar - self.ep)
        };
        let reversal = if self.is_long {
            cur.low < candidate
        } else {
            cur.high > candidate
        };
        let stop = if self.is_long {
            candidate.min(prev.low)
        } else {
            candidate.max(prev.high)
        };

        let mut next = PsarState { sar: stop, ..*self };
        if self.is_long && cur.high > next.ep {
            next.ep = cur.high;
            next.af = max_af.min(self.af + step);
        } else if !self.is_long && cur.low < next.ep {
            next.ep = cur.low;
            next.af = max_af.min(self.af + step);
        }

        if reversal {
            next.is_long = !self.is_long;
            next.af = step;
            next.sar = self.ep;
            if next.is_long {
                next.sar = next.sar.min(cur.low);
                next.ep = cur.high;
            } else {
                next.sar = next.sar.max(cur.high);
                next.ep = cur.low;
            }
        }

        let (long, short) = next.split();
        PsarUpdate {
            state: next,
            stop,
            long,
            short,
            reversal,
        }
    }
}

/// Output columns of the PSAR series.
pub struct PsarColumns<'a> {
    pub long: &'a mut [f64],
    pub short: &'a mut [f64],
    pub af: &'a mut [f64],
    pub reversal: &'a mut [f64],
}

/// Full PSAR series.
///
/// Bar 0 only reports `af0` with no reversal. Bar 1 advances the seed state
/// where a flip resets `af` to `af0` and lands on the (possibly updated)
/// extreme point. Bars from 2 use [`PsarState::update`].
pub fn psar(high: &[f64], low: &[f64], close: &[f64], params: PsarParams, mut out: PsarColumns<'_>) {
    let n = close.len();
    let out_len = out.long.len().min(out.short.len()).min(out.af.len()).min(out.reversal.len());
    if window(1.0, n, out_len).is_none() || high.len() < n || low.len() < n {
        return;
    }
    out.long[..n].fill(f64::NAN);
    out.short[..n].fill(f64::NAN);
    out.af[..n].fill(f64::NAN);
    out.reversal[..n].fill(f64::NAN);
    if n < 2 {
        return;
    }
    out.af[0] = params.af0;
    out.reversal[0] = 0.0;

    let bar = |i: usize| HighLow {
        high: high[i],
        low: low[i],
    };
    let mut state = PsarState::init(bar(0), close[0], bar(1), params.af0, None);
    if !state.is_valid() {
        return;
    }

    let reversal = first_step(&mut state, bar(0), bar(1), params);
    let (long, short) = state.split();
    out.long[1] = long;
    out.short[1] = short;
    out.af[1] = state.af;
    out.reversal[1] = f64::from(u8::from(reversal));

    for i in 2..n {
        let upd = state.update(bar(i), bar(i - 1), params.step, params.max_af);
        state = upd.state;
        out.long[i] = upd.long;
        out.short[i] = upd.short;
        out.af[i] = state.af;
        out.reversal[i] = f64::from(u8::from(upd.reversal));
    }
}

fn first_step(state: &mut PsarState, b0: HighLow, b1: HighLow, params: PsarParams) -> bool {
    let candidate = if state.is_long {
        state.sar + state.af * (state.ep - state.sar)
    } else {
        state.sar - state.af * (state.sar - state.ep)
    };
    state.sar = if state.is_long {
        candidate.min(b0.low)
    } else {
        candidate.max(b0.high)
    };
    let reversal = if state.is_long {
        b1.low < candidate
    } else {
        b1.high > candidate
    };
    if state.is_long && b1.high > state.ep {
        state.ep = b1.high;
        state.af = params.max_af.min(state.af + params.step);
    } else if !state.is_long && b1.low < state.ep {
        state.ep = b1.low;
        state.af = params.max_af.min(state.af + params.step);
    }
    if reversal {
        state.is_long = !state.is_long;
        state.af = params.af0;
        state.sar = state.ep;
        if state.is_long {
            state.sar = state.sar.min(b1.low);
            state.ep = b1.high;
        } else {
            state.sar = state.sar.max(b1.high);
            state.ep = b1.low;
        }
    }
    reversal
}
