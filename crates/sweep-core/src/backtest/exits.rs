//! Live position state and the stop/target exit resolver.

use super::BacktestParams;
use crate::indicators::psar::{HighLow, PsarState, Side};

/// Market data the resolver reads for bar `i`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarData {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub prev_high: f64,
    pub prev_low: f64,
    pub prev_close: f64,
    pub atr: f64,
}

impl BarData {
    fn cur(&self) -> HighLow {
        HighLow {
            high: self.high,
            low: self.low,
        }
    }

    fn prev(&self) -> HighLow {
        HighLow {
            high: self.prev_high,
            low: self.prev_low,
        }
    }
}

/// Exit conditions, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitReason {
    Psar,
    PctStopLoss,
    AtrStopLoss,
    PctTrailingStop,
    AtrTrailingStop,
    PctTakeProfit,
    AtrTakeProfit,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitTrigger {
    pub reason: ExitReason,
    pub price: f64,
}

/// Everything carried bar to bar while a position is open. Levels are NaN
/// when their rule is disabled or could not be computed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionState {
    pub entry_price: f64,
    pub pct_sl: f64,
    pub pct_tp: f64,
    pub pct_tsl: f64,
    pub atr_sl: f64,
    pub atr_tp: f64,
    pub atr_tsl: f64,
    pub psar: PsarState,
    /// Whether the last PSAR update of this position flipped.
    pub psar_reversal: bool,
}

impl Default for PositionState {
    fn default() -> Self {
        Self::FLAT
    }
}

impl PositionState {
    pub const FLAT: PositionState = PositionState {
        entry_price: f64::NAN,
        pct_sl: f64::NAN,
        pct_tp: f64::NAN,
        pct_tsl: f64::NAN,
        atr_sl: f64::NAN,
        atr_tp: f64::NAN,
        atr_tsl: f64::NAN,
        psar: PsarState::INVALID,
        psar_reversal: false,
    };

    /// Open a position at `bar.open`.
    ///
    /// Fixed levels are taken from the entry price, trailing levels are
    /// seeded from the open and the PSAR is seeded in the position direction
    /// from the previous and current bar, then advanced through the current
    /// bar.
    pub fn open(side: Side, bar: &BarData, p: &BacktestParams) -> Self {
        let s = sign(side);
        let entry = bar.open;
        let atr_dist = |mult: f64| bar.atr * mult;
        let mut state = Self {
            entry_price: entry,
            pct_sl: enabled(p.pct_sl_enable, entry * (1.0 - s * p.pct_sl)),
            pct_tp: enabled(p.pct_tp_enable, entry * (1.0 + s * p.pct_tp)),
            pct_tsl: enabled(p.pct_tsl_enable, entry * (1.0 - s * p.pct_tsl)),
            atr_sl: enabled(p.atr_sl_enable, entry - s * atr_dist(p.atr_sl_mult)),
            atr_tp: enabled(p.atr_tp_enable, entry + s * atr_dist(p.atr_tp_mult)),
            atr_tsl: enabled(p.atr_tsl_enable, entry - s * atr_dist(p.atr_tsl_mult)),
            ..Self::FLAT
        };
        if p.psar_enable {
            let seed = PsarState::init(bar.prev(), bar.prev_close, bar.cur(), p.psar.af0, Some(side));
            if seed.is_valid() {
                let upd = seed.update(bar.cur(), bar.prev(), p.psar.step, p.psar.max_af);
                state.psar = upd.state;
                state.psar_reversal = upd.reversal;
            }
        }
        state
    }

    /// Drop the PSAR and trailing-stop state after a forced exit.
    pub fn reset_trailing(&mut self) {
        self.psar = PsarState::INVALID;
        self.psar_reversal = false;
        self.pct_tsl = f64::NAN;
        self.atr_tsl = f64::NAN;
    }
}

fn sign(side: Side) -> f64 {
    match side {
        Side::Long => 1.0,
        Side::Short => -1.0,
    }
}

fn enabled(on: bool, level: f64) -> f64 {
    if on {
        level
    } else {
        f64::NAN
    }
}

/// Close has moved through a protective level. NaN never breaches.
fn adverse(side: Side, close: f64, level: f64) -> bool {
    match side {
        Side::Long => close <= level,
        Side::Short => close >= level,
    }
}

/// Close has reached a profit target. NaN never breaches.
fn favorable(side: Side, close: f64, level: f64) -> bool {
    match side {
        Side::Long => close >= level,
        Side::Short => close <= level,
    }
}

/// Fill price of a PSAR breach: the stop level, or the open when the bar
/// gapped through it, kept inside the bar's range.
fn psar_fill(side: Side, stop: f64, bar: &BarData) -> f64 {
    match side {
        Side::Long => bar.open.min(stop).max(bar.low),
        Side::Short => bar.open.max(stop).min(bar.high),
    }
}

/// Move a trailing level only in the position's favour. A NaN level is
/// re-seeded from `seed` first.
fn ratchet(side: Side, level: f64, seed: f64, candidate: f64) -> f64 {
    let base = if level.is_nan() { seed } else { level };
    match side {
        Side::Long => base.max(candidate),
        Side::Short => base.min(candidate),
    }
}

/// Check every exit rule for an open position on one bar.
///
/// Trailing levels and the PSAR are advanced as a side effect. Every rule is
/// evaluated; the strongest breach wins in the order PSAR, stop loss,
/// trailing stop, take profit, with the percentage rule ahead of the ATR
/// rule inside each class. Trailing stops test the level carried in from the
/// previous bar before ratcheting. On a breach the PSAR and trailing levels
/// are reset.
pub fn resolve_exits(side: Side, pos: &mut PositionState, bar: &BarData, p: &BacktestParams) -> Option<ExitTrigger> {
    let s = sign(side);
    let entry = pos.entry_price;

    let psar = if p.psar_enable && pos.psar.is_valid() {
        let with_position = pos.psar.is_long == (side == Side::Long);
        let upd = pos.psar.update(bar.cur(), bar.prev(), p.psar.step, p.psar.max_af);
        pos.psar = upd.state;
        pos.psar_reversal = upd.reversal;
        // a flip back toward the position is not a breach
        (with_position && upd.reversal).then(|| psar_fill(side, upd.stop, bar))
    } else {
        None
    };

    let pct_sl = p.pct_sl_enable && adverse(side, bar.close, pos.pct_sl);
    let atr_sl = p.atr_sl_enable && adverse(side, bar.close, pos.atr_sl);

    let pct_tsl_prev = pos.pct_tsl;
    let atr_tsl_prev = pos.atr_tsl;
    let pct_tsl = p.pct_tsl_enable && adverse(side, bar.close, pct_tsl_prev);
    let atr_tsl = p.atr_tsl_enable && adverse(side, bar.close, atr_tsl_prev);
    if p.pct_tsl_enable {
        let seed = entry * (1.0 - s * p.pct_tsl);
        pos.pct_tsl = ratchet(side, pct_tsl_prev, seed, bar.close * (1.0 - s * p.pct_tsl));
    }
    if p.atr_tsl_enable {
        let dist = bar.atr * p.atr_tsl_mult;
        pos.atr_tsl = ratchet(side, atr_tsl_prev, entry - s * dist, bar.close - s * dist);
    }

    let pct_tp = p.pct_tp_enable && favorable(side, bar.close, pos.pct_tp);
    let atr_tp = p.atr_tp_enable && favorable(side, bar.close, pos.atr_tp);

    let ranked = [
        (ExitReason::Psar, psar),
        (ExitReason::PctStopLoss, pct_sl.then_some(pos.pct_sl)),
        (ExitReason::AtrStopLoss, atr_sl.then_some(pos.atr_sl)),
        (ExitReason::PctTrailingStop, pct_tsl.then_some(pct_tsl_prev)),
        (ExitReason::AtrTrailingStop, atr_tsl.then_some(atr_tsl_prev)),
        (ExitReason::PctTakeProfit, pct_tp.then_some(pos.pct_tp)),
        (ExitReason::AtrTakeProfit, atr_tp.then_some(pos.atr_tp)),
    ];
    let hit = ranked
        .into_iter()
        .find_map(|(reason, price)| price.map(|price| ExitTrigger { reason, price }));
    if hit.is_some() {
        pos.reset_trailing();
    }
    hit
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::psar::PsarParams;

    fn params() -> BacktestParams {
        BacktestParams {
            psar: PsarParams {
                af0: 0.02,
                step: 0.02,
                max_af: 0.2,
            },
            ..BacktestParams::default()
        }
    }

    fn bar(open: f64, high: f64, low: f64, close: f64) -> BarData {
        BarData {
            open,
            high,
            low,
            close,
            prev_high: 101.0,
            prev_low: 99.0,
            prev_close: 100.0,
            atr: 2.0,
        }
    }

    #[test]
    fn test_open_long_levels() {
        let p = BacktestParams {
            pct_sl_enable: true,
            pct_sl: 0.1,
            pct_tp_enable: true,
            pct_tp: 0.2,
            atr_sl_enable: true,
            atr_sl_mult: 1.5,
            atr_tsl_enable: true,
            atr_tsl_mult: 2.0,
            ..params()
        };
        let pos = PositionState::open(Side::Long, &bar(100.0, 101.0, 99.0, 100.0), &p);
        assert_eq!(pos.entry_price, 100.0);
        assert!((pos.pct_sl - 90.0).abs() < 1e-9);
        assert!((pos.pct_tp - 120.0).abs() < 1e-9);
        assert_eq!(pos.atr_sl, 97.0);
        assert_eq!(pos.atr_tsl, 96.0);
        assert!(pos.atr_tp.is_nan());
        assert!(pos.pct_tsl.is_nan());
        assert!(!pos.psar.is_valid());
    }

    #[test]
    fn test_open_short_mirrors_levels() {
        let p = BacktestParams {
            atr_sl_enable: true,
            atr_sl_mult: 1.0,
            atr_tp_enable: true,
            atr_tp_mult: 3.0,
            ..params()
        };
        let pos = PositionState::open(Side::Short, &bar(100.0, 101.0, 99.0, 100.0), &p);
        assert_eq!(pos.atr_sl, 102.0);
        assert_eq!(pos.atr_tp, 94.0);
    }

    #[test]
    fn test_open_seeds_psar_in_position_direction() {
        let p = BacktestParams {
            psar_enable: true,
            ..params()
        };
        let pos = PositionState::open(Side::Short, &bar(99.0, 99.5, 98.0, 98.5), &p);
        assert!(pos.psar.is_valid());
        assert!(!pos.psar.is_long);
        assert_eq!(pos.psar.ep, 98.0);
    }

    #[test]
    fn test_nothing_enabled_never_exits() {
        let p = params();
        let mut pos = PositionState::open(Side::Long, &bar(100.0, 101.0, 99.0, 100.0), &p);
        assert_eq!(resolve_exits(Side::Long, &mut pos, &bar(100.0, 101.0, 1.0, 2.0), &p), None);
    }

    #[test]
    fn test_nan_atr_never_triggers() {
        let p = BacktestParams {
            atr_sl_enable: true,
            atr_sl_mult: 1.0,
            atr_tsl_enable: true,
            atr_tsl_mult: 1.0,
            ..params()
        };
        let mut entry = bar(100.0, 101.0, 99.0, 100.0);
        entry.atr = f64::NAN;
        let mut pos = PositionState::open(Side::Long, &entry, &p);
        let mut crash = bar(100.0, 100.0, 50.0, 50.0);
        crash.atr = f64::NAN;
        assert_eq!(resolve_exits(Side::Long, &mut pos, &crash, &p), None);
    }

    #[test]
    fn test_stop_loss_beats_take_profit_and_trailing() {
        // wide spread of levels, all breached by one close
        let p = BacktestParams {
            pct_sl_enable: true,
            pct_sl: 0.05,
            pct_tsl_enable: true,
            pct_tsl: 0.01,
            atr_tp_enable: true,
            atr_tp_mult: 1.0,
            ..params()
        };
        let mut pos = PositionState::open(Side::Short, &bar(100.0, 101.0, 99.0, 100.0), &p);
        // make the take profit also satisfied: absurd target above close
        pos.atr_tp = 200.0;
        let t = resolve_exits(Side::Short, &mut pos, &bar(100.0, 110.0, 100.0, 106.0), &p).unwrap();
        assert_eq!(t.reason, ExitReason::PctStopLoss);
        assert!((t.price - 105.0).abs() < 1e-9);
        assert!(pos.pct_tsl.is_nan());
        assert!(!pos.psar.is_valid());
    }

    #[test]
    fn test_trailing_tests_previous_level_then_ratchets() {
        let p = BacktestParams {
            atr_tsl_enable: true,
            atr_tsl_mult: 1.0,
            ..params()
        };
        let mut pos = PositionState::open(Side::Long, &bar(100.0, 101.0, 99.0, 100.0), &p);
        assert_eq!(pos.atr_tsl, 98.0);
        assert_eq!(resolve_exits(Side::Long, &mut pos, &bar(100.0, 111.0, 100.0, 110.0), &p), None);
        assert_eq!(pos.atr_tsl, 108.0);
        // pull-back that would not lower the stop
        assert_eq!(resolve_exits(Side::Long, &mut pos, &bar(110.0, 110.0, 108.5, 109.0), &p), None);
        assert_eq!(pos.atr_tsl, 108.0);
        let t = resolve_exits(Side::Long, &mut pos, &bar(109.0, 109.0, 100.0, 107.0), &p).unwrap();
        assert_eq!(t.reason, ExitReason::AtrTrailingStop);
        assert_eq!(t.price, 108.0);
        assert!(pos.atr_tsl.is_nan());
    }

    #[test]
    fn test_pct_rule_precedes_atr_rule() {
        let p = BacktestParams {
            pct_tp_enable: true,
            pct_tp: 0.01,
            atr_tp_enable: true,
            atr_tp_mult: 0.5,
            ..params()
        };
        let mut pos = PositionState::open(Side::Long, &bar(100.0, 101.0, 99.0, 100.0), &p);
        let t = resolve_exits(Side::Long, &mut pos, &bar(100.0, 105.0, 100.0, 104.0), &p).unwrap();
        assert_eq!(t.reason, ExitReason::PctTakeProfit);
        assert!((t.price - 101.0).abs() < 1e-9);
    }

    #[test]
    fn test_psar_reversal_has_top_priority() {
        let p = BacktestParams {
            psar_enable: true,
            atr_sl_enable: true,
            atr_sl_mult: 1.0,
            ..params()
        };
        let mut pos = PositionState::open(Side::Long, &bar(100.5, 102.0, 100.1, 101.5), &p);
        assert!(pos.psar.is_valid() && pos.psar.is_long);
        let level = pos.psar.sar;
        let mut crash = bar(99.0, 99.0, 80.0, 81.0);
        crash.prev_high = 102.0;
        crash.prev_low = 100.1;
        let t = resolve_exits(Side::Long, &mut pos, &crash, &p).unwrap();
        assert_eq!(t.reason, ExitReason::Psar);
        assert_eq!(level, 99.0);
        // gapped below the 99.12 stop: fills at the open
        assert_eq!(t.price, 99.0);
        assert!(!pos.psar.is_valid());
    }

    fn psar_position(is_long: bool, sar: f64, ep: f64, af: f64) -> PositionState {
        PositionState {
            entry_price: 100.0,
            psar: PsarState { is_long, sar, ep, af },
            ..PositionState::FLAT
        }
    }

    #[test]
    fn test_psar_fill_stays_inside_bar() {
        let p = BacktestParams {
            psar_enable: true,
            ..params()
        };
        // candidate 100 is breached by the 98 low; the stop clamps to the prior low 95
        let mut pos = psar_position(true, 90.0, 110.0, 0.5);
        let mut b = bar(100.0, 105.0, 98.0, 99.0);
        b.prev_high = 104.0;
        b.prev_low = 95.0;
        let t = resolve_exits(Side::Long, &mut pos, &b, &p).unwrap();
        assert_eq!(t.reason, ExitReason::Psar);
        assert_eq!(t.price, 98.0);
        assert!(t.price >= b.low && t.price <= b.high);

        // stop inside the bar fills at the stop
        let mut pos = psar_position(true, 90.0, 110.0, 0.5);
        let mut b = bar(103.0, 105.0, 98.0, 99.0);
        b.prev_high = 104.0;
        b.prev_low = 101.0;
        let t = resolve_exits(Side::Long, &mut pos, &b, &p).unwrap();
        assert_eq!(t.price, 100.0);

        // short side mirrors: stop 105 clamps down to the 102 high
        let mut pos = psar_position(false, 110.0, 90.0, 0.5);
        let mut b = bar(100.0, 102.0, 96.0, 101.0);
        b.prev_high = 105.0;
        b.prev_low = 97.0;
        let t = resolve_exits(Side::Short, &mut pos, &b, &p).unwrap();
        assert_eq!(t.reason, ExitReason::Psar);
        assert_eq!(t.price, 102.0);
    }

    #[test]
    fn test_psar_flip_toward_position_keeps_it_open() {
        let p = BacktestParams {
            psar_enable: true,
            ..params()
        };
        // short-side PSAR under a long position, flipped back by the 102 high
        let mut pos = psar_position(false, 101.0, 99.0, 0.02);
        assert!(resolve_exits(Side::Long, &mut pos, &bar(100.0, 102.0, 99.5, 101.5), &p).is_none());
        assert!(pos.psar.is_valid() && pos.psar.is_long);
        assert!(pos.psar_reversal);
    }
}
