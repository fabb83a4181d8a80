//! Bar-by-bar position simulation for one configuration.
//!
//! Each bar `i >= 1` first lets the exit resolver close an open position on
//! bar `i`'s prices; otherwise the previous bar's signals move the position
//! at bar `i`'s open. Balance, equity and drawdown are booked afterwards.

pub mod balance;
pub mod exits;
pub mod status;

use crate::indicators::atr;
use crate::indicators::psar::PsarParams;
use crate::layout::{Columns, ColumnsMut, ScratchMut, FLOAT_SLOT_MAX_BALANCE, FLOAT_SLOT_TR, INT_SLOT_DIRECTION};
use crate::market::MarketSeries;
use crate::signals::{SignalBar, SIGNAL_COLUMNS};

pub use balance::{Ledger, INIT_MONEY};
pub use exits::{resolve_exits, BarData, ExitReason, ExitTrigger, PositionState};
pub use status::{next_status, PositionStatus};

// ---------------------------------------------------------------------------
// Parameter row
// ---------------------------------------------------------------------------

pub const BACKTEST_PARAM_COUNT: usize = 17;

/// Column names of the backtest parameter matrix, in order.
pub const BACKTEST_PARAM_NAMES: [&str; BACKTEST_PARAM_COUNT] = [
    "pct_sl_enable",
    "pct_tp_enable",
    "pct_tsl_enable",
    "pct_sl",
    "pct_tp",
    "pct_tsl",
    "atr_sl_enable",
    "atr_tp_enable",
    "atr_tsl_enable",
    "atr_period",
    "atr_sl_mult",
    "atr_tp_mult",
    "atr_tsl_mult",
    "psar_enable",
    "psar_af0",
    "psar_af_step",
    "psar_max_af",
];

/// Decoded backtest parameter row. Flags are enabled when non-zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BacktestParams {
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
    pub psar: PsarParams,
}

impl Default for BacktestParams {
    /// Every rule off, with usable values behind each flag.
    fn default() -> Self {
        Self {
            pct_sl_enable: false,
            pct_tp_enable: false,
            pct_tsl_enable: false,
            pct_sl: 0.01,
            pct_tp: 0.01,
            pct_tsl: 0.01,
            atr_sl_enable: false,
            atr_tp_enable: false,
            atr_tsl_enable: false,
            atr_period: 14.0,
            atr_sl_mult: 2.0,
            atr_tp_mult: 2.0,
            atr_tsl_mult: 2.0,
            psar_enable: false,
            psar: PsarParams {
                af0: 0.02,
                step: 0.02,
                max_af: 0.2,
            },
        }
    }
}

impl BacktestParams {
    /// Decode one row. Panics if `row` is shorter than
    /// [`BACKTEST_PARAM_COUNT`]; the layout check guarantees the width.
    pub fn from_row(row: &[f64]) -> Self {
        let flag = |v: f64| v != 0.0 && !v.is_nan();
        Self {
            pct_sl_enable: flag(row[0]),
            pct_tp_enable: flag(row[1]),
            pct_tsl_enable: flag(row[2]),
            pct_sl: row[3],
            pct_tp: row[4],
            pct_tsl: row[5],
            atr_sl_enable: flag(row[6]),
            atr_tp_enable: flag(row[7]),
            atr_tsl_enable: flag(row[8]),
            atr_period: row[9],
            atr_sl_mult: row[10],
            atr_tp_mult: row[11],
            atr_tsl_mult: row[12],
            psar_enable: flag(row[13]),
            psar: PsarParams::from_row(&row[14..17]),
        }
    }

    pub fn to_row(&self) -> [f64; BACKTEST_PARAM_COUNT] {
        let f = |b: bool| if b { 1.0 } else { 0.0 };
        [
            f(self.pct_sl_enable),
            f(self.pct_tp_enable),
            f(self.pct_tsl_enable),
            self.pct_sl,
            self.pct_tp,
            self.pct_tsl,
            f(self.atr_sl_enable),
            f(self.atr_tp_enable),
            f(self.atr_tsl_enable),
            self.atr_period,
            self.atr_sl_mult,
            self.atr_tp_mult,
            self.atr_tsl_mult,
            f(self.psar_enable),
            self.psar.af0,
            self.psar.step,
            self.psar.max_af,
        ]
    }
}

// ---------------------------------------------------------------------------
// Result columns
// ---------------------------------------------------------------------------

pub const BACKTEST_RESULT_COUNT: usize = 17;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BacktestColumn {
    PositionStatus = 0,
    EntryPrice,
    ExitPrice,
    Equity,
    Balance,
    Drawdown,
    PctSl,
    PctTp,
    PctTsl,
    AtrPrice,
    AtrSlPrice,
    AtrTpPrice,
    AtrTslPrice,
    PsarLong,
    PsarShort,
    PsarAf,
    PsarReversal,
}

impl BacktestColumn {
    pub const ALL: [BacktestColumn; BACKTEST_RESULT_COUNT] = [
        BacktestColumn::PositionStatus,
        BacktestColumn::EntryPrice,
        BacktestColumn::ExitPrice,
        BacktestColumn::Equity,
        BacktestColumn::Balance,
        BacktestColumn::Drawdown,
        BacktestColumn::PctSl,
        BacktestColumn::PctTp,
        BacktestColumn::PctTsl,
        BacktestColumn::AtrPrice,
        BacktestColumn::AtrSlPrice,
        BacktestColumn::AtrTpPrice,
        BacktestColumn::AtrTslPrice,
        BacktestColumn::PsarLong,
        BacktestColumn::PsarShort,
        BacktestColumn::PsarAf,
        BacktestColumn::PsarReversal,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            BacktestColumn::PositionStatus => "position_status",
            BacktestColumn::EntryPrice => "entry_price",
            BacktestColumn::ExitPrice => "exit_price",
            BacktestColumn::Equity => "equity",
            BacktestColumn::Balance => "balance",
            BacktestColumn::Drawdown => "drawdown",
            BacktestColumn::PctSl => "pct_sl",
            BacktestColumn::PctTp => "pct_tp",
            BacktestColumn::PctTsl => "pct_tsl",
            BacktestColumn::AtrPrice => "atr_price",
            BacktestColumn::AtrSlPrice => "atr_sl_price",
            BacktestColumn::AtrTpPrice => "atr_tp_price",
            BacktestColumn::AtrTslPrice => "atr_tsl_price",
            BacktestColumn::PsarLong => "psar_long",
            BacktestColumn::PsarShort => "psar_short",
            BacktestColumn::PsarAf => "psar_af",
            BacktestColumn::PsarReversal => "psar_reversal",
        }
    }
}

// ---------------------------------------------------------------------------
// Bar loop
// ---------------------------------------------------------------------------

/// Simulate one configuration into its backtest block.
///
/// Every result column is rewritten. The ATR column is computed once for
/// the whole series with `atr_period`, using the TR scratch slot.
pub fn run_backtest(
    market: &MarketSeries,
    params: &BacktestParams,
    signals: &Columns<'_, bool>,
    out: &mut ColumnsMut<'_, f64>,
    scratch: &mut ScratchMut<'_>,
) {
    let n = market.len();
    for c in 0..out.cols() {
        out.column_mut(c).fill(f64::NAN);
    }
    if n == 0 || out.rows() < n || signals.rows() < n || signals.cols() < SIGNAL_COLUMNS {
        return;
    }

    atr::atr(
        &market.high,
        &market.low,
        &market.close,
        params.atr_period,
        scratch.floats.column_mut(FLOAT_SLOT_TR),
        out.column_mut(BacktestColumn::AtrPrice.index()),
    );

    let sig = [signals.column(0), signals.column(1), signals.column(2), signals.column(3)];
    let mut ledger = Ledger::new(INIT_MONEY);
    let mut pos = PositionState::FLAT;
    let mut status = PositionStatus::Flat;
    write_bar(out, scratch, 0, status, &pos, f64::NAN, &ledger);

    for i in 1..n {
        let prev = status;
        let entry_prev = pos.entry_price;
        let bar = BarData {
            open: market.open[i],
            high: market.high[i],
            low: market.low[i],
            close: market.close[i],
            prev_high: market.high[i - 1],
            prev_low: market.low[i - 1],
            prev_close: market.close[i - 1],
            atr: out.column(BacktestColumn::AtrPrice.index())[i],
        };

        let forced = prev.side().and_then(|side| {
            resolve_exits(side, &mut pos, &bar, params).map(|t| (PositionStatus::exit_of(side), t.price))
        });

        let mut exit_price = f64::NAN;
        if let Some((exit_status, price)) = forced {
            status = exit_status;
            exit_price = price;
        } else {
            status = next_status(prev, SignalBar::read(&sig, i - 1));
            if matches!(
                status,
                PositionStatus::ExitLong
                    | PositionStatus::ExitShort
                    | PositionStatus::ReverseToLong
                    | PositionStatus::ReverseToShort
            ) {
                exit_price = bar.open;
            }
            match status.side() {
                Some(side) if status.is_entry() => pos = PositionState::open(side, &bar, params),
                _ => {}
            }
        }
        if status.is_flat() {
            pos = PositionState::FLAT;
        }

        ledger.step(prev, status, entry_prev, exit_price, bar.open);
        write_bar(out, scratch, i, status, &pos, exit_price, &ledger);
    }
}

fn write_bar(
    out: &mut ColumnsMut<'_, f64>,
    scratch: &mut ScratchMut<'_>,
    i: usize,
    status: PositionStatus,
    pos: &PositionState,
    exit_price: f64,
    ledger: &Ledger,
) {
    use BacktestColumn as C;
    let open = !status.is_flat();
    let level = |v: f64| if open { v } else { f64::NAN };
    // the PSAR state is only ever valid while enabled
    let psar_live = open && pos.psar.is_valid();
    let (psar_long, psar_short) = if psar_live {
        pos.psar.split()
    } else {
        (f64::NAN, f64::NAN)
    };

    let row = [
        (C::PositionStatus, f64::from(status.code())),
        (C::EntryPrice, level(pos.entry_price)),
        (C::ExitPrice, exit_price),
        (C::Equity, ledger.equity),
        (C::Balance, ledger.balance),
        (C::Drawdown, ledger.drawdown),
        (C::PctSl, level(pos.pct_sl)),
        (C::PctTp, level(pos.pct_tp)),
        (C::PctTsl, level(pos.pct_tsl)),
        (C::AtrSlPrice, level(pos.atr_sl)),
        (C::AtrTpPrice, level(pos.atr_tp)),
        (C::AtrTslPrice, level(pos.atr_tsl)),
        (C::PsarLong, psar_long),
        (C::PsarShort, psar_short),
        (C::PsarAf, if psar_live { pos.psar.af } else { f64::NAN }),
        (
            C::PsarReversal,
            if psar_live {
                f64::from(u8::from(pos.psar_reversal))
            } else {
                f64::NAN
            },
        ),
    ];
    for (col, v) in row {
        out.column_mut(col.index())[i] = v;
    }
    scratch.floats.column_mut(FLOAT_SLOT_MAX_BALANCE)[i] = ledger.max_balance;
    scratch.ints.column_mut(INT_SLOT_DIRECTION)[i] = i64::from(status.direction());
}
