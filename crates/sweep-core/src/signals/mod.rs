//! Entry/exit signal generation.

pub mod compare;
pub mod templates;

pub use compare::{compare_into, Combine, Comparison, Trigger};
pub use templates::{generate, SignalTemplate};

/// Columns of the signal block.
pub const SIGNAL_COLUMNS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalColumn {
    EnterLong = 0,
    ExitLong = 1,
    EnterShort = 2,
    ExitShort = 3,
}

/// The four signals of one bar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignalBar {
    pub enter_long: bool,
    pub exit_long: bool,
    pub enter_short: bool,
    pub exit_short: bool,
}

impl SignalBar {
    pub fn read(cols: &[&[bool]; SIGNAL_COLUMNS], i: usize) -> Self {
        Self {
            enter_long: cols[0][i],
            exit_long: cols[1][i],
            enter_short: cols[2][i],
            exit_short: cols[3][i],
        }
    }
}

/// Drop contradictory entries bar by bar.
///
/// An entry together with its own exit loses the entry; both entries on one
/// bar cancel each other.
pub fn clean_signals(enter_long: &mut [bool], exit_long: &[bool], enter_short: &mut [bool], exit_short: &[bool]) {
    let n = enter_long
        .len()
        .min(exit_long.len())
        .min(enter_short.len())
        .min(exit_short.len());
    for i in 0..n {
        if enter_long[i] && exit_long[i] {
            enter_long[i] = false;
        }
        if enter_short[i] && exit_short[i] {
            enter_short[i] = false;
        }
        if enter_long[i] && enter_short[i] {
            enter_long[i] = false;
            enter_short[i] = false;
        }
    }
}
