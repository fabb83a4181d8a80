//! Position status codes and the signal-driven transition table.

use crate::indicators::psar::Side;
use crate::signals::SignalBar;

/// Per-bar position status. The numeric code is what lands in the result
/// block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i8)]
pub enum PositionStatus {
    Flat = 0,
    EnterLong = 1,
    HoldLong = 2,
    ExitLong = 3,
    /// Exit short and enter long on the same bar.
    ReverseToLong = 4,
    EnterShort = -1,
    HoldShort = -2,
    ExitShort = -3,
    /// Exit long and enter short on the same bar.
    ReverseToShort = -4,
}

pub const LONG_LIKE: [PositionStatus; 3] = [
    PositionStatus::EnterLong,
    PositionStatus::HoldLong,
    PositionStatus::ReverseToLong,
];
pub const SHORT_LIKE: [PositionStatus; 3] = [
    PositionStatus::EnterShort,
    PositionStatus::HoldShort,
    PositionStatus::ReverseToShort,
];
pub const FLAT_LIKE: [PositionStatus; 3] = [
    PositionStatus::Flat,
    PositionStatus::ExitLong,
    PositionStatus::ExitShort,
];

impl PositionStatus {
    pub const ALL: [PositionStatus; 9] = [
        PositionStatus::ReverseToShort,
        PositionStatus::ExitShort,
        PositionStatus::HoldShort,
        PositionStatus::EnterShort,
        PositionStatus::Flat,
        PositionStatus::EnterLong,
        PositionStatus::HoldLong,
        PositionStatus::ExitLong,
        PositionStatus::ReverseToLong,
    ];

    pub const fn code(self) -> i8 {
        self as i8
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|s| i64::from(s.code()) == code)
    }

    /// Decode a result-block value. Non-integral values are rejected.
    pub fn from_f64(v: f64) -> Option<Self> {
        if v.fract() != 0.0 {
            return None;
        }
        Self::from_code(v as i64)
    }

    pub fn is_long(self) -> bool {
        LONG_LIKE.contains(&self)
    }

    pub fn is_short(self) -> bool {
        SHORT_LIKE.contains(&self)
    }

    pub fn is_flat(self) -> bool {
        FLAT_LIKE.contains(&self)
    }

    /// Side of the position held after this bar.
    pub fn side(self) -> Option<Side> {
        if self.is_long() {
            Some(Side::Long)
        } else if self.is_short() {
            Some(Side::Short)
        } else {
            None
        }
    }

    /// `1` long, `-1` short, `0` flat after this bar.
    pub fn direction(self) -> i8 {
        match self.side() {
            Some(Side::Long) => 1,
            Some(Side::Short) => -1,
            None => 0,
        }
    }

    /// Whether a new position was opened on this bar.
    pub fn is_entry(self) -> bool {
        matches!(
            self,
            PositionStatus::EnterLong
                | PositionStatus::EnterShort
                | PositionStatus::ReverseToLong
                | PositionStatus::ReverseToShort
        )
    }

    pub fn exit_of(side: Side) -> Self {
        match side {
            Side::Long => PositionStatus::ExitLong,
            Side::Short => PositionStatus::ExitShort,
        }
    }
}

/// Status of bar `i` from the status of bar `i - 1` and that bar's signals.
/// Execution happens at bar `i`'s open.
pub fn next_status(prev: PositionStatus, sig: SignalBar) -> PositionStatus {
    let SignalBar {
        enter_long,
        exit_long,
        enter_short,
        exit_short,
    } = sig;
    let long = prev.is_long();
    let short = prev.is_short();
    let flat = prev.is_flat();

    if (long || flat) && exit_long && enter_short && !enter_long && !exit_short {
        PositionStatus::ReverseToShort
    } else if (short || flat) && exit_short && enter_long && !enter_short && !exit_long {
        PositionStatus::ReverseToLong
    } else if long && exit_long {
        PositionStatus::ExitLong
    } else if short && exit_short {
        PositionStatus::ExitShort
    } else if flat && enter_long && !exit_long && !enter_short {
        PositionStatus::EnterLong
    } else if flat && enter_short && !exit_short && !enter_long {
        PositionStatus::EnterShort
    } else if long {
        PositionStatus::HoldLong
    } else if short {
        PositionStatus::HoldShort
    } else {
        PositionStatus::Flat
    }
}
