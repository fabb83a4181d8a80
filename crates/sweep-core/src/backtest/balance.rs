use super::status::PositionStatus;

/// Starting balance of every configuration.
pub const INIT_MONEY: f64 = 2000.0;

/// Running balance, marked equity and drawdown of one configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ledger {
    pub balance: f64,
    pub equity: f64,
    pub max_balance: f64,
    pub drawdown: f64,
}

impl Ledger {
    pub fn new(init: f64) -> Self {
        Self {
            balance: init,
            equity: init,
            max_balance: init,
            drawdown: 0.0,
        }
    }

    /// Book bar `i`.
    ///
    /// Closing a long (exit or reversal to short) compounds the balance by the
    /// long return from `entry_prev` to `exit`; closing a short mirrors it.
    /// Holding marks equity at the bar's open. Everything else carries the
    /// balance unchanged.
    pub fn step(&mut self, prev: PositionStatus, cur: PositionStatus, entry_prev: f64, exit: f64, open: f64) {
        use PositionStatus::*;
        self.equity = self.balance;
        let closes_long = matches!(cur, ExitLong | ReverseToShort) && prev.is_long();
        let closes_short = matches!(cur, ExitShort | ReverseToLong) && prev.is_short();
        if closes_long {
            self.balance *= 1.0 + (exit - entry_prev) / entry_prev;
            self.equity = self.balance;
        } else if closes_short {
            self.balance *= 1.0 + (entry_prev - exit) / entry_prev;
            self.equity = self.balance;
        } else if cur == HoldLong {
            self.equity = self.balance * (1.0 + (open - entry_prev) / entry_prev);
        } else if cur == HoldShort {
            self.equity = self.balance * (1.0 + (entry_prev - open) / entry_prev);
        }
        self.max_balance = self.max_balance.max(self.balance);
        self.drawdown = if self.max_balance > 0.0 {
            (self.max_balance - self.balance) / self.max_balance
        } else {
            0.0
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use PositionStatus::*;

    #[test]
    fn test_long_round_trip() {
        let mut l = Ledger::new(INIT_MONEY);
        l.step(Flat, EnterLong, f64::NAN, f64::NAN, 100.0);
        assert_eq!(l.equity, 2000.0);
        l.step(EnterLong, HoldLong, 100.0, f64::NAN, 110.0);
        assert_relative_eq!(l.equity, 2200.0);
        assert_eq!(l.balance, 2000.0);
        l.step(HoldLong, ExitLong, 100.0, 90.0, 90.0);
        assert_relative_eq!(l.balance, 1800.0);
        assert_relative_eq!(l.drawdown, 0.1);
    }

    #[test]
    fn test_short_reversal_books_short_leg() {
        let mut l = Ledger::new(INIT_MONEY);
        l.step(HoldShort, ReverseToLong, 100.0, 80.0, 80.0);
        assert_relative_eq!(l.balance, 2400.0);
        assert_relative_eq!(l.max_balance, 2400.0);
        assert_eq!(l.drawdown, 0.0);
    }

    #[test]
    fn test_reversal_from_flat_books_nothing() {
        let mut l = Ledger::new(INIT_MONEY);
        l.step(Flat, ReverseToShort, f64::NAN, 100.0, 100.0);
        assert_eq!(l.balance, INIT_MONEY);
    }
}
