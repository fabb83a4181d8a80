//! Built-in signal templates.

use serde::{Deserialize, Serialize};

use super::compare::{compare_into, Combine, Comparison, Trigger};
use super::{clean_signals, SignalColumn};
use crate::layout::{Columns, ColumnsMut, IndicatorEnabled, IndicatorKind, INDICATOR_KINDS};

/// Signal logic shared by every configuration of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalTemplate {
    /// Fast/slow SMA crossover on the primary series.
    #[default]
    SmaCross,
    /// Crossover entries that also need the secondary series to agree.
    SmaCrossConfirmed,
}

impl SignalTemplate {
    pub const fn id(self) -> u32 {
        match self {
            SignalTemplate::SmaCross => 0,
            SignalTemplate::SmaCrossConfirmed => 1,
        }
    }

    pub fn from_id(id: u32) -> Option<Self> {
        match id {
            0 => Some(SignalTemplate::SmaCross),
            1 => Some(SignalTemplate::SmaCrossConfirmed),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SignalTemplate::SmaCross => "sma_cross",
            SignalTemplate::SmaCrossConfirmed => "sma_cross_confirmed",
        }
    }

    /// Kinds the primary series must have enabled.
    pub fn requires(self) -> &'static [IndicatorKind] {
        &[IndicatorKind::Sma, IndicatorKind::Sma2]
    }
}

/// Everything a template reads for one configuration.
pub struct TemplateInputs<'a> {
    pub enabled: IndicatorEnabled,
    pub enabled2: IndicatorEnabled,
    pub indicators: [Columns<'a, f64>; INDICATOR_KINDS],
    pub indicators2: [Columns<'a, f64>; INDICATOR_KINDS],
    pub mapping: &'a [usize],
}

/// Fill the signal block of one configuration, then clean it.
///
/// Every signal column is cleared first. A template whose primary indicators
/// are disabled leaves all signals false.
pub fn generate(template: SignalTemplate, inputs: &TemplateInputs<'_>, signals: &mut ColumnsMut<'_, bool>, temp: &mut [bool]) {
    for c in 0..signals.cols() {
        signals.column_mut(c).fill(false);
    }
    if !template.requires().iter().all(|&k| inputs.enabled.is_enabled(k)) {
        return;
    }
    let fast = inputs.indicators[IndicatorKind::Sma.index()].column(0);
    let slow = inputs.indicators[IndicatorKind::Sma2.index()].column(0);

    let rules = [
        (SignalColumn::EnterLong, Comparison::Gt, Trigger::Edge),
        (SignalColumn::ExitLong, Comparison::Lt, Trigger::Continuous),
        (SignalColumn::EnterShort, Comparison::Lt, Trigger::Edge),
        (SignalColumn::ExitShort, Comparison::Gt, Trigger::Continuous),
    ];
    for (col, cmp, trigger) in rules {
        compare_into(fast, slow, signals.column_mut(col as usize), temp, cmp, Combine::Assign, trigger);
    }

    let mut cols = signals.columns_mut().into_iter();
    let (Some(enter_long), Some(exit_long), Some(enter_short), Some(exit_short)) =
        (cols.next(), cols.next(), cols.next(), cols.next())
    else {
        return;
    };

    if template == SignalTemplate::SmaCrossConfirmed {
        confirm_entries(inputs, enter_long, enter_short);
    }
    clean_signals(enter_long, exit_long, enter_short, exit_short);
}

/// Keep an entry only when the secondary series' fast/slow relation at the
/// mapped bar points the same way. No-op unless both secondary kinds run.
fn confirm_entries(inputs: &TemplateInputs<'_>, enter_long: &mut [bool], enter_short: &mut [bool]) {
    if !(inputs.enabled2.is_enabled(IndicatorKind::Sma) && inputs.enabled2.is_enabled(IndicatorKind::Sma2)) {
        return;
    }
    let fast2 = inputs.indicators2[IndicatorKind::Sma.index()].column(0);
    let slow2 = inputs.indicators2[IndicatorKind::Sma2.index()].column(0);
    for (i, &j) in inputs.mapping.iter().enumerate().take(enter_long.len()) {
        let (f, s) = match (fast2.get(j), slow2.get(j)) {
            (Some(&f), Some(&s)) => (f, s),
            _ => (f64::NAN, f64::NAN),
        };
        enter_long[i] &= f > s;
        enter_short[i] &= f < s;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::SIGNAL_COLUMNS;

    fn run(
        template: SignalTemplate,
        fast: &[f64],
        slow: &[f64],
        enabled: IndicatorEnabled,
        second: Option<(&[f64], &[f64], &[usize])>,
    ) -> Vec<Vec<bool>> {
        let n = fast.len();
        let empty: &[f64] = &[];
        let mut indicators = [Columns::new(0, 1, empty); INDICATOR_KINDS];
        indicators[0] = Columns::new(n, 1, fast);
        indicators[1] = Columns::new(n, 1, slow);
        let mut indicators2 = [Columns::new(0, 1, empty); INDICATOR_KINDS];
        let zeros = vec![0usize; n];
        let (mapping, enabled2) = match second {
            Some((f2, s2, map)) => {
                indicators2[0] = Columns::new(f2.len(), 1, f2);
                indicators2[1] = Columns::new(s2.len(), 1, s2);
                (map, IndicatorEnabled::from_kinds(&[IndicatorKind::Sma, IndicatorKind::Sma2]))
            }
            None => (zeros.as_slice(), IndicatorEnabled::none()),
        };
        let inputs = TemplateInputs {
            enabled,
            enabled2,
            indicators,
            indicators2,
            mapping,
        };
        let mut data = vec![true; n * SIGNAL_COLUMNS];
        let mut temp = vec![false; n];
        let mut sig = ColumnsMut::new(n, SIGNAL_COLUMNS, &mut data);
        generate(template, &inputs, &mut sig, &mut temp);
        (0..SIGNAL_COLUMNS).map(|c| sig.column(c).to_vec()).collect()
    }

    fn both() -> IndicatorEnabled {
        IndicatorEnabled::from_kinds(&[IndicatorKind::Sma, IndicatorKind::Sma2])
    }

    #[test]
    fn test_template_ids_round_trip() {
        for t in [SignalTemplate::SmaCross, SignalTemplate::SmaCrossConfirmed] {
            assert_eq!(SignalTemplate::from_id(t.id()), Some(t));
        }
        assert_eq!(SignalTemplate::from_id(7), None);
    }

    #[test]
    fn test_sma_cross_signals() {
        let fast = [f64::NAN, 1.0, 3.0, 3.0, 1.0, 1.0];
        let slow = [f64::NAN, 2.0, 2.0, 2.0, 2.0, 2.0];
        let s = run(SignalTemplate::SmaCross, &fast, &slow, both(), None);
        assert_eq!(s[0], [false, false, true, false, false, false]);
        assert_eq!(s[1], [false, true, false, false, true, true]);
        assert_eq!(s[2], [false, true, false, false, true, false]);
        assert_eq!(s[3], [false, false, true, true, false, false]);
    }

    #[test]
    fn test_short_entry_survives_long_exit_on_same_bar() {
        let fast = [3.0, 1.0];
        let slow = [2.0, 2.0];
        let s = run(SignalTemplate::SmaCross, &fast, &slow, both(), None);
        assert_eq!(s[2], [false, true]);
        assert_eq!(s[0], [false, false]);
    }

    #[test]
    fn test_disabled_indicator_gives_all_false() {
        let fast = [1.0, 3.0, 1.0];
        let slow = [2.0, 2.0, 2.0];
        let only_fast = IndicatorEnabled::from_kinds(&[IndicatorKind::Sma]);
        let s = run(SignalTemplate::SmaCross, &fast, &slow, only_fast, None);
        assert!(s.iter().flatten().all(|&b| !b));
    }

    #[test]
    fn test_confirmed_filters_entries_against_second_series() {
        let fast = [1.0, 3.0, 1.0, 3.0];
        let slow = [2.0, 2.0, 2.0, 2.0];
        // second series is bullish at bar 0, bearish at bar 1
        let fast2 = [5.0, 1.0];
        let slow2 = [4.0, 4.0];
        let map = [0usize, 0, 1, 1];
        let s = run(
            SignalTemplate::SmaCrossConfirmed,
            &fast,
            &slow,
            both(),
            Some((&fast2, &slow2, &map)),
        );
        assert_eq!(s[0], [false, true, false, false]);
        assert_eq!(s[2], [false, false, true, false]);
    }

    #[test]
    fn test_confirmed_without_second_series_matches_plain_cross() {
        let fast = [1.0, 3.0, 1.0, 3.0];
        let slow = [2.0, 2.0, 2.0, 2.0];
        let a = run(SignalTemplate::SmaCross, &fast, &slow, both(), None);
        let b = run(SignalTemplate::SmaCrossConfirmed, &fast, &slow, both(), None);
        assert_eq!(a, b);
    }
}
