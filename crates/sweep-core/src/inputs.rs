//! Run inputs and their validation.
//!
//! [`RunInputs::prepare`] checks every shape once, fills in the default
//! second series and produces the [`ShapeKey`] the buffers are allocated
//! from. Nothing downstream re-validates.

use std::borrow::Cow;

use crate::backtest::{BacktestParams, BACKTEST_PARAM_COUNT};
use crate::error::LayoutError;
use crate::layout::{IndicatorEnabled, IndicatorKind, IndicatorParams, ParamMatrix, ScratchWidths, ShapeKey};
use crate::market::{self, MarketSeries};
use crate::signals::SignalTemplate;

/// Second timeframe of a run.
#[derive(Debug, Clone)]
pub struct SecondarySeries {
    pub market: MarketSeries,
    pub params: IndicatorParams,
    pub enabled: IndicatorEnabled,
    /// Primary bar -> secondary bar. Built from timestamps when `None`.
    pub mapping: Option<Vec<usize>>,
}

/// Everything a sweep run reads.
#[derive(Debug, Clone)]
pub struct RunInputs {
    pub market: MarketSeries,
    pub secondary: Option<SecondarySeries>,
    pub indicator_params: IndicatorParams,
    pub enabled: IndicatorEnabled,
    pub signal: SignalTemplate,
    /// `[conf_count, BACKTEST_PARAM_COUNT]`; its row count defines `conf_count`.
    pub backtest_params: ParamMatrix,
    pub scratch: ScratchWidths,
    pub min_rows: usize,
}

impl RunInputs {
    /// Inputs with default indicator parameters for every configuration and
    /// the kinds `signal` needs enabled.
    pub fn new(market: MarketSeries, signal: SignalTemplate, backtest_params: ParamMatrix) -> Self {
        let conf_count = backtest_params.rows();
        Self {
            market,
            secondary: None,
            indicator_params: IndicatorParams::defaults(conf_count),
            enabled: IndicatorEnabled::from_kinds(signal.requires()),
            signal,
            backtest_params,
            scratch: ScratchWidths::default(),
            min_rows: 1,
        }
    }

    pub fn conf_count(&self) -> usize {
        self.backtest_params.rows()
    }

    /// Validate shapes and resolve defaults.
    pub fn prepare(&self) -> Result<PreparedRun<'_>, LayoutError> {
        let conf_count = self.conf_count();
        if conf_count == 0 {
            return Err(LayoutError::NoConfigurations);
        }
        if self.backtest_params.cols() != BACKTEST_PARAM_COUNT {
            return Err(LayoutError::ParamColumns {
                block: "backtest".to_string(),
                expected: BACKTEST_PARAM_COUNT,
                actual: self.backtest_params.cols(),
            });
        }
        let rows = self.market.len();
        if rows == 0 {
            return Err(LayoutError::EmptyMarket);
        }
        if self.min_rows > rows {
            return Err(LayoutError::MinRows {
                min_rows: self.min_rows,
                rows,
            });
        }
        self.indicator_params.validate(conf_count, "")?;

        let (market2, params2, enabled2, mapping) = match &self.secondary {
            Some(s) => {
                s.params.validate(conf_count, " (secondary)")?;
                let mapping = match &s.mapping {
                    Some(m) => Cow::Borrowed(m.as_slice()),
                    None => Cow::Owned(market::build_mapping(&self.market, &s.market)),
                };
                (Cow::Borrowed(&s.market), Cow::Borrowed(&s.params), s.enabled, mapping)
            }
            None => (
                Cow::Owned(self.market.tail(self.min_rows)),
                Cow::Borrowed(&self.indicator_params),
                IndicatorEnabled::none(),
                Cow::Owned(vec![0; rows]),
            ),
        };
        market::validate_mapping(&mapping, rows, market2.len())?;
        let scratch = self.scratch.effective()?;

        let key = ShapeKey {
            conf_count,
            rows,
            rows2: market2.len(),
            scratch,
            min_rows: self.min_rows,
            enabled: self.enabled,
            enabled2,
        };
        Ok(PreparedRun {
            key,
            market: &self.market,
            market2,
            params: &self.indicator_params,
            params2,
            mapping,
            signal: self.signal,
            backtest_params: &self.backtest_params,
        })
    }
}

/// Validated inputs, ready for any backend.
#[derive(Debug)]
pub struct PreparedRun<'a> {
    pub key: ShapeKey,
    pub market: &'a MarketSeries,
    pub market2: Cow<'a, MarketSeries>,
    pub params: &'a IndicatorParams,
    pub params2: Cow<'a, IndicatorParams>,
    pub mapping: Cow<'a, [usize]>,
    pub signal: SignalTemplate,
    pub backtest_params: &'a ParamMatrix,
}

impl PreparedRun<'_> {
    pub fn conf_count(&self) -> usize {
        self.key.conf_count
    }

    pub fn backtest_row(&self, idx: usize) -> BacktestParams {
        BacktestParams::from_row(self.backtest_params.row(idx))
    }

    /// Kinds the template needs but the run has disabled.
    pub fn missing_kinds(&self) -> Vec<IndicatorKind> {
        self.signal
            .requires()
            .iter()
            .copied()
            .filter(|&k| !self.key.enabled.is_enabled(k))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_market(n: usize) -> MarketSeries {
        let rows: Vec<[f64; 6]> = (0..n).map(|i| [i as f64, 1.0, 1.0, 1.0, 1.0, 0.0]).collect();
        MarketSeries::from_rows(&rows)
    }

    fn inputs(conf: usize) -> RunInputs {
        let bt = ParamMatrix::repeat(&BacktestParams::default().to_row(), conf);
        RunInputs::new(flat_market(10), SignalTemplate::SmaCross, bt)
    }

    #[test]
    fn test_prepare_defaults_second_series() {
        let mut i = inputs(3);
        i.min_rows = 2;
        let p = i.prepare().unwrap();
        assert_eq!(p.key.rows, 10);
        assert_eq!(p.key.rows2, 2);
        assert_eq!(p.key.enabled2, IndicatorEnabled::none());
        assert_eq!(p.mapping.len(), 10);
        assert!(p.mapping.iter().all(|&m| m == 0));
        assert_eq!(p.market2.time, vec![8.0, 9.0]);
        assert!(p.missing_kinds().is_empty());
    }

    #[test]
    fn test_prepare_rejects_bad_shapes() {
        let empty = RunInputs::new(flat_market(10), SignalTemplate::SmaCross, ParamMatrix::repeat(&[0.0; 17], 0));
        assert_eq!(empty.prepare().unwrap_err(), LayoutError::NoConfigurations);

        let mut wrong_rows = inputs(3);
        wrong_rows
            .indicator_params
            .set(IndicatorKind::Sma, ParamMatrix::repeat(&[5.0], 2));
        assert!(matches!(
            wrong_rows.prepare(),
            Err(LayoutError::ParamRows { expected: 3, actual: 2, .. })
        ));

        let mut too_many_min = inputs(1);
        too_many_min.min_rows = 11;
        assert!(matches!(too_many_min.prepare(), Err(LayoutError::MinRows { .. })));

        let mut narrow = inputs(1);
        narrow.scratch.bools = 0;
        assert!(matches!(
            narrow.prepare(),
            Err(LayoutError::ScratchTooNarrow { kind: "bool", .. })
        ));
    }

    #[test]
    fn test_secondary_mapping_checked() {
        let mut i = inputs(1);
        i.secondary = Some(SecondarySeries {
            market: flat_market(3),
            params: IndicatorParams::defaults(1),
            enabled: IndicatorEnabled::all(),
            mapping: Some(vec![3; 10]),
        });
        assert!(matches!(
            i.prepare(),
            Err(LayoutError::MappingRange { bar: 0, target: 3, rows: 3 })
        ));

        if let Some(s) = i.secondary.as_mut() {
            s.mapping = None;
        }
        let p = i.prepare().unwrap();
        // times 0..10 against 0..3
        assert_eq!(&p.mapping[..4], &[0, 1, 2, 2]);
    }

    #[test]
    fn test_secondary_params_labelled() {
        let mut i = inputs(2);
        let mut params = IndicatorParams::defaults(2);
        params.set(IndicatorKind::Bbands, ParamMatrix::repeat(&[14.0], 2));
        i.secondary = Some(SecondarySeries {
            market: flat_market(4),
            params,
            enabled: IndicatorEnabled::none(),
            mapping: None,
        });
        match i.prepare() {
            Err(LayoutError::ParamColumns { block, .. }) => assert!(block.ends_with("(secondary)")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
