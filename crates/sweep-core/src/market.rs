//! Market series storage and cross-timeframe bar mapping.
//!
//! Series are kept column-wise so every indicator reads a contiguous slice.
//! Callers hand over row-major `[time, open, high, low, close, volume]` data.

use crate::error::LayoutError;

/// Number of columns in a raw market row.
pub const TOHLCV_COLUMNS: usize = 6;

/// Column selector for [`MarketSeries::column`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Time = 0,
    Open = 1,
    High = 2,
    Low = 3,
    Close = 4,
    Volume = 5,
}

/// One OHLCV series, stored as a structure of arrays.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarketSeries {
    pub time: Vec<f64>,
    pub open: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
    pub volume: Vec<f64>,
}

impl MarketSeries {
    pub fn from_rows(rows: &[[f64; TOHLCV_COLUMNS]]) -> Self {
        let mut s = Self::with_capacity(rows.len());
        for r in rows {
            s.push_row(r);
        }
        s
    }

    /// Build from a row-major flat buffer of `rows * 6` values.
    pub fn from_flat(data: &[f64]) -> Result<Self, LayoutError> {
        if data.len() % TOHLCV_COLUMNS != 0 {
            return Err(LayoutError::FlatShape {
                block: "tohlcv".to_string(),
                len: data.len(),
                rows: data.len() / TOHLCV_COLUMNS,
                cols: TOHLCV_COLUMNS,
            });
        }
        let mut s = Self::with_capacity(data.len() / TOHLCV_COLUMNS);
        for chunk in data.chunks_exact(TOHLCV_COLUMNS) {
            s.push_row(chunk);
        }
        Ok(s)
    }

    fn with_capacity(n: usize) -> Self {
        Self {
            time: Vec::with_capacity(n),
            open: Vec::with_capacity(n),
            high: Vec::with_capacity(n),
            low: Vec::with_capacity(n),
            close: Vec::with_capacity(n),
            volume: Vec::with_capacity(n),
        }
    }

    fn push_row(&mut self, r: &[f64]) {
        self.time.push(r[0]);
        self.open.push(r[1]);
        self.high.push(r[2]);
        self.low.push(r[3]);
        self.close.push(r[4]);
        self.volume.push(r[5]);
    }

    pub fn len(&self) -> usize {
        self.close.len()
    }

    pub fn is_empty(&self) -> bool {
        self.close.is_empty()
    }

    /// `(rows, 6)`, the logical shape used in cache keys.
    pub fn shape(&self) -> (usize, usize) {
        (self.len(), TOHLCV_COLUMNS)
    }

    pub fn column(&self, c: Column) -> &[f64] {
        match c {
            Column::Time => &self.time,
            Column::Open => &self.open,
            Column::High => &self.high,
            Column::Low => &self.low,
            Column::Close => &self.close,
            Column::Volume => &self.volume,
        }
    }

    /// Last `n` bars (all of them when `n >= len`).
    pub fn tail(&self, n: usize) -> Self {
        let start = self.len().saturating_sub(n);
        Self {
            time: self.time[start..].to_vec(),
            open: self.open[start..].to_vec(),
            high: self.high[start..].to_vec(),
            low: self.low[start..].to_vec(),
            close: self.close[start..].to_vec(),
            volume: self.volume[start..].to_vec(),
        }
    }

    /// Columns concatenated in `Column` order: the device upload format.
    pub fn to_column_major(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.len() * TOHLCV_COLUMNS);
        for col in [
            &self.time,
            &self.open,
            &self.high,
            &self.low,
            &self.close,
            &self.volume,
        ] {
            out.extend_from_slice(col);
        }
        out
    }
}

/// Map every primary bar to the last secondary bar that opened at or before it.
///
/// Bars that precede the whole secondary series map to 0. Both series must be
/// sorted by time.
pub fn build_mapping(primary: &MarketSeries, secondary: &MarketSeries) -> Vec<usize> {
    let mut out = Vec::with_capacity(primary.len());
    let mut j = 0usize;
    for &t in &primary.time {
        while j + 1 < secondary.len() && secondary.time[j + 1] <= t {
            j += 1;
        }
        out.push(j);
    }
    out
}

pub(crate) fn validate_mapping(
    mapping: &[usize],
    rows: usize,
    rows2: usize,
) -> Result<(), LayoutError> {
    if mapping.len() != rows {
        return Err(LayoutError::MappingLength {
            expected: rows,
            actual: mapping.len(),
        });
    }
    if rows2 == 0 {
        return Ok(());
    }
    if let Some((bar, &target)) = mapping.iter().enumerate().find(|&(_, &m)| m >= rows2) {
        return Err(LayoutError::MappingRange {
            bar,
            target,
            rows: rows2,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(times: &[f64]) -> MarketSeries {
        let rows: Vec<[f64; 6]> = times
            .iter()
            .map(|&t| [t, 1.0, 2.0, 0.5, 1.5, 10.0])
            .collect();
        MarketSeries::from_rows(&rows)
    }

    #[test]
    fn test_from_flat_splits_columns() {
        let flat = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 10.0, 11.0, 12.0, 13.0, 14.0, 15.0];
        let s = MarketSeries::from_flat(&flat).unwrap();
        assert_eq!(s.len(), 2);
        assert_eq!(s.open, vec![1.0, 11.0]);
        assert_eq!(s.column(Column::Volume), &[5.0, 15.0]);
    }

    #[test]
    fn test_from_flat_rejects_ragged_buffer() {
        let err = MarketSeries::from_flat(&[1.0; 7]).unwrap_err();
        assert!(matches!(err, LayoutError::FlatShape { len: 7, .. }));
    }

    #[test]
    fn test_tail_keeps_last_rows() {
        let s = series(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(s.tail(2).time, vec![3.0, 4.0]);
        assert_eq!(s.tail(0).len(), 0);
        assert_eq!(s.tail(10).len(), 4);
    }

    #[test]
    fn test_column_major_order() {
        let s = series(&[1.0, 2.0]);
        let flat = s.to_column_major();
        assert_eq!(&flat[0..2], &[1.0, 2.0]);
        assert_eq!(&flat[8..10], &[1.5, 1.5]);
    }

    #[test]
    fn test_build_mapping_uses_last_started_bar() {
        let primary = series(&[0.0, 15.0, 30.0, 45.0, 60.0, 75.0]);
        let secondary = series(&[0.0, 60.0]);
        assert_eq!(build_mapping(&primary, &secondary), vec![0, 0, 0, 0, 1, 1]);
    }

    #[test]
    fn test_build_mapping_before_secondary_start_is_zero() {
        let primary = series(&[1.0, 2.0]);
        let secondary = series(&[5.0, 6.0]);
        assert_eq!(build_mapping(&primary, &secondary), vec![0, 0]);
    }

    #[test]
    fn test_validate_mapping() {
        assert!(validate_mapping(&[0, 1, 1], 3, 2).is_ok());
        assert_eq!(
            validate_mapping(&[0, 1], 3, 2),
            Err(LayoutError::MappingLength {
                expected: 3,
                actual: 2
            })
        );
        assert_eq!(
            validate_mapping(&[0, 2, 1], 3, 2),
            Err(LayoutError::MappingRange {
                bar: 1,
                target: 2,
                rows: 2
            })
        );
        // empty secondary series: any mapping value is tolerated
        assert!(validate_mapping(&[0, 5], 2, 0).is_ok());
    }
}
