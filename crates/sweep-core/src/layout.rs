//! Structure-of-arrays buffer layout shared by every backend.
//!
//! A run owns one flat `Vec` per buffer kind (indicator results per series,
//! signals, backtest results, int/float/bool scratch per series). Each buffer
//! is `conf_count` equal-sized regions, one per configuration, so
//! `project(idx)` is pure slicing and the device kernel can address the same
//! memory with `idx * stride`.
//!
//! Inside a configuration's region data is column-major (`[column][row]`),
//! which gives every indicator and backtest column as one contiguous slice.
//! Indicator regions pack all [`IndicatorKind`]s back to back; disabled kinds
//! keep their column count but shrink to `min_rows` rows.

use crate::backtest::BACKTEST_RESULT_COUNT;
use crate::error::LayoutError;
use crate::signals::SIGNAL_COLUMNS;

/// Number of indicator kinds in the fixed schema.
pub const INDICATOR_KINDS: usize = 5;

/// Scratch slots the pipeline itself writes into.
pub const FLOAT_SLOT_TR: usize = 0;
pub const FLOAT_SLOT_MAX_BALANCE: usize = 1;
pub const BOOL_SLOT_COMPARE: usize = 0;
pub const INT_SLOT_DIRECTION: usize = 0;

const REQUIRED_INTS: usize = 1;
const REQUIRED_FLOATS: usize = 2;
const REQUIRED_BOOLS: usize = 1;

// ---------------------------------------------------------------------------
// Indicator schema
// ---------------------------------------------------------------------------

/// Indicator kinds with a fixed slot in every indicator region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IndicatorKind {
    Sma = 0,
    Sma2 = 1,
    Bbands = 2,
    Atr = 3,
    Psar = 4,
}

impl IndicatorKind {
    pub const ALL: [IndicatorKind; INDICATOR_KINDS] = [
        IndicatorKind::Sma,
        IndicatorKind::Sma2,
        IndicatorKind::Bbands,
        IndicatorKind::Atr,
        IndicatorKind::Psar,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            IndicatorKind::Sma => "sma",
            IndicatorKind::Sma2 => "sma2",
            IndicatorKind::Bbands => "bbands",
            IndicatorKind::Atr => "atr",
            IndicatorKind::Psar => "psar",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    pub const fn param_count(self) -> usize {
        match self {
            IndicatorKind::Sma | IndicatorKind::Sma2 | IndicatorKind::Atr => 1,
            IndicatorKind::Bbands => 2,
            IndicatorKind::Psar => 3,
        }
    }

    pub const fn result_columns(self) -> usize {
        match self {
            IndicatorKind::Sma | IndicatorKind::Sma2 | IndicatorKind::Atr => 1,
            IndicatorKind::Bbands => 3,
            IndicatorKind::Psar => 4,
        }
    }

    /// Float scratch columns the indicator needs while computing.
    pub const fn temp_columns(self) -> usize {
        match self {
            IndicatorKind::Atr => 1,
            _ => 0,
        }
    }

    pub fn default_params(self) -> &'static [f64] {
        match self {
            IndicatorKind::Sma | IndicatorKind::Sma2 | IndicatorKind::Atr => &[14.0],
            IndicatorKind::Bbands => &[14.0, 2.0],
            IndicatorKind::Psar => &[0.02, 0.02, 0.2],
        }
    }
}

/// Per-kind enabled flags, shared by every configuration of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct IndicatorEnabled([bool; INDICATOR_KINDS]);

impl IndicatorEnabled {
    pub const fn none() -> Self {
        Self([false; INDICATOR_KINDS])
    }

    pub const fn all() -> Self {
        Self([true; INDICATOR_KINDS])
    }

    pub fn from_kinds(kinds: &[IndicatorKind]) -> Self {
        let mut out = Self::none();
        for &k in kinds {
            out.set(k, true);
        }
        out
    }

    pub fn is_enabled(&self, kind: IndicatorKind) -> bool {
        self.0[kind.index()]
    }

    pub fn set(&mut self, kind: IndicatorKind, on: bool) {
        self.0[kind.index()] = on;
    }

    /// Bit `k` set when kind `k` is enabled (kernel argument format).
    pub fn bits(&self) -> u32 {
        self.0
            .iter()
            .enumerate()
            .filter(|(_, &on)| on)
            .fold(0u32, |acc, (k, _)| acc | (1 << k))
    }
}

// ---------------------------------------------------------------------------
// Parameter matrices
// ---------------------------------------------------------------------------

/// Row-major `[rows, cols]` parameter matrix, one row per configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl ParamMatrix {
    pub fn new(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self, LayoutError> {
        if rows.checked_mul(cols) != Some(data.len()) {
            return Err(LayoutError::FlatShape {
                block: "param_matrix".to_string(),
                len: data.len(),
                rows,
                cols,
            });
        }
        Ok(Self { rows, cols, data })
    }

    /// Stack equal-length rows. Ragged input is rejected.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self, LayoutError> {
        let cols = rows.first().map_or(0, Vec::len);
        if let Some(bad) = rows.iter().find(|r| r.len() != cols) {
            return Err(LayoutError::ParamColumns {
                block: "param_matrix".to_string(),
                expected: cols,
                actual: bad.len(),
            });
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            data: rows.concat(),
        })
    }

    /// `n` copies of one row.
    pub fn repeat(row: &[f64], n: usize) -> Self {
        Self {
            rows: n,
            cols: row.len(),
            data: row.repeat(n),
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn row(&self, idx: usize) -> &[f64] {
        &self.data[idx * self.cols..(idx + 1) * self.cols]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }
}

/// One [`ParamMatrix`] per indicator kind.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorParams {
    blocks: [ParamMatrix; INDICATOR_KINDS],
}

impl IndicatorParams {
    /// Default parameters for every kind, repeated `conf_count` times.
    pub fn defaults(conf_count: usize) -> Self {
        Self {
            blocks: IndicatorKind::ALL.map(|k| ParamMatrix::repeat(k.default_params(), conf_count)),
        }
    }

    pub fn from_blocks(blocks: [ParamMatrix; INDICATOR_KINDS]) -> Self {
        Self { blocks }
    }

    pub fn get(&self, kind: IndicatorKind) -> &ParamMatrix {
        &self.blocks[kind.index()]
    }

    pub fn set(&mut self, kind: IndicatorKind, block: ParamMatrix) {
        self.blocks[kind.index()] = block;
    }

    /// Parameter rows of one configuration, indexed by kind.
    pub fn row(&self, idx: usize) -> [&[f64]; INDICATOR_KINDS] {
        IndicatorKind::ALL.map(|k| self.get(k).row(idx))
    }

    /// All kinds concatenated kind after kind (device upload format).
    pub fn flatten(&self) -> Vec<f64> {
        self.blocks.iter().flat_map(|b| b.as_slice().iter().copied()).collect()
    }

    pub(crate) fn validate(&self, conf_count: usize, series: &str) -> Result<(), LayoutError> {
        for kind in IndicatorKind::ALL {
            let block = self.get(kind);
            let label = format!("{}{series}", kind.name());
            if block.rows() != conf_count {
                return Err(LayoutError::ParamRows {
                    block: label,
                    expected: conf_count,
                    actual: block.rows(),
                });
            }
            if block.cols() != kind.param_count() {
                return Err(LayoutError::ParamColumns {
                    block: label,
                    expected: kind.param_count(),
                    actual: block.cols(),
                });
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Shape descriptor
// ---------------------------------------------------------------------------

/// Widths of the per-configuration scratch blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScratchWidths {
    pub ints: usize,
    pub floats: usize,
    pub bools: usize,
}

impl Default for ScratchWidths {
    fn default() -> Self {
        Self {
            ints: 1,
            floats: 4,
            bools: 4,
        }
    }
}

impl ScratchWidths {
    /// Raise `floats` to the widest indicator temp requirement, then check
    /// the pipeline's own slots fit.
    pub(crate) fn effective(self) -> Result<Self, LayoutError> {
        let indicator_floats = IndicatorKind::ALL
            .iter()
            .map(|k| k.temp_columns())
            .max()
            .unwrap_or(0);
        let out = Self {
            floats: self.floats.max(indicator_floats),
            ..self
        };
        for (kind, required, actual) in [
            ("int", REQUIRED_INTS, out.ints),
            ("float", REQUIRED_FLOATS, out.floats),
            ("bool", REQUIRED_BOOLS, out.bools),
        ] {
            if actual < required {
                return Err(LayoutError::ScratchTooNarrow {
                    kind,
                    required,
                    actual,
                });
            }
        }
        Ok(out)
    }
}

/// Everything that determines buffer shapes. Two runs with equal keys can
/// share one [`BufferSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShapeKey {
    pub conf_count: usize,
    pub rows: usize,
    pub rows2: usize,
    pub scratch: ScratchWidths,
    pub min_rows: usize,
    pub enabled: IndicatorEnabled,
    pub enabled2: IndicatorEnabled,
}

impl ShapeKey {
    pub fn packing(&self) -> IndicatorPacking {
        IndicatorPacking::new(self.rows, self.min_rows, self.enabled)
    }

    pub fn packing2(&self) -> IndicatorPacking {
        IndicatorPacking::new(self.rows2, self.min_rows, self.enabled2)
    }
}

/// Where one kind lives inside a configuration's indicator region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindSlot {
    pub rows: usize,
    pub cols: usize,
    pub offset: usize,
}

/// Offsets of every kind within one indicator region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndicatorPacking {
    pub slots: [KindSlot; INDICATOR_KINDS],
    /// Length of one configuration's region.
    pub stride: usize,
}

impl IndicatorPacking {
    pub fn new(rows: usize, min_rows: usize, enabled: IndicatorEnabled) -> Self {
        let mut offset = 0;
        let slots = IndicatorKind::ALL.map(|kind| {
            let slot = KindSlot {
                rows: if enabled.is_enabled(kind) { rows } else { min_rows },
                cols: kind.result_columns(),
                offset,
            };
            offset += slot.rows * slot.cols;
            slot
        });
        Self {
            slots,
            stride: offset,
        }
    }

    pub fn slot(&self, kind: IndicatorKind) -> KindSlot {
        self.slots[kind.index()]
    }
}

// ---------------------------------------------------------------------------
// Blocks and views
// ---------------------------------------------------------------------------

/// `conf_count` equal regions of `stride` elements.
#[derive(Debug, Clone)]
pub struct Block<T> {
    conf: usize,
    stride: usize,
    data: Vec<T>,
}

impl<T: Copy> Block<T> {
    fn filled(conf: usize, stride: usize, value: T) -> Self {
        Self {
            conf,
            stride,
            data: vec![value; conf * stride],
        }
    }

    pub fn conf_count(&self) -> usize {
        self.conf
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    fn region(&self, idx: usize) -> &[T] {
        &self.data[idx * self.stride..(idx + 1) * self.stride]
    }

    fn region_mut(&mut self, idx: usize) -> &mut [T] {
        &mut self.data[idx * self.stride..(idx + 1) * self.stride]
    }
}

/// Read-only `[cols][rows]` view of one configuration's region.
#[derive(Debug, Clone, Copy)]
pub struct Columns<'a, T> {
    rows: usize,
    cols: usize,
    data: &'a [T],
}

impl<'a, T> Columns<'a, T> {
    pub fn new(rows: usize, cols: usize, data: &'a [T]) -> Self {
        debug_assert_eq!(data.len(), rows * cols);
        Self { rows, cols, data }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn column(&self, c: usize) -> &'a [T] {
        &self.data[c * self.rows..(c + 1) * self.rows]
    }

    /// The whole region, column after column.
    pub fn as_slice(&self) -> &'a [T] {
        self.data
    }
}

/// Mutable `[cols][rows]` view of one configuration's region.
#[derive(Debug)]
pub struct ColumnsMut<'a, T> {
    rows: usize,
    cols: usize,
    data: &'a mut [T],
}

impl<'a, T> ColumnsMut<'a, T> {
    pub fn new(rows: usize, cols: usize, data: &'a mut [T]) -> Self {
        debug_assert_eq!(data.len(), rows * cols);
        Self { rows, cols, data }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn column(&self, c: usize) -> &[T] {
        &self.data[c * self.rows..(c + 1) * self.rows]
    }

    pub fn column_mut(&mut self, c: usize) -> &mut [T] {
        &mut self.data[c * self.rows..(c + 1) * self.rows]
    }

    /// Every column at once, for code that writes several in one pass.
    pub fn columns_mut(&mut self) -> Vec<&mut [T]> {
        let mut rest: &mut [T] = &mut *self.data;
        (0..self.cols)
            .map(|_| take_front(&mut rest, self.rows))
            .collect()
    }

    pub fn as_columns(&self) -> Columns<'_, T> {
        Columns::new(self.rows, self.cols, self.data)
    }
}

/// Split `n` elements off the front of `rest`, leaving the remainder.
fn take_front<'a, T>(rest: &mut &'a mut [T], n: usize) -> &'a mut [T] {
    let (head, tail) = std::mem::take(rest).split_at_mut(n);
    *rest = tail;
    head
}

fn split_kinds<'a, T>(packing: &IndicatorPacking, region: &'a [T]) -> [Columns<'a, T>; INDICATOR_KINDS] {
    packing
        .slots
        .map(|s| Columns::new(s.rows, s.cols, &region[s.offset..s.offset + s.rows * s.cols]))
}

fn split_kinds_mut<'a, T>(
    packing: &IndicatorPacking,
    region: &'a mut [T],
) -> [ColumnsMut<'a, T>; INDICATOR_KINDS] {
    let mut rest = region;
    packing.slots.map(|s| ColumnsMut::new(s.rows, s.cols, take_front(&mut rest, s.rows * s.cols)))
}

/// Scratch views of one configuration for one series.
#[derive(Debug, Clone, Copy)]
pub struct Scratch<'a> {
    pub ints: Columns<'a, i64>,
    pub floats: Columns<'a, f64>,
    pub bools: Columns<'a, bool>,
}

#[derive(Debug)]
pub struct ScratchMut<'a> {
    pub ints: ColumnsMut<'a, i64>,
    pub floats: ColumnsMut<'a, f64>,
    pub bools: ColumnsMut<'a, bool>,
}

/// Everything one configuration owns, read-only.
#[derive(Debug, Clone, Copy)]
pub struct ConfigView<'a> {
    pub indicators: [Columns<'a, f64>; INDICATOR_KINDS],
    pub indicators2: [Columns<'a, f64>; INDICATOR_KINDS],
    pub signals: Columns<'a, bool>,
    pub backtest: Columns<'a, f64>,
    pub scratch: Scratch<'a>,
    pub scratch2: Scratch<'a>,
}

impl<'a> ConfigView<'a> {
    pub fn indicator(&self, kind: IndicatorKind) -> Columns<'a, f64> {
        self.indicators[kind.index()]
    }

    pub fn indicator2(&self, kind: IndicatorKind) -> Columns<'a, f64> {
        self.indicators2[kind.index()]
    }
}

/// Everything one configuration owns, writable. Views of different
/// configurations never alias.
#[derive(Debug)]
pub struct ConfigViewMut<'a> {
    pub indicators: [ColumnsMut<'a, f64>; INDICATOR_KINDS],
    pub indicators2: [ColumnsMut<'a, f64>; INDICATOR_KINDS],
    pub signals: ColumnsMut<'a, bool>,
    pub backtest: ColumnsMut<'a, f64>,
    pub scratch: ScratchMut<'a>,
    pub scratch2: ScratchMut<'a>,
}

// ---------------------------------------------------------------------------
// BufferSet
// ---------------------------------------------------------------------------

/// Every result and scratch buffer of a run.
#[derive(Debug, Clone)]
pub struct BufferSet {
    key: ShapeKey,
    packing: IndicatorPacking,
    packing2: IndicatorPacking,
    pub indicators: Block<f64>,
    pub indicators2: Block<f64>,
    pub signals: Block<bool>,
    pub backtest: Block<f64>,
    pub ints: Block<i64>,
    pub floats: Block<f64>,
    pub bools: Block<bool>,
    pub ints2: Block<i64>,
    pub floats2: Block<f64>,
    pub bools2: Block<bool>,
}

impl BufferSet {
    /// Allocate from shapes alone. Contents start in the reset state.
    pub fn allocate(key: ShapeKey) -> Self {
        let packing = key.packing();
        let packing2 = key.packing2();
        let conf = key.conf_count;
        let w = key.scratch;
        Self {
            key,
            packing,
            packing2,
            indicators: Block::filled(conf, packing.stride, f64::NAN),
            indicators2: Block::filled(conf, packing2.stride, f64::NAN),
            signals: Block::filled(conf, key.rows * SIGNAL_COLUMNS, false),
            backtest: Block::filled(conf, key.rows * BACKTEST_RESULT_COUNT, f64::NAN),
            ints: Block::filled(conf, key.rows * w.ints, 0),
            floats: Block::filled(conf, key.rows * w.floats, f64::NAN),
            bools: Block::filled(conf, key.rows * w.bools, false),
            ints2: Block::filled(conf, key.rows2 * w.ints, 0),
            floats2: Block::filled(conf, key.rows2 * w.floats, f64::NAN),
            bools2: Block::filled(conf, key.rows2 * w.bools, false),
        }
    }

    pub fn key(&self) -> &ShapeKey {
        &self.key
    }

    pub fn packing(&self) -> &IndicatorPacking {
        &self.packing
    }

    pub fn packing2(&self) -> &IndicatorPacking {
        &self.packing2
    }

    pub fn conf_count(&self) -> usize {
        self.key.conf_count
    }

    /// Restore the freshly-allocated contents.
    pub fn reset(&mut self) {
        self.indicators.fill(f64::NAN);
        self.indicators2.fill(f64::NAN);
        self.signals.fill(false);
        self.backtest.fill(f64::NAN);
        self.ints.fill(0);
        self.floats.fill(f64::NAN);
        self.bools.fill(false);
        self.ints2.fill(0);
        self.floats2.fill(f64::NAN);
        self.bools2.fill(false);
    }

    /// Read-only view of configuration `idx`.
    pub fn project(&self, idx: usize) -> ConfigView<'_> {
        let k = &self.key;
        let w = k.scratch;
        ConfigView {
            indicators: split_kinds(&self.packing, self.indicators.region(idx)),
            indicators2: split_kinds(&self.packing2, self.indicators2.region(idx)),
            signals: Columns::new(k.rows, SIGNAL_COLUMNS, self.signals.region(idx)),
            backtest: Columns::new(k.rows, BACKTEST_RESULT_COUNT, self.backtest.region(idx)),
            scratch: Scratch {
                ints: Columns::new(k.rows, w.ints, self.ints.region(idx)),
                floats: Columns::new(k.rows, w.floats, self.floats.region(idx)),
                bools: Columns::new(k.rows, w.bools, self.bools.region(idx)),
            },
            scratch2: Scratch {
                ints: Columns::new(k.rows2, w.ints, self.ints2.region(idx)),
                floats: Columns::new(k.rows2, w.floats, self.floats2.region(idx)),
                bools: Columns::new(k.rows2, w.bools, self.bools2.region(idx)),
            },
        }
    }

    /// Writable view of configuration `idx`.
    pub fn project_mut(&mut self, idx: usize) -> ConfigViewMut<'_> {
        let k = self.key;
        let w = k.scratch;
        ConfigViewMut {
            indicators: split_kinds_mut(&self.packing, self.indicators.region_mut(idx)),
            indicators2: split_kinds_mut(&self.packing2, self.indicators2.region_mut(idx)),
            signals: ColumnsMut::new(k.rows, SIGNAL_COLUMNS, self.signals.region_mut(idx)),
            backtest: ColumnsMut::new(k.rows, BACKTEST_RESULT_COUNT, self.backtest.region_mut(idx)),
            scratch: ScratchMut {
                ints: ColumnsMut::new(k.rows, w.ints, self.ints.region_mut(idx)),
                floats: ColumnsMut::new(k.rows, w.floats, self.floats.region_mut(idx)),
                bools: ColumnsMut::new(k.rows, w.bools, self.bools.region_mut(idx)),
            },
            scratch2: ScratchMut {
                ints: ColumnsMut::new(k.rows2, w.ints, self.ints2.region_mut(idx)),
                floats: ColumnsMut::new(k.rows2, w.floats, self.floats2.region_mut(idx)),
                bools: ColumnsMut::new(k.rows2, w.bools, self.bools2.region_mut(idx)),
            },
        }
    }

    /// Disjoint writable views of every configuration, in index order.
    pub fn split_configs_mut(&mut self) -> Vec<ConfigViewMut<'_>> {
        let k = self.key;
        let w = k.scratch;
        let (packing, packing2) = (self.packing, self.packing2);

        let mut ind = self.indicators.data.as_mut_slice();
        let mut ind2 = self.indicators2.data.as_mut_slice();
        let mut sig = self.signals.data.as_mut_slice();
        let mut bt = self.backtest.data.as_mut_slice();
        let mut ints = self.ints.data.as_mut_slice();
        let mut floats = self.floats.data.as_mut_slice();
        let mut bools = self.bools.data.as_mut_slice();
        let mut ints2 = self.ints2.data.as_mut_slice();
        let mut floats2 = self.floats2.data.as_mut_slice();
        let mut bools2 = self.bools2.data.as_mut_slice();

        (0..k.conf_count)
            .map(|_| ConfigViewMut {
                indicators: split_kinds_mut(&packing, take_front(&mut ind, packing.stride)),
                indicators2: split_kinds_mut(&packing2, take_front(&mut ind2, packing2.stride)),
                signals: ColumnsMut::new(
                    k.rows,
                    SIGNAL_COLUMNS,
                    take_front(&mut sig, k.rows * SIGNAL_COLUMNS),
                ),
                backtest: ColumnsMut::new(
                    k.rows,
                    BACKTEST_RESULT_COUNT,
                    take_front(&mut bt, k.rows * BACKTEST_RESULT_COUNT),
                ),
                scratch: ScratchMut {
                    ints: ColumnsMut::new(k.rows, w.ints, take_front(&mut ints, k.rows * w.ints)),
                    floats: ColumnsMut::new(k.rows, w.floats, take_front(&mut floats, k.rows * w.floats)),
                    bools: ColumnsMut::new(k.rows, w.bools, take_front(&mut bools, k.rows * w.bools)),
                },
                scratch2: ScratchMut {
                    ints: ColumnsMut::new(k.rows2, w.ints, take_front(&mut ints2, k.rows2 * w.ints)),
                    floats: ColumnsMut::new(k.rows2, w.floats, take_front(&mut floats2, k.rows2 * w.floats)),
                    bools: ColumnsMut::new(k.rows2, w.bools, take_front(&mut bools2, k.rows2 * w.bools)),
                },
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(conf: usize, rows: usize, enabled: IndicatorEnabled) -> ShapeKey {
        ShapeKey {
            conf_count: conf,
            rows,
            rows2: 3,
            scratch: ScratchWidths::default(),
            min_rows: 2,
            enabled,
            enabled2: IndicatorEnabled::none(),
        }
    }

    #[test]
    fn test_kind_schema_matches_defaults() {
        for kind in IndicatorKind::ALL {
            assert_eq!(kind.default_params().len(), kind.param_count(), "{}", kind.name());
            assert_eq!(IndicatorKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(IndicatorKind::from_name("rsi"), None);
    }

    #[test]
    fn test_enabled_bits() {
        let e = IndicatorEnabled::from_kinds(&[IndicatorKind::Sma, IndicatorKind::Psar]);
        assert_eq!(e.bits(), 0b10001);
        assert_eq!(IndicatorEnabled::all().bits(), 0b11111);
        assert_eq!(IndicatorEnabled::none().bits(), 0);
    }

    #[test]
    fn test_param_matrix_shape_checks() {
        assert!(ParamMatrix::new(2, 3, vec![0.0; 6]).is_ok());
        assert!(ParamMatrix::new(2, 3, vec![0.0; 5]).is_err());
        let ragged = ParamMatrix::from_rows(&[vec![1.0, 2.0], vec![3.0]]);
        assert!(matches!(ragged, Err(LayoutError::ParamColumns { expected: 2, actual: 1, .. })));
        let m = ParamMatrix::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(m.row(1), &[3.0, 4.0]);
    }

    #[test]
    fn test_indicator_params_validate_rows_and_columns() {
        let mut p = IndicatorParams::defaults(3);
        assert!(p.validate(3, "").is_ok());
        assert_eq!(
            p.validate(4, ""),
            Err(LayoutError::ParamRows {
                block: "sma".to_string(),
                expected: 4,
                actual: 3
            })
        );
        p.set(IndicatorKind::Bbands, ParamMatrix::repeat(&[20.0], 3));
        assert_eq!(
            p.validate(3, " (secondary)"),
            Err(LayoutError::ParamColumns {
                block: "bbands (secondary)".to_string(),
                expected: 2,
                actual: 1
            })
        );
    }

    #[test]
    fn test_scratch_widths_effective() {
        let w = ScratchWidths { ints: 1, floats: 0, bools: 1 };
        assert!(matches!(
            w.effective(),
            Err(LayoutError::ScratchTooNarrow { kind: "float", .. })
        ));
        let w = ScratchWidths { ints: 1, floats: 2, bools: 1 };
        assert_eq!(w.effective().unwrap(), w);
        let w = ScratchWidths { ints: 0, floats: 4, bools: 4 };
        assert!(matches!(
            w.effective(),
            Err(LayoutError::ScratchTooNarrow { kind: "int", .. })
        ));
    }

    #[test]
    fn test_packing_disabled_kind_keeps_columns() {
        let enabled = IndicatorEnabled::from_kinds(&[IndicatorKind::Bbands]);
        let p = IndicatorPacking::new(10, 2, enabled);
        let bb = p.slot(IndicatorKind::Bbands);
        assert_eq!((bb.rows, bb.cols), (10, 3));
        let psar = p.slot(IndicatorKind::Psar);
        assert_eq!((psar.rows, psar.cols), (2, 4));
        // sma 2 + sma2 2 + bbands 30 + atr 2 + psar 8
        assert_eq!(p.stride, 44);
        assert_eq!(psar.offset, 36);
    }

    #[test]
    fn test_allocation_depends_on_shape_only() {
        let b = BufferSet::allocate(key(3, 5, IndicatorEnabled::all()));
        assert_eq!(b.signals.as_slice().len(), 3 * 5 * SIGNAL_COLUMNS);
        assert_eq!(b.backtest.as_slice().len(), 3 * 5 * BACKTEST_RESULT_COUNT);
        assert_eq!(b.floats2.as_slice().len(), 3 * 3 * 4);
        assert!(b.backtest.as_slice().iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_project_mut_writes_are_visible_in_shared_buffer() {
        let mut b = BufferSet::allocate(key(3, 4, IndicatorEnabled::all()));
        {
            let mut v = b.project_mut(1);
            v.backtest.column_mut(3)[2] = 42.0;
            v.indicators[IndicatorKind::Psar.index()].column_mut(1)[0] = 7.0;
            v.signals.column_mut(0)[3] = true;
        }
        let stride = 4 * BACKTEST_RESULT_COUNT;
        assert_eq!(b.backtest.as_slice()[stride + 3 * 4 + 2], 42.0);
        let view = b.project(1);
        assert_eq!(view.indicator(IndicatorKind::Psar).column(1)[0], 7.0);
        assert!(view.signals.column(0)[3]);
        assert!(!b.project(0).signals.column(0)[3]);
        assert!(b.project(2).backtest.column(3)[2].is_nan());
    }

    #[test]
    fn test_split_configs_mut_covers_every_region_once() {
        let mut b = BufferSet::allocate(key(4, 3, IndicatorEnabled::none()));
        for (idx, mut v) in b.split_configs_mut().into_iter().enumerate() {
            v.backtest.column_mut(0).fill(idx as f64);
            v.scratch.ints.column_mut(0).fill(idx as i64);
        }
        for idx in 0..4 {
            let view = b.project(idx);
            assert!(view.backtest.column(0).iter().all(|&x| x == idx as f64));
            assert!(view.scratch.ints.column(0).iter().all(|&x| x == idx as i64));
        }
    }

    #[test]
    fn test_zero_row_placeholder_views() {
        let mut k = key(2, 3, IndicatorEnabled::none());
        k.min_rows = 0;
        k.rows2 = 0;
        let mut b = BufferSet::allocate(k);
        assert_eq!(b.packing().stride, 0);
        let views = b.split_configs_mut();
        assert_eq!(views.len(), 2);
        assert_eq!(views[1].indicators[0].rows(), 0);
        assert_eq!(views[1].scratch2.floats.column(0).len(), 0);
    }

    #[test]
    fn test_reset_restores_sentinels() {
        let mut b = BufferSet::allocate(key(1, 2, IndicatorEnabled::all()));
        b.signals.fill(true);
        b.floats.fill(1.0);
        b.ints.fill(9);
        b.reset();
        assert!(b.signals.as_slice().iter().all(|&s| !s));
        assert!(b.floats.as_slice().iter().all(|v| v.is_nan()));
        assert!(b.ints.as_slice().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_columns_mut_splits_all_columns() {
        let mut data = vec![0.0; 6];
        let mut cols = ColumnsMut::new(2, 3, &mut data);
        for (c, col) in cols.columns_mut().into_iter().enumerate() {
            col.fill(c as f64);
        }
        assert_eq!(data, vec![0.0, 0.0, 1.0, 1.0, 2.0, 2.0]);
    }
}
