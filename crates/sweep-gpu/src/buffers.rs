//! Host-side packing of a prepared run into device upload buffers.
//!
//! The kernel sees one `KernelParams` struct plus a handful of flat buffers.
//! Everything it needs to find a configuration's region (strides, per-kind
//! slot offsets, parameter block offsets) is precomputed here so the kernel
//! does pure index arithmetic.

use bytemuck::{Pod, Zeroable};

use sweep_core::backtest::BACKTEST_PARAM_COUNT;
use sweep_core::layout::{IndicatorKind, IndicatorPacking, INDICATOR_KINDS};
use sweep_core::market::TOHLCV_COLUMNS;
use sweep_core::{BufferSet, PreparedRun};

// ═══════════════════════════════════════════════════════════════════════════
// KernelParams: launch-wide constants
// ═══════════════════════════════════════════════════════════════════════════

/// Launch-wide constants, mirrored by `struct KernelParams` in
/// `kernels/sweep_kernel.cu`. All offsets count elements, not bytes.
///
/// 352 bytes, 44 × u64.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct KernelParams {
    pub conf_count: u64,
    pub rows: u64,
    pub rows2: u64,
    pub int_width: u64,
    pub float_width: u64,
    pub bool_width: u64,
    pub template_id: u64,
    /// Bit `k` set when indicator kind `k` is enabled.
    pub enabled_bits: u64,
    pub enabled2_bits: u64,
    /// Length of one configuration's indicator region, per series.
    pub ind_stride: u64,
    pub ind2_stride: u64,
    /// Offsets into the `inputs` buffer.
    pub market_offset: u64,
    pub market2_offset: u64,
    pub bt_param_offset: u64,
    /// Per-kind rows and offsets inside an indicator region.
    pub slot_rows: [u64; INDICATOR_KINDS],
    pub slot_offset: [u64; INDICATOR_KINDS],
    pub slot2_rows: [u64; INDICATOR_KINDS],
    pub slot2_offset: [u64; INDICATOR_KINDS],
    /// Per-kind parameter block offsets into the `inputs` buffer.
    pub param_offset: [u64; INDICATOR_KINDS],
    pub param2_offset: [u64; INDICATOR_KINDS],
}

const _: () = assert!(std::mem::size_of::<KernelParams>() == 352);

fn slots(packing: &IndicatorPacking) -> ([u64; INDICATOR_KINDS], [u64; INDICATOR_KINDS]) {
    (
        packing.slots.map(|s| s.rows as u64),
        packing.slots.map(|s| s.offset as u64),
    )
}

// ═══════════════════════════════════════════════════════════════════════════
// DeviceUpload: everything copied host -> device for one run
// ═══════════════════════════════════════════════════════════════════════════

/// Read-only kernel inputs, already flattened.
///
/// `inputs` is `[market | market2 | params per kind | params2 per kind |
/// backtest params]`, each market column-major.
#[derive(Debug, Clone)]
pub struct DeviceUpload {
    pub params: KernelParams,
    pub inputs: Vec<f64>,
    pub mapping: Vec<u64>,
}

impl DeviceUpload {
    pub fn build(run: &PreparedRun<'_>) -> Self {
        let key = run.key;
        let packing = key.packing();
        let packing2 = key.packing2();

        let mut inputs = Vec::new();
        let market_offset = inputs.len() as u64;
        inputs.extend(run.market.to_column_major());
        let market2_offset = inputs.len() as u64;
        inputs.extend(run.market2.to_column_major());

        let mut param_offset = [0u64; INDICATOR_KINDS];
        for kind in IndicatorKind::ALL {
            param_offset[kind.index()] = inputs.len() as u64;
            inputs.extend_from_slice(run.params.get(kind).as_slice());
        }
        let mut param2_offset = [0u64; INDICATOR_KINDS];
        for kind in IndicatorKind::ALL {
            param2_offset[kind.index()] = inputs.len() as u64;
            inputs.extend_from_slice(run.params2.get(kind).as_slice());
        }
        let bt_param_offset = inputs.len() as u64;
        inputs.extend_from_slice(run.backtest_params.as_slice());

        let (slot_rows, slot_offset) = slots(&packing);
        let (slot2_rows, slot2_offset) = slots(&packing2);

        let params = KernelParams {
            conf_count: key.conf_count as u64,
            rows: key.rows as u64,
            rows2: key.rows2 as u64,
            int_width: key.scratch.ints as u64,
            float_width: key.scratch.floats as u64,
            bool_width: key.scratch.bools as u64,
            template_id: u64::from(run.signal.id()),
            enabled_bits: u64::from(key.enabled.bits()),
            enabled2_bits: u64::from(key.enabled2.bits()),
            ind_stride: packing.stride as u64,
            ind2_stride: packing2.stride as u64,
            market_offset,
            market2_offset,
            bt_param_offset,
            slot_rows,
            slot_offset,
            slot2_rows,
            slot2_offset,
            param_offset,
            param2_offset,
        };

        Self {
            params,
            inputs,
            mapping: run.mapping.iter().map(|&m| m as u64).collect(),
        }
    }

    /// Elements the `inputs` buffer must hold for `params` to be in range.
    pub fn expected_inputs_len(params: &KernelParams) -> u64 {
        let conf = params.conf_count;
        let rows_total = (params.rows + params.rows2) * TOHLCV_COLUMNS as u64;
        let per_series: u64 = IndicatorKind::ALL
            .iter()
            .map(|k| k.param_count() as u64 * conf)
            .sum();
        rows_total + 2 * per_series + conf * BACKTEST_PARAM_COUNT as u64
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Output buffers: series 1 and 2 share one device allocation per type
// ═══════════════════════════════════════════════════════════════════════════

/// Host mirror of the device output allocations. The primary series block
/// comes first, the secondary one follows at `conf_count * stride`.
#[derive(Debug, Clone, Default)]
pub struct OutputImage {
    pub indicators: Vec<f64>,
    pub signals: Vec<bool>,
    pub backtest: Vec<f64>,
    pub ints: Vec<i64>,
    pub floats: Vec<f64>,
    pub bools: Vec<bool>,
}

impl OutputImage {
    /// Concatenate the host buffers in device order, so the device starts
    /// from the same sentinels the host reset wrote.
    pub fn from_buffers(buffers: &BufferSet) -> Self {
        Self {
            indicators: [buffers.indicators.as_slice(), buffers.indicators2.as_slice()].concat(),
            signals: buffers.signals.as_slice().to_vec(),
            backtest: buffers.backtest.as_slice().to_vec(),
            ints: [buffers.ints.as_slice(), buffers.ints2.as_slice()].concat(),
            floats: [buffers.floats.as_slice(), buffers.floats2.as_slice()].concat(),
            bools: [buffers.bools.as_slice(), buffers.bools2.as_slice()].concat(),
        }
    }

    /// Copy a downloaded image back into the host blocks.
    pub fn write_back(&self, buffers: &mut BufferSet) -> Result<(), String> {
        split_into(&self.indicators, buffers.indicators.as_mut_slice(), "indicators")
            .and_then(|rest| copy_exact(rest, buffers.indicators2.as_mut_slice(), "indicators2"))?;
        copy_exact(&self.signals, buffers.signals.as_mut_slice(), "signals")?;
        copy_exact(&self.backtest, buffers.backtest.as_mut_slice(), "backtest")?;
        split_into(&self.ints, buffers.ints.as_mut_slice(), "ints")
            .and_then(|rest| copy_exact(rest, buffers.ints2.as_mut_slice(), "ints2"))?;
        split_into(&self.floats, buffers.floats.as_mut_slice(), "floats")
            .and_then(|rest| copy_exact(rest, buffers.floats2.as_mut_slice(), "floats2"))?;
        split_into(&self.bools, buffers.bools.as_mut_slice(), "bools")
            .and_then(|rest| copy_exact(rest, buffers.bools2.as_mut_slice(), "bools2"))?;
        Ok(())
    }
}

/// Fill `dst` from the front of `src` and return the remainder.
fn split_into<'a, T: Copy>(src: &'a [T], dst: &mut [T], name: &str) -> Result<&'a [T], String> {
    if src.len() < dst.len() {
        return Err(format!("{name}: device image has {} elements, host needs {}", src.len(), dst.len()));
    }
    let (head, rest) = src.split_at(dst.len());
    dst.copy_from_slice(head);
    Ok(rest)
}

fn copy_exact<T: Copy>(src: &[T], dst: &mut [T], name: &str) -> Result<(), String> {
    if src.len() != dst.len() {
        return Err(format!("{name}: device image has {} elements, host needs {}", src.len(), dst.len()));
    }
    dst.copy_from_slice(src);
    Ok(())
}
