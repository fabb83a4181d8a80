//! CUDA device initialization, property queries and kernel dispatch.
//!
//! Uses cudarc (CUDA driver API). PTX is pre-compiled by build.rs via nvcc
//! and embedded at compile time.

use std::sync::Arc;

use cudarc::driver::sys::CUdevice_attribute;
use cudarc::driver::{CudaDevice, CudaFunction, DeviceRepr, LaunchAsync, LaunchConfig, ValidAsZeroBits};
use cudarc::nvrtc::Ptx;
use tracing::{debug, info, warn};

use sweep_core::BufferSet;

use crate::buffers::{DeviceUpload, KernelParams, OutputImage};
use crate::tuner::{DeviceProps, LaunchGeometry};

const MODULE: &str = "sweep";
const KERNEL: &str = "sweep_kernel";

// ═══════════════════════════════════════════════════════════════════════════
// DeviceRepr + ValidAsZeroBits impls for GPU buffer structs
// ═══════════════════════════════════════════════════════════════════════════

unsafe impl DeviceRepr for KernelParams {}
unsafe impl ValidAsZeroBits for KernelParams {}

// ═══════════════════════════════════════════════════════════════════════════
// GpuDeviceState: persistent CUDA device, reused across runs
// ═══════════════════════════════════════════════════════════════════════════

/// CUDA device 0 with the sweep kernel module loaded.
pub struct GpuDeviceState {
    pub dev: Arc<CudaDevice>,
}

impl GpuDeviceState {
    /// Initialize the device and load the PTX.
    ///
    /// Returns `Err` on init or PTX load failure so the caller can report
    /// the backend as unavailable instead of panicking.
    pub fn new() -> Result<Self, String> {
        let dev = CudaDevice::new(0).map_err(|e| {
            format!(
                "CUDA init failed: {e}. \
                 Run `nvidia-smi` to verify the driver is loaded."
            )
        })?;

        let ptx = include_str!(concat!(env!("OUT_DIR"), "/sweep_kernel.ptx"));
        dev.load_ptx(Ptx::from_src(ptx), MODULE, &[KERNEL])
            .map_err(|e| format!("Failed to load sweep_kernel PTX: {e}"))?;

        let name = dev.name().unwrap_or_else(|_| "unknown".to_string());
        info!(device = %name, "CUDA device ready");

        Ok(Self { dev })
    }

    /// Device limits for the tuner. Any attribute the driver fails to report
    /// keeps its [`DeviceProps::default`] value.
    pub fn query_props(&self) -> DeviceProps {
        let defaults = DeviceProps::default();
        let get = |attr: CUdevice_attribute, fallback: u32| -> u32 {
            match self.dev.attribute(attr) {
                Ok(v) => u32::try_from(v).unwrap_or(fallback),
                Err(e) => {
                    warn!(attribute = ?attr, error = %e, fallback, "device attribute query failed");
                    fallback
                }
            }
        };
        let props = DeviceProps {
            warp_size: get(CUdevice_attribute::CU_DEVICE_ATTRIBUTE_WARP_SIZE, defaults.warp_size),
            max_threads_per_block: get(
                CUdevice_attribute::CU_DEVICE_ATTRIBUTE_MAX_THREADS_PER_BLOCK,
                defaults.max_threads_per_block,
            ),
            max_registers_per_block: get(
                CUdevice_attribute::CU_DEVICE_ATTRIBUTE_MAX_REGISTERS_PER_BLOCK,
                defaults.max_registers_per_block,
            ),
            max_shared_mem_per_block: get(
                CUdevice_attribute::CU_DEVICE_ATTRIBUTE_MAX_SHARED_MEMORY_PER_BLOCK,
                defaults.max_shared_mem_per_block,
            ),
            sm_count: get(
                CUdevice_attribute::CU_DEVICE_ATTRIBUTE_MULTIPROCESSOR_COUNT,
                defaults.sm_count,
            ),
            compute_capability: (
                get(
                    CUdevice_attribute::CU_DEVICE_ATTRIBUTE_COMPUTE_CAPABILITY_MAJOR,
                    defaults.compute_capability.0,
                ),
                get(
                    CUdevice_attribute::CU_DEVICE_ATTRIBUTE_COMPUTE_CAPABILITY_MINOR,
                    defaults.compute_capability.1,
                ),
            ),
        };
        debug!(?props, "device properties");
        props
    }

    /// Upload, launch one grid-stride kernel, synchronize and copy every
    /// output block back into `buffers`.
    ///
    /// `buffers` must already be reset; its contents are the device's
    /// starting image.
    pub fn run(&self, upload: &DeviceUpload, buffers: &mut BufferSet, geometry: LaunchGeometry) -> Result<(), String> {
        let expected = DeviceUpload::expected_inputs_len(&upload.params);
        if upload.inputs.len() as u64 != expected {
            return Err(format!(
                "inputs buffer has {} values, kernel params expect {expected}",
                upload.inputs.len()
            ));
        }

        let dev = &self.dev;
        let htod = |what: &str, e: cudarc::driver::DriverError| format!("{what} upload failed: {e}");

        let params_gpu = dev.htod_sync_copy(&[upload.params]).map_err(|e| htod("params", e))?;
        let inputs_gpu = dev.htod_sync_copy(&upload.inputs).map_err(|e| htod("inputs", e))?;
        let mapping_gpu = dev.htod_sync_copy(&upload.mapping).map_err(|e| htod("mapping", e))?;

        let image = OutputImage::from_buffers(buffers);
        let mut indicators_gpu = dev.htod_sync_copy(&image.indicators).map_err(|e| htod("indicators", e))?;
        let mut signals_gpu = dev.htod_sync_copy(&image.signals).map_err(|e| htod("signals", e))?;
        let mut backtest_gpu = dev.htod_sync_copy(&image.backtest).map_err(|e| htod("backtest", e))?;
        let mut ints_gpu = dev.htod_sync_copy(&image.ints).map_err(|e| htod("ints", e))?;
        let mut floats_gpu = dev.htod_sync_copy(&image.floats).map_err(|e| htod("floats", e))?;
        let mut bools_gpu = dev.htod_sync_copy(&image.bools).map_err(|e| htod("bools", e))?;

        let func: CudaFunction = dev
            .get_func(MODULE, KERNEL)
            .ok_or_else(|| format!("{KERNEL} not found in PTX"))?;

        let cfg = LaunchConfig {
            grid_dim: (geometry.blocks, 1, 1),
            block_dim: (geometry.threads, 1, 1),
            shared_mem_bytes: 0,
        };
        debug!(
            threads = geometry.threads,
            blocks = geometry.blocks,
            max_registers = geometry.max_registers,
            conf_count = upload.params.conf_count,
            "launching sweep kernel"
        );

        unsafe {
            func.launch(
                cfg,
                (
                    &params_gpu,
                    &inputs_gpu,
                    &mapping_gpu,
                    &mut indicators_gpu,
                    &mut signals_gpu,
                    &mut backtest_gpu,
                    &mut ints_gpu,
                    &mut floats_gpu,
                    &mut bools_gpu,
                ),
            )
        }
        .map_err(|e| format!("{KERNEL} launch failed: {e}"))?;

        dev.synchronize().map_err(|e| format!("device synchronize failed: {e}"))?;

        let dtoh = |what: &str, e: cudarc::driver::DriverError| format!("{what} download failed: {e}");
        let result = OutputImage {
            indicators: dev.dtoh_sync_copy(&indicators_gpu).map_err(|e| dtoh("indicators", e))?,
            signals: dev.dtoh_sync_copy(&signals_gpu).map_err(|e| dtoh("signals", e))?,
            backtest: dev.dtoh_sync_copy(&backtest_gpu).map_err(|e| dtoh("backtest", e))?,
            ints: dev.dtoh_sync_copy(&ints_gpu).map_err(|e| dtoh("ints", e))?,
            floats: dev.dtoh_sync_copy(&floats_gpu).map_err(|e| dtoh("floats", e))?,
            bools: dev.dtoh_sync_copy(&bools_gpu).map_err(|e| dtoh("bools", e))?,
        };
        result.write_back(buffers)
    }
}
