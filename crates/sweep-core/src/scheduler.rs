//! CPU schedulers over the per-configuration views.
//!
//! Configurations are independent, so the only thing a scheduler decides is
//! which worker runs which `idx`. The grid-stride helpers reproduce the
//! device loop on the host.

use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::{Result, SweepError};
use crate::inputs::PreparedRun;
use crate::layout::{BufferSet, ConfigViewMut};
use crate::pipeline::run_config;

/// One configuration after another on the calling thread.
pub fn run_sequential(run: &PreparedRun<'_>, buffers: &mut BufferSet) {
    for (idx, view) in buffers.split_configs_mut().into_iter().enumerate() {
        run_config(run, idx, view);
    }
}

/// Configurations fanned out over the current rayon pool.
pub fn run_parallel(run: &PreparedRun<'_>, buffers: &mut BufferSet) {
    buffers
        .split_configs_mut()
        .into_par_iter()
        .enumerate()
        .for_each(|(idx, view)| run_config(run, idx, view));
}

/// [`run_parallel`] on a dedicated pool of `threads` workers, or on the
/// global pool when `threads` is `None`.
pub fn run_parallel_with_threads(run: &PreparedRun<'_>, buffers: &mut BufferSet, threads: Option<usize>) -> Result<()> {
    let Some(n) = threads else {
        debug!("rayon pool: {} threads (auto)", rayon::current_num_threads());
        run_parallel(run, buffers);
        return Ok(());
    };
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(n)
        .build()
        .map_err(|e| SweepError::Config(format!("failed to build a {n}-thread pool: {e}")))?;
    debug!("rayon pool: {n} threads");
    pool.install(|| run_parallel(run, buffers));
    Ok(())
}

// ---------------------------------------------------------------------------
// Grid-stride emulation
// ---------------------------------------------------------------------------

/// Indices worker `worker` visits: `worker, worker + stride, ...` below
/// `conf_count`. A zero stride is treated as 1.
pub fn grid_stride_indices(worker: usize, stride: usize, conf_count: usize) -> impl Iterator<Item = usize> {
    (worker..conf_count).step_by(stride.max(1))
}

/// Visit count per configuration for a `blocks x threads` launch.
pub fn simulate_grid_stride(threads: usize, blocks: usize, conf_count: usize) -> Vec<u32> {
    let stride = threads.saturating_mul(blocks);
    let mut visits = vec![0u32; conf_count];
    for worker in 0..stride.min(conf_count) {
        for idx in grid_stride_indices(worker, stride, conf_count) {
            visits[idx] += 1;
        }
    }
    visits
}

/// Sequential CPU run that walks configurations in the order a
/// `blocks x threads` device launch would.
pub fn run_grid_stride_emulated(run: &PreparedRun<'_>, buffers: &mut BufferSet, threads: usize, blocks: usize) {
    let stride = threads.saturating_mul(blocks).max(1);
    let conf_count = buffers.conf_count();
    let mut views: Vec<Option<ConfigViewMut<'_>>> = buffers.split_configs_mut().into_iter().map(Some).collect();
    for worker in 0..stride.min(conf_count) {
        for idx in grid_stride_indices(worker, stride, conf_count) {
            if let Some(view) = views[idx].take() {
                run_config(run, idx, view);
            }
        }
    }
    info!(threads, blocks, conf_count, "grid-stride emulation finished");
}
