//! Backend dispatch over a cached set of output buffers.

use std::sync::PoisonError;
use std::time::Instant;

use tracing::{debug, info, warn};

use sweep_core::scheduler::{run_parallel_with_threads, run_sequential};
use sweep_core::{BufferSet, CacheOutcome, OutputCache, PreparedRun, Result, RunInputs, SharedBuffers, SweepError};
use sweep_gpu::{GpuOptions, LaunchGeometry};

use crate::backend::Backend;

/// Cache entries kept when the caller does not say otherwise.
pub const DEFAULT_CACHE_SIZE: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Buffer sets kept for reuse; 0 allocates on every run.
    pub cache_max_size: usize,
    /// CPU worker threads; `None` uses the global rayon pool.
    pub threads: Option<usize>,
    pub gpu: GpuOptions,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            cache_max_size: DEFAULT_CACHE_SIZE,
            threads: None,
            gpu: GpuOptions::default(),
        }
    }
}

/// Result of one run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// Every block of the run, addressable per configuration through
    /// [`BufferSet::project`].
    pub buffers: SharedBuffers,
    /// Launch geometry when the GPU ran the sweep.
    pub geometry: Option<LaunchGeometry>,
    pub cache: CacheOutcome,
}

/// Owns the buffer cache and, with the `cuda` feature, the device.
///
/// Runs take `&mut self`: the cache is not shared between concurrent runs.
pub struct Engine {
    options: EngineOptions,
    cache: OutputCache,
    #[cfg(feature = "cuda")]
    device: Option<sweep_gpu::gpu_host::GpuDeviceState>,
}

impl Engine {
    pub fn new(options: EngineOptions) -> Self {
        Self {
            options,
            cache: OutputCache::new(options.cache_max_size),
            #[cfg(feature = "cuda")]
            device: None,
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn cache(&self) -> &OutputCache {
        &self.cache
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// Validate `inputs`, fetch or allocate the buffers for its shape, reset
    /// them and run every configuration on `backend`.
    pub fn run(&mut self, backend: Backend, inputs: &RunInputs) -> Result<RunOutput> {
        let started = Instant::now();
        let prepared = inputs.prepare()?;
        let missing = prepared.missing_kinds();
        if !missing.is_empty() {
            warn!(
                template = prepared.signal.name(),
                ?missing,
                "signal template inputs disabled, signals will stay false"
            );
        }

        let (buffers, cache) = self.cache.get_or_allocate(prepared.key, BufferSet::allocate);
        debug!(key = ?prepared.key, ?cache, "buffers ready");
        let geometry = {
            let mut guard = buffers.lock().unwrap_or_else(PoisonError::into_inner);
            guard.reset();
            self.dispatch(backend, &prepared, &mut guard)?
        };

        info!(
            %backend,
            conf_count = prepared.conf_count(),
            rows = prepared.key.rows,
            cache = ?cache,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "sweep finished"
        );
        Ok(RunOutput {
            buffers,
            geometry,
            cache,
        })
    }

    fn dispatch(&mut self, backend: Backend, run: &PreparedRun<'_>, buffers: &mut BufferSet) -> Result<Option<LaunchGeometry>> {
        match backend {
            Backend::CpuSequential => {
                run_sequential(run, buffers);
                Ok(None)
            }
            Backend::CpuParallel => {
                run_parallel_with_threads(run, buffers, self.options.threads)?;
                Ok(None)
            }
            Backend::Gpu => self.run_gpu(run, buffers).map(Some),
        }
    }

    #[cfg(feature = "cuda")]
    fn run_gpu(&mut self, run: &PreparedRun<'_>, buffers: &mut BufferSet) -> Result<LaunchGeometry> {
        use sweep_gpu::gpu_host::GpuDeviceState;
        use sweep_gpu::DeviceUpload;

        if self.device.is_none() {
            let state = GpuDeviceState::new().map_err(SweepError::BackendUnavailable)?;
            self.device = Some(state);
        }
        let Some(device) = self.device.as_ref() else {
            return Err(SweepError::BackendUnavailable("CUDA device not initialized".to_string()));
        };

        let props = self.options.gpu.autotune.then(|| device.query_props());
        let geometry = self.options.gpu.geometry(props.as_ref(), run.conf_count());
        debug!(?geometry, "gpu launch geometry");

        let upload = DeviceUpload::build(run);
        device.run(&upload, buffers, geometry).map_err(SweepError::Device)?;
        Ok(geometry)
    }

    #[cfg(not(feature = "cuda"))]
    fn run_gpu(&mut self, _run: &PreparedRun<'_>, _buffers: &mut BufferSet) -> Result<LaunchGeometry> {
        Err(SweepError::BackendUnavailable(
            "built without the `cuda` feature".to_string(),
        ))
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineOptions::default())
    }
}
