//! GPU side of the sweep pipeline.
//!
//! `tuner` and `buffers` are plain host code and always build. The cudarc
//! host in `gpu_host` and the nvcc step in build.rs only run with the
//! `cuda` feature.

pub mod buffers;
#[cfg(feature = "cuda")]
pub mod gpu_host;
pub mod tuner;

use std::env;

use tracing::warn;

pub use buffers::{DeviceUpload, KernelParams, OutputImage};
pub use tuner::{auto_tune, fallback_geometry, DeviceProps, LaunchGeometry, TuneRequest};

/// Whether this build carries the CUDA backend.
pub const CUDA_ENABLED: bool = cfg!(feature = "cuda");

/// Launch tuning knobs exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuOptions {
    pub autotune: bool,
    pub threads: Option<u32>,
    pub blocks: Option<u32>,
    /// Ceiling on threads per block while tuning.
    pub desired_threads: u32,
}

impl Default for GpuOptions {
    fn default() -> Self {
        Self {
            autotune: true,
            threads: None,
            blocks: None,
            desired_threads: TuneRequest::new(0).desired_threads,
        }
    }
}

impl GpuOptions {
    /// Geometry for `workload` configurations.
    ///
    /// Without tuning, or without device properties, this is the fixed
    /// 256-thread fallback and manual threads/blocks are dropped with a
    /// warning. Otherwise they override their half of the tuned result.
    pub fn geometry(&self, props: Option<&DeviceProps>, workload: usize) -> LaunchGeometry {
        let props = match props {
            Some(p) if self.autotune => p,
            _ => {
                if self.has_overrides() {
                    warn!(
                        threads = ?self.threads,
                        blocks = ?self.blocks,
                        autotune = self.autotune,
                        "manual launch geometry ignored without auto-tuning"
                    );
                }
                return fallback_geometry(workload);
            }
        };
        let req = TuneRequest {
            desired_threads: self.desired_threads,
            threads_override: self.threads.filter(|&t| t > 0),
            blocks_override: self.blocks.filter(|&b| b > 0),
            ..TuneRequest::new(workload)
        };
        auto_tune(props, &req)
    }

    /// Whether a non-zero thread or block count was requested.
    pub fn has_overrides(&self) -> bool {
        self.threads.is_some_and(|t| t > 0) || self.blocks.is_some_and(|b| b > 0)
    }
}

pub fn env_truthy(name: &str) -> bool {
    env::var(name)
        .map(|v| {
            let s = v.trim().to_ascii_lowercase();
            s == "1" || s == "true" || s == "yes" || s == "on"
        })
        .unwrap_or(false)
}

/// `Some(false)` for an explicit 0/false/no/off, `Some(true)` for a truthy
/// value, `None` when unset or unrecognised.
pub fn env_flag(name: &str) -> Option<bool> {
    let v = env::var(name).ok()?;
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn env_u32(name: &str) -> Option<u32> {
    env::var(name).ok().and_then(|v| v.trim().parse::<u32>().ok())
}
