//! Launch geometry from device limits and workload size.
//!
//! Everything here is plain arithmetic over [`DeviceProps`], so it runs and
//! is tested without a device.

// ═══════════════════════════════════════════════════════════════════════════
// Device properties
// ═══════════════════════════════════════════════════════════════════════════

/// The device limits the tuner reads. Defaults stand in for any attribute
/// the driver failed to report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceProps {
    pub warp_size: u32,
    pub max_threads_per_block: u32,
    pub max_registers_per_block: u32,
    pub max_shared_mem_per_block: u32,
    pub sm_count: u32,
    pub compute_capability: (u32, u32),
}

impl Default for DeviceProps {
    fn default() -> Self {
        Self {
            warp_size: 32,
            max_threads_per_block: 1024,
            max_registers_per_block: 65536,
            max_shared_mem_per_block: 49152,
            sm_count: 1,
            compute_capability: (0, 0),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Request / result
// ═══════════════════════════════════════════════════════════════════════════

/// Workloads up to this many configurations use the small blocks-per-SM
/// target.
pub const SMALL_WORKLOAD_MAX: usize = 1000;

/// Fallback block size when tuning is off or the device cannot be queried.
pub const FALLBACK_THREADS: u32 = 256;

/// Largest grid dimension the tuner hands out.
pub const MAX_GRID_DIM: u64 = (1 << 31) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TuneRequest {
    /// Number of configurations.
    pub workload: usize,
    /// Ceiling on threads per block.
    pub desired_threads: u32,
    pub registers_per_thread: u32,
    pub shared_mem_per_thread: u32,
    pub min_waves: u32,
    pub small_blocks_per_sm: u32,
    pub large_blocks_per_sm: u32,
    pub threads_override: Option<u32>,
    pub blocks_override: Option<u32>,
}

impl TuneRequest {
    pub fn new(workload: usize) -> Self {
        Self {
            workload,
            desired_threads: 512,
            registers_per_thread: 24,
            shared_mem_per_thread: 0,
            min_waves: 4,
            small_blocks_per_sm: 6,
            large_blocks_per_sm: 14,
            threads_override: None,
            blocks_override: None,
        }
    }
}

/// Threads per block, blocks per grid, and the register cap the kernel was
/// tuned for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchGeometry {
    pub threads: u32,
    pub blocks: u32,
    pub max_registers: u32,
}

impl LaunchGeometry {
    /// Grid-stride step of the launch.
    pub fn stride(&self) -> u64 {
        u64::from(self.threads) * u64::from(self.blocks)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Tuning
// ═══════════════════════════════════════════════════════════════════════════

/// Largest power-of-two multiple of the warp that fits every per-block
/// limit and the caller's ceiling, rounded down to a warp multiple.
pub fn threads_per_block(props: &DeviceProps, req: &TuneRequest) -> u32 {
    let warp = props.warp_size.max(1);
    let ceiling = u64::from(props.max_threads_per_block.min(req.desired_threads));
    let fits = |t: u64| {
        t <= ceiling
            && t * u64::from(req.registers_per_thread) <= u64::from(props.max_registers_per_block)
            && t * u64::from(req.shared_mem_per_thread) <= u64::from(props.max_shared_mem_per_block)
    };

    let mut threads = u64::from(warp);
    while fits(threads * 2) {
        threads *= 2;
    }
    let rounded = threads / u64::from(warp) * u64::from(warp);
    u32::try_from(rounded.max(u64::from(warp))).unwrap_or(warp)
}

/// Blocks covering the workload, reaching the per-SM occupancy target and
/// the minimum number of waves, clamped to the grid limit.
pub fn blocks_per_grid(props: &DeviceProps, req: &TuneRequest, threads: u32) -> u32 {
    let threads = u64::from(threads.max(1));
    let workload = req.workload as u64;
    let sm = u64::from(props.sm_count);
    let per_sm = u64::from(if req.workload <= SMALL_WORKLOAD_MAX {
        req.small_blocks_per_sm
    } else {
        req.large_blocks_per_sm
    });

    let required = workload.div_ceil(threads);
    let occupancy = per_sm * sm;
    let waves = u64::from(req.min_waves).saturating_mul(sm).saturating_mul(per_sm);
    let blocks = required.max(occupancy).max(waves).min(MAX_GRID_DIM);
    u32::try_from(blocks).unwrap_or(u32::MAX)
}

/// Full geometry. Manual overrides skip their half of the computation.
pub fn auto_tune(props: &DeviceProps, req: &TuneRequest) -> LaunchGeometry {
    let threads = req
        .threads_override
        .unwrap_or_else(|| threads_per_block(props, req));
    let blocks = req
        .blocks_override
        .unwrap_or_else(|| blocks_per_grid(props, req, threads));
    LaunchGeometry {
        threads,
        blocks,
        max_registers: req.registers_per_thread,
    }
}

/// Fixed 256-thread blocks, enough of them to cover the workload once.
pub fn fallback_geometry(workload: usize) -> LaunchGeometry {
    let blocks = (workload as u64).div_ceil(u64::from(FALLBACK_THREADS)).max(1);
    LaunchGeometry {
        threads: FALLBACK_THREADS,
        blocks: u32::try_from(blocks.min(MAX_GRID_DIM)).unwrap_or(u32::MAX),
        max_registers: TuneRequest::new(workload).registers_per_thread,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ampere() -> DeviceProps {
        DeviceProps {
            sm_count: 82,
            compute_capability: (8, 6),
            ..DeviceProps::default()
        }
    }

    #[test]
    fn test_threads_capped_by_desired_ceiling() {
        let t = threads_per_block(&ampere(), &TuneRequest::new(10_000));
        assert_eq!(t, 512);
    }

    #[test]
    fn test_threads_capped_by_registers() {
        let req = TuneRequest {
            registers_per_thread: 255,
            desired_threads: 1024,
            ..TuneRequest::new(10)
        };
        // 65536 / 255 = 257 -> 256
        assert_eq!(threads_per_block(&ampere(), &req), 256);
    }

    #[test]
    fn test_threads_capped_by_shared_memory() {
        let req = TuneRequest {
            shared_mem_per_thread: 400,
            ..TuneRequest::new(10)
        };
        // 49152 / 400 = 122 -> 64
        assert_eq!(threads_per_block(&ampere(), &req), 64);
    }

    #[test]
    fn test_threads_never_below_one_warp() {
        let req = TuneRequest {
            registers_per_thread: 10_000,
            ..TuneRequest::new(10)
        };
        assert_eq!(threads_per_block(&ampere(), &req), 32);
        let req = TuneRequest {
            desired_threads: 8,
            ..TuneRequest::new(10)
        };
        assert_eq!(threads_per_block(&ampere(), &req), 32);
    }

    #[test]
    fn test_small_workload_gets_min_waves() {
        let props = ampere();
        let req = TuneRequest::new(1);
        let g = auto_tune(&props, &req);
        assert!(g.blocks >= req.min_waves * props.sm_count * req.small_blocks_per_sm);
        assert_eq!(g.blocks, 4 * 82 * 6);
    }

    #[test]
    fn test_large_workload_covers_every_config() {
        let props = ampere();
        let req = TuneRequest::new(50_000_000);
        let g = auto_tune(&props, &req);
        assert!(g.stride() >= 50_000_000);
        assert_eq!(g.blocks, 50_000_000u32.div_ceil(512));
    }

    #[test]
    fn test_large_target_above_threshold() {
        let props = DeviceProps::default();
        let small = auto_tune(&props, &TuneRequest::new(1000));
        let large = auto_tune(&props, &TuneRequest::new(1001));
        assert_eq!(small.blocks, 24);
        assert_eq!(large.blocks, 56);
    }

    #[test]
    fn test_manual_overrides_short_circuit() {
        let req = TuneRequest {
            threads_override: Some(96),
            blocks_override: Some(3),
            ..TuneRequest::new(1_000_000)
        };
        let g = auto_tune(&ampere(), &req);
        assert_eq!((g.threads, g.blocks), (96, 3));

        let req = TuneRequest {
            threads_override: Some(100),
            ..TuneRequest::new(1_000_000)
        };
        let g = auto_tune(&ampere(), &req);
        assert_eq!(g.threads, 100);
        assert_eq!(g.blocks, 10_000);
    }

    #[test]
    fn test_grid_clamped() {
        let props = DeviceProps {
            sm_count: u32::MAX,
            ..DeviceProps::default()
        };
        let g = auto_tune(&props, &TuneRequest::new(1));
        assert_eq!(u64::from(g.blocks), MAX_GRID_DIM);
    }

    #[test]
    fn test_extreme_wave_target_saturates() {
        let props = DeviceProps {
            sm_count: u32::MAX,
            ..DeviceProps::default()
        };
        let req = TuneRequest {
            min_waves: u32::MAX,
            small_blocks_per_sm: u32::MAX,
            ..TuneRequest::new(1)
        };
        assert_eq!(u64::from(blocks_per_grid(&props, &req, 32)), MAX_GRID_DIM);
    }

    #[test]
    fn test_fallback_geometry() {
        assert_eq!(fallback_geometry(0).blocks, 1);
        assert_eq!(fallback_geometry(256).blocks, 1);
        assert_eq!(fallback_geometry(257).blocks, 2);
        assert_eq!(fallback_geometry(257).threads, 256);
    }
}
