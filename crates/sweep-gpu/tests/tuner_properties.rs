//! Property tests for the launch tuner.

use proptest::prelude::*;

use sweep_gpu::tuner::{auto_tune, fallback_geometry, DeviceProps, TuneRequest, MAX_GRID_DIM, SMALL_WORKLOAD_MAX};

fn props_strategy() -> impl Strategy<Value = DeviceProps> {
    (
        prop::sample::select(vec![32u32, 64]),
        prop::sample::select(vec![256u32, 512, 1024]),
        8192u32..131_072,
        16_384u32..102_400,
        1u32..160,
    )
        .prop_map(|(warp, max_threads, regs, shared, sm)| DeviceProps {
            warp_size: warp,
            max_threads_per_block: max_threads,
            max_registers_per_block: regs,
            max_shared_mem_per_block: shared,
            sm_count: sm,
            compute_capability: (8, 0),
        })
}

proptest! {
    #[test]
    fn prop_threads_fit_device_limits(
        props in props_strategy(),
        regs in 1u32..128,
        shared in 0u32..64,
        workload in 1usize..5_000_000,
    ) {
        let req = TuneRequest {
            registers_per_thread: regs,
            shared_mem_per_thread: shared,
            ..TuneRequest::new(workload)
        };
        let g = auto_tune(&props, &req);
        prop_assert!(g.threads >= props.warp_size);
        prop_assert_eq!(g.threads % props.warp_size, 0);
        // anything above one warp must honour every per-block limit
        if g.threads > props.warp_size {
            prop_assert!(g.threads <= props.max_threads_per_block.min(req.desired_threads));
            prop_assert!(u64::from(g.threads) * u64::from(regs) <= u64::from(props.max_registers_per_block));
            prop_assert!(u64::from(g.threads) * u64::from(shared) <= u64::from(props.max_shared_mem_per_block));
        }
    }

    #[test]
    fn prop_blocks_cover_workload_and_waves(props in props_strategy(), workload in 1usize..5_000_000) {
        let req = TuneRequest::new(workload);
        let g = auto_tune(&props, &req);
        let per_sm = if workload <= SMALL_WORKLOAD_MAX { req.small_blocks_per_sm } else { req.large_blocks_per_sm };
        prop_assert!(g.stride() >= workload as u64);
        prop_assert!(u64::from(g.blocks) >= u64::from(req.min_waves) * u64::from(props.sm_count) * u64::from(per_sm));
        prop_assert!(u64::from(g.blocks) <= MAX_GRID_DIM);
    }

    #[test]
    fn prop_fallback_covers_workload(workload in 0usize..10_000_000) {
        let g = fallback_geometry(workload);
        prop_assert_eq!(g.threads, 256);
        prop_assert!(g.blocks >= 1);
        prop_assert!(g.stride() >= workload as u64);
    }
}
