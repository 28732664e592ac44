mod common;

use common::*;
use fw_heap::layout::{BoardLayout, SystemGeometry};
use fw_heap::pm::{NoPmContext, PmError};
use fw_heap::{
    BlockMap, Caps, FatalError, GlobalHeap, Heap, HeapConfig, HeapError, HeapId, HeapInfo,
    MAX_HEAPS, MemoryMap, Pool, Registry, Slot, SystemHeap, Zone,
};
use fw_platform::sim::{SimBoard, SimPlatform};
use std::alloc::{GlobalAlloc, Layout};

fn leak<T>(items: Vec<T>) -> &'static mut [T] {
    Box::leak(items.into_boxed_slice())
}

/// A heap of `count` blocks of `block_size` bytes at `base`.
fn heap(base: usize, block_size: usize, count: usize) -> Heap<'static> {
    let slots = leak(vec![Slot::Free; count]);
    Heap::new(base, Caps::RAM, leak(vec![BlockMap::new(block_size, slots)]))
}

fn init(
    system: Vec<SystemHeap>,
    system_runtime: Vec<Heap<'static>>,
    runtime: Vec<Heap<'static>>,
) -> Result<Registry<'static, SimPlatform>, FatalError> {
    let start = system.first().map_or(0, SystemHeap::base);
    let map = MemoryMap::new(
        leak(system),
        leak(system_runtime),
        leak(runtime),
        leak(Vec::new()),
    );
    Registry::init(SimPlatform::new(start), HeapConfig::new(), map)
}

#[test]
fn system_heaps_must_start_where_the_platform_says() {
    let board = SimBoard::new(&SMALL);
    let (base, _) = board.region();
    let (_, map) = board.into_parts();

    let result = Registry::init(SimPlatform::new(base + 64), HeapConfig::new(), map);
    assert_eq!(
        result.err(),
        Some(FatalError::LayoutMismatch {
            expected: base + 64,
            found: base
        })
    );
}

#[test]
fn every_core_needs_both_per_core_heaps() {
    const UNEVEN: BoardLayout = BoardLayout {
        system: &[SystemGeometry::new(Caps::RAM, 0x400); 3],
        ..SMALL
    };
    let result = SimBoard::new(&UNEVEN).into_registry(HeapConfig::new());
    assert_eq!(
        result.err(),
        Some(FatalError::PoolMismatch {
            system: 3,
            system_runtime: 2
        })
    );
}

#[test]
fn system_alignment_must_be_a_power_of_two() {
    for align in [0, 48] {
        let config = HeapConfig::new().with_dcache_align(align);
        let result = SimBoard::new(&SMALL).into_registry(config);
        assert_eq!(result.err(), Some(FatalError::InvalidAlignment { align }));
    }
}

#[test]
fn overlapping_heaps_are_rejected() {
    let result = init(
        vec![SystemHeap::new(0x1000, 0x100, Caps::RAM)],
        vec![heap(0x1080, 64, 2)],
        Vec::new(),
    );
    assert_eq!(
        result.err(),
        Some(FatalError::OverlappingHeaps {
            first: HeapId::new(Pool::System, 0),
            second: HeapId::new(Pool::SystemRuntime, 0)
        })
    );
}

#[test]
fn the_heap_index_is_bounded() {
    let runtime = (0..MAX_HEAPS - 1)
        .map(|i| heap(0x2000 + i * 0x100, 64, 1))
        .collect();
    let result = init(
        vec![SystemHeap::new(0x1000, 0x100, Caps::RAM)],
        vec![heap(0x1800, 64, 1)],
        runtime,
    );
    assert_eq!(
        result.err(),
        Some(FatalError::TooManyHeaps { limit: MAX_HEAPS })
    );
}

#[test]
fn block_classes_must_ascend() {
    let slots = leak(vec![Slot::Free; 2]);
    let more = leak(vec![Slot::Free; 2]);
    let unordered = Heap::new(
        0x2000,
        Caps::RAM,
        leak(vec![BlockMap::new(128, slots), BlockMap::new(64, more)]),
    );
    let result = init(
        vec![SystemHeap::new(0x1000, 0x100, Caps::RAM)],
        vec![heap(0x1800, 64, 1)],
        vec![unordered],
    );
    assert_eq!(
        result.err(),
        Some(FatalError::InvalidGeometry {
            heap: HeapId::new(Pool::Runtime, 0)
        })
    );
}

#[test]
fn empty_system_heaps_are_not_indexed() {
    let result = init(
        vec![
            SystemHeap::new(0x1000, 0x100, Caps::RAM),
            SystemHeap::new(0x1100, 0, Caps::RAM),
        ],
        vec![heap(0x1800, 64, 1), heap(0x1900, 64, 1)],
        Vec::new(),
    );
    assert!(result.is_ok());
}

#[test]
fn only_a_secondary_core_resets_its_own_system_heap() {
    let (registry, base) = boot(&SMALL);

    assert_eq!(
        registry.reset_core_system_heap(0),
        Err(FatalError::IllegalHeapReset { core: 0, caller: 0 })
    );
    assert_eq!(
        on_core(1, || registry.reset_core_system_heap(0)),
        Err(FatalError::IllegalHeapReset { core: 0, caller: 1 })
    );

    let (first, again) = on_core(1, || {
        let first = addr(registry.allocate(Zone::SYSTEM, Caps::RAM, 200).unwrap());
        registry.reset_core_system_heap(1).unwrap();
        let again = addr(registry.allocate(Zone::SYSTEM, Caps::RAM, 10).unwrap());
        (first, again)
    });
    assert_eq!(first, base + 0x400);
    assert_eq!(again, first);
    assert_eq!(
        registry.system_heap_info(1),
        Ok(HeapInfo {
            used: 10,
            free: 0x400 - 10
        })
    );
    assert_eq!(
        registry.system_heap_info(2),
        Err(FatalError::NoSuchCore {
            pool: Pool::System,
            core: 2
        })
    );
}

#[test]
fn power_management_is_not_supported_by_default() {
    let (registry, _) = boot(&SMALL);
    let mut store = NoPmContext;
    assert_eq!(registry.pm_context_size(&store), Ok(0));
    assert_eq!(
        registry.pm_context_save(&mut store),
        Err(PmError::NotSupported)
    );
    assert_eq!(
        registry.pm_context_restore(&mut store),
        Err(PmError::NotSupported)
    );
}

#[test]
fn reentering_the_lock_is_fatal() {
    let (registry, _) = boot(&SMALL);
    let inner = registry
        .with_map(|_| registry.allocate(Zone::RUNTIME, Caps::RAM, 64))
        .unwrap();
    assert_eq!(
        inner,
        Err(HeapError::Fatal(FatalError::Reentrant { core: 0 }))
    );
    // the lock is usable again afterwards
    assert!(registry.allocate(Zone::RUNTIME, Caps::RAM, 64).is_ok());
}

#[test]
fn global_allocator_serves_the_runtime_zone() {
    static GLOBAL: GlobalHeap<SimPlatform> = GlobalHeap::new(Caps::RAM);
    let (registry, base) = boot(&SMALL);
    let runtime = base + SMALL_RUNTIME_OFFSET;
    let layout = Layout::from_size_align(100, 8).unwrap();

    unsafe {
        assert!(GLOBAL.alloc(layout).is_null());

        GLOBAL.install(registry);
        let block = GLOBAL.alloc(layout);
        assert_eq!(block.addr(), runtime + 256);

        // alignment above the size decides the class
        let aligned = GLOBAL.alloc(Layout::from_size_align(16, 128).unwrap());
        assert_eq!(aligned.addr(), runtime + 384);
        assert!(
            GLOBAL
                .alloc(Layout::from_size_align(16, 1024).unwrap())
                .is_null()
        );

        let zeroed_layout = Layout::from_size_align(64, 64).unwrap();
        let zeroed = GLOBAL.alloc_zeroed(zeroed_layout);
        assert_eq!(zeroed.addr(), runtime);
        assert!(std::slice::from_raw_parts(zeroed, 64).iter().all(|b| *b == 0));

        GLOBAL.dealloc(block, layout);
        GLOBAL.dealloc(aligned, layout);
        GLOBAL.dealloc(zeroed, zeroed_layout);
    }
    assert_eq!(registry.heap_info(RUNTIME_0).unwrap().used, 0);
}
