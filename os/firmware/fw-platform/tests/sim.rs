#![cfg(feature = "std")]

use fw_heap::{FatalError, Platform, Pool};
use fw_platform::memory::{self, BOARD, CORE_COUNT};
use fw_platform::sim::{CacheOpKind, SimBoard, SimPlatform, Trap, UNCACHED_BIT};
use fw_sync::CpuContext;
use std::panic;

#[test]
fn reference_board_places_heaps_back_to_back() {
    let board = SimBoard::reference();
    let (base, span) = board.region();
    assert_eq!(span, BOARD.span());
    assert_eq!(base % 4096, 0);

    let (platform, map) = board.into_parts();
    assert_eq!(platform.system_heap_start(), base);
    assert_eq!(map.cores(), CORE_COUNT);
    assert_eq!(map.system()[0].base(), base);
    assert_eq!(map.system()[0].size(), memory::SYSTEM_MASTER_SIZE);
    assert_eq!(
        map.system()[1].base(),
        base + memory::SYSTEM_MASTER_SIZE
    );

    let mut expected = map.system().last().map(|h| h.base() + h.size()).unwrap();
    for pool in [Pool::SystemRuntime, Pool::Runtime, Pool::Buffer] {
        for heap in map.pool(pool) {
            assert_eq!(heap.base(), expected);
            expected += heap.size();
        }
    }
    assert_eq!(expected, base + span);
}

#[test]
fn threads_run_as_separate_cores() {
    SimPlatform::enter_core(0);
    let platform = SimPlatform::new(0x1000);

    std::thread::spawn(|| {
        SimPlatform::enter_core(3);
        assert_eq!(SimPlatform::current_core(), 3);
    })
    .join()
    .unwrap();

    assert_eq!(platform.core_id(), 0);
    assert_eq!(platform.cpu_id(), 0);
}

#[test]
fn interrupt_mask_is_saved_and_restored() {
    let platform = SimPlatform::new(0x1000);
    assert!(SimPlatform::irq_enabled());

    let outer = platform.irq_save();
    assert!(!SimPlatform::irq_enabled());
    let inner = platform.irq_save();
    platform.irq_restore(inner);
    assert!(!SimPlatform::irq_enabled());
    platform.irq_restore(outer);
    assert!(SimPlatform::irq_enabled());
}

#[test]
fn uncached_alias_round_trips() {
    let platform = SimPlatform::new(0x1000);
    let addr = 0x7f00_1000;
    let alias = platform.cache_to_uncache(addr);
    assert_eq!(alias, addr | UNCACHED_BIT);
    assert!(platform.is_uncached(alias));
    assert!(!platform.is_uncached(addr));
    assert_eq!(platform.uncache_to_cache(alias), addr);
}

#[test]
fn cache_maintenance_is_recorded_per_core() {
    let platform = SimPlatform::new(0x1000);
    SimPlatform::enter_core(2);
    platform.dcache_writeback(0x100, 64);
    platform.dcache_writeback_invalidate(0x200, 32);
    SimPlatform::enter_core(0);
    platform.dcache_invalidate(0x300, 16);

    let ops = platform.take_cache_ops();
    assert_eq!(ops.len(), 3);
    assert_eq!((ops[0].core, ops[0].kind), (2, CacheOpKind::Writeback));
    assert_eq!(ops[1].kind, CacheOpKind::WritebackInvalidate);
    assert!(ops[1].covers(0x200, 32));
    assert!(!ops[1].covers(0x1f0, 32));
    assert_eq!((ops[2].core, ops[2].kind), (0, CacheOpKind::Invalidate));
    assert!(platform.take_cache_ops().is_empty());
}

fn raise_unknown_pointer() {
    <SimPlatform as Platform>::panic(FatalError::UnknownPointer { addr: 0x42 });
}

#[test]
fn fatal_errors_unwind_with_a_trap() {
    let caught = panic::catch_unwind(raise_unknown_pointer).unwrap_err();
    let trap = caught.downcast_ref::<Trap>().unwrap();
    assert_eq!(trap.error, FatalError::UnknownPointer { addr: 0x42 });
    assert_eq!(trap.code, 0x0dea_d000);
}
