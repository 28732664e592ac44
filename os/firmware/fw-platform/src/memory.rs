//! # Memory Layout
//!
//! Heap geometry of the reference board. The firmware linker script reserves
//! the heaps back to back from [`HEAP_BASE`] in [`BOARD`] order.

use fw_heap::layout::{BoardLayout, HeapGeometry, MapGeometry, SystemGeometry};
use fw_heap::{Caps, CoreId, HeapConfig};

/// DSP cores on the board.
pub const CORE_COUNT: usize = 4;

/// The core that boots the firmware.
pub const MASTER_CORE: CoreId = 0;

/// Data cache line size; system heap allocations are aligned to it.
pub const DCACHE_LINE_SIZE: usize = 64;

/// Allocator settings of the board.
pub const CONFIG: HeapConfig = HeapConfig::new()
    .with_master_core(MASTER_CORE)
    .with_dcache_align(DCACHE_LINE_SIZE);

/// Start of the heap region in L2 SRAM (cached alias).
pub const HEAP_BASE: usize = 0xbe10_0000;

/// Size of the heap region in L2 SRAM.
pub const HEAP_REGION_SIZE: usize = 0x4_0000; // 256 KiB

const SYSTEM_CAPS: Caps = Caps::RAM.union(Caps::CACHE).union(Caps::DMA);
const RUNTIME_CAPS: Caps = Caps::RAM.union(Caps::CACHE).union(Caps::DMA);
const HP_BUFFER_CAPS: Caps = Caps::RAM
    .union(Caps::HP)
    .union(Caps::CACHE)
    .union(Caps::DMA);
const LP_BUFFER_CAPS: Caps = Caps::RAM
    .union(Caps::LP)
    .union(Caps::CACHE)
    .union(Caps::DMA);

/// Bump heap of the master core.
pub const SYSTEM_MASTER_SIZE: usize = 0x8000;

/// Bump heap of each secondary core.
pub const SYSTEM_SECONDARY_SIZE: usize = 0x1000;

pub const SYSTEM: [SystemGeometry; CORE_COUNT] = [
    SystemGeometry::new(SYSTEM_CAPS, SYSTEM_MASTER_SIZE),
    SystemGeometry::new(SYSTEM_CAPS, SYSTEM_SECONDARY_SIZE),
    SystemGeometry::new(SYSTEM_CAPS, SYSTEM_SECONDARY_SIZE),
    SystemGeometry::new(SYSTEM_CAPS, SYSTEM_SECONDARY_SIZE),
];

const SYSTEM_RUNTIME_MASTER_MAPS: &[MapGeometry] = &[
    MapGeometry::new(64, 64),
    MapGeometry::new(512, 8),
    MapGeometry::new(1024, 4),
];

const SYSTEM_RUNTIME_SECONDARY_MAPS: &[MapGeometry] = &[
    MapGeometry::new(64, 32),
    MapGeometry::new(512, 4),
    MapGeometry::new(1024, 2),
];

pub const SYSTEM_RUNTIME: [HeapGeometry; CORE_COUNT] = [
    HeapGeometry::new(SYSTEM_CAPS, SYSTEM_RUNTIME_MASTER_MAPS),
    HeapGeometry::new(SYSTEM_CAPS, SYSTEM_RUNTIME_SECONDARY_MAPS),
    HeapGeometry::new(SYSTEM_CAPS, SYSTEM_RUNTIME_SECONDARY_MAPS),
    HeapGeometry::new(SYSTEM_CAPS, SYSTEM_RUNTIME_SECONDARY_MAPS),
];

const RUNTIME_MAPS: &[MapGeometry] = &[
    MapGeometry::new(64, 64),
    MapGeometry::new(128, 64),
    MapGeometry::new(256, 96),
    MapGeometry::new(512, 8),
    MapGeometry::new(1024, 4),
    MapGeometry::new(2048, 2),
];

pub const RUNTIME: [HeapGeometry; 1] = [HeapGeometry::new(RUNTIME_CAPS, RUNTIME_MAPS)];

/// Audio buffers are carved from 384 byte blocks (one 1 ms period of
/// 48 kHz stereo 32 bit samples).
pub const BUFFER_BLOCK_SIZE: usize = 0x180;

const HP_BUFFER_MAPS: &[MapGeometry] = &[MapGeometry::new(BUFFER_BLOCK_SIZE, 64)];
const LP_BUFFER_MAPS: &[MapGeometry] = &[MapGeometry::new(BUFFER_BLOCK_SIZE, 16)];

pub const BUFFER: [HeapGeometry; 2] = [
    HeapGeometry::new(HP_BUFFER_CAPS, HP_BUFFER_MAPS),
    HeapGeometry::new(LP_BUFFER_CAPS, LP_BUFFER_MAPS),
];

/// All heaps of the board.
pub const BOARD: BoardLayout = BoardLayout {
    system: &SYSTEM,
    system_runtime: &SYSTEM_RUNTIME,
    runtime: &RUNTIME,
    buffer: &BUFFER,
};

const _: () = {
    assert!(BOARD.is_well_formed());
    assert!(BOARD.cores() == CORE_COUNT);
    assert!(MASTER_CORE < CORE_COUNT);
    assert!(DCACHE_LINE_SIZE.is_power_of_two());
    assert!(BOARD.span() <= HEAP_REGION_SIZE);
    assert!(HEAP_BASE.is_multiple_of(DCACHE_LINE_SIZE));
};
