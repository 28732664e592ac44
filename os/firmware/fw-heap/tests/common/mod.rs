#![allow(dead_code)]

use fw_heap::layout::{BoardLayout, HeapGeometry, MapGeometry, SystemGeometry};
use fw_heap::{Caps, FatalError, HeapConfig, HeapId, Pool, Registry};
use fw_platform::memory;
use fw_platform::sim::{SimBoard, SimPlatform, Trap};
use fw_trace::TraceSink;
use log::Level;
use std::panic::{self, AssertUnwindSafe};
use std::ptr::NonNull;
use std::sync::{Mutex, PoisonError};

pub type SimRegistry = Registry<'static, SimPlatform>;

pub const DMA_RAM: Caps = Caps::RAM.union(Caps::DMA);

const SMALL_SYSTEM: &[SystemGeometry] = &[SystemGeometry::new(Caps::RAM, 0x400); 2];
const SMALL_SYSTEM_RUNTIME: &[HeapGeometry] = &[HeapGeometry::new(
    Caps::RAM,
    &[MapGeometry::new(64, 4), MapGeometry::new(256, 2)],
); 2];
const SMALL_RUNTIME: &[HeapGeometry] = &[HeapGeometry::new(
    Caps::RAM,
    &[MapGeometry::new(64, 4), MapGeometry::new(128, 2)],
)];
const SMALL_BUFFER: &[HeapGeometry] = &[HeapGeometry::new(DMA_RAM, &[MapGeometry::new(64, 4)])];

/// Two cores.
///
/// | heap | offset | classes |
/// |---|---|---|
/// | system 0 | 0x000 | 0x400 bytes |
/// | system 1 | 0x400 | 0x400 bytes |
/// | system runtime 0 | 0x800 | 64 × 4, 256 × 2 |
/// | system runtime 1 | 0xb00 | 64 × 4, 256 × 2 |
/// | runtime 0 | 0xe00 | 64 × 4, 128 × 2 |
/// | buffer 0 (DMA) | 0x1000 | 64 × 4 |
pub const SMALL: BoardLayout = BoardLayout {
    system: SMALL_SYSTEM,
    system_runtime: SMALL_SYSTEM_RUNTIME,
    runtime: SMALL_RUNTIME,
    buffer: SMALL_BUFFER,
};

pub const SMALL_SYSTEM_RUNTIME_1: usize = 0xb00;
pub const SMALL_RUNTIME_OFFSET: usize = 0xe00;
pub const SMALL_BUFFER_OFFSET: usize = 0x1000;

const SPANNING_SYSTEM: &[SystemGeometry] = &[SystemGeometry::new(Caps::RAM, 0x400)];
const SPANNING_SYSTEM_RUNTIME: &[HeapGeometry] =
    &[HeapGeometry::new(Caps::RAM, &[MapGeometry::new(64, 2)])];
const SPANNING_RUNTIME: &[HeapGeometry] =
    &[HeapGeometry::new(Caps::RAM, &[MapGeometry::new(64, 2)])];
const SPANNING_BUFFER: &[HeapGeometry] = &[HeapGeometry::new(
    DMA_RAM,
    &[MapGeometry::new(64, 8), MapGeometry::new(128, 4)],
)];

/// One core, with a buffer heap of 64 × 8 (at 0x500) and 128 × 4 (at
/// 0x700) blocks.
pub const SPANNING: BoardLayout = BoardLayout {
    system: SPANNING_SYSTEM,
    system_runtime: SPANNING_SYSTEM_RUNTIME,
    runtime: SPANNING_RUNTIME,
    buffer: SPANNING_BUFFER,
};

pub const SPANNING_SMALL_BLOCKS: usize = 0x500;
pub const SPANNING_LARGE_BLOCKS: usize = 0x700;

pub const RUNTIME_0: HeapId = HeapId::new(Pool::Runtime, 0);
pub const BUFFER_0: HeapId = HeapId::new(Pool::Buffer, 0);

/// A fresh registry over `layout`, and the start of its heap memory.
pub fn boot(layout: &BoardLayout) -> (&'static SimRegistry, usize) {
    let board = SimBoard::new(layout);
    let (base, _) = board.region();
    let registry = board.boot(HeapConfig::new()).expect("board boots");
    (registry, base)
}

pub fn boot_reference() -> &'static SimRegistry {
    SimBoard::reference()
        .boot(memory::CONFIG)
        .expect("reference board boots")
}

pub fn addr(block: NonNull<u8>) -> usize {
    block.as_ptr().addr()
}

/// A pointer to heap memory at `addr`.
pub fn at(addr: usize) -> *mut u8 {
    std::ptr::with_exposed_provenance_mut(addr)
}

/// Run `f`, which must end in a fatal heap error, and return that error.
pub fn trap<R>(f: impl FnOnce() -> R) -> FatalError {
    let payload = panic::catch_unwind(AssertUnwindSafe(f))
        .err()
        .expect("expected a fatal heap error");
    payload
        .downcast_ref::<Trap>()
        .expect("payload is a heap trap")
        .error
}

/// Run `f` on a thread that executes as `core`.
pub fn on_core<R: Send>(core: usize, f: impl FnOnce() -> R + Send) -> R {
    std::thread::scope(|scope| {
        scope
            .spawn(|| {
                SimPlatform::enter_core(core);
                f()
            })
            .join()
            .expect("core thread panicked")
    })
}

pub fn fill(block: NonNull<u8>, len: usize, byte: u8) {
    unsafe { block.as_ptr().write_bytes(byte, len) };
}

pub fn bytes(block: NonNull<u8>, len: usize) -> Vec<u8> {
    unsafe { std::slice::from_raw_parts(block.as_ptr(), len) }.to_vec()
}

/// Collects every trace line.
pub struct Capture(Mutex<Vec<String>>);

impl Capture {
    pub const fn new() -> Self {
        Self(Mutex::new(Vec::new()))
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl TraceSink for Capture {
    fn emit(&self, _level: Level, line: &str) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_owned());
    }
}
