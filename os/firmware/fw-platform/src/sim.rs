//! # Host Simulation
//!
//! Runs the heap manager on a development host. Each thread plays one DSP
//! core: [`SimPlatform::enter_core`] selects the core the calling thread
//! executes as, and the interrupt mask is tracked per thread.
//!
//! Heap memory is real (leaked host memory), so allocations can be written
//! and read. The uncached alias of an address sets [`UNCACHED_BIT`]; it is
//! never dereferenced. Cache maintenance is recorded instead of performed,
//! and a fatal heap error unwinds with a [`Trap`] payload so tests can catch
//! it with `std::panic::catch_unwind`.

use crate::memory;
use fw_heap::layout::{BoardLayout, HeapGeometry};
use fw_heap::{
    BlockMap, CoreId, FatalError, Heap, HeapConfig, MemoryMap, Platform, Registry, Slot,
    SystemHeap,
};
use fw_sync::CpuContext;
use fw_trace::TraceSink;
use log::Level;
use std::cell::Cell;
use std::sync::{Mutex, MutexGuard, PoisonError};

thread_local! {
    static CORE: Cell<CoreId> = const { Cell::new(0) };
    static IRQ_ENABLED: Cell<bool> = const { Cell::new(true) };
}

/// Address bit that marks the uncached alias of simulated memory.
pub const UNCACHED_BIT: usize = 1 << (usize::BITS - 2);

/// Alignment of the simulated heap region.
const REGION_ALIGN: usize = 4096;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CacheOpKind {
    Writeback,
    Invalidate,
    WritebackInvalidate,
}

/// One recorded cache maintenance request.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CacheOp {
    /// Core that issued it.
    pub core: CoreId,
    pub kind: CacheOpKind,
    pub addr: usize,
    pub len: usize,
}

impl CacheOp {
    /// Whether the operation covers all of `addr..addr + len`.
    #[must_use]
    pub const fn covers(&self, addr: usize, len: usize) -> bool {
        self.addr <= addr && addr + len <= self.addr + self.len
    }
}

/// Panic payload of a simulated fatal error.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Trap {
    pub error: FatalError,
    pub code: u32,
}

/// Platform services on the host.
#[derive(Debug)]
pub struct SimPlatform {
    system_heap_start: usize,
    cache_ops: Mutex<Vec<CacheOp>>,
}

impl SimPlatform {
    #[must_use]
    pub const fn new(system_heap_start: usize) -> Self {
        Self {
            system_heap_start,
            cache_ops: Mutex::new(Vec::new()),
        }
    }

    /// Run the calling thread as `core` from now on.
    pub fn enter_core(core: CoreId) {
        CORE.set(core);
    }

    /// Core the calling thread runs as.
    #[must_use]
    pub fn current_core() -> CoreId {
        CORE.get()
    }

    /// Whether interrupts are enabled on the calling thread's core.
    #[must_use]
    pub fn irq_enabled() -> bool {
        IRQ_ENABLED.get()
    }

    /// Remove and return every cache operation recorded so far.
    pub fn take_cache_ops(&self) -> Vec<CacheOp> {
        std::mem::take(&mut *self.ops())
    }

    fn ops(&self) -> MutexGuard<'_, Vec<CacheOp>> {
        self.cache_ops
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, kind: CacheOpKind, addr: usize, len: usize) {
        self.ops().push(CacheOp {
            core: CORE.get(),
            kind,
            addr,
            len,
        });
    }
}

impl CpuContext for SimPlatform {
    type Flags = bool;

    fn cpu_id(&self) -> usize {
        CORE.get()
    }

    fn irq_save(&self) -> bool {
        IRQ_ENABLED.replace(false)
    }

    fn irq_restore(&self, flags: bool) {
        IRQ_ENABLED.set(flags);
    }
}

impl Platform for SimPlatform {
    fn system_heap_start(&self) -> usize {
        self.system_heap_start
    }

    fn dcache_writeback(&self, addr: usize, len: usize) {
        self.record(CacheOpKind::Writeback, addr, len);
    }

    fn dcache_invalidate(&self, addr: usize, len: usize) {
        self.record(CacheOpKind::Invalidate, addr, len);
    }

    fn dcache_writeback_invalidate(&self, addr: usize, len: usize) {
        self.record(CacheOpKind::WritebackInvalidate, addr, len);
    }

    fn cache_to_uncache(&self, addr: usize) -> usize {
        addr | UNCACHED_BIT
    }

    fn uncache_to_cache(&self, addr: usize) -> usize {
        addr & !UNCACHED_BIT
    }

    fn is_uncached(&self, addr: usize) -> bool {
        addr & UNCACHED_BIT != 0
    }

    fn panic(error: FatalError) -> ! {
        std::panic::panic_any(Trap {
            error,
            code: FatalError::REASON_CODE,
        })
    }
}

fn leak<T>(items: Vec<T>) -> &'static mut [T] {
    Box::leak(items.into_boxed_slice())
}

fn block_heap(geometry: &HeapGeometry, base: usize) -> Heap<'static> {
    let maps = geometry
        .maps
        .iter()
        .map(|map| BlockMap::new(map.block_size, leak(vec![Slot::Free; map.count])))
        .collect();
    Heap::new(base, geometry.caps, leak(maps))
}

/// Simulated heap memory and descriptors for a [`BoardLayout`].
///
/// Heaps are placed back to back in layout order, the way the firmware
/// linker script places them. Everything is leaked; a board lives for the
/// rest of the process.
#[derive(Debug)]
pub struct SimBoard {
    platform: SimPlatform,
    map: MemoryMap<'static>,
    region: (usize, usize),
}

impl SimBoard {
    #[must_use]
    pub fn new(layout: &BoardLayout) -> Self {
        let span = layout.span();
        let memory: &'static mut [u8] = leak(vec![0u8; span + REGION_ALIGN]);
        let base = memory
            .as_mut_ptr()
            .expose_provenance()
            .next_multiple_of(REGION_ALIGN);

        let mut next = base;
        let mut carve = |len: usize| {
            let at = next;
            next += len;
            at
        };

        let system = layout
            .system
            .iter()
            .map(|heap| SystemHeap::new(carve(heap.size), heap.size, heap.caps))
            .collect();
        let system_runtime = layout
            .system_runtime
            .iter()
            .map(|heap| block_heap(heap, carve(heap.span())))
            .collect();
        let runtime = layout
            .runtime
            .iter()
            .map(|heap| block_heap(heap, carve(heap.span())))
            .collect();
        let buffer = layout
            .buffer
            .iter()
            .map(|heap| block_heap(heap, carve(heap.span())))
            .collect();

        Self {
            platform: SimPlatform::new(base),
            map: MemoryMap::new(leak(system), leak(system_runtime), leak(runtime), leak(buffer)),
            region: (base, span),
        }
    }

    /// The reference board of [`memory::BOARD`].
    #[must_use]
    pub fn reference() -> Self {
        Self::new(&memory::BOARD)
    }

    /// Start address and length of the simulated heap memory.
    #[must_use]
    pub const fn region(&self) -> (usize, usize) {
        self.region
    }

    #[must_use]
    pub fn into_parts(self) -> (SimPlatform, MemoryMap<'static>) {
        (self.platform, self.map)
    }

    /// Initialize a registry over this board.
    ///
    /// # Errors
    /// Whatever [`Registry::init`] rejects.
    pub fn into_registry(self, config: HeapConfig) -> Result<Registry<'static, SimPlatform>, FatalError> {
        Registry::init(self.platform, config, self.map)
    }

    /// Initialize a registry and leak it, for sharing across threads or
    /// installing into a [`GlobalHeap`](fw_heap::GlobalHeap).
    ///
    /// # Errors
    /// Whatever [`Registry::init`] rejects.
    pub fn boot(self, config: HeapConfig) -> Result<&'static Registry<'static, SimPlatform>, FatalError> {
        Ok(Box::leak(Box::new(self.into_registry(config)?)))
    }
}

/// Prints trace lines to stdout, tagged with the simulated core.
#[derive(Debug, Default)]
pub struct StdoutSink;

impl TraceSink for StdoutSink {
    fn emit(&self, _level: Level, line: &str) {
        println!("c{} {line}", CORE.get());
    }
}
