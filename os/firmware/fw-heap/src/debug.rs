//! Heap diagnostics: poison pattern and status dumps.

use crate::{Caps, Heap, HeapId, MemoryMap, Pool};
use log::{Level, debug, error, log, warn};

/// Byte written over free block memory when poisoning is enabled.
pub const POISON: u8 = 0xa5;

pub(crate) const POISON_ENABLED: bool = cfg!(feature = "debug-block-free");

/// Overwrite `len` bytes at `addr` with [`POISON`].
///
/// # Safety
/// `addr..addr + len` must be writable memory not in use by anybody else.
pub(crate) unsafe fn fill_poison(addr: usize, len: usize) {
    let ptr = core::ptr::with_exposed_provenance_mut::<u8>(addr);
    // SAFETY: guaranteed by the caller.
    unsafe { ptr.write_bytes(POISON, len) };
}

/// Whether `len` bytes at `addr` still hold [`POISON`].
///
/// # Safety
/// `addr..addr + len` must be readable memory not written concurrently.
pub(crate) unsafe fn is_poisoned(addr: usize, len: usize) -> bool {
    let ptr = core::ptr::with_exposed_provenance::<u8>(addr);
    // SAFETY: guaranteed by the caller.
    let bytes = unsafe { core::slice::from_raw_parts(ptr, len) };
    bytes.iter().all(|byte| *byte == POISON)
}

/// Check a freshly handed out block range for writes since it was freed.
///
/// # Safety
/// As for [`is_poisoned`].
pub(crate) unsafe fn check_reuse(addr: usize, len: usize) {
    // SAFETY: guaranteed by the caller.
    if unsafe { is_poisoned(addr, len) } {
        debug!(target: "mem", "heap: {addr:#x} untouched since free");
    } else {
        warn!(
            target: "mem",
            "heap: {addr:#x} ({len} bytes) written after free or freed twice"
        );
    }
}

/// Log the state of one block heap at `level`.
pub(crate) fn trace_heap(level: Level, id: HeapId, heap: &Heap<'_>) {
    let info = heap.info();
    log!(
        target: "mem",
        level,
        "heap: {id} {:#x} size {} blocks {} caps {:#x}",
        heap.base(),
        heap.size(),
        heap.maps().len(),
        heap.caps()
    );
    log!(target: "mem", level, " used {} free {}", info.used, info.free);

    for (class, map) in heap.maps().iter().enumerate() {
        log!(
            target: "mem",
            level,
            "  block {class} base {:#x} size {:4} count {:4} free {:4} first free {}",
            map.base(),
            map.block_size(),
            map.count(),
            map.free_count(),
            map.first_free()
        );
    }
}

/// Log every buffer and runtime heap.
pub(crate) fn trace_all(map: &MemoryMap<'_>) {
    for pool in [Pool::Buffer, Pool::Runtime] {
        for (index, heap) in map.pool(pool).iter().enumerate() {
            trace_heap(Level::Info, HeapId::new(pool, index), heap);
        }
    }
}

/// Log the heaps of `pool` that could have served `caps` after a failure.
pub(crate) fn dump_candidates(map: &MemoryMap<'_>, pool: Pool, caps: Caps, bytes: usize) {
    if !cfg!(feature = "debug-heap") {
        return;
    }
    error!(target: "mem", "heap: failed to place {bytes} bytes with caps {caps:#x}");
    for (index, heap) in map.pool(pool).iter().enumerate() {
        if heap.caps().satisfies(caps) {
            trace_heap(Level::Error, HeapId::new(pool, index), heap);
        }
    }
}
