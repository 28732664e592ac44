//! Keeping allocator metadata coherent across cores.
//!
//! Heap descriptors live in cached memory. The lock orders access, but a
//! core that mutates another core's per-core heap has to push its view of the
//! descriptor out before it lets go of the lock, otherwise the owner keeps
//! working on stale lines.

use crate::{BlockMap, CoreId, Heap, HeapId, Platform, SystemHeap};
use core::mem::size_of_val;

/// Address range of a descriptor.
fn region_of<T>(value: &T) -> (usize, usize) {
    (core::ptr::from_ref(value).addr(), size_of_val(value))
}

fn region_of_slice<T>(values: &[T]) -> (usize, usize) {
    (values.as_ptr().addr(), size_of_val(values))
}

/// Flushes issued on behalf of one core.
pub(crate) struct Coherency<'p, P: Platform> {
    platform: &'p P,
    core: CoreId,
}

impl<'p, P: Platform> Coherency<'p, P> {
    pub(crate) const fn new(platform: &'p P, core: CoreId) -> Self {
        Self { platform, core }
    }

    /// Whether a change to `heap` must be published eagerly.
    const fn is_foreign(&self, heap: HeapId) -> bool {
        heap.pool.is_per_core() && heap.index != self.core
    }

    fn writeback_invalidate(&self, (addr, len): (usize, usize)) {
        self.platform.dcache_writeback_invalidate(addr, len);
    }

    fn invalidate(&self, (addr, len): (usize, usize)) {
        self.platform.dcache_invalidate(addr, len);
    }

    /// Publish a change to a system heap.
    pub(crate) fn system_changed(&self, core: CoreId, heap: &SystemHeap) {
        if self.is_foreign(HeapId::new(crate::Pool::System, core)) {
            self.writeback_invalidate(region_of(heap));
        }
    }

    /// Publish a change to block map `level` of a block heap.
    pub(crate) fn heap_changed(&self, id: HeapId, heap: &Heap<'_>, level: usize) {
        if self.is_foreign(id) {
            self.flush_map(heap.map(level));
            self.writeback_invalidate(region_of(heap));
        }
    }

    fn flush_map(&self, map: &BlockMap<'_>) {
        self.writeback_invalidate(map.slots_region());
        self.writeback_invalidate(region_of(map));
    }

    /// Push a whole heap out: every map, its slots, the descriptor.
    pub(crate) fn flush_heap(&self, heap: &Heap<'_>) {
        for map in heap.maps() {
            self.flush_map(map);
        }
        self.writeback_invalidate(region_of(heap));
    }

    /// Push a descriptor array out.
    pub(crate) fn flush_pool<T>(&self, pool: &[T]) {
        self.writeback_invalidate(region_of_slice(pool));
    }

    /// Drop cached lines of another core's descriptor before reading it.
    pub(crate) fn refresh<T>(&self, heap: HeapId, descriptor: &T) {
        if self.is_foreign(heap) {
            self.invalidate(region_of(descriptor));
        }
    }

    /// Write a descriptor back after a change made by its owner.
    pub(crate) fn write_back<T>(&self, descriptor: &T) {
        let (addr, len) = region_of(descriptor);
        self.platform.dcache_writeback(addr, len);
    }
}
