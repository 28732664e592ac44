//! The heap registry: every heap of the board behind one lock.

use crate::coherency::Coherency;
use crate::debug::{self, POISON_ENABLED};
use crate::heap::Grant;
use crate::owner::OwnerIndex;
use crate::pm::{PmContextStore, PmError};
use crate::{
    Caps, CoreId, FatalError, HeapConfig, HeapError, HeapId, HeapInfo, MemoryMap, Platform, Pool,
    Zone, resolver,
};
use core::ptr::{self, NonNull};
use fw_sync::{IrqSpinLockGuard, SpinLock};
use log::{debug, info};

type MapGuard<'a, 'm, P> = IrqSpinLockGuard<'a, MemoryMap<'m>, P>;

/// A range handed out by one of the pools, before address translation.
#[derive(Debug, Copy, Clone)]
struct Placement {
    heap: HeapId,
    /// Cached address.
    addr: usize,
    /// Bytes requested.
    bytes: usize,
    /// Bytes taken from the heap.
    granted: usize,
}

impl Placement {
    const fn from_grant(heap: HeapId, bytes: usize, grant: Grant) -> Self {
        Self {
            heap,
            addr: grant.addr,
            bytes,
            granted: grant.bytes,
        }
    }

    /// Whether the range came out of a block map, and so may carry poison.
    const fn is_block(&self) -> bool {
        !matches!(self.heap.pool, Pool::System)
    }
}

/// Owns the [`MemoryMap`] and serializes all access to it.
///
/// Every operation masks interrupts on the calling core and takes the one
/// registry lock for its whole duration. Operations never block otherwise
/// and must not be called again from within the critical section; a core
/// re-entering the lock gets [`FatalError::Reentrant`].
pub struct Registry<'m, P: Platform> {
    platform: P,
    config: HeapConfig,
    owners: OwnerIndex,
    map: SpinLock<MemoryMap<'m>>,
}

impl<'m, P: Platform> Registry<'m, P> {
    /// Bring the heaps of `map` into service.
    ///
    /// Lays out the block maps of every heap back to back from the heap
    /// base, indexes all heap ranges and writes the metadata back so every
    /// core starts from the same view.
    ///
    /// # Errors
    /// * [`FatalError::InvalidAlignment`] if the configured cache line
    ///   alignment is not a power of two.
    /// * [`FatalError::LayoutMismatch`] if the first system heap is not where
    ///   the platform says the linker put it.
    /// * [`FatalError::PoolMismatch`] if the per-core pools differ in length.
    /// * [`FatalError::InvalidGeometry`], [`FatalError::OverlappingHeaps`],
    ///   [`FatalError::TooManyHeaps`] for broken layouts.
    pub fn init(platform: P, config: HeapConfig, mut map: MemoryMap<'m>) -> Result<Self, FatalError> {
        if !config.dcache_align.is_power_of_two() {
            return Err(FatalError::InvalidAlignment {
                align: config.dcache_align,
            });
        }
        let expected = platform.system_heap_start();
        let found = map.system().first().map_or(0, crate::SystemHeap::base);
        if found != expected {
            return Err(FatalError::LayoutMismatch { expected, found });
        }
        if map.system().len() != map.system_runtime().len() {
            return Err(FatalError::PoolMismatch {
                system: map.system().len(),
                system_runtime: map.system_runtime().len(),
            });
        }

        for pool in [Pool::SystemRuntime, Pool::Runtime, Pool::Buffer] {
            for (index, heap) in map.pool_mut(pool).iter_mut().enumerate() {
                heap.lay_out(HeapId::new(pool, index))?;
            }
        }
        let owners = OwnerIndex::build(&map)?;

        if POISON_ENABLED {
            for pool in [Pool::SystemRuntime, Pool::Runtime, Pool::Buffer] {
                for heap in map.pool(pool) {
                    // SAFETY: heap memory belongs to the allocator and nothing
                    // has been handed out yet.
                    unsafe { debug::fill_poison(heap.base(), heap.size()) };
                }
            }
        }

        let coherency = Coherency::new(&platform, platform.core_id());
        for (_, heap) in map.block_heaps() {
            coherency.flush_heap(heap);
        }
        coherency.flush_pool(map.system());
        for pool in [Pool::SystemRuntime, Pool::Runtime, Pool::Buffer] {
            coherency.flush_pool(map.pool(pool));
        }

        info!(
            target: "mem",
            "heap: {} cores, {} runtime and {} buffer heaps",
            map.cores(),
            map.runtime().len(),
            map.buffer().len()
        );

        Ok(Self {
            platform,
            config,
            owners,
            map: SpinLock::new(map),
        })
    }

    #[must_use]
    pub const fn platform(&self) -> &P {
        &self.platform
    }

    #[must_use]
    pub const fn config(&self) -> &HeapConfig {
        &self.config
    }

    fn lock(&self) -> Result<MapGuard<'_, 'm, P>, FatalError> {
        Ok(self.map.lock_irq(&self.platform)?)
    }

    fn coherency(&self) -> Coherency<'_, P> {
        Coherency::new(&self.platform, self.platform.core_id())
    }

    fn cached(&self, addr: usize) -> usize {
        if self.platform.is_uncached(addr) {
            self.platform.uncache_to_cache(addr)
        } else {
            addr
        }
    }

    /// Allocate `bytes` from `zone` for the calling core.
    ///
    /// # Errors
    /// Recoverable [`HeapError::NoMatchingHeap`] / [`HeapError::Exhausted`].
    /// Fatal for buffer zones, unknown cores, capability mismatches on the
    /// per-core zones and an exhausted system heap.
    pub fn allocate(&self, zone: Zone, caps: Caps, bytes: usize) -> Result<NonNull<u8>, HeapError> {
        self.allocate_with(self.platform.core_id(), zone, caps, bytes, false)
    }

    /// Allocate on behalf of `core`; per-core zones use that core's heaps.
    ///
    /// # Errors
    /// As for [`allocate`](Self::allocate).
    pub fn allocate_on(
        &self,
        core: CoreId,
        zone: Zone,
        caps: Caps,
        bytes: usize,
    ) -> Result<NonNull<u8>, HeapError> {
        self.allocate_with(core, zone, caps, bytes, false)
    }

    /// As [`allocate`](Self::allocate), zero-filled.
    ///
    /// # Errors
    /// As for [`allocate`](Self::allocate).
    pub fn allocate_zeroed(
        &self,
        zone: Zone,
        caps: Caps,
        bytes: usize,
    ) -> Result<NonNull<u8>, HeapError> {
        self.allocate_with(self.platform.core_id(), zone, caps, bytes, true)
    }

    /// Zero-filled allocation from the system heap of `core`.
    ///
    /// # Errors
    /// Fatal if `core` has no system heap or it is exhausted.
    pub fn allocate_zeroed_on(&self, core: CoreId, bytes: usize) -> Result<NonNull<u8>, HeapError> {
        self.allocate_with(core, Zone::SYSTEM, Caps::NONE, bytes, true)
    }

    fn allocate_with(
        &self,
        core: CoreId,
        zone: Zone,
        caps: Caps,
        bytes: usize,
        zeroed: bool,
    ) -> Result<NonNull<u8>, HeapError> {
        let mut map = self.lock()?;
        let placement = self.place(&mut map, core, zone, caps, bytes)?;
        Self::prepare(placement, zeroed);
        drop(map);
        Ok(self.export(placement, zone)?)
    }

    /// Allocate a buffer of `bytes` from the first buffer heap matching
    /// `caps` that can hold it, possibly as a span of blocks.
    ///
    /// Only the uncached flag of `zone` is used.
    ///
    /// # Errors
    /// [`HeapError::NoMatchingHeap`] if no buffer heap matches `caps`,
    /// [`HeapError::Exhausted`] naming the first match if none has room.
    pub fn allocate_buffer(
        &self,
        zone: Zone,
        caps: Caps,
        bytes: usize,
    ) -> Result<NonNull<u8>, HeapError> {
        let mut map = self.lock()?;
        let placement = self.place_buffer(&mut map, zone, caps, bytes)?;
        Self::prepare(placement, false);
        drop(map);
        Ok(self.export(placement, zone)?)
    }

    fn place(
        &self,
        map: &mut MemoryMap<'m>,
        core: CoreId,
        zone: Zone,
        caps: Caps,
        bytes: usize,
    ) -> Result<Placement, HeapError> {
        let heap = resolver::resolve(map, zone, caps, core, bytes)?;
        let coherency = self.coherency();

        let placement = if heap.pool == Pool::System {
            let system = map.system_mut(core).ok_or(FatalError::NoSuchCore {
                pool: Pool::System,
                core,
            })?;
            let addr = system.alloc(bytes, self.config.dcache_align).ok_or(
                FatalError::SystemHeapExhausted {
                    core,
                    bytes,
                    free: system.info().free,
                },
            )?;
            coherency.system_changed(core, system);
            Placement {
                heap,
                addr,
                bytes,
                granted: bytes,
            }
        } else {
            let block_heap = map.heap_mut(heap).ok_or(FatalError::NoSuchHeap { heap })?;
            let Some(grant) = block_heap.alloc_single(bytes) else {
                debug::dump_candidates(map, heap.pool, caps, bytes);
                return Err(HeapError::Exhausted { heap, bytes });
            };
            coherency.heap_changed(heap, block_heap, grant.level);
            Placement::from_grant(heap, bytes, grant)
        };

        map.trace_pending = true;
        debug!(target: "mem", "heap: {bytes} bytes at {:#x} from {heap}", placement.addr);
        Ok(placement)
    }

    fn place_buffer(
        &self,
        map: &mut MemoryMap<'m>,
        zone: Zone,
        caps: Caps,
        bytes: usize,
    ) -> Result<Placement, HeapError> {
        let mut first_match = None;
        let mut placed = None;
        for (index, heap) in map.pool_mut(Pool::Buffer).iter_mut().enumerate() {
            if !heap.caps().satisfies(caps) {
                continue;
            }
            let id = HeapId::new(Pool::Buffer, index);
            first_match.get_or_insert(id);
            if let Some(grant) = heap.alloc_buffer(bytes) {
                placed = Some(Placement::from_grant(id, bytes, grant));
                break;
            }
        }

        if let Some(placement) = placed {
            map.trace_pending = true;
            debug!(
                target: "mem",
                "heap: buffer of {bytes} bytes at {:#x} from {}",
                placement.addr,
                placement.heap
            );
            return Ok(placement);
        }

        debug::dump_candidates(map, Pool::Buffer, caps, bytes);
        Err(match first_match {
            Some(heap) => HeapError::Exhausted { heap, bytes },
            None => HeapError::NoMatchingHeap { zone, caps, bytes },
        })
    }

    /// Check and fill a fresh placement through its cached address.
    fn prepare(placement: Placement, zeroed: bool) {
        let check = POISON_ENABLED && placement.is_block();
        if check {
            // SAFETY: the range was just taken from its heap under the lock.
            unsafe { debug::check_reuse(placement.addr, placement.granted) };
        }
        if zeroed || check {
            let ptr = ptr::with_exposed_provenance_mut::<u8>(placement.addr);
            // SAFETY: as above; `bytes <= granted`.
            unsafe { ptr.write_bytes(0, placement.bytes) };
        }
    }

    /// Hand a placement to the caller, as an uncached alias if requested.
    fn export(&self, placement: Placement, zone: Zone) -> Result<NonNull<u8>, FatalError> {
        let addr = if zone.uncached {
            self.platform
                .dcache_writeback_invalidate(placement.addr, placement.bytes);
            self.platform.cache_to_uncache(placement.addr)
        } else {
            placement.addr
        };
        NonNull::new(ptr::with_exposed_provenance_mut(addr)).ok_or(FatalError::UnknownPointer { addr })
    }

    /// The heap `addr` belongs to, searching the caller's own system runtime
    /// heap first.
    fn owner_of(&self, map: &MemoryMap<'m>, addr: usize) -> Result<HeapId, FatalError> {
        let core = self.platform.core_id();
        if map
            .system_runtime()
            .get(core)
            .is_some_and(|heap| heap.contains(addr))
        {
            return Ok(HeapId::new(Pool::SystemRuntime, core));
        }
        match self.owners.lookup(addr) {
            Some(HeapId {
                pool: Pool::System,
                index,
            }) => Err(FatalError::FreeSystemHeap { addr, core: index }),
            Some(heap) => Ok(heap),
            None => Err(FatalError::UnknownPointer { addr }),
        }
    }

    /// Return a block allocation to its heap. Null is ignored; uncached
    /// aliases are accepted.
    ///
    /// # Errors
    /// Fatal for pointers outside every block heap, pointers into a system
    /// heap, and pointers that are not the start of a live allocation.
    pub fn free(&self, ptr: *mut u8) -> Result<(), FatalError> {
        if ptr.is_null() {
            return Ok(());
        }
        let addr = self.cached(ptr.expose_provenance());
        let mut map = self.lock()?;
        self.release(&mut map, addr)
    }

    fn release(&self, map: &mut MemoryMap<'m>, addr: usize) -> Result<(), FatalError> {
        let id = self.owner_of(map, addr)?;
        let heap = map.heap_mut(id).ok_or(FatalError::NoSuchHeap { heap: id })?;
        let freed = heap.free(addr, id)?;
        if POISON_ENABLED {
            // SAFETY: the span is back in the heap and cannot be handed out
            // again while the lock is held.
            unsafe { debug::fill_poison(freed.addr, freed.bytes) };
        }
        self.coherency().heap_changed(id, heap, freed.level);
        map.trace_pending = true;
        debug!(target: "mem", "heap: freed {} bytes at {addr:#x} to {id}", freed.bytes);
        Ok(())
    }

    /// Move an allocation into a new block from `zone`.
    ///
    /// The new block is allocated first, then the smaller of the old
    /// capacity and `bytes` is copied and the old block freed. A null `ptr`
    /// is a plain allocation. A request for zero bytes returns `None` and
    /// leaves `ptr` allocated.
    ///
    /// # Errors
    /// As for [`allocate`](Self::allocate) and [`free`](Self::free). On a
    /// recoverable error `ptr` stays allocated.
    pub fn reallocate(
        &self,
        ptr: *mut u8,
        zone: Zone,
        caps: Caps,
        bytes: usize,
    ) -> Result<Option<NonNull<u8>>, HeapError> {
        let core = self.platform.core_id();
        self.reallocate_with(ptr, zone, bytes, |registry, map| {
            registry.place(map, core, zone, caps, bytes)
        })
    }

    /// [`reallocate`](Self::reallocate) with buffer placement.
    ///
    /// # Errors
    /// As for [`allocate_buffer`](Self::allocate_buffer) and
    /// [`free`](Self::free).
    pub fn reallocate_buffer(
        &self,
        ptr: *mut u8,
        zone: Zone,
        caps: Caps,
        bytes: usize,
    ) -> Result<Option<NonNull<u8>>, HeapError> {
        self.reallocate_with(ptr, zone, bytes, |registry, map| {
            registry.place_buffer(map, zone, caps, bytes)
        })
    }

    fn reallocate_with(
        &self,
        ptr: *mut u8,
        zone: Zone,
        bytes: usize,
        place: impl FnOnce(&Self, &mut MemoryMap<'m>) -> Result<Placement, HeapError>,
    ) -> Result<Option<NonNull<u8>>, HeapError> {
        if bytes == 0 {
            return Ok(None);
        }

        let mut map = self.lock()?;
        let old = if ptr.is_null() {
            None
        } else {
            let alias = ptr.expose_provenance();
            let addr = self.cached(alias);
            let id = self.owner_of(&map, addr)?;
            let heap = map.heap(id).ok_or(FatalError::NoSuchHeap { heap: id })?;
            let len = heap.capacity(addr, id)?.min(bytes);
            if alias != addr {
                // the caller wrote through the uncached alias
                self.platform.dcache_invalidate(addr, len);
            }
            Some((addr, len))
        };

        let placement = place(self, &mut *map)?;
        Self::prepare(placement, false);

        if let Some((addr, len)) = old {
            // SAFETY: both ranges are live allocations owned by this call
            // and hold at least `len` bytes; they cannot overlap.
            unsafe {
                ptr::copy_nonoverlapping(
                    ptr::with_exposed_provenance::<u8>(addr),
                    ptr::with_exposed_provenance_mut::<u8>(placement.addr),
                    len,
                );
            }
            self.release(&mut map, addr)?;
        }
        drop(map);

        Ok(Some(self.export(placement, zone)?))
    }

    /// Drop every system heap allocation of `core`.
    ///
    /// Only a secondary core may do this, and only for itself, typically
    /// while it powers down.
    ///
    /// # Errors
    /// [`FatalError::IllegalHeapReset`] when called from the master core or
    /// for another core.
    pub fn reset_core_system_heap(&self, core: CoreId) -> Result<(), FatalError> {
        let caller = self.platform.core_id();
        if caller == self.config.master_core || core != caller {
            return Err(FatalError::IllegalHeapReset { core, caller });
        }

        let mut map = self.lock()?;
        let heap = map.system_mut(core).ok_or(FatalError::NoSuchCore {
            pool: Pool::System,
            core,
        })?;
        heap.reset();
        self.coherency().write_back(heap);
        info!(target: "mem", "heap: core {core} system heap reset");
        Ok(())
    }

    /// Current counters of `heap`.
    ///
    /// # Errors
    /// [`FatalError::NoSuchHeap`] for an unknown id.
    pub fn heap_info(&self, heap: HeapId) -> Result<HeapInfo, FatalError> {
        let map = self.lock()?;
        let coherency = self.coherency();
        if heap.pool == Pool::System {
            let system = map
                .system()
                .get(heap.index)
                .ok_or(FatalError::NoSuchHeap { heap })?;
            coherency.refresh(heap, system);
            Ok(system.info())
        } else {
            let block_heap = map.heap(heap).ok_or(FatalError::NoSuchHeap { heap })?;
            coherency.refresh(heap, block_heap);
            Ok(block_heap.info())
        }
    }

    /// Counters of the system heap of `core`.
    ///
    /// # Errors
    /// [`FatalError::NoSuchCore`] if `core` has no system heap.
    pub fn system_heap_info(&self, core: CoreId) -> Result<HeapInfo, FatalError> {
        match self.heap_info(HeapId::new(Pool::System, core)) {
            Err(FatalError::NoSuchHeap { .. }) => Err(FatalError::NoSuchCore {
                pool: Pool::System,
                core,
            }),
            other => other,
        }
    }

    /// Log the state of every runtime and buffer heap if anything changed
    /// since the last call, or unconditionally with `force`.
    ///
    /// # Errors
    /// Fatal only on lock re-entry.
    pub fn heap_trace_all(&self, force: bool) -> Result<(), FatalError> {
        let mut map = self.lock()?;
        if cfg!(feature = "trace") && (map.trace_pending || force) {
            debug::trace_all(&map);
        }
        map.trace_pending = false;
        Ok(())
    }

    /// Run `f` on the heaps while holding the lock.
    ///
    /// # Errors
    /// Fatal only on lock re-entry.
    pub fn with_map<R>(&self, f: impl FnOnce(&MemoryMap<'m>) -> R) -> Result<R, FatalError> {
        let map = self.lock()?;
        Ok(f(&map))
    }

    /// # Errors
    /// Fatal only on lock re-entry.
    pub fn pm_context_size(&self, store: &impl PmContextStore) -> Result<usize, FatalError> {
        let map = self.lock()?;
        Ok(store.context_size(&map))
    }

    /// # Errors
    /// Whatever `store` reports; [`PmError::NotSupported`] by default.
    pub fn pm_context_save(&self, store: &mut impl PmContextStore) -> Result<(), PmError> {
        let map = self.lock()?;
        store.save(&map)
    }

    /// # Errors
    /// Whatever `store` reports; [`PmError::NotSupported`] by default.
    pub fn pm_context_restore(&self, store: &mut impl PmContextStore) -> Result<(), PmError> {
        let mut map = self.lock()?;
        store.restore(&mut map)
    }
}
