use crate::{CoreId, Heap, HeapId, Pool, SystemHeap};

/// Every heap of the board, grouped by pool.
///
/// `system` and `system_runtime` hold one heap per core, indexed by core.
/// The descriptors usually live in `static` arrays sized from the board's
/// geometry tables.
#[derive(Debug)]
pub struct MemoryMap<'m> {
    system: &'m mut [SystemHeap],
    system_runtime: &'m mut [Heap<'m>],
    runtime: &'m mut [Heap<'m>],
    buffer: &'m mut [Heap<'m>],
    /// Set by every allocation and free, cleared by a heap trace.
    pub(crate) trace_pending: bool,
}

impl<'m> MemoryMap<'m> {
    pub fn new(
        system: &'m mut [SystemHeap],
        system_runtime: &'m mut [Heap<'m>],
        runtime: &'m mut [Heap<'m>],
        buffer: &'m mut [Heap<'m>],
    ) -> Self {
        Self {
            system,
            system_runtime,
            runtime,
            buffer,
            trace_pending: false,
        }
    }

    #[must_use]
    pub fn system(&self) -> &[SystemHeap] {
        self.system
    }

    #[must_use]
    pub fn system_runtime(&self) -> &[Heap<'m>] {
        self.system_runtime
    }

    #[must_use]
    pub fn runtime(&self) -> &[Heap<'m>] {
        self.runtime
    }

    #[must_use]
    pub fn buffer(&self) -> &[Heap<'m>] {
        self.buffer
    }

    /// Number of cores with a system heap.
    #[must_use]
    pub const fn cores(&self) -> usize {
        self.system.len()
    }

    /// Block heaps of `pool`; empty for [`Pool::System`].
    #[must_use]
    pub fn pool(&self, pool: Pool) -> &[Heap<'m>] {
        match pool {
            Pool::System => &[],
            Pool::SystemRuntime => self.system_runtime,
            Pool::Runtime => self.runtime,
            Pool::Buffer => self.buffer,
        }
    }

    pub(crate) fn pool_mut(&mut self, pool: Pool) -> &mut [Heap<'m>] {
        match pool {
            Pool::System => &mut [],
            Pool::SystemRuntime => self.system_runtime,
            Pool::Runtime => self.runtime,
            Pool::Buffer => self.buffer,
        }
    }

    /// The block heap `id`, if it exists.
    #[must_use]
    pub fn heap(&self, id: HeapId) -> Option<&Heap<'m>> {
        self.pool(id.pool).get(id.index)
    }

    pub(crate) fn heap_mut(&mut self, id: HeapId) -> Option<&mut Heap<'m>> {
        self.pool_mut(id.pool).get_mut(id.index)
    }

    pub(crate) fn system_mut(&mut self, core: CoreId) -> Option<&mut SystemHeap> {
        self.system.get_mut(core)
    }

    /// Block heaps of every pool, with their ids.
    pub fn block_heaps(&self) -> impl Iterator<Item = (HeapId, &Heap<'m>)> {
        [Pool::SystemRuntime, Pool::Runtime, Pool::Buffer]
            .into_iter()
            .flat_map(move |pool| {
                self.pool(pool)
                    .iter()
                    .enumerate()
                    .map(move |(index, heap)| (HeapId::new(pool, index), heap))
            })
    }
}
