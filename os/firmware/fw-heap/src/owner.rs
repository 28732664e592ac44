//! Address-to-heap lookup.

use crate::{FatalError, HeapId, MemoryMap, Pool};

/// Heaps the index can hold.
pub const MAX_HEAPS: usize = 32;

#[derive(Debug, Copy, Clone)]
struct Interval {
    start: usize,
    end: usize,
    heap: HeapId,
}

const EMPTY: Interval = Interval {
    start: 0,
    end: 0,
    heap: HeapId::new(Pool::System, 0),
};

/// Every heap's address range, sorted by start address.
///
/// Built once at init; heaps never move afterwards.
#[derive(Debug)]
pub(crate) struct OwnerIndex {
    entries: [Interval; MAX_HEAPS],
    len: usize,
}

impl OwnerIndex {
    /// Index all heaps of `map`.
    ///
    /// # Errors
    /// [`FatalError::TooManyHeaps`] past [`MAX_HEAPS`] non-empty heaps,
    /// [`FatalError::OverlappingHeaps`] if two ranges intersect.
    pub(crate) fn build(map: &MemoryMap<'_>) -> Result<Self, FatalError> {
        let mut index = Self {
            entries: [EMPTY; MAX_HEAPS],
            len: 0,
        };

        for (core, heap) in map.system().iter().enumerate() {
            index.push(heap.base(), heap.size(), HeapId::new(Pool::System, core))?;
        }
        for (id, heap) in map.block_heaps() {
            index.push(heap.base(), heap.size(), id)?;
        }

        let entries = &mut index.entries[..index.len];
        entries.sort_unstable_by_key(|entry| entry.start);
        if let Some(pair) = entries.windows(2).find(|pair| pair[0].end > pair[1].start) {
            return Err(FatalError::OverlappingHeaps {
                first: pair[0].heap,
                second: pair[1].heap,
            });
        }
        Ok(index)
    }

    fn push(&mut self, base: usize, size: usize, heap: HeapId) -> Result<(), FatalError> {
        if size == 0 {
            return Ok(());
        }
        let slot = self
            .entries
            .get_mut(self.len)
            .ok_or(FatalError::TooManyHeaps { limit: MAX_HEAPS })?;
        *slot = Interval {
            start: base,
            end: base + size,
            heap,
        };
        self.len += 1;
        Ok(())
    }

    /// The heap whose range contains `addr`.
    pub(crate) fn lookup(&self, addr: usize) -> Option<HeapId> {
        let entries = &self.entries[..self.len];
        let after = entries.partition_point(|entry| entry.start <= addr);
        let candidate = entries.get(after.checked_sub(1)?)?;
        (addr < candidate.end).then_some(candidate.heap)
    }
}
