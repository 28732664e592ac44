//! Heap descriptors.

use crate::block_map::BlockMap;
use crate::{Caps, FatalError};
use core::fmt;

/// The four heap pools of a [`MemoryMap`](crate::MemoryMap).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Pool {
    System,
    SystemRuntime,
    Runtime,
    Buffer,
}

impl Pool {
    /// Pools with one heap per core, indexed by core.
    #[must_use]
    pub const fn is_per_core(self) -> bool {
        matches!(self, Self::System | Self::SystemRuntime)
    }
}

impl fmt::Display for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::System => "system",
            Self::SystemRuntime => "system runtime",
            Self::Runtime => "runtime",
            Self::Buffer => "buffer",
        })
    }
}

/// Identifies a heap by pool and position within the pool.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct HeapId {
    pub pool: Pool,
    pub index: usize,
}

impl HeapId {
    #[must_use]
    pub const fn new(pool: Pool, index: usize) -> Self {
        Self { pool, index }
    }
}

impl fmt::Display for HeapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} heap {}", self.pool, self.index)
    }
}

/// Usage counters. `used + free` equals the heap size whenever the registry
/// lock is not held.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct HeapInfo {
    pub used: usize,
    pub free: usize,
}

/// Per-core bump region.
#[derive(Debug)]
pub struct SystemHeap {
    base: usize,
    size: usize,
    caps: Caps,
    info: HeapInfo,
}

impl SystemHeap {
    #[must_use]
    pub const fn new(base: usize, size: usize, caps: Caps) -> Self {
        Self {
            base,
            size,
            caps,
            info: HeapInfo { used: 0, free: size },
        }
    }

    #[must_use]
    pub const fn base(&self) -> usize {
        self.base
    }

    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    #[must_use]
    pub const fn caps(&self) -> Caps {
        self.caps
    }

    #[must_use]
    pub const fn info(&self) -> HeapInfo {
        self.info
    }

    #[must_use]
    pub const fn contains(&self, addr: usize) -> bool {
        addr >= self.base && addr - self.base < self.size
    }

    /// Bump-allocate `bytes` after aligning the used offset up to `align`.
    pub(crate) const fn alloc(&mut self, bytes: usize, align: usize) -> Option<usize> {
        let offset = self.info.used.next_multiple_of(align);
        if offset > self.size || self.size - offset < bytes {
            return None;
        }
        self.info.used = offset + bytes;
        self.info.free = self.size - self.info.used;
        Some(self.base + offset)
    }

    pub(crate) const fn reset(&mut self) {
        self.info = HeapInfo {
            used: 0,
            free: self.size,
        };
    }
}

/// Where a block allocation landed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct Grant {
    pub addr: usize,
    /// Index of the block map that served it.
    pub level: usize,
    /// Bytes taken from the heap.
    pub bytes: usize,
}

/// A block heap: one [`BlockMap`] per block class, laid out back to back from
/// `base` in ascending block size.
#[derive(Debug)]
pub struct Heap<'m> {
    base: usize,
    size: usize,
    caps: Caps,
    info: HeapInfo,
    maps: &'m mut [BlockMap<'m>],
}

impl<'m> Heap<'m> {
    pub fn new(base: usize, caps: Caps, maps: &'m mut [BlockMap<'m>]) -> Self {
        let size = maps.iter().map(BlockMap::span).sum();
        Self {
            base,
            size,
            caps,
            info: HeapInfo { used: 0, free: size },
            maps,
        }
    }

    #[must_use]
    pub const fn base(&self) -> usize {
        self.base
    }

    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    #[must_use]
    pub const fn caps(&self) -> Caps {
        self.caps
    }

    #[must_use]
    pub const fn info(&self) -> HeapInfo {
        self.info
    }

    #[must_use]
    pub fn maps(&self) -> &[BlockMap<'m>] {
        self.maps
    }

    #[must_use]
    pub const fn contains(&self, addr: usize) -> bool {
        addr >= self.base && addr - self.base < self.size
    }

    /// Assign each map its base address, back to back from the heap base,
    /// and mark every block free.
    pub(crate) fn lay_out(&mut self, id: HeapId) -> Result<(), FatalError> {
        let well_formed = self.base != 0
            && !self.maps.is_empty()
            && self.maps.iter().all(|map| map.count() > 0 && map.block_size() > 0)
            && self
                .maps
                .windows(2)
                .all(|pair| pair[0].block_size() < pair[1].block_size());
        if !well_formed {
            return Err(FatalError::InvalidGeometry { heap: id });
        }

        let mut base = self.base;
        for map in self.maps.iter_mut() {
            map.reset(base);
            base += map.span();
        }
        self.info = HeapInfo {
            used: 0,
            free: self.size,
        };
        Ok(())
    }

    pub(crate) fn map(&self, level: usize) -> &BlockMap<'m> {
        &self.maps[level]
    }

    fn charge(&mut self, level: usize, addr: usize, blocks: usize) -> Grant {
        let bytes = blocks * self.maps[level].block_size();
        self.info.used += bytes;
        self.info.free -= bytes;
        Grant { addr, level, bytes }
    }

    /// Single block from the first class large enough for `bytes` that still
    /// has a free block.
    pub(crate) fn alloc_single(&mut self, bytes: usize) -> Option<Grant> {
        let level = self
            .maps
            .iter()
            .position(|map| map.block_size() >= bytes && map.free_count() > 0)?;
        let addr = self.maps[level].alloc_block()?;
        Some(self.charge(level, addr, 1))
    }

    /// Buffer placement: a single block if any class fits, else a span of
    /// blocks from a smaller class, largest class first.
    pub(crate) fn alloc_buffer(&mut self, bytes: usize) -> Option<Grant> {
        if let Some(grant) = self.alloc_single(bytes) {
            return Some(grant);
        }
        if self.size < bytes {
            return None;
        }
        for level in (0..self.maps.len()).rev() {
            if self.maps[level].block_size() >= bytes {
                continue;
            }
            if let Some(addr) = self.maps[level].alloc_span(bytes) {
                let blocks = bytes.div_ceil(self.maps[level].block_size());
                return Some(self.charge(level, addr, blocks));
            }
        }
        None
    }

    fn level_of(&self, addr: usize, id: HeapId) -> Result<usize, FatalError> {
        self.maps
            .iter()
            .position(|map| map.contains(addr))
            .ok_or(FatalError::OutOfRange { addr, heap: id })
    }

    /// Bytes held by the allocation starting at `addr`.
    pub(crate) fn capacity(&self, addr: usize, id: HeapId) -> Result<usize, FatalError> {
        let level = self.level_of(addr, id)?;
        let map = &self.maps[level];
        Ok(map.span_len(addr)? * map.block_size())
    }

    /// Release the allocation starting at `addr`.
    pub(crate) fn free(&mut self, addr: usize, id: HeapId) -> Result<Grant, FatalError> {
        let level = self.level_of(addr, id)?;
        let blocks = self.maps[level].free_span(addr)?;
        let bytes = blocks * self.maps[level].block_size();
        self.info.used -= bytes;
        self.info.free += bytes;
        Ok(Grant { addr, level, bytes })
    }
}
