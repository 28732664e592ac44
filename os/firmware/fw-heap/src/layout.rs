//! Static description of a board's heaps.
//!
//! Platforms declare their heaps as `const` geometry tables; the descriptor
//! arrays that make up a [`MemoryMap`](crate::MemoryMap) are sized from them.

use crate::Caps;

/// One block class: `count` blocks of `block_size` bytes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MapGeometry {
    pub block_size: usize,
    pub count: usize,
}

impl MapGeometry {
    #[must_use]
    pub const fn new(block_size: usize, count: usize) -> Self {
        Self { block_size, count }
    }

    /// Bytes covered by the class.
    #[must_use]
    pub const fn span(&self) -> usize {
        self.block_size * self.count
    }
}

/// A block heap: capabilities plus its classes, ascending by block size.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct HeapGeometry {
    pub caps: Caps,
    pub maps: &'static [MapGeometry],
}

impl HeapGeometry {
    #[must_use]
    pub const fn new(caps: Caps, maps: &'static [MapGeometry]) -> Self {
        Self { caps, maps }
    }

    /// Bytes covered by all classes.
    #[must_use]
    pub const fn span(&self) -> usize {
        let mut total = 0;
        let mut i = 0;
        while i < self.maps.len() {
            total += self.maps[i].span();
            i += 1;
        }
        total
    }

    /// Number of slot headers needed by all classes.
    #[must_use]
    pub const fn slots(&self) -> usize {
        let mut total = 0;
        let mut i = 0;
        while i < self.maps.len() {
            total += self.maps[i].count;
            i += 1;
        }
        total
    }

    /// Whether the classes are non-empty and strictly ascending by block size.
    #[must_use]
    pub const fn is_well_formed(&self) -> bool {
        if self.maps.is_empty() {
            return false;
        }
        let mut i = 0;
        while i < self.maps.len() {
            let map = self.maps[i];
            if map.block_size == 0 || map.count == 0 {
                return false;
            }
            if i > 0 && self.maps[i - 1].block_size >= map.block_size {
                return false;
            }
            i += 1;
        }
        true
    }
}

/// A bump region.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SystemGeometry {
    pub caps: Caps,
    pub size: usize,
}

impl SystemGeometry {
    #[must_use]
    pub const fn new(caps: Caps, size: usize) -> Self {
        Self { caps, size }
    }
}

/// Every heap of a board, in the order they are placed in memory: system
/// heaps, system runtime heaps, runtime heaps, buffer heaps.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BoardLayout {
    /// One per core.
    pub system: &'static [SystemGeometry],
    /// One per core.
    pub system_runtime: &'static [HeapGeometry],
    pub runtime: &'static [HeapGeometry],
    pub buffer: &'static [HeapGeometry],
}

impl BoardLayout {
    #[must_use]
    pub const fn cores(&self) -> usize {
        self.system.len()
    }

    /// Bytes of heap memory the board needs.
    #[must_use]
    pub const fn span(&self) -> usize {
        let mut total = 0;
        let mut i = 0;
        while i < self.system.len() {
            total += self.system[i].size;
            i += 1;
        }
        total
            + heaps_span(self.system_runtime)
            + heaps_span(self.runtime)
            + heaps_span(self.buffer)
    }

    /// Whether both per-core pools cover the same cores and every block heap
    /// is well formed.
    #[must_use]
    pub const fn is_well_formed(&self) -> bool {
        self.system.len() == self.system_runtime.len()
            && heaps_well_formed(self.system_runtime)
            && heaps_well_formed(self.runtime)
            && heaps_well_formed(self.buffer)
    }
}

const fn heaps_span(heaps: &[HeapGeometry]) -> usize {
    let mut total = 0;
    let mut i = 0;
    while i < heaps.len() {
        total += heaps[i].span();
        i += 1;
    }
    total
}

const fn heaps_well_formed(heaps: &[HeapGeometry]) -> bool {
    let mut i = 0;
    while i < heaps.len() {
        if !heaps[i].is_well_formed() {
            return false;
        }
        i += 1;
    }
    true
}
