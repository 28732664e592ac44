//! One block class of a heap.

use crate::FatalError;

/// Header of one block.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Slot {
    #[default]
    Free,
    /// First block of an allocation spanning `len` blocks.
    Head { len: usize },
    /// Any further block of a span.
    Tail,
}

/// `count` equally sized blocks starting at `base`, tracked by one [`Slot`]
/// each.
///
/// `first_free` is a search hint. It never points past the lowest free slot
/// but may point at a used one.
#[derive(Debug)]
pub struct BlockMap<'m> {
    base: usize,
    block_size: usize,
    free_count: usize,
    first_free: usize,
    slots: &'m mut [Slot],
}

impl<'m> BlockMap<'m> {
    /// A map over `slots.len()` blocks of `block_size` bytes, all free.
    ///
    /// The base address is assigned when the owning heap is laid out.
    pub fn new(block_size: usize, slots: &'m mut [Slot]) -> Self {
        slots.fill(Slot::Free);
        Self {
            base: 0,
            block_size,
            free_count: slots.len(),
            first_free: 0,
            slots,
        }
    }

    #[must_use]
    pub const fn base(&self) -> usize {
        self.base
    }

    #[must_use]
    pub const fn block_size(&self) -> usize {
        self.block_size
    }

    #[must_use]
    pub const fn count(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub const fn free_count(&self) -> usize {
        self.free_count
    }

    #[must_use]
    pub const fn first_free(&self) -> usize {
        self.first_free
    }

    /// Bytes covered by the map.
    #[must_use]
    pub const fn span(&self) -> usize {
        self.block_size * self.slots.len()
    }

    #[must_use]
    pub const fn contains(&self, addr: usize) -> bool {
        addr >= self.base && addr - self.base < self.span()
    }

    #[must_use]
    pub fn slots(&self) -> &[Slot] {
        self.slots
    }

    /// Place the map at `base` with every block free.
    pub(crate) fn reset(&mut self, base: usize) {
        self.base = base;
        self.slots.fill(Slot::Free);
        self.free_count = self.slots.len();
        self.first_free = 0;
    }

    /// Address and length of the slot header array.
    pub(crate) fn slots_region(&self) -> (usize, usize) {
        (
            self.slots.as_ptr().addr(),
            core::mem::size_of_val::<[Slot]>(self.slots),
        )
    }

    const fn block_addr(&self, index: usize) -> usize {
        self.base + index * self.block_size
    }

    fn next_free_from(&self, start: usize) -> Option<usize> {
        self.slots
            .get(start..)?
            .iter()
            .position(|slot| *slot == Slot::Free)
            .map(|offset| start + offset)
    }

    /// Take one block.
    pub(crate) fn alloc_block(&mut self) -> Option<usize> {
        if self.free_count == 0 {
            return None;
        }
        let index = self.next_free_from(self.first_free)?;
        self.slots[index] = Slot::Head { len: 1 };
        self.free_count -= 1;

        // Left on the used slot when nothing behind it is free.
        if let Some(next) = self.next_free_from(index + 1) {
            self.first_free = next;
        }
        Some(self.block_addr(index))
    }

    /// Take `ceil(bytes / block_size)` adjacent blocks, first fit from the
    /// hint.
    pub(crate) fn alloc_span(&mut self, bytes: usize) -> Option<usize> {
        let len = bytes.div_ceil(self.block_size);
        if len == 0 || len > self.free_count {
            return None;
        }
        let start = self.find_run(len)?;

        self.slots[start] = Slot::Head { len };
        self.slots[start + 1..start + len].fill(Slot::Tail);
        self.free_count -= len;

        if start == self.first_free
            && let Some(next) = self.next_free_from(start + len)
        {
            self.first_free = next;
        }
        Some(self.block_addr(start))
    }

    fn find_run(&self, len: usize) -> Option<usize> {
        let mut run = 0;
        for index in self.first_free..self.slots.len() {
            if self.slots[index] == Slot::Free {
                run += 1;
                if run == len {
                    return Some(index + 1 - len);
                }
            } else {
                run = 0;
            }
        }
        None
    }

    /// Index of the block `addr` points at. `addr` must lie inside the map.
    fn index_of(&self, addr: usize) -> Result<usize, FatalError> {
        let offset = addr - self.base;
        if offset % self.block_size != 0 {
            return Err(FatalError::Misaligned {
                addr,
                block_size: self.block_size,
            });
        }
        Ok(offset / self.block_size)
    }

    /// Blocks held by the allocation starting at `addr`.
    pub(crate) fn span_len(&self, addr: usize) -> Result<usize, FatalError> {
        match self.slots[self.index_of(addr)?] {
            Slot::Head { len } => Ok(len),
            Slot::Free => Err(FatalError::NotAllocated { addr }),
            Slot::Tail => Err(FatalError::NotSpanHead { addr }),
        }
    }

    /// Release the allocation starting at `addr`; returns its length in
    /// blocks.
    pub(crate) fn free_span(&mut self, addr: usize) -> Result<usize, FatalError> {
        let len = self.span_len(addr)?;
        let index = (addr - self.base) / self.block_size;

        self.slots[index..index + len].fill(Slot::Free);
        self.free_count += len;
        if index < self.first_free {
            self.first_free = index;
        }
        Ok(len)
    }
}
