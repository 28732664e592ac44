//! Hardware services the allocator depends on.

use crate::FatalError;
use fw_sync::CpuContext;

/// Index of a DSP core.
pub type CoreId = usize;

/// Cache maintenance, address aliasing and the fatal-abort primitive of the
/// target.
///
/// Cache operations take a cached address range. They may round the range
/// out to whole cache lines.
pub trait Platform: CpuContext + Sync {
    /// Index of the executing core.
    #[inline]
    fn core_id(&self) -> CoreId {
        self.cpu_id()
    }

    /// Address the linker placed the first system heap at.
    fn system_heap_start(&self) -> usize;

    /// Write dirty lines back to memory.
    fn dcache_writeback(&self, addr: usize, len: usize);

    /// Drop cached lines so the next read comes from memory.
    fn dcache_invalidate(&self, addr: usize, len: usize);

    fn dcache_writeback_invalidate(&self, addr: usize, len: usize);

    fn cache_to_uncache(&self, addr: usize) -> usize;

    fn uncache_to_cache(&self, addr: usize) -> usize;

    fn is_uncached(&self, addr: usize) -> bool;

    /// Abort the firmware with [`FatalError::REASON_CODE`].
    fn panic(error: FatalError) -> !;
}
