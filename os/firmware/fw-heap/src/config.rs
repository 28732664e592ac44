use crate::CoreId;

/// Runtime parameters of the allocator.
///
/// ```
/// use fw_heap::HeapConfig;
///
/// let config = HeapConfig::new().with_dcache_align(128);
/// assert_eq!(config.master_core, 0);
/// assert_eq!(config.dcache_align, 128);
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct HeapConfig {
    /// The core that boots the firmware. Its system heap is never reset.
    pub master_core: CoreId,
    /// Alignment of system heap allocations; a power of two.
    pub dcache_align: usize,
}

impl HeapConfig {
    pub const DEFAULT_DCACHE_ALIGN: usize = 64;

    #[must_use]
    pub const fn new() -> Self {
        Self {
            master_core: 0,
            dcache_align: Self::DEFAULT_DCACHE_ALIGN,
        }
    }

    #[must_use]
    pub const fn with_master_core(mut self, core: CoreId) -> Self {
        self.master_core = core;
        self
    }

    #[must_use]
    pub const fn with_dcache_align(mut self, align: usize) -> Self {
        self.dcache_align = align;
        self
    }
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self::new()
    }
}
