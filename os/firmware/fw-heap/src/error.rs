use crate::{Caps, CoreId, HeapId, Pool, Zone};
use fw_sync::LockError;

/// Panic reason code of the memory subsystem.
pub const PANIC_MEM: u32 = 0x0dea_d000;

/// Conditions after which the allocator state can no longer be trusted.
///
/// The firmware boundary turns every one of these into a platform panic.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FatalError {
    #[error("invalid zone tag {raw:#x}")]
    InvalidZone { raw: u32 },

    #[error("core {core}: heap caps {available:#x} do not cover requested caps {requested:#x}")]
    CapabilityMismatch {
        core: CoreId,
        requested: Caps,
        available: Caps,
    },

    #[error("core {core}: system heap cannot fit {bytes} bytes ({free} free)")]
    SystemHeapExhausted {
        core: CoreId,
        bytes: usize,
        free: usize,
    },

    #[error("pointer {addr:#x} is not aligned to its {block_size} byte block")]
    Misaligned { addr: usize, block_size: usize },

    #[error("pointer {addr:#x} lies inside {heap} but outside all of its block maps")]
    OutOfRange { addr: usize, heap: HeapId },

    #[error("pointer {addr:#x} does not belong to any heap")]
    UnknownPointer { addr: usize },

    #[error("block at {addr:#x} is not allocated")]
    NotAllocated { addr: usize },

    #[error("block at {addr:#x} continues a span and cannot be freed on its own")]
    NotSpanHead { addr: usize },

    #[error("pointer {addr:#x} lies in the system heap of core {core}")]
    FreeSystemHeap { addr: usize, core: CoreId },

    #[error("system heap starts at {found:#x}, the linker placed it at {expected:#x}")]
    LayoutMismatch { expected: usize, found: usize },

    #[error("{first} overlaps {second}")]
    OverlappingHeaps { first: HeapId, second: HeapId },

    #[error("{system} system heaps but {system_runtime} system runtime heaps")]
    PoolMismatch {
        system: usize,
        system_runtime: usize,
    },

    #[error("more than {limit} heaps")]
    TooManyHeaps { limit: usize },

    #[error("system heap alignment {align} is not a power of two")]
    InvalidAlignment { align: usize },

    #[error("{heap} has an empty block map or starts at address 0")]
    InvalidGeometry { heap: HeapId },

    #[error("core {caller} may not reset the system heap of core {core}")]
    IllegalHeapReset { core: CoreId, caller: CoreId },

    #[error("no {pool} heap for core {core}")]
    NoSuchCore { pool: Pool, core: CoreId },

    #[error("no such heap {heap}")]
    NoSuchHeap { heap: HeapId },

    #[error("core {core} re-entered the heap lock")]
    Reentrant { core: CoreId },
}

impl FatalError {
    /// Reason code reported alongside the panic.
    pub const REASON_CODE: u32 = PANIC_MEM;
}

impl From<LockError> for FatalError {
    fn from(error: LockError) -> Self {
        match error {
            LockError::Reentrant { cpu } => Self::Reentrant { core: cpu },
        }
    }
}

/// Result of an allocation request.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HeapError {
    /// No heap of the requested zone offers the requested capabilities.
    #[error("no {zone} heap with caps {caps:#x} for {bytes} bytes")]
    NoMatchingHeap { zone: Zone, caps: Caps, bytes: usize },

    /// A matching heap was found but has no room left.
    #[error("{heap} cannot fit {bytes} bytes")]
    Exhausted { heap: HeapId, bytes: usize },

    #[error(transparent)]
    Fatal(#[from] FatalError),
}

impl HeapError {
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}
