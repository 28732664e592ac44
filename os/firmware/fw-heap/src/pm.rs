//! Heap context save/restore for power management.
//!
//! The default store refuses every request. A target that powers down heap
//! memory supplies its own [`PmContextStore`].

use crate::{FatalError, MemoryMap};

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PmError {
    #[error("heap context save/restore is not supported on this target")]
    NotSupported,
    #[error(transparent)]
    Fatal(#[from] FatalError),
}

/// Persists heap contents across a power transition.
pub trait PmContextStore {
    /// Bytes needed to hold the context of `map`.
    fn context_size(&self, _map: &MemoryMap<'_>) -> usize {
        0
    }

    /// # Errors
    /// [`PmError::NotSupported`] unless the target overrides it.
    fn save(&mut self, _map: &MemoryMap<'_>) -> Result<(), PmError> {
        Err(PmError::NotSupported)
    }

    /// # Errors
    /// [`PmError::NotSupported`] unless the target overrides it.
    fn restore(&mut self, _map: &mut MemoryMap<'_>) -> Result<(), PmError> {
        Err(PmError::NotSupported)
    }
}

/// Store for targets without heap context support.
#[derive(Debug, Default, Copy, Clone)]
pub struct NoPmContext;

impl PmContextStore for NoPmContext {}
