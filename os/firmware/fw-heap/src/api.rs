//! Raw entry points for firmware callers.
//!
//! Zones and capabilities arrive as the raw tags used over IPC. Recoverable
//! failures are logged and reported as null; fatal ones abort the firmware
//! through [`Platform::panic`].

use crate::pm::{PmContextStore, PmError};
use crate::{
    Caps, CoreId, FatalError, HeapConfig, HeapError, MemoryMap, Platform, Registry, Zone,
};
use core::ptr::{self, NonNull};
use log::error;

fn fatal<P: Platform>(error: FatalError) -> ! {
    error!(target: "mem", "heap: {error}");
    P::panic(error)
}

/// Raw-tag facade over a [`Registry`].
pub struct HeapApi<'r, 'm, P: Platform> {
    registry: &'r Registry<'m, P>,
}

impl<'r, 'm, P: Platform> HeapApi<'r, 'm, P> {
    #[must_use]
    pub const fn new(registry: &'r Registry<'m, P>) -> Self {
        Self { registry }
    }

    /// Bring the heaps up, aborting on a broken layout.
    pub fn init_heap(platform: P, config: HeapConfig, map: MemoryMap<'m>) -> Registry<'m, P> {
        Registry::init(platform, config, map).unwrap_or_else(|error| fatal::<P>(error))
    }

    #[must_use]
    pub const fn registry(&self) -> &'r Registry<'m, P> {
        self.registry
    }

    fn zone(raw: u32) -> Zone {
        Zone::try_from(raw).unwrap_or_else(|error| fatal::<P>(error))
    }

    fn settle(result: Result<NonNull<u8>, HeapError>) -> *mut u8 {
        match result {
            Ok(block) => block.as_ptr(),
            Err(HeapError::Fatal(error)) => fatal::<P>(error),
            Err(error) => {
                error!(target: "mem", "heap: {error}");
                ptr::null_mut()
            }
        }
    }

    fn settle_moved(result: Result<Option<NonNull<u8>>, HeapError>) -> *mut u8 {
        match result {
            Ok(moved) => moved.map_or(ptr::null_mut(), NonNull::as_ptr),
            Err(error) => Self::settle(Err(error)),
        }
    }

    fn check<T>(result: Result<T, FatalError>) -> T {
        result.unwrap_or_else(|error| fatal::<P>(error))
    }

    #[must_use]
    pub fn allocate(&self, zone: u32, caps: u32, bytes: usize) -> *mut u8 {
        let zone = Self::zone(zone);
        Self::settle(self.registry.allocate(zone, Caps::from_bits(caps), bytes))
    }

    #[must_use]
    pub fn allocate_zeroed(&self, zone: u32, caps: u32, bytes: usize) -> *mut u8 {
        let zone = Self::zone(zone);
        Self::settle(
            self.registry
                .allocate_zeroed(zone, Caps::from_bits(caps), bytes),
        )
    }

    #[must_use]
    pub fn allocate_zeroed_on(&self, core: CoreId, bytes: usize) -> *mut u8 {
        Self::settle(self.registry.allocate_zeroed_on(core, bytes))
    }

    #[must_use]
    pub fn allocate_buffer(&self, zone: u32, caps: u32, bytes: usize) -> *mut u8 {
        let zone = Self::zone(zone);
        Self::settle(
            self.registry
                .allocate_buffer(zone, Caps::from_bits(caps), bytes),
        )
    }

    pub fn free(&self, ptr: *mut u8) {
        Self::check(self.registry.free(ptr));
    }

    /// Null when `bytes` is zero; the old allocation is kept in that case.
    #[must_use]
    pub fn reallocate(&self, ptr: *mut u8, zone: u32, caps: u32, bytes: usize) -> *mut u8 {
        let zone = Self::zone(zone);
        Self::settle_moved(
            self.registry
                .reallocate(ptr, zone, Caps::from_bits(caps), bytes),
        )
    }

    #[must_use]
    pub fn reallocate_buffer(&self, ptr: *mut u8, zone: u32, caps: u32, bytes: usize) -> *mut u8 {
        let zone = Self::zone(zone);
        Self::settle_moved(
            self.registry
                .reallocate_buffer(ptr, zone, Caps::from_bits(caps), bytes),
        )
    }

    /// Reset the calling core's system heap. Only the plain system zone tag
    /// is accepted, and never from the master core.
    pub fn free_heap(&self, zone: u32) {
        let core = self.registry.platform().core_id();
        if zone != u32::from(Zone::SYSTEM) {
            fatal::<P>(FatalError::InvalidZone { raw: zone });
        }
        Self::check(self.registry.reset_core_system_heap(core));
    }

    pub fn heap_trace_all(&self, force: bool) {
        Self::check(self.registry.heap_trace_all(force));
    }

    #[must_use]
    pub fn pm_context_size(&self, store: &impl PmContextStore) -> usize {
        Self::check(self.registry.pm_context_size(store))
    }

    /// # Errors
    /// [`PmError::NotSupported`] unless `store` implements saving.
    pub fn pm_context_save(&self, store: &mut impl PmContextStore) -> Result<(), PmError> {
        match self.registry.pm_context_save(store) {
            Err(PmError::Fatal(error)) => fatal::<P>(error),
            other => other,
        }
    }

    /// # Errors
    /// [`PmError::NotSupported`] unless `store` implements restoring.
    pub fn pm_context_restore(&self, store: &mut impl PmContextStore) -> Result<(), PmError> {
        match self.registry.pm_context_restore(store) {
            Err(PmError::Fatal(error)) => fatal::<P>(error),
            other => other,
        }
    }
}
