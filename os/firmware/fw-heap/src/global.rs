//! # Global Allocator Adapter
//!
//! Serves `alloc` collections from the runtime zone of an installed
//! [`Registry`].
//!
//! ## Design outline
//! - **Installation**: the registry is created during boot, after the
//!   allocator static exists, so it is published through an [`AtomicPtr`].
//!   Allocation before [`GlobalHeap::install`] returns null.
//! - **Alignment**: block heaps only guarantee block-size alignment. Requests
//!   are rounded up to `layout.align()`; a block that still does not satisfy
//!   the alignment is returned and the allocation fails.
//! - **Errors**: exhaustion becomes null as `GlobalAlloc` requires, fatal
//!   heap errors abort through [`Platform::panic`].
//!
//! ```ignore
//! #[global_allocator]
//! static GLOBAL: GlobalHeap<Dsp> = GlobalHeap::new(Caps::RAM);
//!
//! // during boot:
//! GLOBAL.install(registry);
//! ```

use crate::{Caps, HeapError, Platform, Registry, Zone};
use core::alloc::{GlobalAlloc, Layout};
use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};

/// `GlobalAlloc` over the runtime zone of a `'static` registry.
pub struct GlobalHeap<P: Platform + 'static> {
    registry: AtomicPtr<Registry<'static, P>>,
    caps: Caps,
}

impl<P: Platform + 'static> GlobalHeap<P> {
    /// An adapter requesting runtime memory with `caps`.
    #[must_use]
    pub const fn new(caps: Caps) -> Self {
        Self {
            registry: AtomicPtr::new(ptr::null_mut()),
            caps,
        }
    }

    /// Start serving allocations from `registry`.
    pub fn install(&self, registry: &'static Registry<'static, P>) {
        self.registry
            .store(ptr::from_ref(registry).cast_mut(), Ordering::Release);
    }

    fn registry(&self) -> Option<&'static Registry<'static, P>> {
        // SAFETY: only ever set from a `&'static Registry`.
        unsafe { self.registry.load(Ordering::Acquire).as_ref() }
    }

    fn allocate(&self, layout: Layout, zeroed: bool) -> *mut u8 {
        let Some(registry) = self.registry() else {
            return ptr::null_mut();
        };
        let bytes = layout.size().max(layout.align());
        let result = if zeroed {
            registry.allocate_zeroed(Zone::RUNTIME, self.caps, bytes)
        } else {
            registry.allocate(Zone::RUNTIME, self.caps, bytes)
        };

        match result {
            Ok(block) if block.as_ptr().addr() % layout.align() == 0 => block.as_ptr(),
            Ok(block) => {
                if let Err(error) = registry.free(block.as_ptr()) {
                    P::panic(error);
                }
                ptr::null_mut()
            }
            Err(HeapError::Fatal(error)) => P::panic(error),
            Err(_) => ptr::null_mut(),
        }
    }
}

unsafe impl<P: Platform + 'static> GlobalAlloc for GlobalHeap<P> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        self.allocate(layout, false)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        let Some(registry) = self.registry() else {
            return;
        };
        if let Err(error) = registry.free(ptr) {
            P::panic(error);
        }
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        self.allocate(layout, true)
    }
}
