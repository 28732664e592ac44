//! # Firmware Heap Manager
//!
//! Statically sized, capability-tagged heaps for a multi-core audio DSP.
//! All heaps are carved from on-chip memory at link time; nothing grows,
//! pages or compacts.
//!
//! ## Pools
//!
//! | pool | per core | allocation | freed |
//! |---|---|---|---|
//! | system | yes | bump, aligned to the data cache line | only in bulk, by a secondary core for itself |
//! | system runtime | yes | one block | block by block |
//! | runtime | no | one block, falls back to the buffer pool | block by block |
//! | buffer | no | one block or a span of smaller blocks | block by block |
//!
//! A block heap consists of [`BlockMap`]s, one per block size, laid out back
//! to back in ascending block size. Each block has a [`Slot`] header; a
//! span records its length on its first slot only.
//!
//! ## Concurrency and coherency
//!
//! The [`Registry`] keeps the whole [`MemoryMap`] behind one interrupt-masking
//! spinlock. Heap metadata is cached; when a core changes a per-core heap of
//! another core it writes the touched descriptors back before releasing the
//! lock. Addresses stored in the metadata are always cached addresses;
//! uncached aliases exist only at the API boundary.
//!
//! ## Errors
//!
//! Allocation failures that leave the allocator consistent are
//! [`HeapError`]s; everything else is a [`FatalError`] which the firmware
//! boundary ([`HeapApi`]) turns into a platform panic with
//! [`FatalError::REASON_CODE`].
//!
//! ## Features
//!
//! * `trace` (default): [`Registry::heap_trace_all`] logs heap state.
//! * `debug-heap`: failed allocations log every heap that could have served
//!   them.
//! * `debug-block-free`: freed blocks are overwritten with [`POISON`] and
//!   checked when handed out again.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod api;
mod block_map;
mod caps;
mod coherency;
mod config;
mod debug;
mod error;
mod global;
mod heap;
pub mod layout;
mod memory_map;
mod owner;
pub mod pm;
mod platform;
mod registry;
mod resolver;
mod zone;

pub use api::HeapApi;
pub use block_map::{BlockMap, Slot};
pub use caps::Caps;
pub use config::HeapConfig;
pub use debug::POISON;
pub use error::{FatalError, HeapError, PANIC_MEM};
pub use global::GlobalHeap;
pub use heap::{Heap, HeapId, HeapInfo, Pool, SystemHeap};
pub use memory_map::MemoryMap;
pub use owner::MAX_HEAPS;
pub use platform::{CoreId, Platform};
pub use registry::Registry;
pub use zone::{RawZone, Zone, ZoneKind};
