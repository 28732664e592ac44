//! # Firmware synchronization primitives
//!
//! The heap registry is guarded by exactly one lock that every core and every
//! interrupt level touching the allocator spins on. This crate provides that
//! lock ([`SpinLock`]) together with the per-core interrupt masking it needs
//! ([`IrqGuard`]), abstracted over a [`CpuContext`] so the same code runs on
//! the DSP and in host tests.
//!
//! ## Operating constraints
//!
//! * The lock is a plain test-and-test-and-set spinlock. There is no queueing
//!   and no priority inheritance: a low-priority holder can delay a
//!   high-priority waiter on another core for an unbounded time.
//! * Acquisition through [`SpinLock::lock_irq`] masks interrupts on the
//!   acquiring core *before* spinning and restores them only *after* the lock
//!   has been released.
//! * Nested acquisition from the core already holding the lock is reported as
//!   [`LockError::Reentrant`] instead of deadlocking.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod irq;
mod spin_lock;

pub use irq::{CpuContext, IrqGuard};
pub use spin_lock::{IrqSpinLockGuard, SpinLock, SpinLockGuard};

/// Errors reported when acquiring a [`SpinLock`] on behalf of a CPU.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LockError {
    /// The calling CPU already holds the lock.
    #[error("lock is already held by cpu {cpu}")]
    Reentrant { cpu: usize },
}
