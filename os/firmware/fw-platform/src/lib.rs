//! # Reference Board Platform
//!
//! Memory layout of the reference board and, with the `std` feature, a host
//! simulation of the platform services the heap manager depends on.

#![cfg_attr(not(any(test, doctest, feature = "std")), no_std)]

pub mod memory;

#[cfg(feature = "std")]
pub mod sim;
