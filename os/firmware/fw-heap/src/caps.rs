//! Memory capability masks.

use bitfield_struct::bitfield;
use core::fmt;

/// Electrical/bus properties of a heap, or the properties a caller requires.
///
/// A request matches a heap when the heap's mask is a superset of the
/// request's mask; see [`Caps::satisfies`].
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct Caps {
    /// Bit 0: read/write RAM.
    pub ram: bool,
    /// Bit 1: read-only memory.
    pub rom: bool,
    /// Bit 2: external (off-die) memory.
    pub ext: bool,
    /// Bit 3: low-power memory bank.
    pub lp: bool,
    /// Bit 4: high-performance memory bank.
    pub hp: bool,
    /// Bit 5: reachable by the DMA engines.
    pub dma: bool,
    /// Bit 6: accessed through the data cache.
    pub cache: bool,
    /// Bit 7: executable.
    pub exec: bool,
    /// Bits 8–31: platform specific.
    #[bits(24)]
    pub platform: u32,
}

impl Caps {
    pub const NONE: Self = Self::new();
    pub const RAM: Self = Self::new().with_ram(true);
    pub const DMA: Self = Self::new().with_dma(true);
    pub const CACHE: Self = Self::new().with_cache(true);
    pub const HP: Self = Self::new().with_hp(true);
    pub const LP: Self = Self::new().with_lp(true);

    /// Whether a heap with these capabilities can serve `request`.
    #[inline]
    #[must_use]
    pub const fn satisfies(self, request: Self) -> bool {
        self.into_bits() & request.into_bits() == request.into_bits()
    }

    /// Bitwise union of two masks.
    #[inline]
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self::from_bits(self.into_bits() | other.into_bits())
    }
}

impl fmt::LowerHex for Caps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.into_bits(), f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn superset_matches() {
        let heap = Caps::RAM.union(Caps::DMA).union(Caps::CACHE);
        assert!(heap.satisfies(Caps::RAM));
        assert!(heap.satisfies(Caps::RAM.union(Caps::DMA)));
        assert!(heap.satisfies(Caps::NONE));
        assert!(!heap.satisfies(Caps::RAM.union(Caps::HP)));
        assert!(!Caps::NONE.satisfies(Caps::RAM));
    }

    #[test]
    fn raw_bits_follow_the_ipc_encoding() {
        assert_eq!(Caps::RAM.into_bits(), 1 << 0);
        assert_eq!(Caps::LP.into_bits(), 1 << 3);
        assert_eq!(Caps::HP.into_bits(), 1 << 4);
        assert_eq!(Caps::DMA.into_bits(), 1 << 5);
        assert_eq!(Caps::CACHE.into_bits(), 1 << 6);
        assert_eq!(Caps::from_bits(0x61), Caps::RAM.union(Caps::DMA).union(Caps::CACHE));
        assert_eq!(format!("{:#x}", Caps::from_bits(0x61)), "0x61");
    }
}
