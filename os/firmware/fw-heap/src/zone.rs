//! Allocation zones and their raw IPC encoding.

use crate::FatalError;
use bitfield_struct::bitfield;
use core::fmt;

/// Which pool family a request is served from.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ZoneKind {
    /// Per-core bump region; never freed individually.
    System,
    /// Per-core block heap.
    SystemRuntime,
    /// Shared block heaps, falling back to the buffer heaps.
    Runtime,
    /// Shared buffer heaps.
    Buffer,
}

/// A zone: pool family plus the "return an uncached alias" flag.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Zone {
    pub kind: ZoneKind,
    pub uncached: bool,
}

impl Zone {
    pub const SYSTEM: Self = Self::new(ZoneKind::System);
    pub const SYSTEM_RUNTIME: Self = Self::new(ZoneKind::SystemRuntime);
    pub const RUNTIME: Self = Self::new(ZoneKind::Runtime);
    pub const BUFFER: Self = Self::new(ZoneKind::Buffer);

    #[must_use]
    pub const fn new(kind: ZoneKind) -> Self {
        Self {
            kind,
            uncached: false,
        }
    }

    /// Same zone, returning uncached aliases.
    #[must_use]
    pub const fn uncached(self) -> Self {
        Self {
            kind: self.kind,
            uncached: true,
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.kind {
            ZoneKind::System => "sys",
            ZoneKind::SystemRuntime => "sys-runtime",
            ZoneKind::Runtime => "runtime",
            ZoneKind::Buffer => "buffer",
        };
        if self.uncached {
            write!(f, "{name} (uncached)")
        } else {
            f.write_str(name)
        }
    }
}

/// Zone tag as carried over IPC and in the C ABI.
///
/// The low nibble selects exactly one zone, bit 4 requests an uncached alias.
/// Bits above are ignored.
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct RawZone {
    /// Bits 0–3: one of the `RawZone::*` kind values.
    #[bits(4)]
    pub kind: u8,
    /// Bit 4: hand out the uncached alias.
    pub uncached: bool,
    #[bits(27)]
    _reserved: u32,
}

impl RawZone {
    pub const SYS: u8 = 1 << 0;
    pub const RUNTIME: u8 = 1 << 1;
    pub const BUFFER: u8 = 1 << 2;
    pub const SYS_RUNTIME: u8 = 1 << 3;
}

impl TryFrom<u32> for Zone {
    type Error = FatalError;

    fn try_from(raw: u32) -> Result<Self, Self::Error> {
        let tag = RawZone::from_bits(raw);
        let kind = match tag.kind() {
            RawZone::SYS => ZoneKind::System,
            RawZone::RUNTIME => ZoneKind::Runtime,
            RawZone::BUFFER => ZoneKind::Buffer,
            RawZone::SYS_RUNTIME => ZoneKind::SystemRuntime,
            _ => return Err(FatalError::InvalidZone { raw }),
        };
        Ok(Self {
            kind,
            uncached: tag.uncached(),
        })
    }
}

impl From<Zone> for u32 {
    fn from(zone: Zone) -> Self {
        let kind = match zone.kind {
            ZoneKind::System => RawZone::SYS,
            ZoneKind::SystemRuntime => RawZone::SYS_RUNTIME,
            ZoneKind::Runtime => RawZone::RUNTIME,
            ZoneKind::Buffer => RawZone::BUFFER,
        };
        RawZone::new()
            .with_kind(kind)
            .with_uncached(zone.uncached)
            .into_bits()
    }
}
