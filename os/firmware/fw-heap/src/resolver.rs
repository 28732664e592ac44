//! Zone and capability based heap selection.

use crate::{Caps, CoreId, FatalError, HeapError, HeapId, MemoryMap, Pool, Zone, ZoneKind};

/// Pick the heap that serves a single-slot request.
///
/// System and system runtime requests go to the requesting core's heap and
/// must match its capabilities. Runtime requests take the first runtime heap
/// that matches, else the first matching buffer heap.
///
/// # Errors
/// Fatal for buffer zones, unknown cores and capability mismatches on the
/// per-core pools; [`HeapError::NoMatchingHeap`] when no shared heap matches.
pub(crate) fn resolve(
    map: &MemoryMap<'_>,
    zone: Zone,
    caps: Caps,
    core: CoreId,
    bytes: usize,
) -> Result<HeapId, HeapError> {
    match zone.kind {
        ZoneKind::System => {
            let heap = map.system().get(core).ok_or(FatalError::NoSuchCore {
                pool: Pool::System,
                core,
            })?;
            check_caps(core, heap.caps(), caps)?;
            Ok(HeapId::new(Pool::System, core))
        }
        ZoneKind::SystemRuntime => {
            let heap = map
                .system_runtime()
                .get(core)
                .ok_or(FatalError::NoSuchCore {
                    pool: Pool::SystemRuntime,
                    core,
                })?;
            check_caps(core, heap.caps(), caps)?;
            Ok(HeapId::new(Pool::SystemRuntime, core))
        }
        ZoneKind::Runtime => first_match(map, Pool::Runtime, caps)
            .or_else(|| first_match(map, Pool::Buffer, caps))
            .ok_or(HeapError::NoMatchingHeap { zone, caps, bytes }),
        ZoneKind::Buffer => Err(FatalError::InvalidZone {
            raw: u32::from(zone),
        }
        .into()),
    }
}

const fn check_caps(core: CoreId, available: Caps, requested: Caps) -> Result<(), FatalError> {
    if available.satisfies(requested) {
        Ok(())
    } else {
        Err(FatalError::CapabilityMismatch {
            core,
            requested,
            available,
        })
    }
}

/// First heap of `pool` whose capabilities cover `caps`.
pub(crate) fn first_match(map: &MemoryMap<'_>, pool: Pool, caps: Caps) -> Option<HeapId> {
    matching(map, pool, caps).next()
}

/// Every heap of `pool` whose capabilities cover `caps`, in pool order.
pub(crate) fn matching<'a>(
    map: &'a MemoryMap<'_>,
    pool: Pool,
    caps: Caps,
) -> impl Iterator<Item = HeapId> + 'a {
    map.pool(pool)
        .iter()
        .enumerate()
        .filter(move |(_, heap)| heap.caps().satisfies(caps))
        .map(move |(index, _)| HeapId::new(pool, index))
}
