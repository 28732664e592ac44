mod common;

use common::*;
use fw_heap::{Caps, FatalError, HeapError, HeapId, MemoryMap, Pool, Slot, Zone};
use std::ptr;

fn large_slots(map: &MemoryMap<'_>) -> Vec<Slot> {
    map.buffer()[0].maps()[1].slots().to_vec()
}

#[test]
fn freeing_null_does_nothing() {
    let (registry, _) = boot(&SMALL);
    assert_eq!(registry.free(ptr::null_mut()), Ok(()));
}

#[test]
fn double_free_is_fatal() {
    let (registry, _) = boot(&SMALL);
    let block = registry.allocate(Zone::RUNTIME, Caps::RAM, 64).unwrap();
    registry.free(block.as_ptr()).unwrap();
    assert_eq!(
        registry.free(block.as_ptr()),
        Err(FatalError::NotAllocated { addr: addr(block) })
    );
}

#[test]
fn pointers_into_a_span_are_rejected() {
    let (registry, base) = boot(&SPANNING);
    let span = registry.allocate_buffer(Zone::BUFFER, DMA_RAM, 300).unwrap();
    let head = addr(span);
    assert_eq!(head, base + SPANNING_LARGE_BLOCKS);

    assert_eq!(
        registry.free(at(head + 128)),
        Err(FatalError::NotSpanHead { addr: head + 128 })
    );
    assert_eq!(
        registry.free(at(head + 8)),
        Err(FatalError::Misaligned {
            addr: head + 8,
            block_size: 128
        })
    );
    // still intact
    assert_eq!(registry.heap_info(BUFFER_0).unwrap().used, 384);
}

#[test]
fn freeing_a_span_releases_exactly_its_blocks() {
    let (registry, _) = boot(&SPANNING);
    let span = registry.allocate_buffer(Zone::BUFFER, DMA_RAM, 300).unwrap();
    let single = registry.allocate_buffer(Zone::BUFFER, DMA_RAM, 128).unwrap();

    let slots = registry.with_map(large_slots).unwrap();
    assert_eq!(
        slots,
        [Slot::Head { len: 3 }, Slot::Tail, Slot::Tail, Slot::Head { len: 1 }]
    );

    registry.free(span.as_ptr()).unwrap();
    let slots = registry.with_map(large_slots).unwrap();
    assert_eq!(
        slots,
        [Slot::Free, Slot::Free, Slot::Free, Slot::Head { len: 1 }]
    );
    assert_eq!(registry.heap_info(BUFFER_0).unwrap().used, 128);

    registry.free(single.as_ptr()).unwrap();
    assert_eq!(registry.heap_info(BUFFER_0).unwrap().used, 0);
}

#[test]
fn fragmented_heaps_cannot_serve_spans() {
    let (registry, _) = boot(&SPANNING);
    for _ in 0..4 {
        registry.allocate_buffer(Zone::BUFFER, DMA_RAM, 128).unwrap();
    }
    let small: Vec<_> = (0..8)
        .map(|_| registry.allocate_buffer(Zone::BUFFER, DMA_RAM, 64).unwrap())
        .collect();
    for block in small.iter().step_by(2) {
        registry.free(block.as_ptr()).unwrap();
    }

    // 256 bytes are free, but no three of them are adjacent
    assert_eq!(registry.heap_info(BUFFER_0).unwrap().free, 256);
    assert_eq!(
        registry.allocate_buffer(Zone::BUFFER, DMA_RAM, 192),
        Err(HeapError::Exhausted {
            heap: BUFFER_0,
            bytes: 192
        })
    );
    assert!(registry.allocate_buffer(Zone::BUFFER, DMA_RAM, 64).is_ok());
}

#[test]
fn system_heap_memory_cannot_be_freed() {
    let (registry, base) = boot(&SMALL);
    let block = registry.allocate(Zone::SYSTEM, Caps::RAM, 16).unwrap();
    assert_eq!(
        registry.free(block.as_ptr()),
        Err(FatalError::FreeSystemHeap { addr: base, core: 0 })
    );
    assert_eq!(
        registry.free(at(base + 0x400)),
        Err(FatalError::FreeSystemHeap {
            addr: base + 0x400,
            core: 1
        })
    );
}

#[test]
fn pointers_outside_every_heap_are_fatal() {
    let (registry, base) = boot(&SMALL);
    let outside = base + SMALL.span() + 64;
    assert_eq!(
        registry.free(at(outside)),
        Err(FatalError::UnknownPointer { addr: outside })
    );
}

#[test]
fn another_cores_system_runtime_block_can_be_freed() {
    let (registry, base) = boot(&SMALL);
    let block = on_core(1, || {
        addr(
            registry
                .allocate(Zone::SYSTEM_RUNTIME, Caps::RAM, 64)
                .unwrap(),
        )
    });
    assert_eq!(block, base + SMALL_SYSTEM_RUNTIME_1);

    registry.free(at(block)).unwrap();
    assert_eq!(
        registry
            .heap_info(HeapId::new(Pool::SystemRuntime, 1))
            .unwrap()
            .used,
        0
    );
}

const SIZES: [usize; 8] = [8, 64, 100, 200, 384, 500, 900, 1200];

/// xorshift32, enough for a reproducible workload.
struct Rng(u32);

impl Rng {
    fn next(&mut self) -> u32 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.0 = x;
        x
    }

    fn below(&mut self, n: usize) -> usize {
        self.next() as usize % n
    }
}

fn check_accounting(map: &MemoryMap<'_>) {
    for (id, heap) in map.block_heaps() {
        let info = heap.info();
        assert_eq!(info.used + info.free, heap.size(), "{id}");

        let held: usize = heap
            .maps()
            .iter()
            .map(|class| {
                let blocks = class.slots().iter().filter(|slot| **slot != Slot::Free).count();
                assert_eq!(class.count() - blocks, class.free_count(), "{id}");
                blocks * class.block_size()
            })
            .sum();
        assert_eq!(held, info.used, "{id}");
    }
}

#[test]
fn accounting_holds_under_random_traffic() {
    let registry = boot_reference();
    let mut rng = Rng(0x2545_f491);
    let mut live = Vec::new();

    for _ in 0..2000 {
        if live.is_empty() || rng.below(3) != 0 {
            let bytes = SIZES[rng.below(SIZES.len())];
            let block = match rng.below(3) {
                0 => registry.allocate_buffer(Zone::BUFFER, Caps::HP, bytes),
                1 => registry.allocate(Zone::SYSTEM_RUNTIME, Caps::RAM, bytes),
                _ => registry.allocate(Zone::RUNTIME, Caps::RAM, bytes),
            };
            match block {
                Ok(block) => live.push(block),
                Err(error) => assert!(!error.is_fatal(), "{error}"),
            }
        } else {
            let block = live.swap_remove(rng.below(live.len()));
            registry.free(block.as_ptr()).unwrap();
        }
        registry.with_map(check_accounting).unwrap();
    }

    for block in live {
        registry.free(block.as_ptr()).unwrap();
    }
    registry
        .with_map(|map| {
            check_accounting(map);
            assert!(map.block_heaps().all(|(_, heap)| heap.info().used == 0));
        })
        .unwrap();
}
