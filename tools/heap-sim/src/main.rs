use fw_heap::{Caps, HeapError, MemoryMap, Registry, Zone};
use fw_platform::memory::{self, CORE_COUNT};
use fw_platform::sim::{CacheOpKind, SimBoard, SimPlatform, StdoutSink};
use fw_trace::TraceLogger;
use log::LevelFilter;
use std::process::ExitCode;
use std::ptr::NonNull;
use std::{env, thread};

static SINK: StdoutSink = StdoutSink;
static LOGGER: TraceLogger = TraceLogger::new(&SINK, LevelFilter::Info);

const DEFAULT_ROUNDS: usize = 10_000;

/// Live allocations a core holds before it frees some again.
const MAX_LIVE: usize = 24;

/// xorshift32 seeded per core, so every run replays the same traffic.
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
        usize::try_from(self.next()).map_or(0, |x| x % n)
    }
}

#[derive(Debug, Default, Copy, Clone)]
struct Tally {
    allocated: usize,
    exhausted: usize,
    freed: usize,
}

fn request(registry: &Registry<'static, SimPlatform>, rng: &mut Rng) -> Result<NonNull<u8>, HeapError> {
    const SIZES: [usize; 8] = [16, 64, 100, 256, 384, 700, 1024, 2000];
    let bytes = SIZES[rng.below(SIZES.len())];
    match rng.below(4) {
        0 => registry.allocate(Zone::SYSTEM_RUNTIME, Caps::RAM, bytes),
        1 => registry.allocate(Zone::RUNTIME, Caps::RAM, bytes),
        2 => registry.allocate_buffer(Zone::BUFFER, Caps::HP, bytes),
        _ => registry.allocate_buffer(Zone::BUFFER.uncached(), Caps::LP, bytes),
    }
}

fn run_core(registry: &Registry<'static, SimPlatform>, core: usize, rounds: usize) -> Result<Tally, HeapError> {
    SimPlatform::enter_core(core);
    let mut rng = Rng(0x9e37_79b9 ^ u32::try_from(core).unwrap_or(0).wrapping_mul(0x85eb_ca6b));
    let mut live = Vec::with_capacity(MAX_LIVE);
    let mut tally = Tally::default();

    for _ in 0..rounds {
        if live.len() < MAX_LIVE && rng.below(3) != 0 {
            match request(registry, &mut rng) {
                Ok(block) => {
                    live.push(block);
                    tally.allocated += 1;
                }
                Err(HeapError::Fatal(error)) => return Err(error.into()),
                Err(_) => tally.exhausted += 1,
            }
        } else if !live.is_empty() {
            let block = live.swap_remove(rng.below(live.len()));
            registry.free(block.as_ptr())?;
            tally.freed += 1;
        }
    }

    for block in live.drain(..) {
        registry.free(block.as_ptr())?;
        tally.freed += 1;
    }
    Ok(tally)
}

/// Every block heap is empty and its counters add up.
fn check(map: &MemoryMap<'_>) -> Vec<String> {
    map.block_heaps()
        .filter_map(|(id, heap)| {
            let info = heap.info();
            let free_blocks: usize = heap.maps().iter().map(|class| class.free_count()).sum();
            let blocks: usize = heap.maps().iter().map(|class| class.count()).sum();
            (info.used != 0 || info.used + info.free != heap.size() || free_blocks != blocks)
                .then(|| format!("{id}: used {} free {} of {}", info.used, info.free, heap.size()))
        })
        .collect()
}

fn main() -> ExitCode {
    // args: [cores] [rounds]
    let mut args = env::args().skip(1);
    let cores = args.next().map_or(Ok(CORE_COUNT), |arg| arg.parse());
    let rounds = args.next().map_or(Ok(DEFAULT_ROUNDS), |arg| arg.parse());
    let (Ok(cores), Ok(rounds)) = (cores, rounds) else {
        eprintln!("usage: heap-sim [cores] [rounds]");
        return ExitCode::FAILURE;
    };
    if cores == 0 || cores > CORE_COUNT {
        eprintln!("the reference board has {CORE_COUNT} cores");
        return ExitCode::FAILURE;
    }

    if let Err(error) = LOGGER.init() {
        eprintln!("logger: {error}");
        return ExitCode::FAILURE;
    }
    // failed requests are expected and dump their heaps as errors
    log::set_max_level(LevelFilter::Off);

    let registry = match SimBoard::reference().boot(memory::CONFIG) {
        Ok(registry) => registry,
        Err(error) => {
            eprintln!("heap init: {error}");
            return ExitCode::FAILURE;
        }
    };

    let results: Vec<_> = thread::scope(|scope| {
        let workers: Vec<_> = (0..cores)
            .map(|core| scope.spawn(move || run_core(registry, core, rounds)))
            .collect();
        workers.into_iter().map(|worker| worker.join()).collect()
    });

    let mut failed = false;
    for (core, result) in results.into_iter().enumerate() {
        match result {
            Ok(Ok(tally)) => println!(
                "core {core}: {} allocated, {} freed, {} exhausted",
                tally.allocated, tally.freed, tally.exhausted
            ),
            Ok(Err(error)) => {
                eprintln!("core {core}: {error}");
                failed = true;
            }
            Err(_) => {
                eprintln!("core {core}: trapped");
                failed = true;
            }
        }
    }

    log::set_max_level(LevelFilter::Info);
    if let Err(error) = registry.heap_trace_all(true) {
        eprintln!("trace: {error}");
        failed = true;
    }

    let summary = registry.with_map(|map| {
        map.block_heaps()
            .map(|(id, heap)| {
                let free_blocks: usize = heap.maps().iter().map(|class| class.free_count()).sum();
                format!("{id}: {} bytes, {free_blocks} blocks free", heap.info().free)
            })
            .collect::<Vec<_>>()
    });
    for line in summary.unwrap_or_default() {
        println!("{line}");
    }

    let ops = registry.platform().take_cache_ops();
    let count = |kind| ops.iter().filter(|op| op.kind == kind).count();
    println!(
        "cache maintenance: {} writeback, {} invalidate, {} writeback+invalidate",
        count(CacheOpKind::Writeback),
        count(CacheOpKind::Invalidate),
        count(CacheOpKind::WritebackInvalidate)
    );

    match registry.with_map(check) {
        Ok(problems) if problems.is_empty() => {}
        Ok(problems) => {
            for problem in problems {
                eprintln!("leak: {problem}");
            }
            failed = true;
        }
        Err(error) => {
            eprintln!("check: {error}");
            failed = true;
        }
    }

    if failed {
        ExitCode::FAILURE
    } else {
        println!("ok: {cores} cores, {rounds} rounds each");
        ExitCode::SUCCESS
    }
}
