//! Ready-made instrumented arenas.
//!
//! Each constructor returns the arena together with the [`CallLog`] of the
//! counting layer wrapped around its backend.

use vmarena::{Arena, ArenaConfig, ArenaError, HeapMemory, VirtualMemory};

use crate::{CallLog, CountingBackend, FaultyBackend, Faults};

pub type CountingArena<B = VirtualMemory> = Arena<CountingBackend<B>>;
pub type FaultyArena<B = HeapMemory> = Arena<CountingBackend<FaultyBackend<B>>>;

/// Test configuration: poisoning off so `Overwrite` bytes are predictable.
pub fn quiet_config(reserve_size: usize, commit_size: usize) -> ArenaConfig {
    ArenaConfig::new(reserve_size, commit_size).with_poison_unzeroed(false)
}

/// A virtual-memory arena whose backend calls are counted.
pub fn counting_arena(config: ArenaConfig) -> Result<(CountingArena, CallLog), ArenaError> {
    let backend = CountingBackend::new(VirtualMemory::new());
    let log = backend.log();
    Ok((Arena::with_config_in(config, backend)?, log))
}

/// A heap-backed arena whose backend calls are counted.
pub fn counting_heap_arena(
    config: ArenaConfig,
) -> Result<(CountingArena<HeapMemory>, CallLog), ArenaError> {
    let backend = CountingBackend::new(HeapMemory::new());
    let log = backend.log();
    Ok((Arena::with_config_in(config, backend)?, log))
}

/// A virtual-memory arena that refuses the calls named by `faults`.
///
/// The log is returned even when construction fails, so tests can check
/// what the failed constructor cleaned up.
pub fn faulty_arena(
    config: ArenaConfig,
    faults: Faults,
) -> (Result<FaultyArena<VirtualMemory>, ArenaError>, CallLog) {
    let backend = CountingBackend::new(FaultyBackend::new(VirtualMemory::new(), faults));
    let log = backend.log();
    (Arena::with_config_in(config, backend), log)
}

/// A heap-backed arena that refuses the calls named by `faults`.
pub fn faulty_heap_arena(
    config: ArenaConfig,
    faults: Faults,
) -> (Result<FaultyArena, ArenaError>, CallLog) {
    let backend = CountingBackend::new(FaultyBackend::new(HeapMemory::new(), faults));
    let log = backend.log();
    (Arena::with_config_in(config, backend), log)
}
