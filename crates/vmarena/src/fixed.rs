//! Fixed-capacity arena over the general heap.
//!
//! The same [`Arena`] core running on [`HeapMemory`]: reserve and commit
//! are one zeroed allocation of the full capacity, the committed boundary
//! never moves, and destroying the arena is one deallocation. Useful where
//! virtual memory reservation is unavailable or the capacity is small.

use crate::arena::Arena;
use crate::backend::HeapMemory;
use crate::config::ArenaConfig;
use crate::error::ArenaError;

/// An arena with all of its capacity allocated from the heap up front.
pub type FixedArena = Arena<HeapMemory>;

impl Arena<HeapMemory> {
    /// Allocate a `capacity`-byte arena from the heap.
    ///
    /// `capacity` includes the [`HEADER_SIZE`](crate::HEADER_SIZE) header and
    /// is rounded up to [`ARENA_ALIGN`](crate::ARENA_ALIGN).
    ///
    /// # Errors
    ///
    /// - [`ArenaError::InvalidConfig`] if `capacity` cannot hold the header.
    /// - [`ArenaError::ReservationFailed`] if the heap allocation fails.
    pub fn fixed(capacity: usize) -> Result<Self, ArenaError> {
        Self::fixed_with_config(ArenaConfig::fixed(capacity))
    }

    /// Allocate a heap arena from a full configuration.
    ///
    /// The commit chunk is forced to the reservation size, so the arena
    /// never grows.
    pub fn fixed_with_config(config: ArenaConfig) -> Result<Self, ArenaError> {
        let config = ArenaConfig {
            commit_size: config.reserve_size,
            ..config
        };
        Self::with_config_in(config, HeapMemory::new())
    }

    /// Total capacity in bytes, header included.
    pub fn capacity(&self) -> usize {
        self.reserve_size()
    }
}
