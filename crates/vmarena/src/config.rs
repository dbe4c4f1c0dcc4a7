//! Arena configuration parameters.

use crate::align::{gib, mib};

/// Configuration for an [`Arena`](crate::Arena).
///
/// Controls the size of the address-space reservation, the granularity of
/// commits, and two opt-in behaviours. Validated when the arena is
/// created; all values are immutable afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArenaConfig {
    /// Total address space to reserve, in bytes.
    ///
    /// Rounded up to the backend page size. This is the hard ceiling on
    /// allocations: the arena never grows its reservation.
    pub reserve_size: usize,

    /// Chunk size for committing physical memory, in bytes.
    ///
    /// Rounded up to the backend page size and clamped to `reserve_size`.
    /// The first chunk is committed at creation; later chunks are committed
    /// as pushes cross the committed boundary.
    pub commit_size: usize,

    /// Decommit whole chunks above the position when the arena is rewound.
    ///
    /// Off by default: rewinding then stays O(1) and memory already
    /// committed is reused without another system call. Turning it on
    /// lowers resident memory after a large rewind at the cost of
    /// re-committing on the next growth.
    pub decommit_on_pop: bool,

    /// Fill regions pushed with [`Zeroing::Overwrite`](crate::Zeroing::Overwrite)
    /// with [`POISON_BYTE`](crate::POISON_BYTE).
    ///
    /// Makes reads of never-written bytes visible. Defaults to on in debug
    /// builds and off in release builds.
    pub poison_unzeroed: bool,
}

impl ArenaConfig {
    /// Default reservation: 1 GiB of address space.
    pub const DEFAULT_RESERVE_SIZE: usize = gib(1);

    /// Default commit chunk: 1 MiB.
    pub const DEFAULT_COMMIT_SIZE: usize = mib(1);

    /// Create a config with the given reservation and commit chunk sizes.
    ///
    /// Uses default values for all other parameters.
    pub fn new(reserve_size: usize, commit_size: usize) -> Self {
        Self {
            reserve_size,
            commit_size,
            decommit_on_pop: false,
            poison_unzeroed: cfg!(debug_assertions),
        }
    }

    /// Config for a fixed-capacity arena: reserve and commit the same size,
    /// so the arena never grows.
    pub fn fixed(capacity: usize) -> Self {
        Self::new(capacity, capacity)
    }

    /// Set [`decommit_on_pop`](Self::decommit_on_pop).
    pub fn with_decommit_on_pop(mut self, enabled: bool) -> Self {
        self.decommit_on_pop = enabled;
        self
    }

    /// Set [`poison_unzeroed`](Self::poison_unzeroed).
    pub fn with_poison_unzeroed(mut self, enabled: bool) -> Self {
        self.poison_unzeroed = enabled;
        self
    }
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_RESERVE_SIZE, Self::DEFAULT_COMMIT_SIZE)
    }
}
