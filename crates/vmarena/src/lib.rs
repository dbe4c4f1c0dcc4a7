//! Linear ("bump") arena allocation over reserved virtual memory.
//!
//! An [`Arena`] reserves a large range of address space once, commits
//! physical memory for a prefix of it, and grows that prefix in fixed
//! chunks as allocations demand. Allocation is a bounds check and a bump;
//! freeing is rewinding the position ([`Arena::pop`], [`Arena::pop_to`],
//! [`Arena::pop_clear`]) or dropping the arena, which releases the whole
//! reservation at once. Objects are never freed one by one.
//!
//! # Architecture
//!
//! ```text
//! Arena<B: MemoryBackend>
//! ├── pos / commit_pos bookkeeping (arena.rs)
//! ├── AllocHandle → &[u8] resolution (handle.rs, raw.rs)
//! ├── typed helpers: push_value / push_array (typed.rs)
//! └── B: MemoryBackend
//!     ├── VirtualMemory: reserve, then commit in chunks (default)
//!     └── HeapMemory: one allocation, used by FixedArena (fixed.rs)
//! ```
//!
//! # Example
//!
//! ```
//! use vmarena::{Arena, Zeroing, kib, mib};
//!
//! let mut arena = Arena::new(mib(64), kib(64))?;
//! let frame_start = arena.pos();
//!
//! let ids = arena.alloc_slice(&[3u32, 1, 4, 1, 5])?;
//! let scratch = arena.push(1024, Zeroing::Zeroed)?;
//! assert!(arena.bytes(scratch).iter().all(|&b| b == 0));
//! assert_eq!(arena.array(ids)[2], 4);
//!
//! // Free the whole frame in one step.
//! arena.pop_to(frame_start);
//! # Ok::<(), vmarena::ArenaError>(())
//! ```
//!
//! # Unsafe code
//!
//! Confined to the backends, the backend calls in `arena.rs`, and the
//! slice construction in `raw.rs`. Every `unsafe` block carries a
//! `// SAFETY:` comment.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

pub mod align;
pub mod arena;
pub mod backend;
pub mod config;
pub mod error;
pub mod fixed;
pub mod handle;
mod raw;
mod typed;

// Public re-exports for the primary API surface.
pub use align::{gib, kib, mib, ARENA_ALIGN};
pub use arena::{Arena, ArenaHeader, Zeroing, HEADER_SIZE, POISON_BYTE};
pub use backend::{HeapMemory, MemoryBackend, Reservation, VirtualMemory};
pub use config::ArenaConfig;
pub use error::{ArenaError, BackendError, BackendErrorKind, BackendOp};
pub use fixed::FixedArena;
pub use handle::{AllocHandle, ArrayHandle, ValueHandle};
