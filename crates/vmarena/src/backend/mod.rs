//! Platform memory backends.
//!
//! A [`MemoryBackend`] hands out [`Reservation`]s of address space and
//! controls which sub-ranges of them are backed by physical memory. The
//! arena drives a backend; a backend never calls back into the arena.
//!
//! Two implementations ship with the crate:
//!
//! - [`VirtualMemory`]: OS virtual memory (`mmap`/`mprotect` on Unix,
//!   `VirtualAlloc` on Windows). Reserve and commit are distinct steps.
//! - [`HeapMemory`]: one zeroed allocation from the global allocator.
//!   Reserve already backs everything, so commit and decommit only check
//!   their range.

#![allow(unsafe_code)]

mod heap;
mod virtual_memory;

use std::ptr::NonNull;

pub use heap::HeapMemory;
pub use virtual_memory::VirtualMemory;

use crate::error::{BackendError, BackendOp};

/// A claimed range of address space.
///
/// Only backends create reservations, and [`MemoryBackend::release`]
/// consumes them, so a reservation is released at most once. The token
/// does not grant access to its bytes: only ranges that were successfully
/// committed may be read or written.
#[derive(Debug)]
pub struct Reservation {
    base: NonNull<u8>,
    len: usize,
}

impl Reservation {
    /// Wrap a raw reservation.
    ///
    /// # Safety
    ///
    /// `base..base + len` must be a range of address space claimed by the
    /// backend that will receive this token in `commit`/`decommit`/`release`,
    /// aliasing no other live reservation or allocation.
    pub unsafe fn from_raw_parts(base: NonNull<u8>, len: usize) -> Self {
        Self { base, len }
    }

    /// First byte of the reservation.
    pub fn base(&self) -> NonNull<u8> {
        self.base
    }

    /// Length of the reservation in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the reservation covers no bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Check that `offset..offset + len` lies inside this reservation.
    pub fn check_range(&self, op: BackendOp, offset: usize, len: usize) -> Result<(), BackendError> {
        match offset.checked_add(len) {
            Some(end) if end <= self.len => Ok(()),
            _ => Err(BackendError::out_of_range(op)),
        }
    }
}

/// Reserve/commit/decommit/release over some source of memory.
///
/// # Safety
///
/// Implementors guarantee:
///
/// - `reserve(size)` returns a reservation of exactly `size` bytes whose
///   base is aligned to at least [`ARENA_ALIGN`](crate::ARENA_ALIGN) and
///   which aliases no other live mapping.
/// - After `commit(r, offset, len)` returns `Ok`, every byte of
///   `offset..offset + len` is readable and writable, and holds an
///   initialized value (zero on first commit), until that range is
///   decommitted or the reservation is released.
/// - `commit` on an already committed range succeeds and leaves its
///   contents untouched.
/// - `release` returns the whole reservation to its source.
pub unsafe trait MemoryBackend {
    /// Granularity of reservations and commits, in bytes. A power of two.
    ///
    /// Arenas round their sizes to at least [`ARENA_ALIGN`](crate::ARENA_ALIGN)
    /// regardless, so a finer granularity is allowed.
    fn page_size(&self) -> usize;

    /// Claim `size` bytes of address space with no access rights.
    fn reserve(&mut self, size: usize) -> Result<Reservation, BackendError>;

    /// Make `offset..offset + len` of `reservation` readable and writable.
    ///
    /// # Safety
    ///
    /// `reservation` must have been returned by `reserve` on this backend.
    unsafe fn commit(
        &mut self,
        reservation: &Reservation,
        offset: usize,
        len: usize,
    ) -> Result<(), BackendError>;

    /// Drop physical backing and access for `offset..offset + len`, keeping
    /// the range reserved.
    ///
    /// # Safety
    ///
    /// `reservation` must have been returned by `reserve` on this backend,
    /// and no reference into the range may outlive the call.
    unsafe fn decommit(
        &mut self,
        reservation: &Reservation,
        offset: usize,
        len: usize,
    ) -> Result<(), BackendError>;

    /// Return the entire reservation. Every address derived from it becomes
    /// invalid.
    ///
    /// # Safety
    ///
    /// `reservation` must have been returned by `reserve` on this backend,
    /// and no reference into it may outlive the call.
    unsafe fn release(&mut self, reservation: Reservation) -> Result<(), BackendError>;
}
