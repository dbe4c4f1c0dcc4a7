//! Global-allocator backend for fixed-capacity arenas.

use std::alloc::{self, Layout};
use std::ptr::NonNull;

use super::{MemoryBackend, Reservation};
use crate::align::ARENA_ALIGN;
use crate::error::{BackendError, BackendOp};

/// Backend that satisfies a reservation with one zeroed heap allocation.
///
/// There is no reserve/commit split: the whole reservation is backed from
/// the start, `commit` and `decommit` only validate their range, and
/// `release` is a single deallocation.
#[derive(Clone, Copy, Debug, Default)]
pub struct HeapMemory;

impl HeapMemory {
    /// Create a heap backend.
    pub fn new() -> Self {
        Self
    }

    fn layout(op: BackendOp, size: usize) -> Result<Layout, BackendError> {
        if size == 0 {
            return Err(BackendError::invalid_size(op));
        }
        Layout::from_size_align(size, ARENA_ALIGN).map_err(|_| BackendError::invalid_size(op))
    }
}

// SAFETY: `alloc_zeroed` returns a fresh, zero-initialized, readable and
// writable block aligned to `ARENA_ALIGN` that aliases nothing else; it stays
// valid until `release` deallocates it with the same layout.
unsafe impl MemoryBackend for HeapMemory {
    fn page_size(&self) -> usize {
        ARENA_ALIGN
    }

    fn reserve(&mut self, size: usize) -> Result<Reservation, BackendError> {
        let layout = Self::layout(BackendOp::Reserve, size)?;
        // SAFETY: `layout` has nonzero size.
        let ptr = unsafe { alloc::alloc_zeroed(layout) };
        let base = NonNull::new(ptr).ok_or_else(|| BackendError::refused(BackendOp::Reserve))?;
        // SAFETY: `base` is a fresh allocation of exactly `size` bytes.
        Ok(unsafe { Reservation::from_raw_parts(base, size) })
    }

    unsafe fn commit(
        &mut self,
        reservation: &Reservation,
        offset: usize,
        len: usize,
    ) -> Result<(), BackendError> {
        reservation.check_range(BackendOp::Commit, offset, len)
    }

    unsafe fn decommit(
        &mut self,
        reservation: &Reservation,
        offset: usize,
        len: usize,
    ) -> Result<(), BackendError> {
        reservation.check_range(BackendOp::Decommit, offset, len)
    }

    unsafe fn release(&mut self, reservation: Reservation) -> Result<(), BackendError> {
        let layout = Self::layout(BackendOp::Release, reservation.len())?;
        // SAFETY: the caller guarantees the reservation came from `reserve`,
        // which allocated it with this exact layout.
        unsafe { alloc::dealloc(reservation.base().as_ptr(), layout) };
        Ok(())
    }
}
