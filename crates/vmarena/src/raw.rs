//! Low-level primitives for arena memory access.
//!
//! The only place in the arena core where byte slices are built from a
//! reservation's base pointer. Callers bounds-check against the committed
//! prefix before calling; each function states the rest of its contract.

#![allow(unsafe_code)]

use std::ptr::NonNull;

/// Borrow `offset..offset + len` of a reservation as bytes.
///
/// # Safety
///
/// The range must lie inside the committed prefix of a live reservation
/// starting at `base`, and no mutable borrow of it may exist for `'a`.
pub(crate) unsafe fn committed<'a>(base: NonNull<u8>, offset: usize, len: usize) -> &'a [u8] {
    // SAFETY: committed bytes are readable and initialized (backend
    // contract); the caller rules out overlapping mutable borrows.
    unsafe { std::slice::from_raw_parts(base.as_ptr().add(offset), len) }
}

/// Mutably borrow `offset..offset + len` of a reservation as bytes.
///
/// # Safety
///
/// As [`committed`], and no other borrow of the range may exist for `'a`.
pub(crate) unsafe fn committed_mut<'a>(
    base: NonNull<u8>,
    offset: usize,
    len: usize,
) -> &'a mut [u8] {
    // SAFETY: committed bytes are writable (backend contract); the caller
    // guarantees exclusivity.
    unsafe { std::slice::from_raw_parts_mut(base.as_ptr().add(offset), len) }
}
