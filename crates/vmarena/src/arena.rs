//! The linear arena allocator.
//!
//! [`Arena`] reserves a large range of address space up front and backs
//! only a prefix of it with physical memory. Allocation bumps a position;
//! when the position crosses the committed boundary the arena commits the
//! next chunk(s). Rewinding (`pop`, `pop_to`, `pop_clear`) only moves the
//! position back, so it is O(1) and leaves committed memory in place.
//!
//! ```text
//! base                                                      reserve_size
//! ├─ header ─┬──── allocations ────┬──── committed, free ────┬── reserved ──┤
//! 0     HEADER_SIZE               pos                   commit_pos
//! ```
//!
//! Invariants, after every operation:
//!
//! - `HEADER_SIZE <= pos <= commit_pos <= reserve_size`
//! - `commit_pos` is a multiple of `commit_size`, or equal to `reserve_size`
//! - every allocation offset is a multiple of [`ARENA_ALIGN`]

#![allow(unsafe_code)]

use std::fmt;
use std::ptr::NonNull;

use bytemuck::{Pod, Zeroable};

use crate::align::{align_up, round_up_to_multiple, ARENA_ALIGN};
use crate::backend::{MemoryBackend, Reservation, VirtualMemory};
use crate::config::ArenaConfig;
use crate::error::{ArenaError, BackendError, BackendOp};
use crate::handle::AllocHandle;
use crate::raw;

/// Size of the [`ArenaHeader`] at the base of every reservation. The first
/// allocation starts at (or after) this offset.
pub const HEADER_SIZE: usize = std::mem::size_of::<ArenaHeader>();

/// Fill byte for [`Zeroing::Overwrite`] regions when
/// [`ArenaConfig::poison_unzeroed`] is set.
pub const POISON_BYTE: u8 = 0xA5;

const HEADER_MAGIC: u64 = u64::from_le_bytes(*b"VMARENA\0");
const HEADER_VERSION: u64 = 1;

/// Self-describing record written at offset 0 of every reservation.
///
/// Identifies the block in a raw memory dump. The arena's live state
/// (`pos`, `commit_pos`) is kept in the [`Arena`] value, not here.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct ArenaHeader {
    /// `b"VMARENA\0"` read as a little-endian `u64`.
    pub magic: u64,
    /// Layout version of this header.
    pub version: u64,
    /// Page-aligned reservation size.
    pub reserve_size: u64,
    /// Page-aligned commit chunk size.
    pub commit_size: u64,
}

impl ArenaHeader {
    /// Whether the magic and version match this crate's layout.
    pub fn is_valid(&self) -> bool {
        self.magic == HEADER_MAGIC && self.version == HEADER_VERSION
    }
}

/// Whether a push clears the bytes it returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Zeroing {
    /// Every returned byte reads as zero.
    Zeroed,
    /// The caller writes every byte before reading any of them.
    ///
    /// Skips the clearing pass. The bytes hold whatever was last stored
    /// there (zero for memory never used, stale data after a rewind), or
    /// [`POISON_BYTE`] when [`ArenaConfig::poison_unzeroed`] is set.
    Overwrite,
}

/// A linear allocator over a reserved range of memory.
///
/// Allocations are identified by [`AllocHandle`]s and resolved with
/// [`bytes`](Self::bytes) / [`bytes_mut`](Self::bytes_mut). No allocation is
/// freed individually: [`pop`](Self::pop) and friends rewind the position,
/// and dropping the arena (or calling [`destroy`](Self::destroy)) releases
/// the whole reservation with one backend call.
///
/// An arena is single-threaded: every mutation takes `&mut self`. It may
/// be moved to another thread when its backend can.
pub struct Arena<B: MemoryBackend = VirtualMemory> {
    /// Cached base of `reservation`.
    base: NonNull<u8>,
    /// `None` only once released.
    reservation: Option<Reservation>,
    backend: B,
    /// Effective configuration (sizes page aligned).
    config: ArenaConfig,
    /// Bump position: offset of the next free byte.
    pos: usize,
    /// End of the committed prefix.
    commit_pos: usize,
}

// SAFETY: the arena exclusively owns its reservation and holds no
// thread-affine state; moving the arena moves that ownership.
unsafe impl<B: MemoryBackend + Send> Send for Arena<B> {}

impl Arena<VirtualMemory> {
    /// Reserve `reserve_size` bytes of address space and commit the first
    /// `commit_size` bytes, growing in `commit_size` chunks.
    ///
    /// Both sizes are rounded up to the system page size.
    ///
    /// # Errors
    ///
    /// See [`with_config_in`](Self::with_config_in).
    pub fn new(reserve_size: usize, commit_size: usize) -> Result<Self, ArenaError> {
        Self::with_config(ArenaConfig::new(reserve_size, commit_size))
    }

    /// Create a virtual-memory arena from a full configuration.
    pub fn with_config(config: ArenaConfig) -> Result<Self, ArenaError> {
        Self::with_config_in(config, VirtualMemory::new())
    }
}

impl<B: MemoryBackend> Arena<B> {
    /// Create an arena over `backend`.
    ///
    /// Rounds both sizes up to the backend page size, clamps the commit
    /// chunk to the reservation (and raises it to cover the header),
    /// reserves, commits the first chunk, and writes the header.
    ///
    /// # Errors
    ///
    /// - [`ArenaError::InvalidConfig`] for zero sizes, sizes that overflow
    ///   when page aligned, or a reservation too small for the header.
    /// - [`ArenaError::ReservationFailed`] if the backend cannot reserve.
    /// - [`ArenaError::CommitFailed`] if the first chunk cannot be
    ///   committed. The reservation is released before returning.
    pub fn with_config_in(config: ArenaConfig, mut backend: B) -> Result<Self, ArenaError> {
        // Sizes are kept word aligned even over backends with smaller pages.
        let page_size = backend.page_size().max(ARENA_ALIGN);
        let (reserve_size, commit_size) = Self::layout(&config, page_size)?;

        let reservation = backend
            .reserve(reserve_size)
            .map_err(|source| ArenaError::ReservationFailed {
                requested: reserve_size,
                source,
            })?;

        // SAFETY: `reservation` was just returned by `backend.reserve`.
        if let Err(source) = unsafe { backend.commit(&reservation, 0, commit_size) } {
            // SAFETY: as above; nothing borrows the reservation.
            if let Err(err) = unsafe { backend.release(reservation) } {
                tracing::warn!(error = %err, "failed to release reservation after commit failure");
            }
            return Err(ArenaError::CommitFailed {
                offset: 0,
                len: commit_size,
                source,
            });
        }

        let mut arena = Self {
            base: reservation.base(),
            reservation: Some(reservation),
            backend,
            config: ArenaConfig {
                reserve_size,
                commit_size,
                ..config
            },
            pos: HEADER_SIZE,
            commit_pos: commit_size,
        };
        arena.write_header();

        tracing::debug!(reserve_size, commit_size, page_size, "arena created");
        Ok(arena)
    }

    /// Page-align and validate the requested sizes.
    ///
    /// `page_size` is a power of two no smaller than [`ARENA_ALIGN`].
    fn layout(config: &ArenaConfig, page_size: usize) -> Result<(usize, usize), ArenaError> {
        if config.reserve_size == 0 || config.commit_size == 0 {
            return Err(ArenaError::InvalidConfig {
                reason: format!(
                    "reserve_size and commit_size must be nonzero (got {} and {})",
                    config.reserve_size, config.commit_size,
                ),
            });
        }

        let reserve_size = align_up(config.reserve_size, page_size)
            .filter(|&size| size <= isize::MAX as usize)
            .ok_or_else(|| ArenaError::InvalidConfig {
                reason: format!(
                    "reserve_size {} overflows when aligned to {page_size}-byte pages",
                    config.reserve_size,
                ),
            })?;
        if reserve_size < HEADER_SIZE {
            return Err(ArenaError::InvalidConfig {
                reason: format!(
                    "reserve_size {reserve_size} cannot hold the {HEADER_SIZE}-byte arena header"
                ),
            });
        }

        // reserve_size is page aligned and >= HEADER_SIZE, so neither
        // rounding below can exceed it before the clamp.
        let header_pages = align_up(HEADER_SIZE, page_size).unwrap_or(reserve_size);
        let commit_size = align_up(config.commit_size, page_size)
            .unwrap_or(reserve_size)
            .max(header_pages)
            .min(reserve_size);

        Ok((reserve_size, commit_size))
    }

    fn write_header(&mut self) {
        let header = ArenaHeader {
            magic: HEADER_MAGIC,
            version: HEADER_VERSION,
            reserve_size: self.config.reserve_size as u64,
            commit_size: self.config.commit_size as u64,
        };
        // SAFETY: 0..HEADER_SIZE is committed (commit_size >= HEADER_SIZE)
        // and below every allocation, so nothing else borrows it.
        let bytes = unsafe { raw::committed_mut(self.base, 0, HEADER_SIZE) };
        bytes.copy_from_slice(bytemuck::bytes_of(&header));
    }

    /// Read back the header at the base of the reservation.
    pub fn header(&self) -> ArenaHeader {
        // SAFETY: the header range is committed and never handed out.
        let bytes = unsafe { raw::committed(self.base, 0, HEADER_SIZE) };
        bytemuck::pod_read_unaligned(bytes)
    }

    /// Allocate `size` bytes, word aligned.
    ///
    /// # Errors
    ///
    /// [`ArenaError::CommitFailed`] if growing the committed prefix fails.
    /// The arena is left unchanged.
    ///
    /// # Panics
    ///
    /// Panics if the allocation would run past the reservation: the arena
    /// was sized too small for its workload. Use [`try_push`](Self::try_push)
    /// to handle that case.
    pub fn push(&mut self, size: usize, zeroing: Zeroing) -> Result<AllocHandle, ArenaError> {
        match self.try_push(size, zeroing) {
            Err(err @ ArenaError::CapacityExceeded { .. }) => panic!("{err}"),
            other => other,
        }
    }

    /// Allocate `size` bytes, word aligned, reporting an exhausted
    /// reservation as an error instead of panicking.
    ///
    /// A zero-byte push is always at the aligned position, so on a full
    /// arena its offset is `reserve_size`, one past the last byte. Its
    /// handle resolves to an empty slice like any other.
    ///
    /// # Errors
    ///
    /// - [`ArenaError::CapacityExceeded`] if the aligned allocation would end
    ///   past `reserve_size`.
    /// - [`ArenaError::CommitFailed`] if growing the committed prefix fails.
    ///
    /// On error, `pos` and `commit_pos` are unchanged.
    pub fn try_push(&mut self, size: usize, zeroing: Zeroing) -> Result<AllocHandle, ArenaError> {
        let reserve_size = self.config.reserve_size;
        // reserve_size is word aligned (see `layout`), so aligning
        // pos <= reserve_size cannot pass it.
        let aligned = align_up(self.pos, ARENA_ALIGN).unwrap_or(reserve_size);
        let new_pos = aligned
            .checked_add(size)
            .filter(|&end| end <= reserve_size)
            .ok_or(ArenaError::CapacityExceeded {
                requested: size,
                available: reserve_size.saturating_sub(aligned),
            })?;

        if new_pos > self.commit_pos {
            self.grow(new_pos)?;
        }
        self.pos = new_pos;

        // SAFETY: aligned..new_pos lies below commit_pos and above every
        // live allocation; `&mut self` rules out other borrows.
        let bytes = unsafe { raw::committed_mut(self.base, aligned, size) };
        match zeroing {
            Zeroing::Zeroed => bytes.fill(0),
            Zeroing::Overwrite if self.config.poison_unzeroed => bytes.fill(POISON_BYTE),
            Zeroing::Overwrite => {}
        }

        Ok(AllocHandle::new(aligned, size))
    }

    /// Allocate `size` bytes and borrow them directly.
    ///
    /// # Errors
    ///
    /// As [`push`](Self::push).
    ///
    /// # Panics
    ///
    /// As [`push`](Self::push).
    pub fn push_bytes(&mut self, size: usize, zeroing: Zeroing) -> Result<&mut [u8], ArenaError> {
        let handle = self.push(size, zeroing)?;
        Ok(self.bytes_mut(handle))
    }

    /// Commit up to the first chunk boundary at or past `new_pos`.
    fn grow(&mut self, new_pos: usize) -> Result<(), ArenaError> {
        let reserve_size = self.config.reserve_size;
        let target = round_up_to_multiple(new_pos, self.config.commit_size)
            .map_or(reserve_size, |boundary| boundary.min(reserve_size));
        let offset = self.commit_pos;
        let len = target - offset;

        self.commit_range(offset, len)
            .map_err(|source| ArenaError::CommitFailed {
                offset,
                len,
                source,
            })?;

        tracing::trace!(from = offset, to = target, "arena commit grown");
        self.commit_pos = target;
        Ok(())
    }

    fn commit_range(&mut self, offset: usize, len: usize) -> Result<(), BackendError> {
        let Some(reservation) = self.reservation.as_ref() else {
            return Err(BackendError::out_of_range(BackendOp::Commit));
        };
        // SAFETY: the reservation came from `self.backend`.
        unsafe { self.backend.commit(reservation, offset, len) }
    }

    fn decommit_range(&mut self, offset: usize, len: usize) -> Result<(), BackendError> {
        let Some(reservation) = self.reservation.as_ref() else {
            return Err(BackendError::out_of_range(BackendOp::Decommit));
        };
        // SAFETY: the reservation came from `self.backend`; the range lies
        // above `pos`, so no resolved slice points into it while we hold
        // `&mut self`.
        unsafe { self.backend.decommit(reservation, offset, len) }
    }

    /// Rewind the position by `size` bytes.
    ///
    /// `size` is clamped so the position never drops below
    /// [`HEADER_SIZE`]. Committed memory stays committed and its bytes are
    /// not cleared, unless [`ArenaConfig::decommit_on_pop`] is set.
    pub fn pop(&mut self, size: usize) {
        let size = size.min(self.pos - HEADER_SIZE);
        self.pos -= size;
        if self.config.decommit_on_pop {
            self.shrink_commit();
        }
    }

    /// Rewind the position to `pos`. A no-op if `pos` is not below the
    /// current position.
    pub fn pop_to(&mut self, pos: usize) {
        if pos < self.pos {
            self.pop(self.pos - pos);
        }
    }

    /// Rewind past every allocation.
    pub fn pop_clear(&mut self) {
        self.pop_to(HEADER_SIZE);
    }

    /// Run `f`, then rewind to the position before it ran.
    ///
    /// Everything `f` allocates is released in one step when it returns.
    pub fn scope<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let mark = self.pos;
        let result = f(self);
        self.pop_to(mark);
        result
    }

    /// Decommit whole chunks above the position, keeping the first chunk.
    fn shrink_commit(&mut self) {
        let reserve_size = self.config.reserve_size;
        let commit_size = self.config.commit_size;
        let keep = round_up_to_multiple(self.pos, commit_size)
            .map_or(reserve_size, |boundary| boundary.max(commit_size).min(reserve_size));
        if keep >= self.commit_pos {
            return;
        }

        let len = self.commit_pos - keep;
        match self.decommit_range(keep, len) {
            Ok(()) => tracing::trace!(from = self.commit_pos, to = keep, "arena commit shrunk"),
            // Treat the range as uncommitted either way: recommitting an
            // already committed range is harmless.
            Err(err) => tracing::warn!(offset = keep, len, error = %err, "arena decommit failed"),
        }
        self.commit_pos = keep;
    }

    /// Whether `handle` lies entirely below the current position.
    ///
    /// A handle made before a rewind past its allocation is not live. This
    /// is a bounds check only: it cannot tell handles from another arena,
    /// or a rewound handle whose range has since been reallocated.
    pub fn is_live(&self, handle: AllocHandle) -> bool {
        handle.offset >= HEADER_SIZE
            && handle
                .offset
                .checked_add(handle.len)
                .is_some_and(|end| end <= self.pos)
    }

    /// Borrow the bytes of an allocation.
    ///
    /// # Panics
    ///
    /// Panics if the handle is not [live](Self::is_live).
    pub fn bytes(&self, handle: AllocHandle) -> &[u8] {
        self.assert_live(handle);
        // SAFETY: live handles lie in HEADER_SIZE..pos, inside the committed
        // prefix; `&self` rules out mutable borrows.
        unsafe { raw::committed(self.base, handle.offset, handle.len) }
    }

    /// Mutably borrow the bytes of an allocation.
    ///
    /// # Panics
    ///
    /// Panics if the handle is not [live](Self::is_live).
    pub fn bytes_mut(&mut self, handle: AllocHandle) -> &mut [u8] {
        self.assert_live(handle);
        // SAFETY: as in `bytes`; `&mut self` rules out any other borrow.
        unsafe { raw::committed_mut(self.base, handle.offset, handle.len) }
    }

    fn assert_live(&self, handle: AllocHandle) {
        assert!(
            self.is_live(handle),
            "{handle} is outside the live region {HEADER_SIZE}..{}",
            self.pos,
        );
    }

    /// Release the reservation, reporting backend failure.
    ///
    /// Dropping the arena does the same but can only log a failure.
    ///
    /// # Errors
    ///
    /// [`ArenaError::ReleaseFailed`] if the backend refuses.
    pub fn destroy(mut self) -> Result<(), ArenaError> {
        self.release()
            .map_err(|source| ArenaError::ReleaseFailed { source })
    }

    fn release(&mut self) -> Result<(), BackendError> {
        let Some(reservation) = self.reservation.take() else {
            return Ok(());
        };
        tracing::debug!(
            reserve_size = self.config.reserve_size,
            committed = self.commit_pos,
            "arena released"
        );
        // SAFETY: the reservation came from `self.backend`, and every borrow
        // of it is tied to `self`, which is being torn down.
        unsafe { self.backend.release(reservation) }
    }

    /// Current bump position: offset of the next free byte (before alignment).
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// End of the committed prefix.
    pub fn commit_pos(&self) -> usize {
        self.commit_pos
    }

    /// Page-aligned reservation size: the allocation ceiling.
    pub fn reserve_size(&self) -> usize {
        self.config.reserve_size
    }

    /// Page-aligned commit chunk size.
    pub fn commit_size(&self) -> usize {
        self.config.commit_size
    }

    /// Bytes between the header and the position, including alignment padding.
    pub fn used(&self) -> usize {
        self.pos - HEADER_SIZE
    }

    /// Bytes between the position and the end of the reservation.
    pub fn remaining(&self) -> usize {
        self.config.reserve_size - self.pos
    }

    /// Bytes currently backed by physical memory.
    pub fn committed_bytes(&self) -> usize {
        self.commit_pos
    }

    /// The effective configuration, with sizes page aligned.
    pub fn config(&self) -> &ArenaConfig {
        &self.config
    }

    /// The backend this arena draws memory from.
    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl<B: MemoryBackend> Drop for Arena<B> {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            tracing::warn!(error = %err, "failed to release arena reservation on drop");
        }
    }
}

impl<B: MemoryBackend> fmt::Debug for Arena<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("reserve_size", &self.config.reserve_size)
            .field("commit_size", &self.config.commit_size)
            .field("pos", &self.pos)
            .field("commit_pos", &self.commit_pos)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::{kib, mib};
    use crate::backend::HeapMemory;

    fn arena(reserve: usize, commit: usize) -> Arena {
        Arena::with_config(ArenaConfig::new(reserve, commit).with_poison_unzeroed(false)).unwrap()
    }

    fn assert_invariants<B: MemoryBackend>(a: &Arena<B>) {
        assert!(HEADER_SIZE <= a.pos());
        assert!(a.pos() <= a.commit_pos());
        assert!(a.commit_pos() <= a.reserve_size());
        assert!(
            a.commit_pos() % a.commit_size() == 0 || a.commit_pos() == a.reserve_size(),
            "commit_pos {} is neither a chunk boundary nor the reservation end",
            a.commit_pos(),
        );
    }

    #[test]
    fn header_size_is_four_words_of_u64() {
        assert_eq!(HEADER_SIZE, 32);
    }

    #[test]
    fn create_starts_after_header_with_first_chunk_committed() {
        let a = arena(mib(1), kib(64));
        assert_eq!(a.pos(), HEADER_SIZE);
        assert_eq!(a.commit_pos(), kib(64));
        assert_eq!(a.reserve_size(), mib(1));
        assert_eq!(a.used(), 0);
        assert_invariants(&a);
    }

    #[test]
    fn create_rounds_sizes_to_pages() {
        let page = VirtualMemory::new().page_size();
        let a = arena(page * 3 + 1, 1);
        assert_eq!(a.reserve_size(), page * 4);
        assert_eq!(a.commit_size(), page);
        assert_eq!(a.commit_pos(), page);
    }

    #[test]
    fn commit_size_is_clamped_to_reservation() {
        let a = arena(kib(64), mib(1));
        assert_eq!(a.commit_size(), kib(64));
        assert_eq!(a.commit_pos(), a.reserve_size());
    }

    #[test]
    fn header_describes_the_reservation() {
        let a = arena(mib(1), kib(64));
        let header = a.header();
        assert!(header.is_valid());
        assert_eq!(header.reserve_size, mib(1) as u64);
        assert_eq!(header.commit_size, kib(64) as u64);
    }

    #[test]
    fn zero_sizes_are_invalid() {
        let err = Arena::new(0, kib(4)).unwrap_err();
        assert!(matches!(err, ArenaError::InvalidConfig { .. }));
        let err = Arena::new(kib(4), 0).unwrap_err();
        assert!(matches!(err, ArenaError::InvalidConfig { .. }));
    }

    #[test]
    fn overflowing_reserve_is_invalid() {
        let err = Arena::new(usize::MAX, kib(4)).unwrap_err();
        assert!(matches!(err, ArenaError::InvalidConfig { .. }));
    }

    #[test]
    fn reservation_smaller_than_header_is_invalid() {
        let err = Arena::with_config_in(ArenaConfig::fixed(16), HeapMemory::new()).unwrap_err();
        assert!(matches!(err, ArenaError::InvalidConfig { .. }));
    }

    #[test]
    fn push_returns_word_aligned_offsets_and_addresses() {
        let mut a = arena(mib(1), kib(64));
        for size in [1, 3, 7, 8, 13, 100, 0, 5] {
            let h = a.push(size, Zeroing::Zeroed).unwrap();
            assert_eq!(h.offset() % ARENA_ALIGN, 0);
            assert_eq!(a.bytes(h).as_ptr() as usize % ARENA_ALIGN, 0);
            assert_eq!(a.bytes(h).len(), size);
        }
        assert_invariants(&a);
    }

    #[test]
    fn first_push_lands_right_after_header() {
        let mut a = arena(mib(1), kib(64));
        let h = a.push(10, Zeroing::Zeroed).unwrap();
        assert_eq!(h.offset(), HEADER_SIZE);
        assert_eq!(a.pos(), HEADER_SIZE + 10);
    }

    #[test]
    fn zeroed_push_reads_zero_over_stale_bytes() {
        let mut a = arena(mib(1), kib(64));
        let h = a.push(256, Zeroing::Zeroed).unwrap();
        a.bytes_mut(h).fill(0xFF);
        a.pop(256);
        let h2 = a.push(256, Zeroing::Zeroed).unwrap();
        assert_eq!(h2, h);
        assert!(a.bytes(h2).iter().all(|&b| b == 0));
    }

    #[test]
    fn overwrite_push_may_expose_stale_bytes() {
        let mut a = arena(mib(1), kib(64));
        let h = a.push(64, Zeroing::Zeroed).unwrap();
        a.bytes_mut(h).fill(0x5A);
        a.pop(64);
        let h2 = a.push(64, Zeroing::Overwrite).unwrap();
        assert_eq!(h2.offset(), h.offset());
        assert!(a.bytes(h2).iter().all(|&b| b == 0x5A));
    }

    #[test]
    fn poisoning_fills_overwrite_regions() {
        let config = ArenaConfig::new(mib(1), kib(64)).with_poison_unzeroed(true);
        let mut a = Arena::with_config(config).unwrap();
        let h = a.push(48, Zeroing::Overwrite).unwrap();
        assert!(a.bytes(h).iter().all(|&b| b == POISON_BYTE));
        let z = a.push(48, Zeroing::Zeroed).unwrap();
        assert!(a.bytes(z).iter().all(|&b| b == 0));
    }

    #[test]
    fn push_bytes_borrows_the_new_region() {
        let mut a = arena(mib(1), kib(64));
        let bytes = a.push_bytes(5, Zeroing::Zeroed).unwrap();
        bytes.copy_from_slice(b"hello");
        let pos = a.pos();
        assert_eq!(pos, HEADER_SIZE + 5);
    }

    #[test]
    fn growth_commits_in_chunk_multiples() {
        let mut a = arena(mib(1), kib(64));
        a.push(kib(64), Zeroing::Overwrite).unwrap();
        assert_eq!(a.commit_pos(), kib(128));
        // One push spanning several chunks commits them together.
        a.push(kib(200), Zeroing::Overwrite).unwrap();
        assert_eq!(a.commit_pos(), kib(320));
        assert_invariants(&a);
    }

    #[test]
    fn growth_clamps_at_reservation_end() {
        let page = VirtualMemory::new().page_size();
        // Reservation of 5 pages in 2-page chunks: the last chunk is short.
        let mut a = arena(page * 5, page * 2);
        a.push(page * 5 - HEADER_SIZE, Zeroing::Zeroed).unwrap();
        assert_eq!(a.commit_pos(), page * 5);
        assert_eq!(a.remaining(), 0);
        assert_invariants(&a);
    }

    #[test]
    fn capacity_exceeded_leaves_state_unchanged() {
        let mut a = arena(kib(64), kib(16));
        a.push(1000, Zeroing::Zeroed).unwrap();
        let (pos, commit_pos) = (a.pos(), a.commit_pos());

        let err = a.try_push(kib(64), Zeroing::Zeroed).unwrap_err();
        let aligned = align_up(pos, ARENA_ALIGN).unwrap();
        assert_eq!(
            err,
            ArenaError::CapacityExceeded {
                requested: kib(64),
                available: kib(64) - aligned,
            }
        );
        assert_eq!(a.pos(), pos);
        assert_eq!(a.commit_pos(), commit_pos);
    }

    #[test]
    fn size_overflow_is_capacity_exceeded() {
        let mut a = arena(kib(64), kib(16));
        let err = a.try_push(usize::MAX, Zeroing::Zeroed).unwrap_err();
        assert!(matches!(err, ArenaError::CapacityExceeded { .. }));
        assert_eq!(a.pos(), HEADER_SIZE);
    }

    #[test]
    #[should_panic(expected = "arena capacity exceeded")]
    fn push_panics_when_arena_is_undersized() {
        let mut a = arena(kib(64), kib(16));
        let _ = a.push(kib(64), Zeroing::Zeroed);
    }

    #[test]
    fn pop_is_clamped_at_header() {
        let mut a = arena(mib(1), kib(64));
        a.push(100, Zeroing::Zeroed).unwrap();
        a.pop(usize::MAX);
        assert_eq!(a.pos(), HEADER_SIZE);
        assert_invariants(&a);
    }

    #[test]
    fn pop_keeps_committed_memory() {
        let mut a = arena(mib(1), kib(64));
        a.push(kib(100), Zeroing::Zeroed).unwrap();
        let committed = a.commit_pos();
        a.pop_clear();
        assert_eq!(a.commit_pos(), committed);
    }

    #[test]
    fn pop_to_never_grows() {
        let mut a = arena(mib(1), kib(64));
        a.push(100, Zeroing::Zeroed).unwrap();
        let pos = a.pos();
        a.pop_to(pos + 1000);
        assert_eq!(a.pos(), pos);
        a.pop_to(0);
        assert_eq!(a.pos(), HEADER_SIZE);
    }

    #[test]
    fn pop_clear_resets_deterministically() {
        let mut a = arena(mib(1), kib(64));
        let first = a.push(40, Zeroing::Zeroed).unwrap();
        a.push(1000, Zeroing::Zeroed).unwrap();
        a.push(3, Zeroing::Zeroed).unwrap();
        a.pop_clear();
        let again = a.push(40, Zeroing::Zeroed).unwrap();
        assert_eq!(again, first);
    }

    #[test]
    fn pop_to_saved_position_reuses_region() {
        let mut a = arena(mib(1), kib(64));
        a.push(100, Zeroing::Zeroed).unwrap();
        let pos0 = a.pos();
        let second = a.push(200, Zeroing::Zeroed).unwrap();
        a.bytes_mut(second).fill(0xEE);
        a.pop_to(pos0);
        let third = a.push(50, Zeroing::Zeroed).unwrap();
        assert_eq!(third.offset(), second.offset());
        assert!(a.bytes(third).iter().all(|&b| b == 0));
    }

    #[test]
    fn scope_rewinds_on_return() {
        let mut a = arena(mib(1), kib(64));
        a.push(8, Zeroing::Zeroed).unwrap();
        let before = a.pos();
        let len = a.scope(|a| {
            a.push(500, Zeroing::Zeroed).unwrap();
            a.push(500, Zeroing::Zeroed).unwrap();
            a.used()
        });
        assert!(len >= 1008);
        assert_eq!(a.pos(), before);
    }

    #[test]
    fn rewound_handles_are_not_live() {
        let mut a = arena(mib(1), kib(64));
        let keep = a.push(16, Zeroing::Zeroed).unwrap();
        let gone = a.push(16, Zeroing::Zeroed).unwrap();
        a.pop(16);
        assert!(a.is_live(keep));
        assert!(!a.is_live(gone));
        assert!(!a.is_live(AllocHandle::new(0, 8)));
    }

    #[test]
    #[should_panic(expected = "outside the live region")]
    fn resolving_a_rewound_handle_panics() {
        let mut a = arena(mib(1), kib(64));
        let h = a.push(16, Zeroing::Zeroed).unwrap();
        a.pop_clear();
        let _ = a.bytes(h);
    }

    #[test]
    fn decommit_on_pop_shrinks_to_chunk_above_position() {
        let config = ArenaConfig::new(mib(1), kib(64))
            .with_decommit_on_pop(true)
            .with_poison_unzeroed(false);
        let mut a = Arena::with_config(config).unwrap();
        a.push(kib(100), Zeroing::Overwrite).unwrap();
        let mark = a.pos();
        a.push(kib(300), Zeroing::Overwrite).unwrap();
        assert_eq!(a.commit_pos(), kib(448));

        a.pop_to(mark);
        assert_eq!(a.commit_pos(), kib(128));
        assert_invariants(&a);

        a.pop_clear();
        assert_eq!(a.commit_pos(), kib(64));
        assert_invariants(&a);

        // Regrowth recommits and hands back zeroed memory.
        let h = a.push(kib(200), Zeroing::Zeroed).unwrap();
        assert!(a.bytes(h).iter().all(|&b| b == 0));
        assert_eq!(a.commit_pos(), kib(256));
    }

    /// Heap memory reporting byte-granular pages.
    #[derive(Default)]
    struct BytePages(HeapMemory);

    // SAFETY: forwards to `HeapMemory`; only `page_size` differs.
    unsafe impl MemoryBackend for BytePages {
        fn page_size(&self) -> usize {
            1
        }

        fn reserve(&mut self, size: usize) -> Result<Reservation, BackendError> {
            self.0.reserve(size)
        }

        unsafe fn commit(
            &mut self,
            r: &Reservation,
            offset: usize,
            len: usize,
        ) -> Result<(), BackendError> {
            // SAFETY: forwarded from the caller.
            unsafe { self.0.commit(r, offset, len) }
        }

        unsafe fn decommit(
            &mut self,
            r: &Reservation,
            offset: usize,
            len: usize,
        ) -> Result<(), BackendError> {
            // SAFETY: forwarded from the caller.
            unsafe { self.0.decommit(r, offset, len) }
        }

        unsafe fn release(&mut self, r: Reservation) -> Result<(), BackendError> {
            // SAFETY: forwarded from the caller.
            unsafe { self.0.release(r) }
        }
    }

    #[test]
    fn sub_word_pages_still_give_word_aligned_sizes() {
        let config = ArenaConfig::new(37, 37).with_poison_unzeroed(false);
        let mut a = Arena::with_config_in(config, BytePages::default()).unwrap();
        assert_eq!(a.reserve_size(), 40);
        assert_eq!(a.commit_size(), 40);

        a.try_push(5, Zeroing::Zeroed).unwrap();
        assert_eq!(a.pos(), 37);
        let err = a.try_push(1, Zeroing::Zeroed).unwrap_err();
        assert_eq!(
            err,
            ArenaError::CapacityExceeded {
                requested: 1,
                available: 0,
            }
        );
        assert_eq!(a.pos(), 37);
        assert_invariants(&a);
    }

    #[test]
    fn zero_byte_push_on_a_full_arena_sits_one_past_the_end() {
        let mut a = Arena::with_config_in(ArenaConfig::fixed(64), HeapMemory::new()).unwrap();
        a.push(64 - HEADER_SIZE, Zeroing::Zeroed).unwrap();
        let h = a.push(0, Zeroing::Zeroed).unwrap();
        assert_eq!(h.offset(), a.reserve_size());
        assert!(h.is_empty());
        assert!(a.is_live(h));
        assert!(a.bytes(h).is_empty());
        assert!(a.try_push(1, Zeroing::Zeroed).is_err());
    }

    #[test]
    fn destroy_releases_the_reservation() {
        let a = arena(mib(1), kib(64));
        assert!(a.destroy().is_ok());
    }

    #[test]
    fn arena_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<Arena>();
        assert_send::<Arena<HeapMemory>>();
    }

    #[test]
    fn arenas_on_separate_threads_are_independent() {
        let handles: Vec<_> = (0..4u8)
            .map(|i| {
                std::thread::spawn(move || {
                    let mut a = arena(mib(1), kib(64));
                    let h = a.push(1024, Zeroing::Zeroed).unwrap();
                    a.bytes_mut(h).fill(i);
                    a.bytes(h).iter().all(|&b| b == i)
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
    }

    #[cfg(not(miri))]
    mod proptests {
        use super::*;
        use proptest::prelude::*;

        #[derive(Clone, Debug)]
        enum Op {
            Push(usize, bool),
            Pop(usize),
            PopTo(usize),
            Clear,
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![
                4 => (0usize..20_000, any::<bool>()).prop_map(|(n, z)| Op::Push(n, z)),
                2 => (0usize..30_000).prop_map(Op::Pop),
                1 => (0usize..300_000).prop_map(Op::PopTo),
                1 => Just(Op::Clear),
            ]
        }

        fn run(decommit: bool, ops: &[Op]) -> Result<(), TestCaseError> {
            let config = ArenaConfig::new(kib(256), kib(16))
                .with_decommit_on_pop(decommit)
                .with_poison_unzeroed(false);
            let mut a = Arena::with_config(config).unwrap();
            let mut max_commit = a.commit_pos();
            for op in ops {
                let before = (a.pos(), a.commit_pos());
                match *op {
                    Op::Push(n, zeroed) => {
                        let zeroing = if zeroed { Zeroing::Zeroed } else { Zeroing::Overwrite };
                        match a.try_push(n, zeroing) {
                            Ok(h) => {
                                prop_assert_eq!(h.offset() % ARENA_ALIGN, 0);
                                prop_assert!(h.offset() >= HEADER_SIZE);
                                prop_assert_eq!(h.end(), a.pos());
                                if zeroed {
                                    prop_assert!(a.bytes(h).iter().all(|&b| b == 0));
                                }
                            }
                            Err(ArenaError::CapacityExceeded { .. }) => {
                                prop_assert_eq!((a.pos(), a.commit_pos()), before);
                            }
                            Err(other) => return Err(TestCaseError::fail(other.to_string())),
                        }
                    }
                    Op::Pop(n) => a.pop(n),
                    Op::PopTo(p) => a.pop_to(p),
                    Op::Clear => a.pop_clear(),
                }
                prop_assert!(HEADER_SIZE <= a.pos());
                prop_assert!(a.pos() <= a.commit_pos());
                prop_assert!(a.commit_pos() <= a.reserve_size());
                prop_assert!(
                    a.commit_pos() % a.commit_size() == 0 || a.commit_pos() == a.reserve_size()
                );
                if !decommit {
                    prop_assert!(a.commit_pos() >= max_commit);
                    max_commit = a.commit_pos();
                }
            }
            Ok(())
        }

        proptest! {
            #[test]
            fn invariants_hold_over_random_ops(ops in proptest::collection::vec(op(), 1..60)) {
                run(false, &ops)?;
            }

            #[test]
            fn invariants_hold_with_decommit_on_pop(ops in proptest::collection::vec(op(), 1..60)) {
                run(true, &ops)?;
            }
        }
    }
}
