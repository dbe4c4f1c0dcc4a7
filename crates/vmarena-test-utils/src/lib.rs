//! Instrumented memory backends for vmarena development.
//!
//! [`CountingBackend`] records every call it forwards, so tests can assert
//! exactly how many commits an allocation pattern caused.
//! [`FaultyBackend`] injects failures into chosen calls, so tests can drive
//! the arena's error paths without exhausting real memory. They compose:
//! `CountingBackend<FaultyBackend<HeapMemory>>` counts injected failures too.

#![deny(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use vmarena::{BackendError, BackendOp, MemoryBackend, Reservation};

#[derive(Debug, Default)]
struct Counters {
    reserve: AtomicUsize,
    commit: AtomicUsize,
    decommit: AtomicUsize,
    release: AtomicUsize,
    committed_bytes: AtomicUsize,
    decommitted_bytes: AtomicUsize,
}

/// Snapshot of the calls a [`CountingBackend`] has seen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BackendCalls {
    pub reserve: usize,
    pub commit: usize,
    pub decommit: usize,
    pub release: usize,
    /// Total length passed to successful commits.
    pub committed_bytes: usize,
    /// Total length passed to successful decommits.
    pub decommitted_bytes: usize,
}

/// Shared view of a [`CountingBackend`]'s counters.
///
/// Outlives the backend, so it can be read after the arena owning the
/// backend has been dropped or has failed to construct.
#[derive(Clone, Debug, Default)]
pub struct CallLog {
    counters: Arc<Counters>,
}

impl CallLog {
    pub fn snapshot(&self) -> BackendCalls {
        let c = &self.counters;
        BackendCalls {
            reserve: c.reserve.load(Ordering::Relaxed),
            commit: c.commit.load(Ordering::Relaxed),
            decommit: c.decommit.load(Ordering::Relaxed),
            release: c.release.load(Ordering::Relaxed),
            committed_bytes: c.committed_bytes.load(Ordering::Relaxed),
            decommitted_bytes: c.decommitted_bytes.load(Ordering::Relaxed),
        }
    }

    /// Number of commit calls, failed ones included.
    pub fn commits(&self) -> usize {
        self.counters.commit.load(Ordering::Relaxed)
    }

    /// Number of release calls.
    pub fn releases(&self) -> usize {
        self.counters.release.load(Ordering::Relaxed)
    }
}

/// Forwards to an inner backend, counting each call.
#[derive(Debug)]
pub struct CountingBackend<B> {
    inner: B,
    log: CallLog,
}

impl<B: MemoryBackend> CountingBackend<B> {
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            log: CallLog::default(),
        }
    }

    /// A handle to the counters, valid after the backend is gone.
    pub fn log(&self) -> CallLog {
        self.log.clone()
    }

    pub fn calls(&self) -> BackendCalls {
        self.log.snapshot()
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }
}

fn bump(counter: &AtomicUsize, by: usize) {
    counter.fetch_add(by, Ordering::Relaxed);
}

// SAFETY: every call is forwarded unchanged to `inner`, which upholds the
// trait contract; reservations are exactly the ones `inner` produced.
#[allow(unsafe_code)]
unsafe impl<B: MemoryBackend> MemoryBackend for CountingBackend<B> {
    fn page_size(&self) -> usize {
        self.inner.page_size()
    }

    fn reserve(&mut self, size: usize) -> Result<Reservation, BackendError> {
        bump(&self.log.counters.reserve, 1);
        self.inner.reserve(size)
    }

    unsafe fn commit(
        &mut self,
        reservation: &Reservation,
        offset: usize,
        len: usize,
    ) -> Result<(), BackendError> {
        bump(&self.log.counters.commit, 1);
        // SAFETY: forwarded from our caller's contract.
        unsafe { self.inner.commit(reservation, offset, len) }?;
        bump(&self.log.counters.committed_bytes, len);
        Ok(())
    }

    unsafe fn decommit(
        &mut self,
        reservation: &Reservation,
        offset: usize,
        len: usize,
    ) -> Result<(), BackendError> {
        bump(&self.log.counters.decommit, 1);
        // SAFETY: forwarded from our caller's contract.
        unsafe { self.inner.decommit(reservation, offset, len) }?;
        bump(&self.log.counters.decommitted_bytes, len);
        Ok(())
    }

    unsafe fn release(&mut self, reservation: Reservation) -> Result<(), BackendError> {
        bump(&self.log.counters.release, 1);
        // SAFETY: forwarded from our caller's contract.
        unsafe { self.inner.release(reservation) }
    }
}

/// Which calls a [`FaultyBackend`] should refuse.
///
/// Call numbers are 1-based and count every call of that kind, so
/// `fail_commit_at: Some(2)` lets the initial commit through and refuses
/// the first growth.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Faults {
    pub fail_reserve: bool,
    pub fail_commit_at: Option<usize>,
    pub fail_decommit: bool,
    /// Refusing a release leaks the reservation.
    pub fail_release: bool,
}

impl Faults {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn reserve() -> Self {
        Self {
            fail_reserve: true,
            ..Self::default()
        }
    }

    pub fn commit_at(call: usize) -> Self {
        Self {
            fail_commit_at: Some(call),
            ..Self::default()
        }
    }

    pub fn decommit() -> Self {
        Self {
            fail_decommit: true,
            ..Self::default()
        }
    }

    pub fn release() -> Self {
        Self {
            fail_release: true,
            ..Self::default()
        }
    }
}

/// Forwards to an inner backend, refusing the calls named by [`Faults`].
///
/// A refused call returns [`BackendError::refused`] without reaching the
/// inner backend.
#[derive(Debug)]
pub struct FaultyBackend<B> {
    inner: B,
    faults: Faults,
    commits_seen: usize,
}

impl<B: MemoryBackend> FaultyBackend<B> {
    pub fn new(inner: B, faults: Faults) -> Self {
        Self {
            inner,
            faults,
            commits_seen: 0,
        }
    }

    pub fn faults(&self) -> Faults {
        self.faults
    }
}

// SAFETY: every call is either refused before touching memory or
// forwarded unchanged to `inner`.
#[allow(unsafe_code)]
unsafe impl<B: MemoryBackend> MemoryBackend for FaultyBackend<B> {
    fn page_size(&self) -> usize {
        self.inner.page_size()
    }

    fn reserve(&mut self, size: usize) -> Result<Reservation, BackendError> {
        if self.faults.fail_reserve {
            return Err(BackendError::refused(BackendOp::Reserve));
        }
        self.inner.reserve(size)
    }

    unsafe fn commit(
        &mut self,
        reservation: &Reservation,
        offset: usize,
        len: usize,
    ) -> Result<(), BackendError> {
        self.commits_seen += 1;
        if self.faults.fail_commit_at == Some(self.commits_seen) {
            return Err(BackendError::refused(BackendOp::Commit));
        }
        // SAFETY: forwarded from our caller's contract.
        unsafe { self.inner.commit(reservation, offset, len) }
    }

    unsafe fn decommit(
        &mut self,
        reservation: &Reservation,
        offset: usize,
        len: usize,
    ) -> Result<(), BackendError> {
        if self.faults.fail_decommit {
            return Err(BackendError::refused(BackendOp::Decommit));
        }
        // SAFETY: forwarded from our caller's contract.
        unsafe { self.inner.decommit(reservation, offset, len) }
    }

    unsafe fn release(&mut self, reservation: Reservation) -> Result<(), BackendError> {
        if self.faults.fail_release {
            std::mem::forget(reservation);
            return Err(BackendError::refused(BackendOp::Release));
        }
        // SAFETY: forwarded from our caller's contract.
        unsafe { self.inner.release(reservation) }
    }
}
