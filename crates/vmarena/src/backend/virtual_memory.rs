//! Operating-system virtual memory backend.
//!
//! Reservations are address space with no access rights; commits grant
//! read/write access, and the kernel supplies zeroed physical pages on
//! first touch.
//!
//! | Operation | Unix | Windows |
//! |-----------|------|---------|
//! | reserve   | `mmap(PROT_NONE, MAP_PRIVATE \| MAP_ANONYMOUS)` | `VirtualAlloc(MEM_RESERVE, PAGE_NOACCESS)` |
//! | commit    | `mprotect(PROT_READ \| PROT_WRITE)` | `VirtualAlloc(MEM_COMMIT, PAGE_READWRITE)` |
//! | decommit  | `mprotect(PROT_NONE)` + `madvise(MADV_DONTNEED)` | `VirtualFree(MEM_DECOMMIT)` |
//! | release   | `munmap` | `VirtualFree(MEM_RELEASE)` |

#[cfg(not(any(unix, windows)))]
compile_error!("vmarena's virtual memory backend supports Unix and Windows targets only");

use super::{MemoryBackend, Reservation};
use crate::error::{BackendError, BackendOp};

/// Page size assumed when the system cannot be queried.
const FALLBACK_PAGE_SIZE: usize = 4096;

/// Backend over the operating system's virtual memory primitives.
///
/// The page size is queried once at construction.
#[derive(Clone, Copy, Debug)]
pub struct VirtualMemory {
    page_size: usize,
}

impl VirtualMemory {
    /// Create a backend, querying the system page size.
    pub fn new() -> Self {
        let page_size = match sys::page_size() {
            Some(size) if size.is_power_of_two() => size,
            other => {
                tracing::warn!(
                    reported = ?other,
                    fallback = FALLBACK_PAGE_SIZE,
                    "system page size unavailable, using fallback"
                );
                FALLBACK_PAGE_SIZE
            }
        };
        Self { page_size }
    }
}

impl Default for VirtualMemory {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: reservations come from fresh anonymous mappings, page aligned
// (so at least `ARENA_ALIGN` aligned) and disjoint from every other live
// mapping. Committed pages are readable/writable and zero-filled on first
// touch; re-committing only re-applies the same protection. Release unmaps
// the whole range.
unsafe impl MemoryBackend for VirtualMemory {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn reserve(&mut self, size: usize) -> Result<Reservation, BackendError> {
        if size == 0 {
            return Err(BackendError::invalid_size(BackendOp::Reserve));
        }
        let base = sys::reserve(size).ok_or_else(|| BackendError::last_os_error(BackendOp::Reserve))?;
        // SAFETY: `base` is a fresh mapping of `size` bytes owned by no one else.
        Ok(unsafe { Reservation::from_raw_parts(base, size) })
    }

    unsafe fn commit(
        &mut self,
        reservation: &Reservation,
        offset: usize,
        len: usize,
    ) -> Result<(), BackendError> {
        reservation.check_range(BackendOp::Commit, offset, len)?;
        if len == 0 {
            return Ok(());
        }
        // SAFETY: the range was checked against a reservation made by this
        // backend.
        let ptr = unsafe { reservation.base().as_ptr().add(offset) };
        // SAFETY: `ptr..ptr + len` is inside our mapping; chunk sizes are
        // page multiples, so the range is page aligned.
        if unsafe { sys::commit(ptr, len) } {
            Ok(())
        } else {
            Err(BackendError::last_os_error(BackendOp::Commit))
        }
    }

    unsafe fn decommit(
        &mut self,
        reservation: &Reservation,
        offset: usize,
        len: usize,
    ) -> Result<(), BackendError> {
        reservation.check_range(BackendOp::Decommit, offset, len)?;
        if len == 0 {
            return Ok(());
        }
        // SAFETY: as in `commit`; the caller holds no references into it.
        let ptr = unsafe { reservation.base().as_ptr().add(offset) };
        // SAFETY: as above.
        if unsafe { sys::decommit(ptr, len) } {
            Ok(())
        } else {
            Err(BackendError::last_os_error(BackendOp::Decommit))
        }
    }

    unsafe fn release(&mut self, reservation: Reservation) -> Result<(), BackendError> {
        // SAFETY: the caller guarantees the reservation is ours and unused.
        if unsafe { sys::release(reservation.base().as_ptr(), reservation.len()) } {
            Ok(())
        } else {
            Err(BackendError::last_os_error(BackendOp::Release))
        }
    }
}

#[cfg(unix)]
mod sys {
    use std::ptr::{self, NonNull};

    pub(super) fn page_size() -> Option<usize> {
        // SAFETY: `sysconf` has no preconditions.
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        usize::try_from(size).ok().filter(|&s| s > 0)
    }

    pub(super) fn reserve(size: usize) -> Option<NonNull<u8>> {
        // SAFETY: an anonymous private mapping at a kernel-chosen address
        // cannot alias existing memory.
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_NONE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return None;
        }
        NonNull::new(ptr.cast())
    }

    pub(super) unsafe fn commit(ptr: *mut u8, len: usize) -> bool {
        // SAFETY: caller passes a page-aligned range inside one of our mappings.
        unsafe { libc::mprotect(ptr.cast(), len, libc::PROT_READ | libc::PROT_WRITE) == 0 }
    }

    pub(super) unsafe fn decommit(ptr: *mut u8, len: usize) -> bool {
        // SAFETY: caller passes a page-aligned range inside one of our mappings.
        unsafe {
            libc::mprotect(ptr.cast(), len, libc::PROT_NONE) == 0
                && libc::madvise(ptr.cast(), len, libc::MADV_DONTNEED) == 0
        }
    }

    pub(super) unsafe fn release(ptr: *mut u8, len: usize) -> bool {
        // SAFETY: caller passes a whole mapping created by `reserve`.
        unsafe { libc::munmap(ptr.cast(), len) == 0 }
    }
}

#[cfg(windows)]
mod sys {
    use std::ptr::{self, NonNull};

    use windows_sys::Win32::System::Memory::{
        VirtualAlloc, VirtualFree, MEM_COMMIT, MEM_DECOMMIT, MEM_RELEASE, MEM_RESERVE,
        PAGE_NOACCESS, PAGE_READWRITE,
    };
    use windows_sys::Win32::System::SystemInformation::{GetSystemInfo, SYSTEM_INFO};

    pub(super) fn page_size() -> Option<usize> {
        // SAFETY: SYSTEM_INFO is plain data; GetSystemInfo fills it in.
        let info = unsafe {
            let mut info: SYSTEM_INFO = std::mem::zeroed();
            GetSystemInfo(&mut info);
            info
        };
        usize::try_from(info.dwPageSize).ok().filter(|&s| s > 0)
    }

    pub(super) fn reserve(size: usize) -> Option<NonNull<u8>> {
        // SAFETY: a reservation at a system-chosen address cannot alias
        // existing memory.
        let ptr = unsafe { VirtualAlloc(ptr::null(), size, MEM_RESERVE, PAGE_NOACCESS) };
        NonNull::new(ptr.cast())
    }

    pub(super) unsafe fn commit(ptr: *mut u8, len: usize) -> bool {
        // SAFETY: caller passes a range inside one of our reservations.
        unsafe { !VirtualAlloc(ptr.cast_const().cast(), len, MEM_COMMIT, PAGE_READWRITE).is_null() }
    }

    pub(super) unsafe fn decommit(ptr: *mut u8, len: usize) -> bool {
        // SAFETY: caller passes a range inside one of our reservations.
        unsafe { VirtualFree(ptr.cast(), len, MEM_DECOMMIT) != 0 }
    }

    pub(super) unsafe fn release(ptr: *mut u8, _len: usize) -> bool {
        // SAFETY: caller passes the base of a reservation; MEM_RELEASE
        // requires a zero size and frees the whole region.
        unsafe { VirtualFree(ptr.cast(), 0, MEM_RELEASE) != 0 }
    }
}
