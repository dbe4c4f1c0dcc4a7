//! Arena and backend error types.

use std::error::Error;
use std::fmt;

/// The backend operation that failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendOp {
    /// Claiming address space.
    Reserve,
    /// Backing a reserved range with physical memory.
    Commit,
    /// Stripping physical backing from a committed range.
    Decommit,
    /// Returning a whole reservation to the system.
    Release,
}

impl fmt::Display for BackendOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Reserve => "reserve",
            Self::Commit => "commit",
            Self::Decommit => "decommit",
            Self::Release => "release",
        })
    }
}

/// Why a backend operation failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendErrorKind {
    /// The operating system (or allocator) refused the request.
    Refused,
    /// The requested range is not inside the reservation.
    OutOfRange,
    /// The requested size cannot be expressed as an allocation layout.
    InvalidSize,
}

/// A failed call into a [`MemoryBackend`](crate::backend::MemoryBackend).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendError {
    /// Which operation failed.
    pub op: BackendOp,
    /// Failure category.
    pub kind: BackendErrorKind,
    /// Raw OS error code (`errno` / `GetLastError`), when one was reported.
    pub os_code: Option<i32>,
}

impl BackendError {
    /// A refusal carrying the calling thread's last OS error.
    pub fn last_os_error(op: BackendOp) -> Self {
        Self {
            op,
            kind: BackendErrorKind::Refused,
            os_code: std::io::Error::last_os_error().raw_os_error(),
        }
    }

    /// A refusal with no OS error code (e.g. the global allocator returned null).
    pub fn refused(op: BackendOp) -> Self {
        Self {
            op,
            kind: BackendErrorKind::Refused,
            os_code: None,
        }
    }

    /// A range that falls outside its reservation.
    pub fn out_of_range(op: BackendOp) -> Self {
        Self {
            op,
            kind: BackendErrorKind::OutOfRange,
            os_code: None,
        }
    }

    /// A size that no allocation layout can describe.
    pub fn invalid_size(op: BackendOp) -> Self {
        Self {
            op,
            kind: BackendErrorKind::InvalidSize,
            os_code: None,
        }
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            BackendErrorKind::Refused => write!(f, "{} refused by the system", self.op)?,
            BackendErrorKind::OutOfRange => {
                write!(f, "{} range lies outside the reservation", self.op)?
            }
            BackendErrorKind::InvalidSize => write!(f, "{} size is not representable", self.op)?,
        }
        if let Some(code) = self.os_code {
            write!(f, " (os error {code})")?;
        }
        Ok(())
    }
}

impl Error for BackendError {}

/// Errors that can occur during arena operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArenaError {
    /// The backend could not reserve the arena's address space.
    ReservationFailed {
        /// Bytes of address space requested (page aligned).
        requested: usize,
        /// The underlying backend failure.
        source: BackendError,
    },
    /// The backend could not back a range with physical memory, either the
    /// initial chunk at creation or a growth step during a push.
    CommitFailed {
        /// Offset of the range from the arena base.
        offset: usize,
        /// Length of the range in bytes.
        len: usize,
        /// The underlying backend failure.
        source: BackendError,
    },
    /// An allocation would run past the end of the reservation.
    CapacityExceeded {
        /// Number of bytes requested.
        requested: usize,
        /// Bytes available between the aligned position and the end of the
        /// reservation.
        available: usize,
    },
    /// The backend could not release the reservation.
    ReleaseFailed {
        /// The underlying backend failure.
        source: BackendError,
    },
    /// The arena configuration was rejected at construction.
    InvalidConfig {
        /// Human-readable explanation.
        reason: String,
    },
}

impl fmt::Display for ArenaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReservationFailed { requested, source } => {
                write!(f, "failed to reserve {requested} bytes: {source}")
            }
            Self::CommitFailed {
                offset,
                len,
                source,
            } => {
                write!(
                    f,
                    "failed to commit {len} bytes at offset {offset}: {source}"
                )
            }
            Self::CapacityExceeded {
                requested,
                available,
            } => {
                write!(
                    f,
                    "arena capacity exceeded: requested {requested} bytes, {available} bytes available"
                )
            }
            Self::ReleaseFailed { source } => {
                write!(f, "failed to release arena reservation: {source}")
            }
            Self::InvalidConfig { reason } => write!(f, "invalid arena config: {reason}"),
        }
    }
}

impl Error for ArenaError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::ReservationFailed { source, .. }
            | Self::CommitFailed { source, .. }
            | Self::ReleaseFailed { source } => Some(source),
            _ => None,
        }
    }
}
