//! Allocation handles.
//!
//! An arena hands out offsets, not pointers. An [`AllocHandle`] records
//! where an allocation lives relative to the arena base; the arena resolves
//! it to a slice in O(1), checking it against the current position, so a
//! handle rewound past by `pop` cannot be resolved.

use std::fmt;
use std::marker::PhantomData;

/// Byte range of one allocation within an arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[must_use]
pub struct AllocHandle {
    /// Offset of the first byte from the arena base. Word aligned. Below
    /// `reserve_size`, except for an empty allocation on a full arena,
    /// which sits exactly at it.
    pub(crate) offset: usize,
    /// Length of the allocation in bytes.
    pub(crate) len: usize,
}

impl AllocHandle {
    pub(crate) fn new(offset: usize, len: usize) -> Self {
        Self { offset, len }
    }

    /// Offset of the first byte from the arena base.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Length of the allocation in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether this is a zero-length allocation.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Offset one past the last byte.
    pub fn end(&self) -> usize {
        self.offset + self.len
    }
}

impl fmt::Display for AllocHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AllocHandle(off={}, len={})", self.offset, self.len)
    }
}

/// Handle to a single `T` allocated with [`Arena::push_value`](crate::Arena::push_value).
#[must_use]
pub struct ValueHandle<T> {
    pub(crate) raw: AllocHandle,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ValueHandle<T> {
    pub(crate) fn new(raw: AllocHandle) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    /// The untyped byte range.
    pub fn raw(&self) -> AllocHandle {
        self.raw
    }
}

/// Handle to `len` contiguous `T`s allocated with
/// [`Arena::push_array`](crate::Arena::push_array).
#[must_use]
pub struct ArrayHandle<T> {
    pub(crate) raw: AllocHandle,
    len: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ArrayHandle<T> {
    pub(crate) fn new(raw: AllocHandle, len: usize) -> Self {
        Self {
            raw,
            len,
            _marker: PhantomData,
        }
    }

    /// The untyped byte range.
    pub fn raw(&self) -> AllocHandle {
        self.raw
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the array has no elements.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

// Manual impls: the derives would demand the same traits of `T`.

impl<T> Clone for ValueHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ValueHandle<T> {}

impl<T> PartialEq for ValueHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T> Eq for ValueHandle<T> {}

impl<T> fmt::Debug for ValueHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueHandle")
            .field("type", &std::any::type_name::<T>())
            .field("offset", &self.raw.offset)
            .finish()
    }
}

impl<T> Clone for ArrayHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ArrayHandle<T> {}

impl<T> PartialEq for ArrayHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw && self.len == other.len
    }
}

impl<T> Eq for ArrayHandle<T> {}

impl<T> fmt::Debug for ArrayHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayHandle")
            .field("type", &std::any::type_name::<T>())
            .field("offset", &self.raw.offset)
            .field("len", &self.len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_handle_accessors() {
        let h = AllocHandle::new(32, 100);
        assert_eq!(h.offset(), 32);
        assert_eq!(h.len(), 100);
        assert_eq!(h.end(), 132);
        assert!(!h.is_empty());
        assert_eq!(h.to_string(), "AllocHandle(off=32, len=100)");
    }

    #[test]
    fn empty_handle() {
        assert!(AllocHandle::new(40, 0).is_empty());
    }

    #[test]
    fn typed_handles_copy_without_t_being_copy() {
        struct NotCopy;
        let h: ValueHandle<NotCopy> = ValueHandle::new(AllocHandle::new(32, 0));
        let h2 = h;
        assert_eq!(h, h2);

        let a: ArrayHandle<NotCopy> = ArrayHandle::new(AllocHandle::new(32, 0), 3);
        let a2 = a;
        assert_eq!(a, a2);
        assert_eq!(a2.len(), 3);
        assert!(format!("{a2:?}").contains("NotCopy"));
    }
}
