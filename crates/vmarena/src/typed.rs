//! Typed allocation helpers.
//!
//! Thin wrappers over [`Arena::push`] for plain-old-data types: one value
//! is `push(size_of::<T>())`, an array of `n` is `push(size_of::<T>() * n)`.
//! Allocations are only word aligned, so `T` may not need more than
//! [`ARENA_ALIGN`]; that is checked at compile time. Callers with stricter
//! alignment needs pad with a byte push first.

use bytemuck::Pod;

use crate::align::ARENA_ALIGN;
use crate::arena::{Arena, Zeroing};
use crate::backend::MemoryBackend;
use crate::error::ArenaError;
use crate::handle::{ArrayHandle, ValueHandle};

const fn assert_word_aligned<T>() {
    assert!(
        std::mem::align_of::<T>() <= ARENA_ALIGN,
        "arena allocations are only word aligned"
    );
}

impl<B: MemoryBackend> Arena<B> {
    /// Allocate space for one `T`.
    ///
    /// # Errors
    ///
    /// As [`push`](Self::push).
    ///
    /// # Panics
    ///
    /// As [`push`](Self::push).
    pub fn push_value<T: Pod>(&mut self, zeroing: Zeroing) -> Result<ValueHandle<T>, ArenaError> {
        const { assert_word_aligned::<T>() };
        let raw = self.push(std::mem::size_of::<T>(), zeroing)?;
        Ok(ValueHandle::new(raw))
    }

    /// Allocate space for `len` contiguous `T`s.
    ///
    /// A byte size that overflows `usize` is treated as exceeding capacity.
    ///
    /// # Errors
    ///
    /// As [`push`](Self::push).
    ///
    /// # Panics
    ///
    /// As [`push`](Self::push).
    pub fn push_array<T: Pod>(
        &mut self,
        len: usize,
        zeroing: Zeroing,
    ) -> Result<ArrayHandle<T>, ArenaError> {
        const {
            assert_word_aligned::<T>();
            assert!(std::mem::size_of::<T>() > 0, "zero-sized array elements");
        };
        let size = std::mem::size_of::<T>().checked_mul(len).unwrap_or(usize::MAX);
        let raw = self.push(size, zeroing)?;
        Ok(ArrayHandle::new(raw, len))
    }

    /// Allocate a `T` and move `value` into it.
    pub fn alloc_value<T: Pod>(&mut self, value: T) -> Result<ValueHandle<T>, ArenaError> {
        let handle = self.push_value(Zeroing::Overwrite)?;
        *self.value_mut(handle) = value;
        Ok(handle)
    }

    /// Allocate an array and copy `values` into it.
    pub fn alloc_slice<T: Pod>(&mut self, values: &[T]) -> Result<ArrayHandle<T>, ArenaError> {
        let handle = self.push_array(values.len(), Zeroing::Overwrite)?;
        self.array_mut(handle).copy_from_slice(values);
        Ok(handle)
    }

    /// Borrow a value.
    ///
    /// # Panics
    ///
    /// Panics if the handle has been rewound past.
    pub fn value<T: Pod>(&self, handle: ValueHandle<T>) -> &T {
        bytemuck::from_bytes(self.bytes(handle.raw))
    }

    /// Mutably borrow a value.
    ///
    /// # Panics
    ///
    /// Panics if the handle has been rewound past.
    pub fn value_mut<T: Pod>(&mut self, handle: ValueHandle<T>) -> &mut T {
        bytemuck::from_bytes_mut(self.bytes_mut(handle.raw))
    }

    /// Borrow an array.
    ///
    /// # Panics
    ///
    /// Panics if the handle has been rewound past.
    pub fn array<T: Pod>(&self, handle: ArrayHandle<T>) -> &[T] {
        bytemuck::cast_slice(self.bytes(handle.raw))
    }

    /// Mutably borrow an array.
    ///
    /// # Panics
    ///
    /// Panics if the handle has been rewound past.
    pub fn array_mut<T: Pod>(&mut self, handle: ArrayHandle<T>) -> &mut [T] {
        bytemuck::cast_slice_mut(self.bytes_mut(handle.raw))
    }
}
