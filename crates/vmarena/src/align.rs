//! Alignment arithmetic and size units.

/// Alignment of every arena allocation: one machine word.
pub const ARENA_ALIGN: usize = std::mem::size_of::<usize>();

/// `n` kibibytes in bytes.
pub const fn kib(n: usize) -> usize {
    n << 10
}

/// `n` mebibytes in bytes.
pub const fn mib(n: usize) -> usize {
    n << 20
}

/// `n` gibibytes in bytes.
pub const fn gib(n: usize) -> usize {
    n << 30
}

/// Round `value` up to the next multiple of `align`.
///
/// `align` must be a power of two. Returns `None` on overflow.
pub fn align_up(value: usize, align: usize) -> Option<usize> {
    debug_assert!(align.is_power_of_two(), "alignment {align} is not a power of two");
    let mask = align - 1;
    value.checked_add(mask).map(|v| v & !mask)
}

/// Round `value` up to the next multiple of `chunk`, for any nonzero `chunk`.
///
/// Commit chunks are page multiples but need not be powers of two.
pub(crate) fn round_up_to_multiple(value: usize, chunk: usize) -> Option<usize> {
    debug_assert!(chunk > 0);
    match value % chunk {
        0 => Some(value),
        rem => value.checked_add(chunk - rem),
    }
}
