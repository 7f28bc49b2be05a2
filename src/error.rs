//! The error type returned by fallible container operations.

use anyalloc_internals::allocator::AllocError;

/// Errors reported by [`ObjectAllocation`] and [`AllocatorAware`].
///
/// Allocation failures are the only errors a well-formed program sees. The
/// other variants report a violated precondition and are checked in every
/// build.
///
/// [`ObjectAllocation`]: crate::ObjectAllocation
/// [`AllocatorAware`]: crate::AllocatorAware
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The allocator could not satisfy a request.
    #[error(transparent)]
    Alloc(#[from] AllocError),

    /// An allocation index was past the end of the list.
    #[error("allocation index {index} is out of range for {len} allocations")]
    IndexOutOfRange {
        /// The requested index.
        index: usize,
        /// The number of allocations.
        len: usize,
    },

    /// A range ended before it started.
    #[error("range end {end} is less than its start {start}")]
    InvalidRange {
        /// The start of the range.
        start: usize,
        /// The end of the range.
        end: usize,
    },

    /// Storage was exchanged between allocators that are not equal and do
    /// not propagate on swap.
    #[error("cannot swap storage between unequal allocators that do not propagate on swap")]
    AllocatorMismatch,
}

/// A [`Result`](core::result::Result) type alias where the error is [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;
