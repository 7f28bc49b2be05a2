//! The allocator interface used by every container in this crate.
//!
//! See [`Allocator`] for the trait itself and [`tracking`](crate::tracking)
//! for an allocator that records its blocks.

pub use anyalloc_internals::{
    allocation::Allocation,
    allocator::{
        AllocError, Allocator, Global, InPlace, Initializer, Propagation, UsesAllocator,
        UsingAllocator, Value, WithAllocator, allocate, construct, deallocate, destroy, equal,
        try_allocate,
    },
};
