//! Commonly used items for convenient importing.
//!
//! ```
//! use anyalloc::prelude::*;
//!
//! fn store<T: Clone + 'static>(value: T) -> Result<ObjectAllocation, anyalloc::Error> {
//!     ObjectAllocation::with_value(value)
//! }
//!
//! assert!(store(3_u8)?.is::<u8>());
//! # Ok::<(), anyalloc::Error>(())
//! ```

pub use crate::{
    Allocator, AllocatorAware, Global, Normal, ObjectAllocation, Strict, Trivial, Unique,
};
