//! Type-erased value storage.
//!
//! - [`RawObject`]: an [`Allocation`] plus the table describing its value
//! - [`vtable`]: the dispatch table and its typed entries
//!
//! [`Allocation`]: crate::allocation::Allocation

mod raw;
pub(crate) mod vtable;

pub use self::raw::RawObject;
