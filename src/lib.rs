#![no_std]
#![deny(
    missing_docs,
    clippy::alloc_instead_of_core,
    clippy::std_instead_of_alloc,
    clippy::std_instead_of_core,
    clippy::missing_safety_doc,
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    clippy::as_ptr_cast_mut,
    clippy::ptr_as_ptr,
    rustdoc::invalid_rust_codeblocks,
    rustdoc::broken_intra_doc_links,
    unused_doc_comments
)]
// Make docs.rs generate better docs
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Allocator-aware, type-erased storage for a single value.
//!
//! ## Overview
//!
//! [`ObjectAllocation`] holds at most one value of any `'static` type in a
//! block obtained from an [`Allocator`]. The type of the value can change at
//! runtime, and the container remembers how to move, copy, assign and destroy
//! whatever it currently holds. Which of those operations exist is decided at
//! compile time by a requirement specification, so a container that promises
//! to be cloneable only ever accepts cloneable values.
//!
//! ```
//! use anyalloc::{ObjectAllocation, Unique};
//!
//! // Move-only: accepts any type, offers no copies.
//! let mut slot = ObjectAllocation::<Unique>::new();
//! slot.emplace(std::rc::Rc::new("shared"))?;
//! let moved = slot.take();
//! assert!(!slot.has_value());
//! assert!(moved.is::<std::rc::Rc<&str>>());
//! # Ok::<(), anyalloc::Error>(())
//! ```
//!
//! ## Core Concepts
//!
//! The crate is built from a few layers, each usable on its own:
//!
//! - **[`Allocator`]**: a source of raw blocks, with constants describing
//!   whether it follows its container on copy-assignment, move-assignment and
//!   swap, and hooks customizing how values are placed into its blocks.
//! - **[`Allocation`]**: a record of one block, its pointer and its layout,
//!   with no knowledge of what the block holds.
//! - **[`AllocatorAware`]**: an allocator together with the blocks it handed
//!   out, implementing copy, move, assignment and swap under the allocator's
//!   propagation rules.
//! - **[`requirements`]**: the four-field specifications ([`Trivial`],
//!   [`Unique`], [`Normal`], [`Strict`] and custom [`Req`]s) that select the
//!   operations of a container.
//! - **[`ObjectAllocation`]**: the type-erased container itself.
//!
//! For implementation details, see the [`anyalloc-internals`] crate.
//!
//! [`anyalloc-internals`]: anyalloc_internals
//!
//! ## Allocators
//!
//! [`Global`] forwards to the global allocator and is the default everywhere.
//! [`tracking::Tracking`] wraps any allocator and records its live blocks,
//! which is useful in tests:
//!
//! ```
//! use anyalloc::{ObjectAllocation, tracking::Tracking};
//!
//! let tracking = Tracking::new();
//! {
//!     let mut object = ObjectAllocation::<anyalloc::Normal, _>::new_in(tracking.clone());
//!     object.emplace(vec![0_u8; 32])?;
//!     let _copy = object.try_clone()?;
//!     assert_eq!(tracking.stats().live_blocks, 2);
//! }
//! assert_eq!(tracking.stats().live_blocks, 0);
//! # Ok::<(), anyalloc::Error>(())
//! ```
//!
//! ## Errors
//!
//! Every operation that may need a new block returns a [`Result`] whose error
//! is [`Error`]. [`Clone`] implementations follow the standard collections and
//! divert allocation failures to [`handle_alloc_error`].
//!
//! [`handle_alloc_error`]: alloc::alloc::handle_alloc_error
//!
//! ## Diagnostics
//!
//! The containers emit [`tracing`] events: `trace` for every allocation,
//! release and emplace, and `debug` when a value or block has to be relocated
//! between unequal allocators or an emplace fails.
//!
//! ## Features
//!
//! - `std` (default): uses `std` locks in [`tracking`] and enables the `std`
//!   support of the dependencies. Without it the crate is `no_std` and needs
//!   only `alloc`.

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod allocator;
mod allocator_aware;
mod error;
mod object_allocation;
pub mod prelude;
pub mod requirements;
pub mod tracking;
mod util;

pub use self::{
    allocator::{AllocError, Allocation, Allocator, Global, Propagation},
    allocator_aware::AllocatorAware,
    error::{Error, Result},
    object_allocation::ObjectAllocation,
    requirements::{Normal, Req, Strict, Trivial, Unique},
};
