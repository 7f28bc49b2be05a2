#![no_std]
#![forbid(
    missing_docs,
    clippy::alloc_instead_of_core,
    clippy::std_instead_of_alloc,
    clippy::std_instead_of_core,
    clippy::missing_safety_doc,
    clippy::missing_docs_in_private_items,
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    rustdoc::invalid_rust_codeblocks,
    rustdoc::broken_intra_doc_links,
    missing_copy_implementations,
    unused_doc_comments
)]
#![allow(rustdoc::private_intra_doc_links)]
//! Internal implementation crate for [`anyalloc`].
//!
//! # Overview
//!
//! This crate contains the low-level, type-erased data structures and unsafe
//! operations that power the [`anyalloc`] container library: the allocator
//! capability adapter, raw allocation records, the requirement level markers,
//! and the per-type dispatch tables used to operate on an erased value.
//!
//! **This crate is an implementation detail.** No semantic versioning guarantees
//! are provided. Users should depend on the [`anyalloc`] crate, not this one.
//!
//! # Architecture
//!
//! - **[`allocator`]**: The [`Allocator`] trait, the process-wide [`Global`]
//!   allocator, and the free functions that every layer above uses to
//!   allocate, release, construct and destroy.
//! - **[`allocation`]**: [`Allocation`], one raw block together with the
//!   [`Layout`] it was requested with.
//! - **[`requirement`]**: Type-level levels ([`Absent`], [`Fallible`],
//!   [`Infallible`]) and the four-field [`Requirements`] specification.
//! - **`object`**: [`RawObject`], an allocation paired with a `&'static`
//!   dispatch table describing how to move, copy and destroy the value in it.
//!
//! # Safety Strategy
//!
//! Once a value of type `T` is written into an [`Allocation`], the only record
//! of `T` is the dispatch table stored next to it. Every entry of that table is
//! instantiated for exactly that `T`, so the table must never be paired with a
//! block holding anything else.
//!
//! This crate maintains that pairing through:
//!
//! - **Module-based encapsulation**: [`RawObject`] keeps its fields
//!   module-private, so the table and the block can only change together
//! - **Static tables**: tables are `&'static` values created in a `const`
//!   block for one concrete `(T, R, A)` triple and are never mutated
//! - **Documented entry contracts**: each entry states exactly which block it
//!   may be called with
//!
//! [`anyalloc`]: https://docs.rs/anyalloc/latest/anyalloc/
//! [`Allocator`]: allocator::Allocator
//! [`Global`]: allocator::Global
//! [`Allocation`]: allocation::Allocation
//! [`Layout`]: core::alloc::Layout
//! [`Absent`]: requirement::Absent
//! [`Fallible`]: requirement::Fallible
//! [`Infallible`]: requirement::Infallible
//! [`Requirements`]: requirement::Requirements

extern crate alloc;

pub mod allocation;
pub mod allocator;
mod object;
pub mod requirement;

pub use object::RawObject;
