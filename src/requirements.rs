//! Requirement specifications for [`ObjectAllocation`].
//!
//! A requirement specification is a type implementing [`Requirements`]. It
//! fixes, for each of the four special operations of a container, one of
//! three levels:
//!
//! - [`Absent`]: the operation is not offered and the container has no method
//!   for it.
//! - [`Fallible`]: the operation is offered and may fail. For copies this
//!   means the value is [`Clone`].
//! - [`Infallible`]: the operation is offered and cannot fail apart from
//!   allocation. For copies this means the value is [`Copy`].
//!
//! Moving a value never fails in Rust, so every type can be stored under any
//! level of move construction and move assignment.
//!
//! Specifications are ordered field by field. `S: Satisfies<R>` holds when
//! every field of `S` is at least the corresponding field of `R`, and this is
//! what allows a container of `S` to be assigned into, or relaxed to, a
//! container of `R`.
//!
//! # Presets
//!
//! | preset      | move-construct | copy-construct | move-assign | copy-assign |
//! |-------------|----------------|----------------|-------------|-------------|
//! | [`Trivial`] | absent         | absent         | absent      | absent      |
//! | [`Unique`]  | infallible     | absent         | infallible  | absent      |
//! | [`Normal`]  | fallible       | fallible       | infallible  | fallible    |
//! | [`Strict`]  | infallible     | infallible     | infallible  | infallible  |
//!
//! Any other combination can be written with [`Req`]:
//!
//! ```
//! use anyalloc::{
//!     ObjectAllocation,
//!     requirements::{Absent, Fallible, Level, Req},
//! };
//!
//! // Copyable, but never moved after being stored.
//! type Pinned = Req<Absent, Fallible, Absent, Fallible>;
//!
//! let object = ObjectAllocation::<Pinned>::with_value(vec![1, 2, 3])?;
//! let copy = object.try_clone()?;
//! assert_eq!(copy.requirements().move_construct, Level::Absent);
//! # Ok::<(), anyalloc::Error>(())
//! ```
//!
//! [`ObjectAllocation`]: crate::ObjectAllocation

pub use anyalloc_internals::requirement::{
    Absent, Covers, Expectation, Fallible, Infallible, Level, MemberRequirements, Normal, Present,
    Req, Requirements, Satisfies, Strict, Supports, Trivial, Unique,
};
