//! Allocator capability adapter.
//!
//! Every layer of the crate talks to memory through the [`Allocator`] trait
//! and the free functions in this module. The trait normalizes what an
//! allocator can do:
//!
//! - hand out and take back [`Layout`]-sized blocks ([`Allocator::allocate`],
//!   [`Allocator::deallocate`]), optionally honoring a placement hint
//! - report the largest request it can serve ([`Allocator::max_size`])
//! - decide whether it follows its containers on copy-assignment,
//!   move-assignment and swap ([`Propagation`])
//! - customize how values are placed into and removed from its blocks
//!   ([`Allocator::construct`], [`Allocator::destroy`])
//!
//! The free functions [`construct`] and [`destroy`] apply the construction
//! policy: the allocator's hook always performs the placement, and the value
//! itself is produced by an [`Initializer`] that may or may not receive the
//! allocator.

mod construct;
mod global;

use core::{alloc::Layout, ptr::NonNull};

pub use self::{
    construct::{
        InPlace, Initializer, UsesAllocator, UsingAllocator, Value, WithAllocator, construct,
        destroy,
    },
    global::Global,
};

/// The error returned when an allocator cannot satisfy a request.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, thiserror::Error)]
#[error("failed to allocate {} bytes aligned to {}", .layout.size(), .layout.align())]
pub struct AllocError {
    /// The layout that could not be served.
    layout: Layout,
}

impl AllocError {
    /// Creates an error for a failed request of `layout`.
    #[inline]
    pub const fn new(layout: Layout) -> Self {
        Self { layout }
    }

    /// The layout that could not be served.
    #[inline]
    pub const fn layout(&self) -> Layout {
        self.layout
    }
}

/// Whether an allocator travels with its container during an operation.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Propagation {
    /// The receiving container keeps its own allocator.
    #[default]
    Keep,
    /// The receiving container takes over the source's allocator.
    Propagate,
}

impl Propagation {
    /// Returns `true` for [`Propagation::Propagate`].
    #[inline]
    pub const fn propagates(self) -> bool {
        matches!(self, Self::Propagate)
    }
}

/// A source of raw memory blocks.
///
/// Two allocators comparing equal through [`PartialEq`] must be able to
/// release each other's blocks. Cloning an allocator yields an equal
/// allocator.
///
/// # Safety
///
/// Implementors must guarantee that:
///
/// 1. A pointer returned by [`allocate`](Allocator::allocate) or
///    [`allocate_hinted`](Allocator::allocate_hinted) is valid for reads and
///    writes of `layout.size()` bytes, aligned to `layout.align()`, and stays
///    valid until it is passed to [`deallocate`](Allocator::deallocate) on
///    this allocator or an allocator equal to it.
/// 2. When [`ALWAYS_EQUAL`](Allocator::ALWAYS_EQUAL) is `true`, every pair of
///    instances compares equal.
/// 3. [`construct`](Allocator::construct) leaves `ptr` holding an initialized
///    value, and [`destroy`](Allocator::destroy) ends the life of the value
///    exactly once.
pub unsafe trait Allocator: Clone + PartialEq + 'static {
    /// Behavior of a container's allocator when the container is
    /// copy-assigned.
    const ON_COPY_ASSIGN: Propagation = Propagation::Keep;
    /// Behavior of a container's allocator when the container is
    /// move-assigned.
    const ON_MOVE_ASSIGN: Propagation = Propagation::Keep;
    /// Behavior of the allocators when two containers are swapped.
    const ON_SWAP: Propagation = Propagation::Keep;
    /// Whether all instances of this allocator compare equal.
    const ALWAYS_EQUAL: bool = false;

    /// Obtains a block fitting `layout`.
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError>;

    /// Obtains a block fitting `layout`, preferably near `hint`.
    ///
    /// The default ignores the hint.
    #[inline]
    fn allocate_hinted(
        &self,
        layout: Layout,
        hint: NonNull<u8>,
    ) -> Result<NonNull<u8>, AllocError> {
        let _ = hint;
        self.allocate(layout)
    }

    /// Releases a block.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. `ptr` was returned by this allocator, or by an allocator equal to
    ///    it, for the same `layout`.
    /// 2. `ptr` has not already been released.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);

    /// The largest block size this allocator can possibly serve.
    #[inline]
    fn max_size(&self) -> usize {
        isize::MAX as usize
    }

    /// Obtains a block fitting `layout`, returning `None` instead of an error.
    ///
    /// Requests above [`max_size`](Allocator::max_size) fail without reaching
    /// [`allocate`](Allocator::allocate).
    #[inline]
    fn try_allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        if layout.size() > self.max_size() {
            return None;
        }
        self.allocate(layout).ok()
    }

    /// The allocator a copy of a container should use.
    #[inline]
    fn select_on_copy(&self) -> Self {
        self.clone()
    }

    /// Places `value` into the block at `ptr`.
    ///
    /// Containers call this whenever a value enters a fresh block, including
    /// the target block of a relocation.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. `ptr` is valid for writes and aligned for `T`.
    /// 2. `ptr` does not currently hold a live value.
    #[inline]
    unsafe fn construct<T>(&self, ptr: NonNull<T>, value: T) {
        // SAFETY: Guaranteed by the caller
        unsafe {
            ptr.write(value);
        }
    }

    /// Ends the life of the value at `ptr` without releasing its block.
    ///
    /// Containers call this only when a value ends its life in the block it
    /// occupies: on clearing, on dropping, and when a value of another type
    /// replaces it. Calls to `construct` and `destroy` need not pair up:
    ///
    /// - a value replaced by assignment in place is dropped by the assignment
    ///   itself, and its successor is written without `construct`;
    /// - a relocated value is moved out of its old block without `destroy` and
    ///   constructed again in the new one.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. `ptr` holds a live `T`.
    /// 2. The value is not used after this call.
    #[inline]
    unsafe fn destroy<T>(&self, ptr: NonNull<T>) {
        // SAFETY: Guaranteed by the caller
        unsafe {
            ptr.drop_in_place();
        }
    }
}

/// Obtains a block fitting `layout`, forwarding `hint` when one is given.
#[inline]
pub fn allocate<A: Allocator>(
    alloc: &A,
    layout: Layout,
    hint: Option<NonNull<u8>>,
) -> Result<NonNull<u8>, AllocError> {
    match hint {
        Some(hint) => alloc.allocate_hinted(layout, hint),
        None => alloc.allocate(layout),
    }
}

/// Obtains a block fitting `layout`, or `None` if the request exceeds
/// [`Allocator::max_size`] or the allocator fails.
#[inline]
pub fn try_allocate<A: Allocator>(
    alloc: &A,
    layout: Layout,
    hint: Option<NonNull<u8>>,
) -> Option<NonNull<u8>> {
    if layout.size() > alloc.max_size() {
        return None;
    }
    match hint {
        Some(hint) => alloc.allocate_hinted(layout, hint).ok(),
        None => alloc.try_allocate(layout),
    }
}

/// Releases a block obtained through [`allocate`] or [`try_allocate`].
///
/// # Safety
///
/// The caller must ensure:
///
/// 1. `ptr` was returned by `alloc`, or by an allocator equal to it, for the
///    same `layout`.
/// 2. `ptr` has not already been released.
#[inline]
pub unsafe fn deallocate<A: Allocator>(alloc: &A, ptr: NonNull<u8>, layout: Layout) {
    // SAFETY: Guaranteed by the caller
    unsafe {
        alloc.deallocate(ptr, layout);
    }
}

/// Returns `true` if blocks from `left` may be released through `right`.
///
/// Short-circuits for allocators whose instances are always equal.
#[inline]
pub fn equal<A: Allocator>(left: &A, right: &A) -> bool {
    A::ALWAYS_EQUAL || left == right
}
