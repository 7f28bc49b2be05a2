//! Dispatch table for type-erased values.
//!
//! This module contains the [`DispatchTable`] which enables moving, copying,
//! assigning and destroying a value stored in an [`Allocation`] once its
//! concrete type `T` has been erased. The table stores function pointers that
//! dispatch to the correct typed implementations.
//!
//! Which of the four construct and assign entries exist is decided by the
//! requirement specification the table was built for: each level marker
//! implements an entry trait that yields either `None` or the typed function.
//!
//! # Safety Invariant
//!
//! Tables are only created as `&'static` references via
//! [`DispatchTable::new`], which pairs every function pointer with the single
//! type `T` at compile time. A table must only ever be used with blocks
//! holding that `T`.

use core::{alloc::Layout, any::TypeId};

use crate::{
    allocation::Allocation,
    allocator::{AllocError, Allocator},
    requirement::{Absent, Expectation, Fallible, Infallible, Supports},
};

/// Relocates the value in `src` into a fresh block from the first allocator,
/// releasing `src` through the second allocator.
pub type MoveConstructFn<A> = unsafe fn(&A, &A, &mut Allocation) -> Result<Allocation, AllocError>;

/// Copies the value in the block into a fresh block from the allocator.
pub type CopyConstructFn<A> = unsafe fn(&A, &Allocation) -> Result<Allocation, AllocError>;

/// Moves the value in `src` into `dst`, assigning in place when `dst` holds a
/// value, and releases `src`.
pub type MoveAssignFn<A> =
    unsafe fn(&A, &mut Allocation, bool, &A, &mut Allocation) -> Result<(), AllocError>;

/// Copies the value in `src` into `dst`, assigning in place when `dst` holds
/// a value.
pub type CopyAssignFn<A> = unsafe fn(&A, &mut Allocation, bool, &Allocation) -> Result<(), AllocError>;

/// Destroys the value in the block and releases the block.
pub type DestroyFn<A> = unsafe fn(&A, &mut Allocation);

/// Level markers that know how to move-construct a `T`.
pub trait MoveConstructEntry<T, A: Allocator>: Expectation {
    /// The entry, or `None` when the operation is not offered.
    const ENTRY: Option<MoveConstructFn<A>>;
}

/// Level markers that know how to copy-construct a `T`.
pub trait CopyConstructEntry<T, A: Allocator>: Expectation {
    /// The entry, or `None` when the operation is not offered.
    const ENTRY: Option<CopyConstructFn<A>>;
}

/// Level markers that know how to move-assign a `T`.
pub trait MoveAssignEntry<T, A: Allocator>: Expectation {
    /// The entry, or `None` when the operation is not offered.
    const ENTRY: Option<MoveAssignFn<A>>;
}

/// Level markers that know how to copy-assign a `T`.
pub trait CopyAssignEntry<T, A: Allocator>: Expectation {
    /// The entry, or `None` when the operation is not offered.
    const ENTRY: Option<CopyAssignFn<A>>;
}

impl<T: 'static, A: Allocator> MoveConstructEntry<T, A> for Absent {
    const ENTRY: Option<MoveConstructFn<A>> = None;
}

impl<T: 'static, A: Allocator> MoveConstructEntry<T, A> for Fallible {
    const ENTRY: Option<MoveConstructFn<A>> = Some(move_construct::<T, A>);
}

impl<T: 'static, A: Allocator> MoveConstructEntry<T, A> for Infallible {
    const ENTRY: Option<MoveConstructFn<A>> = Some(move_construct::<T, A>);
}

impl<T: 'static, A: Allocator> CopyConstructEntry<T, A> for Absent {
    const ENTRY: Option<CopyConstructFn<A>> = None;
}

impl<T: Clone + 'static, A: Allocator> CopyConstructEntry<T, A> for Fallible {
    const ENTRY: Option<CopyConstructFn<A>> = Some(clone_construct::<T, A>);
}

impl<T: Copy + 'static, A: Allocator> CopyConstructEntry<T, A> for Infallible {
    const ENTRY: Option<CopyConstructFn<A>> = Some(bitwise_construct::<T, A>);
}

impl<T: 'static, A: Allocator> MoveAssignEntry<T, A> for Absent {
    const ENTRY: Option<MoveAssignFn<A>> = None;
}

impl<T: 'static, A: Allocator> MoveAssignEntry<T, A> for Fallible {
    const ENTRY: Option<MoveAssignFn<A>> = Some(move_assign::<T, A>);
}

impl<T: 'static, A: Allocator> MoveAssignEntry<T, A> for Infallible {
    const ENTRY: Option<MoveAssignFn<A>> = Some(move_assign::<T, A>);
}

impl<T: 'static, A: Allocator> CopyAssignEntry<T, A> for Absent {
    const ENTRY: Option<CopyAssignFn<A>> = None;
}

impl<T: Clone + 'static, A: Allocator> CopyAssignEntry<T, A> for Fallible {
    const ENTRY: Option<CopyAssignFn<A>> = Some(clone_assign::<T, A>);
}

impl<T: Copy + 'static, A: Allocator> CopyAssignEntry<T, A> for Infallible {
    const ENTRY: Option<CopyAssignFn<A>> = Some(bitwise_assign::<T, A>);
}

/// Dispatch table for a type-erased value.
///
/// # Safety Invariant
///
/// Every function pointer in this table was instantiated with the type `T`
/// and allocator type `A` that were used to create it, and `type_id`,
/// `type_name` and `layout` describe that same `T`.
pub(crate) struct DispatchTable<A: Allocator> {
    /// Gets the [`TypeId`] of the stored type.
    type_id: fn() -> TypeId,
    /// Gets the [`core::any::type_name`] of the stored type.
    type_name: fn() -> &'static str,
    /// The layout of the stored type.
    layout: Layout,
    /// Relocation into a block from another allocator.
    move_construct: Option<MoveConstructFn<A>>,
    /// Copy into a fresh block.
    copy_construct: Option<CopyConstructFn<A>>,
    /// Move assignment.
    move_assign: Option<MoveAssignFn<A>>,
    /// Copy assignment.
    copy_assign: Option<CopyAssignFn<A>>,
    /// Destruction and release of the block.
    destroy: DestroyFn<A>,
}

impl<A: Allocator> DispatchTable<A> {
    /// Creates the [`DispatchTable`] for storing `T` under the requirements
    /// `R`.
    pub(super) const fn new<T: 'static, R: Supports<T, A>>() -> &'static Self {
        const {
            &Self {
                type_id: TypeId::of::<T>,
                type_name: core::any::type_name::<T>,
                layout: Layout::new::<T>(),
                move_construct: R::MOVE_CONSTRUCT,
                copy_construct: R::COPY_CONSTRUCT,
                move_assign: R::MOVE_ASSIGN,
                copy_assign: R::COPY_ASSIGN,
                destroy: destroy::<T, A>,
            }
        }
    }

    /// Gets the [`TypeId`] of the stored type.
    #[inline]
    pub(super) fn type_id(&self) -> TypeId {
        (self.type_id)()
    }

    /// Gets the [`core::any::type_name`] of the stored type.
    #[inline]
    pub(super) fn type_name(&self) -> &'static str {
        (self.type_name)()
    }

    /// Gets the layout of the stored type.
    #[inline]
    pub(super) fn layout(&self) -> Layout {
        self.layout
    }

    /// Relocates the value in `src` into a fresh block from `dst_alloc`.
    ///
    /// On success `src` is released through `src_alloc` and left empty. On
    /// failure `src` is untouched.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. This table is the table of the value stored in `src`.
    /// 2. The block of `src` was produced by `src_alloc` or an allocator equal
    ///    to it.
    ///
    /// # Panics
    ///
    /// Panics if the table was built without a move-construct entry.
    #[inline]
    pub(super) unsafe fn move_construct(
        &self,
        dst_alloc: &A,
        src_alloc: &A,
        src: &mut Allocation,
    ) -> Result<Allocation, AllocError> {
        let Some(entry) = self.move_construct else {
            absent_entry("move construction", self.type_name())
        };
        // SAFETY: `entry` is `move_construct::<T, A>` for the stored `T`. Its
        // safety requirements are upheld:
        // 1. Guaranteed by the caller
        // 2. Guaranteed by the caller
        unsafe { entry(dst_alloc, src_alloc, src) }
    }

    /// Copies the value in `src` into a fresh block from `alloc`.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. This table is the table of the value stored in `src`.
    ///
    /// # Panics
    ///
    /// Panics if the table was built without a copy-construct entry.
    #[inline]
    pub(super) unsafe fn copy_construct(
        &self,
        alloc: &A,
        src: &Allocation,
    ) -> Result<Allocation, AllocError> {
        let Some(entry) = self.copy_construct else {
            absent_entry("copy construction", self.type_name())
        };
        // SAFETY: `entry` is the copy entry for the stored `T`. Its safety
        // requirements are upheld:
        // 1. Guaranteed by the caller
        unsafe { entry(alloc, src) }
    }

    /// Moves the value in `src` into `dst`.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. This table is the table of the value stored in `src`.
    /// 2. If `dst_has_value` is `true`, `dst` holds a value of the same type;
    ///    otherwise `dst` is empty.
    /// 3. The block of `dst` was produced by `dst_alloc`, and the block of
    ///    `src` by `src_alloc`, or by allocators equal to them.
    ///
    /// # Panics
    ///
    /// Panics if the table was built without a move-assign entry.
    #[inline]
    pub(super) unsafe fn move_assign(
        &self,
        dst_alloc: &A,
        dst: &mut Allocation,
        dst_has_value: bool,
        src_alloc: &A,
        src: &mut Allocation,
    ) -> Result<(), AllocError> {
        let Some(entry) = self.move_assign else {
            absent_entry("move assignment", self.type_name())
        };
        // SAFETY: `entry` is `move_assign::<T, A>` for the stored `T`. Its
        // safety requirements are upheld:
        // 1. Guaranteed by the caller
        // 2. Guaranteed by the caller
        // 3. Guaranteed by the caller
        unsafe { entry(dst_alloc, dst, dst_has_value, src_alloc, src) }
    }

    /// Copies the value in `src` into `dst`.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. This table is the table of the value stored in `src`.
    /// 2. If `dst_has_value` is `true`, `dst` holds a value of the same type;
    ///    otherwise `dst` is empty.
    /// 3. The block of `dst` was produced by `dst_alloc` or an allocator equal
    ///    to it.
    ///
    /// # Panics
    ///
    /// Panics if the table was built without a copy-assign entry.
    #[inline]
    pub(super) unsafe fn copy_assign(
        &self,
        dst_alloc: &A,
        dst: &mut Allocation,
        dst_has_value: bool,
        src: &Allocation,
    ) -> Result<(), AllocError> {
        let Some(entry) = self.copy_assign else {
            absent_entry("copy assignment", self.type_name())
        };
        // SAFETY: `entry` is the copy-assign entry for the stored `T`. Its
        // safety requirements are upheld:
        // 1. Guaranteed by the caller
        // 2. Guaranteed by the caller
        // 3. Guaranteed by the caller
        unsafe { entry(dst_alloc, dst, dst_has_value, src) }
    }

    /// Destroys the value in `allocation` and releases its block.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. This table is the table of the value stored in `allocation`.
    /// 2. The block was produced by `alloc` or an allocator equal to it.
    /// 3. The value is not used after this call.
    #[inline]
    pub(super) unsafe fn destroy(&self, alloc: &A, allocation: &mut Allocation) {
        // SAFETY: `self.destroy` is `destroy::<T, A>` for the stored `T`. Its
        // safety requirements are upheld:
        // 1. Guaranteed by the caller
        // 2. Guaranteed by the caller
        // 3. Guaranteed by the caller
        unsafe { (self.destroy)(alloc, allocation) }
    }
}

/// Reports a call to an entry the requirements left out.
#[cold]
#[track_caller]
fn absent_entry(operation: &str, type_name: &str) -> ! {
    panic!("{operation} is not offered for `{type_name}` under these requirements")
}

/// Relocates a `T` from `src` into a fresh block from `dst_alloc`.
///
/// # Safety
///
/// The caller must ensure:
///
/// 1. `src` holds a live `T`.
/// 2. The block of `src` was produced by `src_alloc` or an allocator equal to
///    it.
unsafe fn move_construct<T: 'static, A: Allocator>(
    dst_alloc: &A,
    src_alloc: &A,
    src: &mut Allocation,
) -> Result<Allocation, AllocError> {
    let dst = Allocation::new_in(dst_alloc, Layout::new::<T>())?;
    // SAFETY: `src` holds a live `T` (1). The bitwise copy becomes the only
    // owner of the value since the block is released right after.
    let value = unsafe { src.as_ptr::<T>().read() };
    // SAFETY: The block was produced by `src_alloc` (2) and no longer holds a
    // value that needs to be destroyed.
    unsafe {
        src.deallocate(src_alloc);
    }
    // SAFETY: `dst` is a fresh block with the layout of `T`.
    unsafe {
        dst_alloc.construct(dst.as_ptr::<T>(), value);
    }
    Ok(dst)
}

/// Clones a `T` from `src` into a fresh block from `alloc`.
///
/// # Safety
///
/// The caller must ensure:
///
/// 1. `src` holds a live `T`.
unsafe fn clone_construct<T: Clone + 'static, A: Allocator>(
    alloc: &A,
    src: &Allocation,
) -> Result<Allocation, AllocError> {
    // SAFETY: `src` holds a live `T` (1).
    let source = unsafe { src.as_ptr::<T>().as_ref() };
    // Clone before allocating so that a panicking `clone` leaks nothing.
    let value = source.clone();
    let dst = Allocation::new_in(alloc, Layout::new::<T>())?;
    // SAFETY: `dst` is a fresh block with the layout of `T`.
    unsafe {
        alloc.construct(dst.as_ptr::<T>(), value);
    }
    Ok(dst)
}

/// Copies a `T` bitwise from `src` into a fresh block from `alloc`.
///
/// # Safety
///
/// The caller must ensure:
///
/// 1. `src` holds a live `T`.
unsafe fn bitwise_construct<T: Copy + 'static, A: Allocator>(
    alloc: &A,
    src: &Allocation,
) -> Result<Allocation, AllocError> {
    let dst = Allocation::new_in(alloc, Layout::new::<T>())?;
    // SAFETY: `src` holds a live `T` (1), and `T: Copy`.
    let value = unsafe { src.as_ptr::<T>().read() };
    // SAFETY: `dst` is a fresh block with the layout of `T`.
    unsafe {
        alloc.construct(dst.as_ptr::<T>(), value);
    }
    Ok(dst)
}

/// Moves a `T` from `src` into `dst` and releases `src`.
///
/// `src` is released before the old value of `dst` is dropped, so a panic in
/// that drop finds `src` already empty.
///
/// # Safety
///
/// The caller must ensure:
///
/// 1. `src` holds a live `T`.
/// 2. If `dst_has_value` is `true`, `dst` holds a live `T`; otherwise `dst`
///    is empty.
/// 3. The block of `dst` was produced by `dst_alloc`, and the block of `src`
///    by `src_alloc`, or by allocators equal to them.
unsafe fn move_assign<T: 'static, A: Allocator>(
    dst_alloc: &A,
    dst: &mut Allocation,
    dst_has_value: bool,
    src_alloc: &A,
    src: &mut Allocation,
) -> Result<(), AllocError> {
    if !dst_has_value {
        debug_assert!(dst.is_empty());
        // SAFETY: Requirements (1) and (3) carry over.
        *dst = unsafe { move_construct::<T, A>(dst_alloc, src_alloc, src) }?;
        return Ok(());
    }

    // SAFETY: `src` holds a live `T` (1). The bitwise copy becomes the only
    // owner of the value since the block is released right after.
    let value = unsafe { src.as_ptr::<T>().read() };
    // SAFETY: The block was produced by `src_alloc` (3) and no longer holds a
    // value that needs to be destroyed.
    unsafe {
        src.deallocate(src_alloc);
    }
    let mut slot = dst.as_ptr::<T>();
    // SAFETY: `dst` holds a live `T` (2) and is exclusively borrowed.
    let target = unsafe { slot.as_mut() };
    *target = value;
    Ok(())
}

/// Clones a `T` from `src` into `dst`.
///
/// # Safety
///
/// The caller must ensure:
///
/// 1. `src` holds a live `T`.
/// 2. If `dst_has_value` is `true`, `dst` holds a live `T`; otherwise `dst`
///    is empty.
/// 3. `dst` and `src` are distinct blocks.
unsafe fn clone_assign<T: Clone + 'static, A: Allocator>(
    dst_alloc: &A,
    dst: &mut Allocation,
    dst_has_value: bool,
    src: &Allocation,
) -> Result<(), AllocError> {
    if !dst_has_value {
        debug_assert!(dst.is_empty());
        // SAFETY: Requirement (1) carries over.
        *dst = unsafe { clone_construct::<T, A>(dst_alloc, src) }?;
        return Ok(());
    }

    // SAFETY: `src` holds a live `T` (1).
    let source = unsafe { src.as_ptr::<T>().as_ref() };
    let mut slot = dst.as_ptr::<T>();
    // SAFETY: `dst` holds a live `T` (2) that does not alias `source` (3).
    let target = unsafe { slot.as_mut() };
    target.clone_from(source);
    Ok(())
}

/// Copies a `T` bitwise from `src` into `dst`.
///
/// # Safety
///
/// The caller must ensure:
///
/// 1. `src` holds a live `T`.
/// 2. If `dst_has_value` is `true`, `dst` holds a live `T`; otherwise `dst`
///    is empty.
unsafe fn bitwise_assign<T: Copy + 'static, A: Allocator>(
    dst_alloc: &A,
    dst: &mut Allocation,
    dst_has_value: bool,
    src: &Allocation,
) -> Result<(), AllocError> {
    if !dst_has_value {
        debug_assert!(dst.is_empty());
        // SAFETY: Requirement (1) carries over.
        *dst = unsafe { bitwise_construct::<T, A>(dst_alloc, src) }?;
        return Ok(());
    }

    // SAFETY: `src` holds a live `T` (1), and `T: Copy`.
    let value = unsafe { src.as_ptr::<T>().read() };
    // SAFETY: `dst` holds a live `T` (2) which has no destructor.
    unsafe {
        dst.as_ptr::<T>().write(value);
    }
    Ok(())
}

/// Destroys the `T` in `allocation` and releases the block.
///
/// # Safety
///
/// The caller must ensure:
///
/// 1. `allocation` holds a live `T`.
/// 2. The block was produced by `alloc` or an allocator equal to it.
/// 3. The value is not used after this call.
unsafe fn destroy<T: 'static, A: Allocator>(alloc: &A, allocation: &mut Allocation) {
    // SAFETY: `allocation` holds a live `T` (1) that is not used afterwards (3).
    unsafe {
        alloc.destroy(allocation.as_ptr::<T>());
    }
    // SAFETY: The block was produced by `alloc` (2) and its value has been
    // destroyed.
    unsafe {
        allocation.deallocate(alloc);
    }
}
