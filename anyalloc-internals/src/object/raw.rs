//! Type-erased value slot.
//!
//! This module encapsulates the fields of [`RawObject`], ensuring they are
//! only visible within this module. This visibility restriction guarantees
//! the safety invariant: **the dispatch table always describes the value held
//! in the allocation**.
//!
//! # Safety Invariant
//!
//! The table is only set right after a value of its type has been placed in
//! the allocation, and it is cleared before (or while) that value is moved
//! out or destroyed. A `RawObject` without a table holds no value, and its
//! allocation is empty.
//!
//! A `RawObject` does not own an allocator. Every operation that touches the
//! block takes the allocator as a parameter, and the caller promises that it
//! is the allocator (or one equal to it) that produced the block. Dropping a
//! `RawObject` that still holds a value leaks it; owners release it with
//! [`RawObject::destroy`].

use core::{
    alloc::Layout,
    any::TypeId,
    fmt,
    marker::PhantomData,
};

use crate::{
    allocation::Allocation,
    allocator::{self, AllocError, Allocator, Initializer, Value},
    object::vtable::DispatchTable,
    requirement::Supports,
};

/// An allocation holding at most one value of an erased type.
pub struct RawObject<A: Allocator> {
    /// The block holding the value.
    ///
    /// # Safety
    ///
    /// The following safety invariants are guaranteed to be upheld as long as
    /// this struct exists:
    ///
    /// 1. When `vtable` is `Some`, the block holds a live value of the type
    ///    the table was built for.
    /// 2. When `vtable` is `None`, the block is empty.
    allocation: Allocation,

    /// The table of the held value, `None` when empty.
    vtable: Option<&'static DispatchTable<A>>,

    /// The erased value may be neither `Send` nor `Sync`.
    _not_thread_safe: PhantomData<*mut ()>,
}

impl<A: Allocator> RawObject<A> {
    /// Creates an empty slot.
    #[inline]
    pub const fn new() -> Self {
        Self {
            allocation: Allocation::empty(),
            vtable: None,
            _not_thread_safe: PhantomData,
        }
    }

    /// Returns `true` if the slot holds a value.
    #[inline]
    pub fn has_value(&self) -> bool {
        self.vtable.is_some()
    }

    /// The [`TypeId`] of the held value.
    #[inline]
    pub fn type_id(&self) -> Option<TypeId> {
        self.vtable.map(|vtable| vtable.type_id())
    }

    /// The [`core::any::type_name`] of the held value.
    #[inline]
    pub fn type_name(&self) -> Option<&'static str> {
        self.vtable.map(|vtable| vtable.type_name())
    }

    /// The layout of the held value.
    #[inline]
    pub fn layout(&self) -> Option<Layout> {
        self.vtable.map(|vtable| vtable.layout())
    }

    /// The size in bytes of the held value, `0` when empty.
    #[inline]
    pub fn size(&self) -> usize {
        self.layout().map_or(0, |layout| layout.size())
    }

    /// The block holding the value.
    #[inline]
    pub fn allocation(&self) -> &Allocation {
        &self.allocation
    }

    /// Returns `true` if the slot holds a `T`.
    #[inline]
    pub fn is<T: 'static>(&self) -> bool {
        self.type_id() == Some(TypeId::of::<T>())
    }

    /// Returns `true` if both slots hold values of the same type.
    #[inline]
    pub fn same_type(&self, other: &Self) -> bool {
        match (self.type_id(), other.type_id()) {
            (Some(left), Some(right)) => left == right,
            _ => false,
        }
    }

    /// Returns a reference to the held `T`.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. The slot holds a `T`.
    #[inline]
    pub unsafe fn get_unchecked<T: 'static>(&self) -> &T {
        // Debug assertion to catch type mismatches in case of bugs
        debug_assert_eq!(self.type_id(), Some(TypeId::of::<T>()));

        let ptr = self.allocation.as_ptr::<T>();
        // SAFETY: The slot holds a live `T` (guaranteed by the caller and the
        // invariants of this type), and the reference is tied to `&self`.
        unsafe { ptr.as_ref() }
    }

    /// Returns a mutable reference to the held `T`.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. The slot holds a `T`.
    #[inline]
    pub unsafe fn get_unchecked_mut<T: 'static>(&mut self) -> &mut T {
        // Debug assertion to catch type mismatches in case of bugs
        debug_assert_eq!(self.type_id(), Some(TypeId::of::<T>()));

        let mut ptr = self.allocation.as_ptr::<T>();
        // SAFETY: The slot holds a live `T` (guaranteed by the caller and the
        // invariants of this type), and the reference is tied to `&mut self`.
        unsafe { ptr.as_mut() }
    }

    /// Replaces the held value with a `T` produced by `init`.
    ///
    /// The value is produced first. If the slot already holds a `T` and `R`
    /// offers move assignment, the new value is assigned in place and the
    /// block is reused. Otherwise the old value is destroyed, a block sized
    /// for `T` is obtained from `alloc` and the value is constructed into it.
    ///
    /// If obtaining the block fails, the slot is left empty.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. The current block, if any, was produced by `alloc` or an allocator
    ///    equal to it.
    pub unsafe fn emplace<T, R, I>(&mut self, alloc: &A, init: I) -> Result<&mut T, AllocError>
    where
        T: 'static,
        R: Supports<T, A>,
        I: Initializer<T, A>,
    {
        let value = init.initialize(alloc);

        if R::MOVE_ASSIGN.is_some() && self.is::<T>() {
            // SAFETY: The slot holds a `T`, checked right above.
            let slot = unsafe { self.get_unchecked_mut::<T>() };
            *slot = value;
            return Ok(slot);
        }

        // SAFETY: The block was produced by `alloc` (guaranteed by the caller).
        unsafe {
            self.destroy(alloc);
        }

        self.allocation = Allocation::new_in(alloc, Layout::new::<T>())?;
        let ptr = self.allocation.as_ptr::<T>();
        // SAFETY: The block is fresh and sized for `T`.
        unsafe {
            allocator::construct(alloc, ptr, Value(value));
        }
        self.vtable = Some(DispatchTable::new::<T, R>());

        // SAFETY: A `T` was constructed right above.
        Ok(unsafe { self.get_unchecked_mut::<T>() })
    }

    /// Destroys the held value, if any, and releases its block.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. The current block, if any, was produced by `alloc` or an allocator
    ///    equal to it.
    #[inline]
    pub unsafe fn destroy(&mut self, alloc: &A) {
        if let Some(vtable) = self.vtable.take() {
            // SAFETY:
            // 1. `vtable` is the table of the held value (invariant of this type)
            // 2. Guaranteed by the caller
            // 3. The table has been cleared, so the value cannot be reached again
            unsafe {
                vtable.destroy(alloc, &mut self.allocation);
            }
        }
    }

    /// Copies the held value into a new slot whose block comes from `alloc`.
    ///
    /// # Panics
    ///
    /// Panics if the held value's table has no copy-construct entry.
    pub fn copy_construct(&self, alloc: &A) -> Result<Self, AllocError> {
        let Some(vtable) = self.vtable else {
            return Ok(Self::new());
        };

        // SAFETY:
        // 1. `vtable` is the table of the held value (invariant of this type)
        let allocation = unsafe { vtable.copy_construct(alloc, &self.allocation) }?;
        Ok(Self {
            allocation,
            vtable: Some(vtable),
            _not_thread_safe: PhantomData,
        })
    }

    /// Relocates the held value into a new slot whose block comes from
    /// `dst_alloc`, leaving this slot empty.
    ///
    /// On failure this slot is untouched.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. The current block, if any, was produced by `src_alloc` or an
    ///    allocator equal to it.
    ///
    /// # Panics
    ///
    /// Panics if the held value's table has no move-construct entry.
    pub unsafe fn move_construct(&mut self, dst_alloc: &A, src_alloc: &A) -> Result<Self, AllocError> {
        let Some(vtable) = self.vtable else {
            return Ok(Self::new());
        };

        // The entry releases the block before the value reaches its new one,
        // so the table must already be gone if that unwinds.
        self.vtable = None;
        // SAFETY:
        // 1. `vtable` is the table of the held value (invariant of this type)
        // 2. Guaranteed by the caller
        let result = unsafe { vtable.move_construct(dst_alloc, src_alloc, &mut self.allocation) };
        let allocation = result.inspect_err(|_| self.vtable = Some(vtable))?;
        Ok(Self {
            allocation,
            vtable: Some(vtable),
            _not_thread_safe: PhantomData,
        })
    }

    /// Takes the value and its block out of this slot without touching the
    /// allocator, leaving this slot empty.
    #[inline]
    pub fn take(&mut self) -> Self {
        core::mem::replace(self, Self::new())
    }

    /// Copies the value held by `src` into this slot.
    ///
    /// When both slots hold the same type the value is assigned in place.
    /// Otherwise the current value is destroyed, and this slot adopts the
    /// table of `src` together with a block sized for the new value. An empty
    /// `src` empties this slot.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. The current block, if any, was produced by `dst_alloc` or an
    ///    allocator equal to it.
    ///
    /// # Panics
    ///
    /// Panics if the table of `src` has no copy-assign entry.
    pub unsafe fn copy_assign(&mut self, dst_alloc: &A, src: &Self) -> Result<(), AllocError> {
        let Some(src_vtable) = src.vtable else {
            // SAFETY: Guaranteed by the caller
            unsafe {
                self.destroy(dst_alloc);
            }
            return Ok(());
        };

        let in_place = self.same_type(src);
        if !in_place {
            // SAFETY: Guaranteed by the caller
            unsafe {
                self.destroy(dst_alloc);
            }
        }

        // SAFETY:
        // 1. `src_vtable` is the table of the value held by `src`
        // 2. `in_place` is `true` only if this slot holds the same type; otherwise
        //    this slot was emptied right above
        // 3. Guaranteed by the caller
        unsafe {
            src_vtable.copy_assign(dst_alloc, &mut self.allocation, in_place, &src.allocation)
        }?;

        if !in_place {
            self.vtable = Some(src_vtable);
        }
        Ok(())
    }

    /// Moves the value held by `src` into this slot, leaving `src` empty.
    ///
    /// When both slots hold the same type the value is assigned in place.
    /// Otherwise the current value is destroyed, and this slot adopts the
    /// table of `src` together with a block from `dst_alloc`. An empty `src`
    /// empties this slot. If obtaining a block fails, `src` is untouched.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. The current block of this slot, if any, was produced by `dst_alloc`
    ///    or an allocator equal to it.
    /// 2. The current block of `src`, if any, was produced by `src_alloc` or
    ///    an allocator equal to it.
    ///
    /// # Panics
    ///
    /// Panics if the table of `src` has no move-assign entry.
    pub unsafe fn move_assign(
        &mut self,
        dst_alloc: &A,
        src: &mut Self,
        src_alloc: &A,
    ) -> Result<(), AllocError> {
        let Some(src_vtable) = src.vtable else {
            // SAFETY: Guaranteed by the caller (1)
            unsafe {
                self.destroy(dst_alloc);
            }
            return Ok(());
        };

        let in_place = self.same_type(src);
        if !in_place {
            // SAFETY: Guaranteed by the caller (1)
            unsafe {
                self.destroy(dst_alloc);
            }
        }

        // The entry releases the block of `src` before the old value of this
        // slot is dropped, so `src` must not keep its table if that drop
        // unwinds.
        src.vtable = None;
        // SAFETY:
        // 1. `src_vtable` is the table of the value held by `src`
        // 2. `in_place` is `true` only if this slot holds the same type; otherwise
        //    this slot was emptied right above
        // 3. Guaranteed by the caller (1, 2)
        let result = unsafe {
            src_vtable.move_assign(
                dst_alloc,
                &mut self.allocation,
                in_place,
                src_alloc,
                &mut src.allocation,
            )
        };
        result.inspect_err(|_| src.vtable = Some(src_vtable))?;

        if !in_place {
            self.vtable = Some(src_vtable);
        }
        Ok(())
    }
}

impl<A: Allocator> Default for RawObject<A> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Allocator> fmt::Debug for RawObject<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawObject")
            .field("type_name", &self.type_name())
            .field("allocation", &self.allocation)
            .finish()
    }
}
