//! Raw memory blocks.
//!
//! An [`Allocation`] records one block obtained from an allocator: the pointer
//! and the [`Layout`] it was requested with. A record does not know which
//! allocator produced it; whoever owns the record also owns that allocator and
//! must hand it back when the block is released.
//!
//! # Invariant
//!
//! The pointer is `None` exactly when the layout has a size of zero. Zero-sized
//! requests never reach the allocator, so an empty record owns nothing and
//! releasing it is a no-op.

use core::{alloc::Layout, fmt, mem, ptr::NonNull};

use crate::allocator::{self, AllocError, Allocator};

/// One raw block of memory obtained from an allocator.
///
/// Dropping a record that still owns a block leaks the block: release it with
/// [`Allocation::deallocate`] first.
pub struct Allocation {
    /// Start of the block, `None` when `layout.size() == 0`.
    ptr: Option<NonNull<u8>>,
    /// The layout the block was requested with.
    layout: Layout,
}

// SAFETY: A record is an exclusively owned block of raw bytes. It carries no
// thread affinity of its own; typed contents are handled by the owners.
unsafe impl Send for Allocation {}

// SAFETY: Shared access to a record only exposes its address and layout.
unsafe impl Sync for Allocation {}

impl Allocation {
    /// A record owning nothing.
    #[inline]
    pub const fn empty() -> Self {
        Self {
            ptr: None,
            layout: Layout::new::<()>(),
        }
    }

    /// Obtains a block for `layout` from `alloc`.
    ///
    /// Zero-sized layouts produce an empty record without calling the
    /// allocator.
    #[inline]
    pub fn new_in<A: Allocator>(alloc: &A, layout: Layout) -> Result<Self, AllocError> {
        Self::new_hinted_in(alloc, layout, None)
    }

    /// Like [`Allocation::new_in`], forwarding a placement hint.
    pub fn new_hinted_in<A: Allocator>(
        alloc: &A,
        layout: Layout,
        hint: Option<NonNull<u8>>,
    ) -> Result<Self, AllocError> {
        if layout.size() == 0 {
            return Ok(Self { ptr: None, layout });
        }

        let ptr = allocator::allocate(alloc, layout, hint)?;
        Ok(Self {
            ptr: Some(ptr),
            layout,
        })
    }

    /// Obtains a block for `layout` from `alloc`, returning `None` when the
    /// request is above the allocator's maximum size or fails.
    pub fn try_new_in<A: Allocator>(alloc: &A, layout: Layout) -> Option<Self> {
        if layout.size() == 0 {
            return Some(Self { ptr: None, layout });
        }

        let ptr = allocator::try_allocate(alloc, layout, None)?;
        Some(Self {
            ptr: Some(ptr),
            layout,
        })
    }

    /// Releases the current block, if any, then obtains a fresh block for
    /// `layout`.
    ///
    /// On failure the record is left empty.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. The current block, if any, was produced by `alloc` or by an
    ///    allocator equal to it.
    /// 2. The current block does not hold a value that still needs to be
    ///    destroyed.
    pub unsafe fn allocate<A: Allocator>(
        &mut self,
        alloc: &A,
        layout: Layout,
    ) -> Result<(), AllocError> {
        // SAFETY: Guaranteed by the caller
        unsafe {
            self.deallocate(alloc);
        }
        *self = Self::new_in(alloc, layout)?;
        Ok(())
    }

    /// Releases the current block, if any, and leaves the record empty.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. The current block, if any, was produced by `alloc` or by an
    ///    allocator equal to it.
    /// 2. The current block does not hold a value that still needs to be
    ///    destroyed.
    pub unsafe fn deallocate<A: Allocator>(&mut self, alloc: &A) {
        let released = mem::take(self);
        if let Some(ptr) = released.ptr {
            // SAFETY:
            // 1. Guaranteed by the caller
            // 2. The record has been reset, so the block cannot be released twice
            //    through it
            unsafe {
                allocator::deallocate(alloc, ptr, released.layout);
            }
        }
    }

    /// Obtains a block with the same layout as `other` and lets `copier`
    /// populate it.
    ///
    /// The copier receives the new record first and the source second.
    pub fn copy_construct<A, F>(alloc: &A, other: &Self, copier: F) -> Result<Self, AllocError>
    where
        A: Allocator,
        F: FnOnce(&Self, &Self),
    {
        let allocation = Self::new_in(alloc, other.layout)?;
        copier(&allocation, other);
        Ok(allocation)
    }

    /// Takes over the block owned by `other`, leaving `other` empty.
    #[inline]
    pub fn move_construct(other: &mut Self) -> Self {
        mem::take(other)
    }

    /// Copies the bytes of `src` into this block.
    ///
    /// Copies as many bytes as the smaller of the two blocks holds.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. This block does not hold a value whose invariants would be broken by
    ///    overwriting its bytes.
    /// 2. The two records do not refer to the same block.
    #[inline]
    pub unsafe fn copy_bytes_from(&self, src: &Self) {
        let (Some(dst_ptr), Some(src_ptr)) = (self.ptr, src.ptr) else {
            return;
        };
        let count = self.size().min(src.size());
        // SAFETY:
        // 1. Both blocks are valid for `count` bytes since `count` is bounded by
        //    both sizes
        // 2. The blocks are distinct (guaranteed by the caller)
        unsafe {
            core::ptr::copy_nonoverlapping(src_ptr.as_ptr(), dst_ptr.as_ptr(), count);
        }
    }

    /// The start of the block, or `None` for an empty record.
    #[inline]
    pub fn ptr(&self) -> Option<NonNull<u8>> {
        self.ptr
    }

    /// The block as a pointer to `T`.
    ///
    /// Empty records produce a dangling pointer aligned for `T`, which is a
    /// valid place for zero-sized values.
    #[inline]
    pub fn as_ptr<T>(&self) -> NonNull<T> {
        match self.ptr {
            Some(ptr) => ptr.cast::<T>(),
            None => NonNull::dangling(),
        }
    }

    /// The number of bytes in the block.
    #[inline]
    pub fn size(&self) -> usize {
        self.layout.size()
    }

    /// The layout the block was requested with.
    #[inline]
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Returns `true` if the record owns no block.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ptr.is_none()
    }
}

impl Default for Allocation {
    #[inline]
    fn default() -> Self {
        Self::empty()
    }
}

impl Drop for Allocation {
    /// Leaks the block if the record still owns one. Blocks are released
    /// through [`Allocation::deallocate`].
    #[inline]
    fn drop(&mut self) {}
}

impl fmt::Debug for Allocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Allocation")
            .field("ptr", &self.ptr)
            .field("size", &self.layout.size())
            .field("align", &self.layout.align())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use alloc::{rc::Rc, vec::Vec};
    use core::cell::RefCell;

    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;
    use crate::allocator::Global;

    assert_impl_all!(Allocation: Send, Sync, Default);
    assert_not_impl_any!(Allocation: Copy, Clone);

    /// Logs `(true, addr)` on allocation and `(false, addr)` on release.
    #[derive(Clone, Default)]
    struct Logged(Rc<RefCell<Vec<(bool, usize)>>>);

    impl PartialEq for Logged {
        fn eq(&self, other: &Self) -> bool {
            Rc::ptr_eq(&self.0, &other.0)
        }
    }

    impl Logged {
        fn releases(&self) -> usize {
            self.0.borrow().iter().filter(|(alloc, _)| !alloc).count()
        }
    }

    // SAFETY: Forwards to `Global`.
    unsafe impl Allocator for Logged {
        fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
            let ptr = Global.allocate(layout)?;
            self.0.borrow_mut().push((true, ptr.as_ptr() as usize));
            Ok(ptr)
        }

        unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
            self.0.borrow_mut().push((false, ptr.as_ptr() as usize));
            // SAFETY: Forwarded from the caller
            unsafe { Global.deallocate(ptr, layout) }
        }
    }

    #[test]
    fn test_zero_size_is_empty() {
        let logged = Logged::default();
        let allocation = Allocation::new_in(&logged, Layout::new::<()>()).unwrap();
        assert!(allocation.is_empty());
        assert_eq!(allocation.size(), 0);
        assert!(logged.0.borrow().is_empty());
    }

    #[test]
    fn test_allocate_releases_previous_block() {
        let logged = Logged::default();
        let mut allocation = Allocation::new_in(&logged, Layout::new::<u64>()).unwrap();
        let first = allocation.ptr().unwrap().as_ptr() as usize;

        // SAFETY: The block came from `logged` and holds no value
        unsafe { allocation.allocate(&logged, Layout::new::<[u64; 2]>()) }.unwrap();
        assert_eq!(allocation.size(), 16);
        assert_eq!(logged.0.borrow()[1], (false, first));

        // SAFETY: See above
        unsafe { allocation.deallocate(&logged) };
        assert!(allocation.is_empty());
        assert_eq!(logged.releases(), 2);
    }

    #[test]
    fn test_move_construct_clears_source() {
        let logged = Logged::default();
        let mut source = Allocation::new_in(&logged, Layout::new::<u32>()).unwrap();
        let address = source.ptr();

        let mut target = Allocation::move_construct(&mut source);
        assert_eq!(target.ptr(), address);
        assert!(source.is_empty());
        assert_eq!(source.size(), 0);

        // Releasing both records must free the block exactly once.
        // SAFETY: Both records only ever held blocks from `logged`
        unsafe { source.deallocate(&logged) };
        // SAFETY: See above
        unsafe { target.deallocate(&logged) };
        assert_eq!(logged.releases(), 1);
    }

    #[test]
    fn test_copy_construct_runs_copier() {
        let mut source = Allocation::new_in(&Global, Layout::new::<[u8; 4]>()).unwrap();
        // SAFETY: Fresh block sized for `[u8; 4]`
        unsafe { source.as_ptr::<[u8; 4]>().write(*b"abcd") };

        let mut copy = Allocation::copy_construct(&Global, &source, |dst, src| {
            // SAFETY: `dst` is a fresh block distinct from `src`
            unsafe { dst.copy_bytes_from(src) }
        })
        .unwrap();

        assert_ne!(copy.ptr(), source.ptr());
        // SAFETY: Populated by the copier
        assert_eq!(unsafe { copy.as_ptr::<[u8; 4]>().read() }, *b"abcd");

        // SAFETY: Both blocks came from `Global` and hold plain bytes
        unsafe { copy.deallocate(&Global) };
        // SAFETY: See above
        unsafe { source.deallocate(&Global) };
    }

    #[test]
    fn test_try_new_in_rejects_oversized() {
        let layout = Layout::from_size_align(isize::MAX as usize, 1).unwrap();
        #[derive(Clone, PartialEq)]
        struct Small;

        // SAFETY: Forwards to `Global`.
        unsafe impl Allocator for Small {
            fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
                Global.allocate(layout)
            }

            unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
                // SAFETY: Forwarded from the caller
                unsafe { Global.deallocate(ptr, layout) }
            }

            fn max_size(&self) -> usize {
                1024
            }
        }

        assert!(Allocation::try_new_in(&Small, layout).is_none());
        assert!(Allocation::new_in(&Small, Layout::new::<u8>()).is_ok_and(|mut a| {
            // SAFETY: Allocated from `Small` and holds no value
            unsafe { a.deallocate(&Small) };
            true
        }));
    }
}
