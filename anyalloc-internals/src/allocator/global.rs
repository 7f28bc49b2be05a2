//! The process-wide allocator.

use core::{alloc::Layout, ptr::NonNull};

use crate::allocator::{AllocError, Allocator, Propagation};

/// The global memory allocator registered with `#[global_allocator]`.
///
/// All instances are equal, and the allocator follows its container on
/// move-assignment. Zero-sized requests never reach the global allocator and
/// are served with a dangling, well-aligned pointer.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Global;

/// A non-null pointer aligned to `layout.align()` that must not be read from.
#[inline]
fn dangling(layout: Layout) -> Result<NonNull<u8>, AllocError> {
    NonNull::new(core::ptr::without_provenance_mut(layout.align())).ok_or(AllocError::new(layout))
}

// SAFETY:
// 1. Blocks come from `alloc::alloc::alloc` with the requested layout and are
//    only released by `dealloc` with that same layout. Zero-sized blocks are
//    never read or written.
// 2. `Global` has no state, so every pair of instances is equal.
// 3. The default hooks are used.
unsafe impl Allocator for Global {
    const ALWAYS_EQUAL: bool = true;
    const ON_MOVE_ASSIGN: Propagation = Propagation::Propagate;

    #[inline]
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        if layout.size() == 0 {
            return dangling(layout);
        }

        // SAFETY: `layout` has a non-zero size.
        let ptr = unsafe { alloc::alloc::alloc(layout) };
        NonNull::new(ptr).ok_or(AllocError::new(layout))
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        if layout.size() == 0 {
            return;
        }

        // SAFETY: The caller guarantees that `ptr` was returned by `allocate`
        // for `layout`, which means it came from `alloc::alloc::alloc`.
        unsafe {
            alloc::alloc::dealloc(ptr.as_ptr(), layout);
        }
    }
}
