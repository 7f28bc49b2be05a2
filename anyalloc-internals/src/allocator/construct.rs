//! Value construction through an allocator.
//!
//! Construction is split in two: an [`Initializer`] produces the value, and
//! the allocator's [`construct`](Allocator::construct) hook places it. The
//! hook always runs, so an allocator that instruments or redirects placement
//! sees every value regardless of how it was produced.
//!
//! Initializers come in two flavors. [`WithAllocator`] and
//! [`UsingAllocator`] hand the allocator to the value's constructor, for
//! types that themselves allocate through it. [`Value`] and [`InPlace`]
//! ignore it.

use core::ptr::NonNull;

use crate::allocator::Allocator;

/// Something that can produce a `T`, optionally using the allocator the value
/// will live in.
pub trait Initializer<T, A> {
    /// Produces the value.
    fn initialize(self, alloc: &A) -> T;
}

/// An already-built value.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Value<T>(pub T);

impl<T, A> Initializer<T, A> for Value<T> {
    #[inline]
    fn initialize(self, _alloc: &A) -> T {
        self.0
    }
}

/// A closure building the value without the allocator.
#[derive(Copy, Clone, Debug)]
pub struct InPlace<F>(pub F);

impl<T, A, F> Initializer<T, A> for InPlace<F>
where
    F: FnOnce() -> T,
{
    #[inline]
    fn initialize(self, _alloc: &A) -> T {
        (self.0)()
    }
}

/// A closure building the value from the allocator.
#[derive(Copy, Clone, Debug)]
pub struct WithAllocator<F>(pub F);

impl<T, A, F> Initializer<T, A> for WithAllocator<F>
where
    F: FnOnce(&A) -> T,
{
    #[inline]
    fn initialize(self, alloc: &A) -> T {
        (self.0)(alloc)
    }
}

/// Types with a constructor that takes the allocator alongside its arguments.
pub trait UsesAllocator<A, Args>: Sized {
    /// Builds the value from `args`, allocating through `alloc`.
    fn new_using_allocator(args: Args, alloc: &A) -> Self;
}

/// Arguments for a [`UsesAllocator`] constructor.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct UsingAllocator<Args>(pub Args);

impl<T, A, Args> Initializer<T, A> for UsingAllocator<Args>
where
    T: UsesAllocator<A, Args>,
{
    #[inline]
    fn initialize(self, alloc: &A) -> T {
        T::new_using_allocator(self.0, alloc)
    }
}

/// Produces a value from `init` and places it at `ptr` through the
/// allocator's construct hook.
///
/// The value is produced before anything is written, so a panicking
/// initializer leaves `ptr` untouched.
///
/// # Safety
///
/// The caller must ensure:
///
/// 1. `ptr` is valid for writes and aligned for `T`.
/// 2. `ptr` does not currently hold a live value.
#[inline]
pub unsafe fn construct<T, A, I>(alloc: &A, ptr: NonNull<T>, init: I)
where
    A: Allocator,
    I: Initializer<T, A>,
{
    let value = init.initialize(alloc);
    // SAFETY: Guaranteed by the caller
    unsafe {
        alloc.construct(ptr, value);
    }
}

/// Ends the life of the value at `ptr` through the allocator's destroy hook.
///
/// # Safety
///
/// The caller must ensure:
///
/// 1. `ptr` holds a live `T`.
/// 2. The value is not used after this call.
#[inline]
pub unsafe fn destroy<T, A: Allocator>(alloc: &A, ptr: NonNull<T>) {
    // SAFETY: Guaranteed by the caller
    unsafe {
        alloc.destroy(ptr);
    }
}

#[cfg(test)]
mod tests {
    use alloc::{string::String, vec::Vec};
    use core::{
        alloc::Layout,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use super::*;
    use crate::allocator::{AllocError, Global};

    static CONSTRUCTED: AtomicUsize = AtomicUsize::new(0);
    static DESTROYED: AtomicUsize = AtomicUsize::new(0);

    #[derive(Clone, PartialEq, Debug)]
    struct Hooked;

    // SAFETY: Forwards to `Global` and the default hooks.
    unsafe impl Allocator for Hooked {
        fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
            Global.allocate(layout)
        }

        unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
            // SAFETY: Forwarded from the caller
            unsafe { Global.deallocate(ptr, layout) }
        }

        unsafe fn construct<T>(&self, ptr: NonNull<T>, value: T) {
            CONSTRUCTED.fetch_add(1, Ordering::Relaxed);
            // SAFETY: Forwarded from the caller
            unsafe { ptr.write(value) }
        }

        unsafe fn destroy<T>(&self, ptr: NonNull<T>) {
            DESTROYED.fetch_add(1, Ordering::Relaxed);
            // SAFETY: Forwarded from the caller
            unsafe { ptr.drop_in_place() }
        }
    }

    struct Tagged {
        name: String,
        allocator: Hooked,
    }

    impl UsesAllocator<Hooked, &str> for Tagged {
        fn new_using_allocator(name: &str, alloc: &Hooked) -> Self {
            Self {
                name: name.into(),
                allocator: alloc.clone(),
            }
        }
    }

    fn with_slot<T>(f: impl FnOnce(NonNull<T>)) {
        let layout = Layout::new::<T>();
        let ptr = Hooked.allocate(layout).unwrap();
        f(ptr.cast());
        // SAFETY: Allocated above with `layout`
        unsafe { Hooked.deallocate(ptr, layout) };
    }

    #[test]
    fn test_every_initializer_goes_through_the_hook() {
        let before_constructed = CONSTRUCTED.load(Ordering::Relaxed);
        let before_destroyed = DESTROYED.load(Ordering::Relaxed);

        with_slot::<Vec<u32>>(|ptr| {
            // SAFETY: Fresh slot sized for `Vec<u32>`
            unsafe { construct(&Hooked, ptr, Value(alloc::vec![1, 2])) };
            // SAFETY: Constructed above
            assert_eq!(unsafe { ptr.as_ref() }, &[1, 2]);
            // SAFETY: Constructed above and not used afterwards
            unsafe { destroy(&Hooked, ptr) };
        });

        with_slot::<String>(|ptr| {
            // SAFETY: Fresh slot sized for `String`
            unsafe { construct(&Hooked, ptr, InPlace(|| String::from("plain"))) };
            // SAFETY: Constructed above
            assert_eq!(unsafe { ptr.as_ref() }, "plain");
            // SAFETY: Constructed above and not used afterwards
            unsafe { destroy(&Hooked, ptr) };
        });

        with_slot::<Tagged>(|ptr| {
            // SAFETY: Fresh slot sized for `Tagged`
            unsafe { construct(&Hooked, ptr, UsingAllocator("tagged")) };
            // SAFETY: Constructed above
            let tagged = unsafe { ptr.as_ref() };
            assert_eq!(tagged.name, "tagged");
            assert_eq!(tagged.allocator, Hooked);
            // SAFETY: Constructed above and not used afterwards
            unsafe { destroy(&Hooked, ptr) };
        });

        with_slot::<usize>(|ptr| {
            let init = WithAllocator(|alloc: &Hooked| alloc.max_size());
            // SAFETY: Fresh slot sized for `usize`
            unsafe { construct(&Hooked, ptr, init) };
            // SAFETY: Constructed above
            assert_eq!(unsafe { ptr.read() }, isize::MAX as usize);
            // SAFETY: Constructed above and not used afterwards
            unsafe { destroy(&Hooked, ptr) };
        });

        assert!(CONSTRUCTED.load(Ordering::Relaxed) - before_constructed >= 4);
        assert!(DESTROYED.load(Ordering::Relaxed) - before_destroyed >= 4);
    }
}
