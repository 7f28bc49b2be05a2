//! An allocator adaptor that records every live block.
//!
//! [`Tracking`] wraps another [`Allocator`] and keeps a registry of the blocks
//! it has handed out. It is meant for tests and diagnostics: it answers how
//! many blocks and bytes are live, and it panics when a block is released
//! twice, released with a different layout, or released through an allocator
//! that never produced it.
//!
//! Clones of a `Tracking` share their registry and compare equal. Two
//! independently created instances never compare equal, so containers treat
//! them as unable to release each other's blocks.
//!
//! # Examples
//!
//! ```
//! use anyalloc::{ObjectAllocation, Unique, tracking::Tracking};
//!
//! let tracking = Tracking::new();
//! let mut object = ObjectAllocation::<Unique, _>::new_in(tracking.clone());
//! object.emplace(String::from("tracked"))?;
//! assert_eq!(tracking.stats().live_blocks, 1);
//!
//! object.clear();
//! assert_eq!(tracking.stats().live_blocks, 0);
//! # Ok::<(), anyalloc::Error>(())
//! ```

mod lock;

use alloc::vec::Vec;
use core::{
    alloc::Layout,
    fmt,
    ptr::NonNull,
    sync::atomic::{AtomicUsize, Ordering},
};

use anyalloc_internals::allocator::{AllocError, Allocator, Global, Propagation};
use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;
use tracing::{trace, warn};
use triomphe::Arc;

use self::lock::RegistryLock;

/// Live blocks keyed by address, in allocation order.
type Registry = IndexMap<usize, Layout, FxBuildHasher>;

/// A snapshot of a [`Tracking`] allocator's counters.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Stats {
    /// The number of successful allocations.
    pub allocations: usize,
    /// The number of deallocations.
    pub deallocations: usize,
    /// The number of blocks currently live.
    pub live_blocks: usize,
    /// The number of bytes currently live.
    pub live_bytes: usize,
}

/// State shared by all clones of a [`Tracking`] allocator.
struct Shared {
    allocations: AtomicUsize,
    deallocations: AtomicUsize,
    registry: RegistryLock<Registry>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        let registry = self.registry.get_mut();
        if !registry.is_empty() {
            let live_bytes: usize = registry.values().map(Layout::size).sum();
            warn!(
                live_blocks = registry.len(),
                live_bytes, "tracking allocator dropped with live blocks"
            );
        }
    }
}

/// An allocator that records the blocks handed out by `A`.
///
/// The propagation constants and construction hooks of `A` are forwarded.
/// [`ALWAYS_EQUAL`](Allocator::ALWAYS_EQUAL) is always `false`.
pub struct Tracking<A: Allocator = Global> {
    inner: A,
    shared: Arc<Shared>,
}

impl Tracking {
    /// Creates a tracker around [`Global`].
    #[must_use]
    pub fn new() -> Self {
        Self::new_in(Global)
    }
}

impl<A: Allocator> Tracking<A> {
    /// Creates a tracker around `inner`.
    #[must_use]
    pub fn new_in(inner: A) -> Self {
        Self {
            inner,
            shared: Arc::new(Shared {
                allocations: AtomicUsize::new(0),
                deallocations: AtomicUsize::new(0),
                registry: RegistryLock::new(Registry::default()),
            }),
        }
    }

    /// The wrapped allocator.
    #[inline]
    pub fn inner(&self) -> &A {
        &self.inner
    }

    /// A snapshot of the counters.
    pub fn stats(&self) -> Stats {
        let registry = self.shared.registry.read();
        Stats {
            allocations: self.shared.allocations.load(Ordering::Relaxed),
            deallocations: self.shared.deallocations.load(Ordering::Relaxed),
            live_blocks: registry.len(),
            live_bytes: registry.values().map(Layout::size).sum(),
        }
    }

    /// The address and layout of every live block, oldest first.
    pub fn live_blocks(&self) -> Vec<(usize, Layout)> {
        self.shared
            .registry
            .read()
            .iter()
            .map(|(&address, &layout)| (address, layout))
            .collect()
    }

    /// Returns `true` if `ptr` is a live block of this tracker.
    pub fn is_live(&self, ptr: NonNull<u8>) -> bool {
        self.shared.registry.read().contains_key(&ptr.addr().get())
    }

    /// Records a block obtained from the inner allocator.
    fn record(&self, ptr: NonNull<u8>, layout: Layout) {
        self.shared.allocations.fetch_add(1, Ordering::Relaxed);
        // Zero-sized blocks share their dangling address and are not kept.
        if layout.size() != 0 {
            self.shared.registry.write().insert(ptr.addr().get(), layout);
        }
        trace!(
            address = ptr.addr().get(),
            size = layout.size(),
            align = layout.align(),
            "tracked allocation"
        );
    }
}

impl<A: Allocator + Default> Default for Tracking<A> {
    fn default() -> Self {
        Self::new_in(A::default())
    }
}

impl<A: Allocator> Clone for Tracking<A> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<A: Allocator> PartialEq for Tracking<A> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared) && self.inner == other.inner
    }
}

impl<A: Allocator + fmt::Debug> fmt::Debug for Tracking<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracking")
            .field("inner", &self.inner)
            .field("stats", &self.stats())
            .finish()
    }
}

// SAFETY:
// 1. Blocks come from `inner` unchanged and are released through it
// 2. `ALWAYS_EQUAL` is `false`
// 3. The construction hooks of `inner` are forwarded unchanged
unsafe impl<A: Allocator> Allocator for Tracking<A> {
    const ON_COPY_ASSIGN: Propagation = A::ON_COPY_ASSIGN;
    const ON_MOVE_ASSIGN: Propagation = A::ON_MOVE_ASSIGN;
    const ON_SWAP: Propagation = A::ON_SWAP;

    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        let ptr = self.inner.allocate(layout)?;
        self.record(ptr, layout);
        Ok(ptr)
    }

    fn allocate_hinted(
        &self,
        layout: Layout,
        hint: NonNull<u8>,
    ) -> Result<NonNull<u8>, AllocError> {
        let ptr = self.inner.allocate_hinted(layout, hint)?;
        self.record(ptr, layout);
        Ok(ptr)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        if layout.size() != 0 {
            let recorded = self.shared.registry.write().shift_remove(&ptr.addr().get());
            match recorded {
                Some(recorded) => assert_eq!(
                    recorded, layout,
                    "block {ptr:p} released with a different layout than it was allocated with"
                ),
                None => panic!("block {ptr:p} is not live in this tracking allocator"),
            }
        }
        self.shared.deallocations.fetch_add(1, Ordering::Relaxed);
        trace!(
            address = ptr.addr().get(),
            size = layout.size(),
            "tracked deallocation"
        );

        // SAFETY: The block was live in the registry, so it came from `inner`
        // with `layout` and has not been released yet.
        unsafe {
            self.inner.deallocate(ptr, layout);
        }
    }

    fn max_size(&self) -> usize {
        self.inner.max_size()
    }

    fn select_on_copy(&self) -> Self {
        Self {
            inner: self.inner.select_on_copy(),
            shared: Arc::clone(&self.shared),
        }
    }

    unsafe fn construct<T>(&self, ptr: NonNull<T>, value: T) {
        // SAFETY: Forwarded from the caller
        unsafe {
            self.inner.construct(ptr, value);
        }
    }

    unsafe fn destroy<T>(&self, ptr: NonNull<T>) {
        // SAFETY: Forwarded from the caller
        unsafe {
            self.inner.destroy(ptr);
        }
    }
}
