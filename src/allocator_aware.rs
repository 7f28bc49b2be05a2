//! An allocator together with the raw blocks obtained from it.
//!
//! [`AllocatorAware`] is the memory half of a container: it owns one allocator
//! and an ordered list of [`Allocation`]s produced by it, and it implements
//! copying, moving, assignment and swapping under the allocator's
//! [`Propagation`] rules. It never interprets the bytes it holds. Values the
//! caller writes into its blocks are never dropped by it.
//!
//! # Propagation
//!
//! | operation        | `Keep`                                   | `Propagate`                        |
//! |------------------|------------------------------------------|------------------------------------|
//! | copy-assign      | copy with own allocator                  | take the source's allocator, copy  |
//! | move-assign      | adopt if allocators are equal, else copy | take the source's allocator, adopt |
//! | swap             | allocators must be equal                 | allocators are swapped too         |
//!
//! The same rules decide what [`ObjectAllocation`] does with its allocator;
//! both containers go through [`Handover`], [`copy_assign_allocator`] and
//! [`swap_allocators`].
//!
//! [`Propagation`]: crate::allocator::Propagation
//! [`ObjectAllocation`]: crate::ObjectAllocation

use alloc::vec::Vec;
use core::{
    alloc::Layout,
    fmt,
    ops::{Bound, RangeBounds},
};

use anyalloc_internals::{
    allocation::Allocation,
    allocator::{self, Allocator, Global},
};
use tracing::{debug, trace};

use crate::{
    error::{Error, Result},
    util::abort_on_error,
};

/// An allocator and the blocks it has handed out.
///
/// Every block is released when the wrapper is dropped.
///
/// # Examples
///
/// ```
/// use core::alloc::Layout;
///
/// use anyalloc::AllocatorAware;
///
/// let mut blocks = AllocatorAware::new();
/// blocks.allocate(Layout::new::<[u8; 64]>())?;
/// blocks.allocate(Layout::new::<u32>())?;
/// assert_eq!(blocks.len(), 2);
/// assert_eq!(blocks.size(), 68);
///
/// let copy = blocks.try_clone()?;
/// assert_eq!(copy.size(), 68);
/// # Ok::<(), anyalloc::Error>(())
/// ```
pub struct AllocatorAware<A: Allocator = Global> {
    /// The allocator every block came from.
    allocator: A,
    /// The blocks, in allocation order.
    allocations: Vec<Allocation>,
}

impl AllocatorAware {
    /// Creates an empty wrapper using [`Global`].
    #[must_use]
    pub const fn new() -> Self {
        Self::new_in(Global)
    }
}

impl<A: Allocator> AllocatorAware<A> {
    /// Creates an empty wrapper using `allocator`.
    #[must_use]
    pub const fn new_in(allocator: A) -> Self {
        Self {
            allocator,
            allocations: Vec::new(),
        }
    }

    /// The allocator every block came from.
    #[inline]
    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    /// The blocks, in allocation order.
    #[inline]
    pub fn allocations(&self) -> &[Allocation] {
        &self.allocations
    }

    /// The block at `index`.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&Allocation> {
        self.allocations.get(index)
    }

    /// The number of entries, including released ones.
    #[inline]
    pub fn len(&self) -> usize {
        self.allocations.len()
    }

    /// Returns `true` if there are no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.allocations.is_empty()
    }

    /// Returns `true` if any entry owns a block.
    pub fn has_value(&self) -> bool {
        self.allocations.iter().any(|allocation| !allocation.is_empty())
    }

    /// The total number of bytes held.
    pub fn size(&self) -> usize {
        self.allocations.iter().map(Allocation::size).sum()
    }

    /// Obtains a new block for `layout` and appends it.
    pub fn allocate(&mut self, layout: Layout) -> Result<&Allocation> {
        let allocation = Allocation::new_in(&self.allocator, layout)?;
        let index = self.allocations.len();
        trace!(
            index,
            size = layout.size(),
            align = layout.align(),
            "allocated block"
        );
        self.allocations.push(allocation);
        Ok(&self.allocations[index])
    }

    /// Like [`allocate`](Self::allocate), but returns `None` when the request
    /// exceeds the allocator's maximum size or fails.
    pub fn try_allocate(&mut self, layout: Layout) -> Option<&Allocation> {
        let allocation = Allocation::try_new_in(&self.allocator, layout)?;
        let index = self.allocations.len();
        self.allocations.push(allocation);
        Some(&self.allocations[index])
    }

    /// Releases the block at `index` and replaces it with a fresh block for
    /// `layout`.
    ///
    /// The old contents are not carried over. If the new block cannot be
    /// obtained the entry is left empty.
    pub fn reallocate(&mut self, index: usize, layout: Layout) -> Result<&Allocation> {
        self.check_index(index)?;
        let allocation = &mut self.allocations[index];
        // SAFETY:
        // 1. Every block in the list was produced by `self.allocator`
        // 2. The wrapper never stores values that need to be destroyed
        unsafe { allocation.allocate(&self.allocator, layout) }?;
        trace!(
            index,
            size = layout.size(),
            align = layout.align(),
            "reallocated block"
        );
        Ok(&self.allocations[index])
    }

    /// Releases the block at `index`, leaving an empty entry in its place.
    pub fn deallocate(&mut self, index: usize) -> Result<()> {
        self.check_index(index)?;
        self.release(index..index + 1);
        Ok(())
    }

    /// Releases every block in `range`, leaving empty entries in their place.
    pub fn deallocate_range(&mut self, range: impl RangeBounds<usize>) -> Result<()> {
        let start = match range.start_bound() {
            Bound::Included(&start) => start,
            Bound::Excluded(&start) => start.saturating_add(1),
            Bound::Unbounded => 0,
        };
        let end = match range.end_bound() {
            Bound::Included(&end) => end.saturating_add(1),
            Bound::Excluded(&end) => end,
            Bound::Unbounded => self.allocations.len(),
        };

        if start > end {
            return Err(Error::InvalidRange { start, end });
        }
        if end > self.allocations.len() {
            return Err(Error::IndexOutOfRange {
                index: end - 1,
                len: self.allocations.len(),
            });
        }

        self.release(start..end);
        Ok(())
    }

    /// Releases every block and removes all entries.
    pub fn deallocate_all(&mut self) {
        self.release(0..self.allocations.len());
        self.allocations.clear();
    }

    /// Copies every block into a new wrapper, using the allocator chosen by
    /// [`Allocator::select_on_copy`].
    ///
    /// `copier` fills each new block from its source; it receives the new
    /// block first.
    pub fn try_clone_with<F>(&self, copier: F) -> Result<Self>
    where
        F: FnMut(&Allocation, &Allocation),
    {
        self.try_clone_in(self.allocator.select_on_copy(), copier)
    }

    /// Copies every block into a new wrapper using `allocator`.
    pub fn try_clone_in<F>(&self, allocator: A, copier: F) -> Result<Self>
    where
        F: FnMut(&Allocation, &Allocation),
    {
        let allocations = copy_blocks(&allocator, &self.allocations, copier)?;
        Ok(Self {
            allocator,
            allocations,
        })
    }

    /// Copies every block byte for byte into a new wrapper.
    pub fn try_clone(&self) -> Result<Self> {
        self.try_clone_with(copy_bytes)
    }

    /// Moves every block into a new wrapper with the same allocator, leaving
    /// this wrapper empty.
    #[must_use]
    pub fn take(&mut self) -> Self {
        Self {
            allocator: self.allocator.clone(),
            allocations: core::mem::take(&mut self.allocations),
        }
    }

    /// Moves every block into a new wrapper using `allocator`, leaving this
    /// wrapper empty.
    ///
    /// When `allocator` equals the current one the blocks are adopted as they
    /// are. Otherwise each block is copied into a block from `allocator` and
    /// the original is released. On failure this wrapper is untouched.
    pub fn take_in(&mut self, allocator: A) -> Result<Self> {
        if Handover::for_take(&allocator, &self.allocator) == Handover::Adopt {
            return Ok(Self {
                allocator,
                allocations: core::mem::take(&mut self.allocations),
            });
        }

        debug!(
            blocks = self.allocations.len(),
            "allocators differ, relocating blocks"
        );
        let allocations = copy_blocks(&allocator, &self.allocations, copy_bytes)?;
        self.deallocate_all();
        Ok(Self {
            allocator,
            allocations,
        })
    }

    /// Replaces the blocks of this wrapper with copies of the blocks of
    /// `other`.
    ///
    /// If the allocator propagates on copy-assignment this wrapper takes a
    /// clone of `other`'s allocator; otherwise the copies come from its own.
    /// On failure this wrapper is untouched.
    pub fn clone_assign_with<F>(&mut self, other: &Self, copier: F) -> Result<()>
    where
        F: FnMut(&Allocation, &Allocation),
    {
        let allocator = copy_assign_allocator(&self.allocator, &other.allocator);
        let allocations = copy_blocks(&allocator, &other.allocations, copier)?;

        self.deallocate_all();
        self.allocator = allocator;
        self.allocations = allocations;
        Ok(())
    }

    /// Byte-for-byte [`clone_assign_with`](Self::clone_assign_with).
    pub fn clone_assign(&mut self, other: &Self) -> Result<()> {
        self.clone_assign_with(other, copy_bytes)
    }

    /// Moves the blocks of `other` into this wrapper, releasing the current
    /// ones and leaving `other` empty.
    ///
    /// If the allocator propagates on move-assignment, or the two allocators
    /// are equal, the blocks are adopted as they are. Otherwise they are
    /// copied into blocks from this wrapper's allocator. On failure both
    /// wrappers are untouched.
    pub fn assign_from(&mut self, other: &mut Self) -> Result<()> {
        let handover = Handover::for_move_assign(&self.allocator, &other.allocator);
        if handover != Handover::Relocate {
            self.deallocate_all();
            if handover == Handover::Propagate {
                self.allocator = other.allocator.clone();
            }
            self.allocations = core::mem::take(&mut other.allocations);
            return Ok(());
        }

        debug!(
            blocks = other.allocations.len(),
            "allocators differ, relocating blocks"
        );
        let allocations = copy_blocks(&self.allocator, &other.allocations, copy_bytes)?;
        self.deallocate_all();
        self.allocations = allocations;
        other.deallocate_all();
        Ok(())
    }

    /// Exchanges the blocks of two wrappers.
    ///
    /// If the allocator propagates on swap the allocators are exchanged too.
    /// Otherwise the allocators must be equal, and
    /// [`Error::AllocatorMismatch`] is returned if they are not.
    pub fn swap(&mut self, other: &mut Self) -> Result<()> {
        swap_allocators(&mut self.allocator, &mut other.allocator)?;
        core::mem::swap(&mut self.allocations, &mut other.allocations);
        Ok(())
    }

    /// Checks that `index` refers to an entry.
    fn check_index(&self, index: usize) -> Result<()> {
        if index < self.allocations.len() {
            Ok(())
        } else {
            Err(Error::IndexOutOfRange {
                index,
                len: self.allocations.len(),
            })
        }
    }

    /// Releases the blocks in `range`, which must be in bounds.
    fn release(&mut self, range: core::ops::Range<usize>) {
        for (index, allocation) in self.allocations[range.clone()].iter_mut().enumerate() {
            if allocation.is_empty() {
                continue;
            }
            trace!(
                index = range.start + index,
                size = allocation.size(),
                "released block"
            );
            // SAFETY:
            // 1. Every block in the list was produced by `self.allocator`
            // 2. The wrapper never stores values that need to be destroyed
            unsafe {
                allocation.deallocate(&self.allocator);
            }
        }
    }
}

/// How memory moves from one container to another.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Handover {
    /// The destination takes over the source's allocator and memory.
    Propagate,
    /// The allocators are equal, so the memory changes hands as it is.
    Adopt,
    /// The allocators differ, so the contents are copied into memory from
    /// the destination's allocator and the source's memory is released.
    Relocate,
}

impl Handover {
    /// The handover for move-assigning the contents of a container using
    /// `src` into one using `dst`.
    pub(crate) fn for_move_assign<A: Allocator>(dst: &A, src: &A) -> Self {
        if A::ON_MOVE_ASSIGN.propagates() {
            Self::Propagate
        } else {
            Self::for_take(dst, src)
        }
    }

    /// The handover for moving the contents of a container using `current`
    /// into a new container using `target`.
    pub(crate) fn for_take<A: Allocator>(target: &A, current: &A) -> Self {
        if allocator::equal(target, current) {
            Self::Adopt
        } else {
            Self::Relocate
        }
    }
}

/// The allocator a container using `dst` copies with when it is
/// copy-assigned from a container using `src`.
pub(crate) fn copy_assign_allocator<A: Allocator>(dst: &A, src: &A) -> A {
    if A::ON_COPY_ASSIGN.propagates() {
        src.clone()
    } else {
        dst.clone()
    }
}

/// Exchanges the allocators of two containers being swapped, or checks that
/// they can stay where they are.
///
/// Returns [`Error::AllocatorMismatch`] without touching either allocator
/// when they neither propagate nor compare equal.
pub(crate) fn swap_allocators<A: Allocator>(left: &mut A, right: &mut A) -> Result<()> {
    if A::ON_SWAP.propagates() {
        core::mem::swap(left, right);
    } else if !allocator::equal(left, right) {
        return Err(Error::AllocatorMismatch);
    }
    Ok(())
}

/// Copies `blocks` into fresh blocks from `allocator`.
///
/// On failure every block obtained so far is released again.
fn copy_blocks<A, F>(allocator: &A, blocks: &[Allocation], mut copier: F) -> Result<Vec<Allocation>>
where
    A: Allocator,
    F: FnMut(&Allocation, &Allocation),
{
    let mut copies = Vec::with_capacity(blocks.len());
    for block in blocks {
        match Allocation::copy_construct(allocator, block, &mut copier) {
            Ok(copy) => copies.push(copy),
            Err(error) => {
                for mut copy in copies {
                    // SAFETY: Each copy was produced by `allocator` just above and
                    // holds plain bytes.
                    unsafe {
                        copy.deallocate(allocator);
                    }
                }
                return Err(error.into());
            }
        }
    }
    Ok(copies)
}

/// A copier that duplicates the bytes of a block.
fn copy_bytes(dst: &Allocation, src: &Allocation) {
    // SAFETY:
    // 1. `dst` is a block fresh from `Allocation::copy_construct`
    // 2. A fresh block never aliases its source
    unsafe {
        dst.copy_bytes_from(src);
    }
}

impl<A: Allocator + Default> Default for AllocatorAware<A> {
    fn default() -> Self {
        Self::new_in(A::default())
    }
}

impl<A: Allocator> Clone for AllocatorAware<A> {
    /// Copies every block byte for byte.
    ///
    /// Aborts through [`handle_alloc_error`] if a block cannot be obtained.
    ///
    /// [`handle_alloc_error`]: alloc::alloc::handle_alloc_error
    fn clone(&self) -> Self {
        abort_on_error(self.try_clone())
    }
}

impl<A: Allocator> Drop for AllocatorAware<A> {
    fn drop(&mut self) {
        self.deallocate_all();
    }
}

impl<A: Allocator + fmt::Debug> fmt::Debug for AllocatorAware<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AllocatorAware")
            .field("allocator", &self.allocator)
            .field("allocations", &self.allocations)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;
    use crate::tracking::Tracking;

    assert_impl_all!(AllocatorAware<Global>: Send, Sync);

    fn bytes<A: Allocator>(wrapper: &AllocatorAware<A>, index: usize) -> u32 {
        let allocation = wrapper.get(index).unwrap();
        // SAFETY: The tests only read blocks they wrote a `u32` into
        unsafe { allocation.as_ptr::<u32>().read() }
    }

    fn write<A: Allocator>(wrapper: &AllocatorAware<A>, index: usize, value: u32) {
        let allocation = wrapper.get(index).unwrap();
        // SAFETY: The block was allocated with the layout of `u32`
        unsafe { allocation.as_ptr::<u32>().write(value) };
    }

    #[test]
    fn test_handover_rules() {
        let (first, second) = (Tracking::new(), Tracking::new());
        // Trackers follow `Global`: propagate on move-assignment only.
        assert_eq!(
            Handover::for_move_assign(&first, &second),
            Handover::Propagate
        );
        assert_eq!(Handover::for_take(&first, &first.clone()), Handover::Adopt);
        assert_eq!(Handover::for_take(&first, &second), Handover::Relocate);
        assert!(copy_assign_allocator(&first, &second) == first);

        let (mut left, mut right) = (first.clone(), second.clone());
        assert_eq!(
            swap_allocators(&mut left, &mut right),
            Err(Error::AllocatorMismatch)
        );
        assert!(left == first);
        assert!(swap_allocators(&mut left, &mut first.clone()).is_ok());
        assert!(left == first);
    }

    #[test]
    fn test_index_checks() {
        let mut wrapper = AllocatorAware::new_in(Tracking::new());
        wrapper.allocate(Layout::new::<u32>()).unwrap();

        assert_eq!(
            wrapper.deallocate(1),
            Err(Error::IndexOutOfRange { index: 1, len: 1 })
        );
        assert_eq!(
            wrapper.reallocate(5, Layout::new::<u8>()).unwrap_err(),
            Error::IndexOutOfRange { index: 5, len: 1 }
        );
        #[allow(clippy::reversed_empty_ranges)]
        let reversed = 1..0;
        assert_eq!(
            wrapper.deallocate_range(reversed),
            Err(Error::InvalidRange { start: 1, end: 0 })
        );
        assert_eq!(
            wrapper.deallocate_range(0..=3),
            Err(Error::IndexOutOfRange { index: 3, len: 1 })
        );
        assert!(wrapper.deallocate_range(..).is_ok());
        assert!(!wrapper.has_value());
        assert_eq!(wrapper.len(), 1);
    }

    #[test]
    fn test_reallocate_replaces_block() {
        let tracking = Tracking::new();
        let mut wrapper = AllocatorAware::new_in(tracking.clone());
        wrapper.allocate(Layout::new::<u32>()).unwrap();
        wrapper.reallocate(0, Layout::new::<[u32; 4]>()).unwrap();

        let stats = tracking.stats();
        assert_eq!(stats.allocations, 2);
        assert_eq!(stats.live_blocks, 1);
        assert_eq!(stats.live_bytes, 16);
    }

    #[test]
    fn test_clone_copies_bytes() {
        let mut wrapper = AllocatorAware::new_in(Tracking::new());
        wrapper.allocate(Layout::new::<u32>()).unwrap();
        write(&wrapper, 0, 0xdead_beef);

        let copy = wrapper.clone();
        assert_eq!(bytes(&copy, 0), 0xdead_beef);
        assert_ne!(copy.get(0).unwrap().ptr(), wrapper.get(0).unwrap().ptr());
        assert!(copy.allocator() == wrapper.allocator());
    }

    #[test]
    fn test_take_in_relocates_between_allocators() {
        let first = Tracking::new();
        let second = Tracking::new();
        let mut wrapper = AllocatorAware::new_in(first.clone());
        wrapper.allocate(Layout::new::<u32>()).unwrap();
        write(&wrapper, 0, 7);

        let moved = wrapper.take_in(second.clone()).unwrap();
        assert!(wrapper.is_empty());
        assert_eq!(bytes(&moved, 0), 7);
        assert_eq!(first.stats().live_blocks, 0);
        assert_eq!(second.stats().live_blocks, 1);

        let mut moved = moved;
        let adopted = moved.take_in(second.clone()).unwrap();
        assert_eq!(second.stats().allocations, 1);
        assert_eq!(bytes(&adopted, 0), 7);
    }

    #[test]
    fn test_drop_releases_everything() {
        let tracking = Tracking::new();
        {
            let mut wrapper = AllocatorAware::new_in(tracking.clone());
            for size in 1..=4 {
                wrapper
                    .allocate(Layout::from_size_align(size * 8, 8).unwrap())
                    .unwrap();
            }
            assert_eq!(tracking.stats().live_bytes, 80);
        }
        assert_eq!(tracking.stats().live_blocks, 0);
    }
}
