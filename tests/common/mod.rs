//! Allocators and value types shared by the integration tests.

#![allow(dead_code)]

use std::{
    alloc::Layout,
    cell::{Cell, RefCell},
    ptr::NonNull,
    rc::Rc,
};

use anyalloc::{
    AllocError, Allocator, Global, Propagation,
    tracking::Tracking,
};

/// Forwards to `Global` and travels with its container on every operation.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct PropagateAll;

// SAFETY: Forwards to `Global`.
unsafe impl Allocator for PropagateAll {
    const ON_COPY_ASSIGN: Propagation = Propagation::Propagate;
    const ON_MOVE_ASSIGN: Propagation = Propagation::Propagate;
    const ON_SWAP: Propagation = Propagation::Propagate;

    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        Global.allocate(layout)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: Forwarded from the caller
        unsafe { Global.deallocate(ptr, layout) }
    }
}

/// Forwards to `Global` and never leaves its container.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct KeepAll;

// SAFETY: Forwards to `Global`.
unsafe impl Allocator for KeepAll {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        Global.allocate(layout)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: Forwarded from the caller
        unsafe { Global.deallocate(ptr, layout) }
    }
}

/// A tracker whose containers propagate it.
pub type Propagating = Tracking<PropagateAll>;

/// A tracker whose containers keep their own.
pub type Keeping = Tracking<KeepAll>;

pub fn propagating() -> Propagating {
    Tracking::new_in(PropagateAll)
}

pub fn keeping() -> Keeping {
    Tracking::new_in(KeepAll)
}

/// Forwards to `Global` until its budget of allocations runs out.
///
/// Clones share the budget.
#[derive(Clone, Debug)]
pub struct Budget(Rc<Cell<usize>>);

impl Budget {
    pub fn new(allocations: usize) -> Self {
        Self(Rc::new(Cell::new(allocations)))
    }

    pub fn refill(&self, allocations: usize) {
        self.0.set(allocations);
    }
}

impl PartialEq for Budget {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

// SAFETY: Forwards to `Global`, only refusing some requests.
unsafe impl Allocator for Budget {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        let remaining = self.0.get();
        if remaining == 0 {
            return Err(AllocError::new(layout));
        }
        self.0.set(remaining - 1);
        Global.allocate(layout)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: Forwarded from the caller
        unsafe { Global.deallocate(ptr, layout) }
    }
}

/// A tracker whose inner allocator can be made to fail.
pub fn budgeted(allocations: usize) -> (Tracking<Budget>, Budget) {
    let budget = Budget::new(allocations);
    (Tracking::new_in(budget.clone()), budget)
}

/// Records its name in a shared log when dropped.
#[derive(Clone, Debug)]
pub struct DropTracker {
    pub name: &'static str,
    pub log: Rc<RefCell<Vec<&'static str>>>,
}

impl Drop for DropTracker {
    fn drop(&mut self) {
        self.log.borrow_mut().push(self.name);
    }
}

/// A value whose `clone` panics while `armed` is set.
#[derive(Debug)]
pub struct PanicOnClone {
    pub armed: Rc<Cell<bool>>,
    pub payload: String,
}

impl Clone for PanicOnClone {
    fn clone(&self) -> Self {
        assert!(!self.armed.get(), "clone of an armed value");
        Self {
            armed: Rc::clone(&self.armed),
            payload: self.payload.clone(),
        }
    }

    fn clone_from(&mut self, source: &Self) {
        assert!(!self.armed.get(), "clone of an armed value");
        self.payload.clone_from(&source.payload);
    }
}

/// A value whose `drop` panics while `armed` is set.
#[derive(Debug)]
pub struct PanicOnDrop {
    pub armed: bool,
    pub payload: Box<u64>,
}

impl Drop for PanicOnDrop {
    fn drop(&mut self) {
        assert!(!self.armed, "drop of an armed value");
    }
}
