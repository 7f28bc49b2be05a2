use core::{
    any::{TypeId, type_name},
    fmt,
    marker::PhantomData,
};

use anyalloc_internals::{
    RawObject,
    allocator::{
        self, Allocator, Global, Initializer, UsesAllocator, UsingAllocator, Value, WithAllocator,
    },
    requirement::{MemberRequirements, Normal, Present, Requirements, Satisfies, Supports},
};
use tracing::{debug, trace};

use crate::{
    allocator_aware::{Handover, copy_assign_allocator, swap_allocators},
    error::{Error, Result},
    util::abort_on_error,
};

/// A container for at most one value of any type, stored in memory from an
/// allocator `A`.
///
/// The requirement specification `R` decides which operations the container
/// offers and which types it accepts: a value of type `T` can only be stored
/// if `R: Supports<T, A>`, which in turn requires `T: Clone` when copying is
/// fallible and `T: Copy` when it is infallible. Operations whose field of
/// `R` is [`Absent`](crate::requirements::Absent) do not exist on the container at all.
///
/// | preset                   | move-construct | copy-construct | move-assign | copy-assign |
/// |--------------------------|----------------|----------------|-------------|-------------|
/// | [`Trivial`](crate::Trivial) | -           | -              | -           | -           |
/// | [`Unique`](crate::Unique)   | infallible  | -              | infallible  | -           |
/// | [`Normal`](crate::Normal)   | fallible    | fallible       | infallible  | fallible    |
/// | [`Strict`](crate::Strict)   | infallible  | infallible     | infallible  | infallible  |
///
/// # Examples
///
/// ```
/// use anyalloc::ObjectAllocation;
///
/// let mut object: ObjectAllocation = ObjectAllocation::new();
/// object.emplace(5_i32)?;
/// assert_eq!(object.get::<i32>(), Some(&5));
///
/// object.emplace(String::from("five"))?;
/// assert_eq!(object.get::<i32>(), None);
/// assert_eq!(object.get::<String>().map(String::as_str), Some("five"));
///
/// let copy = object.try_clone()?;
/// assert!(copy.is::<String>());
/// # Ok::<(), anyalloc::Error>(())
/// ```
///
/// The allocator follows the same propagation rules as
/// [`AllocatorAware`](crate::AllocatorAware) on assignment and swap.
///
/// Types that cannot honor the requirements are rejected at compile time:
///
/// ```compile_fail
/// use anyalloc::{ObjectAllocation, Strict};
///
/// let mut object = ObjectAllocation::<Strict>::new();
/// // `String` is not `Copy`, so it cannot be copied infallibly.
/// object.emplace(String::new());
/// ```
pub struct ObjectAllocation<R: Requirements = Normal, A: Allocator = Global> {
    allocator: A,
    raw: RawObject<A>,
    _requirements: PhantomData<fn() -> R>,
}

impl<R: Requirements, A: Allocator + Default> ObjectAllocation<R, A> {
    /// Creates an empty container with a default allocator.
    #[must_use]
    pub fn new() -> Self {
        Self::new_in(A::default())
    }

    /// Creates a container holding `value`, using a default allocator.
    pub fn with_value<T>(value: T) -> Result<Self>
    where
        T: 'static,
        R: Supports<T, A>,
    {
        Self::with_value_in(value, A::default())
    }
}

impl<R: Requirements, A: Allocator> ObjectAllocation<R, A> {
    /// Creates an empty container using `allocator`.
    #[must_use]
    pub const fn new_in(allocator: A) -> Self {
        Self::from_raw(allocator, RawObject::new())
    }

    /// Creates a container holding `value`, using `allocator`.
    pub fn with_value_in<T>(value: T, allocator: A) -> Result<Self>
    where
        T: 'static,
        R: Supports<T, A>,
    {
        Self::with_init_in(Value(value), allocator)
    }

    /// Creates a container holding the value produced by `init`, using
    /// `allocator`.
    pub fn with_init_in<T, I>(init: I, allocator: A) -> Result<Self>
    where
        T: 'static,
        R: Supports<T, A>,
        I: Initializer<T, A>,
    {
        let mut object = Self::new_in(allocator);
        object.emplace_init(init)?;
        Ok(object)
    }

    const fn from_raw(allocator: A, raw: RawObject<A>) -> Self {
        Self {
            allocator,
            raw,
            _requirements: PhantomData,
        }
    }

    /// Stores `value`, replacing the current value.
    ///
    /// When the container already holds a `T` and `R` offers move assignment,
    /// `value` is assigned over the current one and the block is reused.
    /// Otherwise the current value is destroyed and a block sized for `T` is
    /// obtained. If that fails the container is left empty.
    pub fn emplace<T>(&mut self, value: T) -> Result<&mut T>
    where
        T: 'static,
        R: Supports<T, A>,
    {
        self.emplace_init(Value(value))
    }

    /// Stores the value returned by `f`, which receives the allocator.
    ///
    /// ```
    /// use anyalloc::{ObjectAllocation, tracking::Tracking};
    ///
    /// let mut object = ObjectAllocation::<anyalloc::Unique, _>::new_in(Tracking::new());
    /// object.emplace_with(|allocator: &Tracking| allocator.clone())?;
    /// assert!(object.get::<Tracking>() == Some(object.allocator()));
    /// # Ok::<(), anyalloc::Error>(())
    /// ```
    pub fn emplace_with<T, F>(&mut self, f: F) -> Result<&mut T>
    where
        T: 'static,
        R: Supports<T, A>,
        F: FnOnce(&A) -> T,
    {
        self.emplace_init(WithAllocator(f))
    }

    /// Stores a `T` built from `args` and the allocator through
    /// [`UsesAllocator`].
    pub fn emplace_using<T, Args>(&mut self, args: Args) -> Result<&mut T>
    where
        T: UsesAllocator<A, Args> + 'static,
        R: Supports<T, A>,
    {
        self.emplace_init(UsingAllocator(args))
    }

    /// Stores the value produced by `init`.
    ///
    /// This is the general form of [`emplace`](Self::emplace),
    /// [`emplace_with`](Self::emplace_with) and
    /// [`emplace_using`](Self::emplace_using).
    pub fn emplace_init<T, I>(&mut self, init: I) -> Result<&mut T>
    where
        T: 'static,
        R: Supports<T, A>,
        I: Initializer<T, A>,
    {
        if R::MOVE_ASSIGN.is_some() && self.raw.is::<T>() {
            trace!(type_name = type_name::<T>(), "assigning value in place");
        } else {
            trace!(
                type_name = type_name::<T>(),
                replaced = ?self.raw.type_name(),
                "emplacing value"
            );
        }

        // SAFETY:
        // 1. The block of `self.raw` was produced by `self.allocator`
        let result = unsafe { self.raw.emplace::<T, R, I>(&self.allocator, init) };
        result.map_err(|error| {
            debug!(%error, type_name = type_name::<T>(), "emplace failed, container left empty");
            Error::from(error)
        })
    }

    /// Stores the value returned by `f`, or leaves the container untouched
    /// if `f` fails.
    ///
    /// ```
    /// use anyalloc::ObjectAllocation;
    ///
    /// #[derive(Debug)]
    /// enum LoadError {
    ///     Parse(std::num::ParseIntError),
    ///     Storage(anyalloc::Error),
    /// }
    ///
    /// impl From<anyalloc::Error> for LoadError {
    ///     fn from(error: anyalloc::Error) -> Self {
    ///         Self::Storage(error)
    ///     }
    /// }
    ///
    /// let mut object: ObjectAllocation = ObjectAllocation::with_value(1_u8)?;
    /// let result = object.try_emplace_with(|_| "x".parse::<u32>().map_err(LoadError::Parse));
    /// assert!(matches!(result, Err(LoadError::Parse(_))));
    /// assert_eq!(object.get::<u8>(), Some(&1));
    /// # Ok::<(), anyalloc::Error>(())
    /// ```
    pub fn try_emplace_with<T, E, F>(&mut self, f: F) -> Result<&mut T, E>
    where
        T: 'static,
        R: Supports<T, A>,
        F: FnOnce(&A) -> Result<T, E>,
        E: From<Error>,
    {
        let value = f(&self.allocator)?;
        self.emplace(value).map_err(E::from)
    }

    /// Destroys the value, if any, and releases its block.
    pub fn clear(&mut self) {
        if let Some(type_name) = self.raw.type_name() {
            trace!(type_name, "clearing value");
        }
        // SAFETY:
        // 1. The block of `self.raw` was produced by `self.allocator`
        unsafe {
            self.raw.destroy(&self.allocator);
        }
    }

    /// A reference to the value if it is a `T`.
    #[inline]
    pub fn get<T: 'static>(&self) -> Option<&T> {
        if self.raw.is::<T>() {
            // SAFETY:
            // 1. The container holds a `T`, checked right above
            Some(unsafe { self.raw.get_unchecked::<T>() })
        } else {
            None
        }
    }

    /// A mutable reference to the value if it is a `T`.
    #[inline]
    pub fn get_mut<T: 'static>(&mut self) -> Option<&mut T> {
        if self.raw.is::<T>() {
            // SAFETY:
            // 1. The container holds a `T`, checked right above
            Some(unsafe { self.raw.get_unchecked_mut::<T>() })
        } else {
            None
        }
    }

    /// A reference to the value, without checking its type.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. The container holds a `T`.
    #[inline]
    pub unsafe fn get_unchecked<T: 'static>(&self) -> &T {
        // SAFETY: Guaranteed by the caller
        unsafe { self.raw.get_unchecked::<T>() }
    }

    /// A mutable reference to the value, without checking its type.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. The container holds a `T`.
    #[inline]
    pub unsafe fn get_unchecked_mut<T: 'static>(&mut self) -> &mut T {
        // SAFETY: Guaranteed by the caller
        unsafe { self.raw.get_unchecked_mut::<T>() }
    }

    /// Returns `true` if the container holds a `T`.
    #[inline]
    pub fn is<T: 'static>(&self) -> bool {
        self.raw.is::<T>()
    }

    /// Returns `true` if the container holds a value.
    #[inline]
    pub fn has_value(&self) -> bool {
        self.raw.has_value()
    }

    /// The [`TypeId`] of the value.
    #[inline]
    pub fn type_id(&self) -> Option<TypeId> {
        self.raw.type_id()
    }

    /// The type name of the value.
    #[inline]
    pub fn type_name(&self) -> Option<&'static str> {
        self.raw.type_name()
    }

    /// The size in bytes of the value, `0` when empty.
    #[inline]
    pub fn size(&self) -> usize {
        self.raw.size()
    }

    /// The size in bytes of the block holding the value.
    ///
    /// Zero-sized values hold no block.
    #[inline]
    pub fn reserved(&self) -> usize {
        self.raw.allocation().size()
    }

    /// The allocator the value's block comes from.
    #[inline]
    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    /// The runtime view of `R`.
    #[inline]
    pub const fn requirements(&self) -> MemberRequirements {
        R::MEMBERS
    }

    /// Exchanges the contents of two containers.
    ///
    /// If the allocator propagates on swap the allocators are exchanged too.
    /// Otherwise the allocators must be equal, and
    /// [`Error::AllocatorMismatch`] is returned if they are not.
    pub fn swap(&mut self, other: &mut Self) -> Result<()> {
        swap_allocators(&mut self.allocator, &mut other.allocator)?;
        core::mem::swap(&mut self.raw, &mut other.raw);
        Ok(())
    }

    /// Re-types the container under weaker requirements without touching the
    /// value.
    ///
    /// ```
    /// use anyalloc::{Normal, ObjectAllocation, Unique};
    ///
    /// let object = ObjectAllocation::<Normal>::with_value(String::from("kept"))?;
    /// let unique: ObjectAllocation<Unique> = object.relax();
    /// assert_eq!(unique.get::<String>().map(String::as_str), Some("kept"));
    /// # Ok::<(), anyalloc::Error>(())
    /// ```
    #[must_use]
    pub fn relax<R2>(mut self) -> ObjectAllocation<R2, A>
    where
        R: Satisfies<R2>,
        R2: Requirements,
    {
        ObjectAllocation::from_raw(self.allocator.clone(), self.raw.take())
    }

    /// Copies the value into a container with weaker requirements.
    pub fn try_clone_as<R2>(&self) -> Result<ObjectAllocation<R2, A>>
    where
        R: Satisfies<R2>,
        R2: Requirements,
        R2::CopyConstruct: Present,
    {
        let allocator = self.allocator.select_on_copy();
        // The stored table was built for at least `R`, which covers `R2`.
        let raw = self.raw.copy_construct(&allocator)?;
        Ok(ObjectAllocation::from_raw(allocator, raw))
    }
}

impl<R, A> ObjectAllocation<R, A>
where
    R: Requirements,
    R::CopyConstruct: Present,
    A: Allocator,
{
    /// Copies the value into a new container, using the allocator chosen by
    /// [`Allocator::select_on_copy`].
    pub fn try_clone(&self) -> Result<Self> {
        self.try_clone_in(self.allocator.select_on_copy())
    }

    /// Copies the value into a new container using `allocator`.
    pub fn try_clone_in(&self, allocator: A) -> Result<Self> {
        let raw = self.raw.copy_construct(&allocator)?;
        Ok(Self::from_raw(allocator, raw))
    }
}

impl<R, A> ObjectAllocation<R, A>
where
    R: Requirements,
    R::MoveConstruct: Present,
    A: Allocator,
{
    /// Moves the value and its block into a new container with the same
    /// allocator, leaving this one empty.
    #[must_use]
    pub fn take(&mut self) -> Self {
        Self::from_raw(self.allocator.clone(), self.raw.take())
    }

    /// Moves the value into a new container using `allocator`, leaving this
    /// one empty.
    ///
    /// When `allocator` equals the current one the block is adopted.
    /// Otherwise the value is relocated into a block from `allocator` and the
    /// old block is released. On failure this container is untouched.
    pub fn take_in(&mut self, allocator: A) -> Result<Self> {
        if Handover::for_take(&allocator, &self.allocator) == Handover::Adopt {
            return Ok(Self::from_raw(allocator, self.raw.take()));
        }

        debug!(type_name = ?self.raw.type_name(), "allocators differ, relocating value");
        // SAFETY:
        // 1. The block of `self.raw` was produced by `self.allocator`
        let raw = unsafe { self.raw.move_construct(&allocator, &self.allocator) }?;
        Ok(Self::from_raw(allocator, raw))
    }
}

impl<R, A> ObjectAllocation<R, A>
where
    R: Requirements,
    R::MoveAssign: Present,
    A: Allocator,
{
    /// Moves the value of `other` into this container, leaving `other` empty.
    ///
    /// `other` may have stronger requirements than this container.
    ///
    /// - If the allocator propagates on move-assignment, this container
    ///   destroys its value and takes over `other`'s allocator and block.
    /// - If the allocators are equal and the stored types differ, the block
    ///   of `other` is adopted.
    /// - Otherwise the value is moved through `other`'s table: assigned in
    ///   place when both hold the same type, or relocated into a block from
    ///   this container's allocator. On failure `other` is untouched.
    pub fn assign_from<R2>(&mut self, other: &mut ObjectAllocation<R2, A>) -> Result<()>
    where
        R2: Satisfies<R>,
    {
        match Handover::for_move_assign(&self.allocator, &other.allocator) {
            Handover::Propagate => {
                self.clear();
                self.allocator = other.allocator.clone();
                self.raw = other.raw.take();
                return Ok(());
            }
            Handover::Adopt if !self.raw.same_type(&other.raw) => {
                self.clear();
                self.raw = other.raw.take();
                return Ok(());
            }
            Handover::Adopt => {}
            Handover::Relocate => {
                debug!(type_name = ?other.raw.type_name(), "allocators differ, relocating value");
            }
        }

        // SAFETY:
        // 1. The block of `self.raw` was produced by `self.allocator`
        // 2. The block of `other.raw` was produced by `other.allocator`
        unsafe {
            self.raw
                .move_assign(&self.allocator, &mut other.raw, &other.allocator)
        }?;
        Ok(())
    }
}

impl<R, A> ObjectAllocation<R, A>
where
    R: Requirements,
    R::CopyAssign: Present,
    A: Allocator,
{
    /// Copies the value of `other` into this container.
    ///
    /// `other` may have stronger requirements than this container. If the
    /// allocator propagates on copy-assignment this container first takes a
    /// clone of `other`'s allocator, releasing its value if the allocators
    /// differ. The value is then assigned in place when both hold the same
    /// type, or copied into a fresh block otherwise. An empty `other` empties
    /// this container.
    pub fn clone_assign_from<R2>(&mut self, other: &ObjectAllocation<R2, A>) -> Result<()>
    where
        R2: Satisfies<R>,
    {
        let allocator = copy_assign_allocator(&self.allocator, &other.allocator);
        if !allocator::equal(&allocator, &self.allocator) {
            self.clear();
        }
        self.allocator = allocator;

        // SAFETY:
        // 1. The block of `self.raw` was produced by `self.allocator`, which is
        //    either unchanged or equal to the one that produced it
        unsafe { self.raw.copy_assign(&self.allocator, &other.raw) }?;
        Ok(())
    }
}

impl<R: Requirements, A: Allocator + Default> Default for ObjectAllocation<R, A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R, A> Clone for ObjectAllocation<R, A>
where
    R: Requirements,
    R::CopyConstruct: Present,
    A: Allocator,
{
    /// Copies the value into a new container.
    ///
    /// Aborts through [`handle_alloc_error`] if the block cannot be obtained.
    ///
    /// [`handle_alloc_error`]: alloc::alloc::handle_alloc_error
    fn clone(&self) -> Self {
        abort_on_error(self.try_clone())
    }
}

impl<R: Requirements, A: Allocator> Drop for ObjectAllocation<R, A> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<R: Requirements, A: Allocator + fmt::Debug> fmt::Debug for ObjectAllocation<R, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectAllocation")
            .field("type_name", &self.raw.type_name())
            .field("size", &self.raw.size())
            .field("requirements", &R::MEMBERS)
            .field("allocator", &self.allocator)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use alloc::{
        rc::Rc,
        string::{String, ToString},
        vec,
        vec::Vec,
    };

    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;
    use crate::{requirements::*, tracking::Tracking};

    assert_not_impl_any!(ObjectAllocation: Send, Sync);
    assert_impl_all!(ObjectAllocation<Normal>: Clone, Default);
    assert_impl_all!(ObjectAllocation<Strict>: Clone);
    assert_not_impl_any!(ObjectAllocation<Unique>: Clone);
    assert_not_impl_any!(ObjectAllocation<Trivial>: Clone);

    #[test]
    fn test_emplace_replaces_type() {
        let tracking = Tracking::new();
        let mut object = ObjectAllocation::<Normal, _>::new_in(tracking.clone());
        assert!(!object.has_value());
        assert_eq!(object.type_name(), None);

        *object.emplace(1_u64).unwrap() += 1;
        assert_eq!(object.get::<u64>(), Some(&2));
        assert_eq!(object.size(), 8);
        assert_eq!(object.reserved(), 8);

        object.emplace("owned".to_string()).unwrap();
        assert!(object.get::<u64>().is_none());
        assert_eq!(object.type_id(), Some(TypeId::of::<String>()));
        assert_eq!(tracking.stats().live_blocks, 1);

        object.clear();
        assert!(!object.has_value());
        assert_eq!(tracking.stats().live_blocks, 0);
    }

    #[test]
    fn test_zero_sized_value() {
        let tracking = Tracking::new();
        let mut object = ObjectAllocation::<Strict, _>::new_in(tracking.clone());
        object.emplace(()).unwrap();
        assert!(object.has_value());
        assert!(object.is::<()>());
        assert_eq!(object.size(), 0);
        assert_eq!(object.reserved(), 0);
        assert_eq!(tracking.stats().allocations, 0);
    }

    #[test]
    fn test_get_mut_and_unchecked() {
        let mut object = ObjectAllocation::<Unique>::with_value(vec![1_u8, 2]).unwrap();
        object.get_mut::<Vec<u8>>().unwrap().push(3);
        // SAFETY: Holds a `Vec<u8>`
        assert_eq!(unsafe { object.get_unchecked::<Vec<u8>>() }, &[1, 2, 3]);
        // SAFETY: See above
        unsafe { object.get_unchecked_mut::<Vec<u8>>() }.clear();
        assert_eq!(object.get::<Vec<u8>>().map(Vec::len), Some(0));
        assert!(object.get_mut::<String>().is_none());
    }

    #[test]
    fn test_move_only_values() {
        let shared = Rc::new(5);
        let mut object = ObjectAllocation::<Unique>::with_value(Rc::clone(&shared)).unwrap();
        assert_eq!(Rc::strong_count(&shared), 2);

        let moved = object.take();
        assert!(!object.has_value());
        assert_eq!(moved.get::<Rc<i32>>().map(|rc| **rc), Some(5));

        drop(moved);
        assert_eq!(Rc::strong_count(&shared), 1);
    }

    #[test]
    fn test_requirements_reflection() {
        let object = ObjectAllocation::<Unique>::new();
        assert_eq!(object.requirements(), MemberRequirements::UNIQUE);
        let object = ObjectAllocation::<Req<Absent, Infallible, Absent, Absent>>::new();
        assert_eq!(object.requirements().copy_construct, Level::Infallible);
    }

    #[test]
    fn test_try_clone_as_weaker() {
        let object = ObjectAllocation::<Strict>::with_value(7_u16).unwrap();
        let copy: ObjectAllocation<Req<Absent, Fallible, Absent, Absent>> =
            object.try_clone_as().unwrap();
        assert_eq!(copy.get::<u16>(), Some(&7));
        assert_eq!(object.get::<u16>(), Some(&7));
    }

    #[test]
    fn test_clone_assign_in_place() {
        let tracking = Tracking::new();
        let mut dst = ObjectAllocation::<Normal, _>::with_value_in("a".to_string(), tracking.clone())
            .unwrap();
        let src = ObjectAllocation::<Strict, _>::with_value_in(3_i8, tracking.clone()).unwrap();
        dst.clone_assign_from(&src).unwrap();
        assert_eq!(dst.get::<i8>(), Some(&3));

        let block = tracking.live_blocks();
        dst.clone_assign_from(&src).unwrap();
        assert_eq!(tracking.live_blocks(), block);
    }

    #[test]
    fn test_debug_output() {
        let object = ObjectAllocation::<Normal>::with_value(1_u32).unwrap();
        let debug = alloc::format!("{object:?}");
        assert!(debug.contains("u32"));
        assert!(debug.contains("Global"));
    }
}
