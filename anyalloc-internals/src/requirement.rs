//! Requirement specifications for stored values.
//!
//! A container decides up front which special operations its values must
//! support. The decision is a [`Requirements`] type with four fields, one per
//! operation: move-construct, copy-construct, move-assign and copy-assign.
//! Destroy is always available. Each field is one of three levels:
//!
//! - [`Absent`]: the operation is not offered at all
//! - [`Fallible`]: the operation is offered and may panic
//! - [`Infallible`]: the operation is offered and cannot panic
//!
//! Moves in Rust are bitwise and cannot fail, so both present levels accept
//! any type for the two move fields. Copies require [`Clone`] at the
//! [`Fallible`] level and [`Copy`] at the [`Infallible`] level.
//!
//! The presets [`Trivial`], [`Unique`], [`Normal`] and [`Strict`] cover the
//! usual shapes; [`Req`] builds any other combination.
//!
//! [`Satisfies`] orders specifications field by field: a container whose
//! requirements satisfy another's may hand its value over to it.

use core::{fmt, marker::PhantomData};

use crate::{
    allocator::Allocator,
    object::vtable::{
        CopyAssignEntry, CopyAssignFn, CopyConstructEntry, CopyConstructFn, MoveAssignEntry,
        MoveAssignFn, MoveConstructEntry, MoveConstructFn,
    },
};

mod sealed {
    /// Keeps the set of levels closed.
    pub trait Sealed {}
}

/// Runtime view of a requirement level.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    /// The operation is not offered.
    Absent,
    /// The operation is offered and may panic.
    Fallible,
    /// The operation is offered and cannot panic.
    Infallible,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Absent => "absent",
            Self::Fallible => "fallible",
            Self::Infallible => "infallible",
        })
    }
}

/// A requirement level marker.
///
/// This trait is sealed: the only levels are [`Absent`], [`Fallible`] and
/// [`Infallible`].
pub trait Expectation: sealed::Sealed + 'static {
    /// The runtime value of this level.
    const LEVEL: Level;
}

/// Levels under which an operation is available.
pub trait Present: Expectation {}

/// Level ordering: `Self` is at least as strong as `E`.
pub trait Covers<E: Expectation>: Expectation {}

/// Marker for an operation that is not offered.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Absent;

/// Marker for an operation that is offered and may panic.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Fallible;

/// Marker for an operation that is offered and cannot panic.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Infallible;

impl sealed::Sealed for Absent {}
impl sealed::Sealed for Fallible {}
impl sealed::Sealed for Infallible {}

impl Expectation for Absent {
    const LEVEL: Level = Level::Absent;
}

impl Expectation for Fallible {
    const LEVEL: Level = Level::Fallible;
}

impl Expectation for Infallible {
    const LEVEL: Level = Level::Infallible;
}

impl Present for Fallible {}
impl Present for Infallible {}

impl Covers<Absent> for Absent {}
impl Covers<Absent> for Fallible {}
impl Covers<Fallible> for Fallible {}
impl Covers<Absent> for Infallible {}
impl Covers<Fallible> for Infallible {}
impl Covers<Infallible> for Infallible {}

/// Runtime view of a [`Requirements`] type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct MemberRequirements {
    /// Level of move construction.
    pub move_construct: Level,
    /// Level of copy construction.
    pub copy_construct: Level,
    /// Level of move assignment.
    pub move_assign: Level,
    /// Level of copy assignment.
    pub copy_assign: Level,
}

impl MemberRequirements {
    /// No special operations.
    pub const TRIVIAL: Self = Self::uniform(Level::Absent);
    /// Move-only values.
    pub const UNIQUE: Self = Self {
        move_construct: Level::Infallible,
        copy_construct: Level::Absent,
        move_assign: Level::Infallible,
        copy_assign: Level::Absent,
    };
    /// Regular values: movable and clonable.
    pub const NORMAL: Self = Self {
        move_construct: Level::Fallible,
        copy_construct: Level::Fallible,
        move_assign: Level::Infallible,
        copy_assign: Level::Fallible,
    };
    /// Every operation offered and infallible.
    pub const STRICT: Self = Self::uniform(Level::Infallible);

    /// Every field at `level`.
    #[inline]
    pub const fn uniform(level: Level) -> Self {
        Self {
            move_construct: level,
            copy_construct: level,
            move_assign: level,
            copy_assign: level,
        }
    }

    /// Returns `true` if every field of `self` is at least as strong as the
    /// matching field of `other`.
    #[inline]
    pub const fn satisfies(&self, other: &Self) -> bool {
        self.move_construct as u8 >= other.move_construct as u8
            && self.copy_construct as u8 >= other.copy_construct as u8
            && self.move_assign as u8 >= other.move_assign as u8
            && self.copy_assign as u8 >= other.copy_assign as u8
    }
}

impl PartialOrd for MemberRequirements {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        use core::cmp::Ordering;

        match (self.satisfies(other), other.satisfies(self)) {
            (true, true) => Some(Ordering::Equal),
            (true, false) => Some(Ordering::Greater),
            (false, true) => Some(Ordering::Less),
            (false, false) => None,
        }
    }
}

impl fmt::Display for MemberRequirements {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "move-construct: {}, copy-construct: {}, move-assign: {}, copy-assign: {}",
            self.move_construct, self.copy_construct, self.move_assign, self.copy_assign
        )
    }
}

/// A four-field requirement specification.
pub trait Requirements: 'static {
    /// Level of move construction.
    type MoveConstruct: Expectation;
    /// Level of copy construction.
    type CopyConstruct: Expectation;
    /// Level of move assignment.
    type MoveAssign: Expectation;
    /// Level of copy assignment.
    type CopyAssign: Expectation;

    /// Runtime view of this specification.
    const MEMBERS: MemberRequirements = MemberRequirements {
        move_construct: <Self::MoveConstruct as Expectation>::LEVEL,
        copy_construct: <Self::CopyConstruct as Expectation>::LEVEL,
        move_assign: <Self::MoveAssign as Expectation>::LEVEL,
        copy_assign: <Self::CopyAssign as Expectation>::LEVEL,
    };
}

/// A requirement specification built from four levels.
///
/// This type is never instantiated; it only appears as a type parameter.
pub struct Req<MoveConstruct, CopyConstruct, MoveAssign, CopyAssign>(
    PhantomData<fn() -> (MoveConstruct, CopyConstruct, MoveAssign, CopyAssign)>,
);

impl<MC, CC, MA, CA> Requirements for Req<MC, CC, MA, CA>
where
    MC: Expectation,
    CC: Expectation,
    MA: Expectation,
    CA: Expectation,
{
    type MoveConstruct = MC;
    type CopyConstruct = CC;
    type MoveAssign = MA;
    type CopyAssign = CA;
}

/// No special operations: values can only be emplaced and destroyed.
pub type Trivial = Req<Absent, Absent, Absent, Absent>;

/// Move-only values.
pub type Unique = Req<Infallible, Absent, Infallible, Absent>;

/// Regular values that can be moved and cloned.
pub type Normal = Req<Fallible, Fallible, Infallible, Fallible>;

/// Values whose every operation is infallible, which means they are [`Copy`].
pub type Strict = Req<Infallible, Infallible, Infallible, Infallible>;

/// `Self` is at least as strong as `R` in every field.
pub trait Satisfies<R: Requirements>: Requirements {}

impl<S, R> Satisfies<R> for S
where
    S: Requirements,
    R: Requirements,
    S::MoveConstruct: Covers<R::MoveConstruct>,
    S::CopyConstruct: Covers<R::CopyConstruct>,
    S::MoveAssign: Covers<R::MoveAssign>,
    S::CopyAssign: Covers<R::CopyAssign>,
{
}

/// Values of type `T` can be stored under these requirements with allocator
/// `A`.
///
/// Implemented automatically for every specification whose present fields
/// `T` can honor.
#[diagnostic::on_unimplemented(
    message = "`{T}` cannot be stored under the requirements `{Self}`",
    note = "copy fields require `Clone` when fallible and `Copy` when infallible"
)]
pub trait Supports<T: 'static, A: Allocator>: Requirements {
    /// The move-construct entry for `T`, if offered.
    #[doc(hidden)]
    const MOVE_CONSTRUCT: Option<MoveConstructFn<A>>;
    /// The copy-construct entry for `T`, if offered.
    #[doc(hidden)]
    const COPY_CONSTRUCT: Option<CopyConstructFn<A>>;
    /// The move-assign entry for `T`, if offered.
    #[doc(hidden)]
    const MOVE_ASSIGN: Option<MoveAssignFn<A>>;
    /// The copy-assign entry for `T`, if offered.
    #[doc(hidden)]
    const COPY_ASSIGN: Option<CopyAssignFn<A>>;
}

impl<T, A, R> Supports<T, A> for R
where
    T: 'static,
    A: Allocator,
    R: Requirements,
    R::MoveConstruct: MoveConstructEntry<T, A>,
    R::CopyConstruct: CopyConstructEntry<T, A>,
    R::MoveAssign: MoveAssignEntry<T, A>,
    R::CopyAssign: CopyAssignEntry<T, A>,
{
    const MOVE_CONSTRUCT: Option<MoveConstructFn<A>> =
        <R::MoveConstruct as MoveConstructEntry<T, A>>::ENTRY;
    const COPY_CONSTRUCT: Option<CopyConstructFn<A>> =
        <R::CopyConstruct as CopyConstructEntry<T, A>>::ENTRY;
    const MOVE_ASSIGN: Option<MoveAssignFn<A>> = <R::MoveAssign as MoveAssignEntry<T, A>>::ENTRY;
    const COPY_ASSIGN: Option<CopyAssignFn<A>> = <R::CopyAssign as CopyAssignEntry<T, A>>::ENTRY;
}
