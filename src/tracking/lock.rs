#[cfg(feature = "std")]
use std::sync as impl_;

#[cfg(not(feature = "std"))]
use spin as impl_;

/// A reader-writer lock backed by `std` when available and by a spin lock
/// otherwise.
///
/// With `std`, a poisoned lock is entered anyway.
#[repr(transparent)]
pub(crate) struct RegistryLock<T>(impl_::RwLock<T>);

#[repr(transparent)]
pub(crate) struct RegistryReadGuard<'a, T>(impl_::RwLockReadGuard<'a, T>);

#[repr(transparent)]
pub(crate) struct RegistryWriteGuard<'a, T>(impl_::RwLockWriteGuard<'a, T>);

impl<T> RegistryLock<T> {
    #[must_use]
    pub(crate) const fn new(value: T) -> Self {
        Self(impl_::RwLock::new(value))
    }

    #[inline]
    pub(crate) fn read(&self) -> RegistryReadGuard<'_, T> {
        #[cfg(not(feature = "std"))]
        let guard = self.0.read();

        #[cfg(feature = "std")]
        let guard = self.0.read().unwrap_or_else(std::sync::PoisonError::into_inner);

        RegistryReadGuard(guard)
    }

    #[inline]
    pub(crate) fn write(&self) -> RegistryWriteGuard<'_, T> {
        #[cfg(not(feature = "std"))]
        let guard = self.0.write();

        #[cfg(feature = "std")]
        let guard = self.0.write().unwrap_or_else(std::sync::PoisonError::into_inner);

        RegistryWriteGuard(guard)
    }

    #[inline]
    pub(crate) fn get_mut(&mut self) -> &mut T {
        #[cfg(not(feature = "std"))]
        let value = self.0.get_mut();

        #[cfg(feature = "std")]
        let value = self.0.get_mut().unwrap_or_else(std::sync::PoisonError::into_inner);

        value
    }
}

impl<T> core::ops::Deref for RegistryReadGuard<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> core::ops::Deref for RegistryWriteGuard<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> core::ops::DerefMut for RegistryWriteGuard<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}
