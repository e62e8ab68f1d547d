//! Manage a resource that can be started, stopped, and destroyed – i.e. a
//! [`Subject`] – and which has different facets depending on whether it is
//! locked exclusively, shared between multiple users, or unlocked/free.
//!
//! For example, a resource representing a PostgreSQL cluster would allow start,
//! stop, and destroy actions only when it is exclusively locked. The _type_ of
//! an unlocked cluster resource or a shared cluster resource would not even
//! have functions available to start, stop, or destroy the cluster.
//!
//! The intent is to codify safe behaviours into Rust's type system so that we
//! make it hard or impossible to mishandle a resource – and conversely, easier
//! to correctly handle a resource.

use super::{lock, CoordinateError, Subject};
use either::{Either, Left, Right};

// ----------------------------------------------------------------------------

/// The view of a resource available while it is unlocked.
pub trait FacetFree {
    type FacetFree<'a>
    where
        Self: 'a;

    fn facet_free(&self) -> Self::FacetFree<'_>;
}

/// The view of a resource available while it is locked shared.
pub trait FacetShared {
    type FacetShared<'a>
    where
        Self: 'a;

    fn facet_shared(&self) -> Self::FacetShared<'_>;
}

/// The view of a resource available while it is locked exclusively.
pub trait FacetExclusive {
    type FacetExclusive<'a>
    where
        Self: 'a;

    fn facet_exclusive(&self) -> Self::FacetExclusive<'_>;
}

// ----------------------------------------------------------------------------

/// An unlocked/free resource.
pub struct ResourceFree<R: Subject> {
    lock: lock::UnlockedFile,
    inner: R,
}

impl<R: Subject> ResourceFree<R> {
    pub fn new(lock: lock::UnlockedFile, inner: R) -> Self {
        Self { lock, inner }
    }

    /// Attempt to obtain a shared lock on the resource.
    pub fn try_shared(self) -> Result<Either<Self, ResourceShared<R>>, CoordinateError<R::Error>> {
        Ok(match self.lock.try_lock_shared()? {
            Left(lock) => Left(Self { inner: self.inner, lock }),
            Right(lock) => Right(ResourceShared { inner: self.inner, lock }),
        })
    }

    /// Obtain a shared lock on the resource. Can block indefinitely.
    pub fn shared(self) -> Result<ResourceShared<R>, CoordinateError<R::Error>> {
        let lock = self.lock.lock_shared()?;
        Ok(ResourceShared { inner: self.inner, lock })
    }

    /// Attempt to obtain an exclusive lock on the resource.
    pub fn try_exclusive(
        self,
    ) -> Result<Either<Self, ResourceExclusive<R>>, CoordinateError<R::Error>> {
        Ok(match self.lock.try_lock_exclusive()? {
            Left(lock) => Left(Self { inner: self.inner, lock }),
            Right(lock) => Right(ResourceExclusive { inner: self.inner, lock }),
        })
    }

    /// Obtain an exclusive lock on the resource. Can block indefinitely.
    pub fn exclusive(self) -> Result<ResourceExclusive<R>, CoordinateError<R::Error>> {
        let lock = self.lock.lock_exclusive()?;
        Ok(ResourceExclusive { inner: self.inner, lock })
    }
}

impl<R: Subject + FacetFree> ResourceFree<R> {
    /// Return the free facet of the wrapped resource.
    pub fn facet(&self) -> R::FacetFree<'_> {
        self.inner.facet_free()
    }
}

// ----------------------------------------------------------------------------

/// A shared resource.
pub struct ResourceShared<R: Subject> {
    lock: lock::LockedFileShared,
    inner: R,
}

impl<R: Subject> ResourceShared<R> {
    pub fn new(lock: lock::LockedFileShared, inner: R) -> Self {
        Self { lock, inner }
    }

    /// Attempt to obtain an exclusive lock on the resource.
    pub fn try_exclusive(
        self,
    ) -> Result<Either<Self, ResourceExclusive<R>>, CoordinateError<R::Error>> {
        Ok(match self.lock.try_lock_exclusive()? {
            Left(lock) => Left(Self { inner: self.inner, lock }),
            Right(lock) => Right(ResourceExclusive { inner: self.inner, lock }),
        })
    }

    /// Obtain an exclusive lock on the resource. Can block indefinitely.
    pub fn exclusive(self) -> Result<ResourceExclusive<R>, CoordinateError<R::Error>> {
        let lock = self.lock.lock_exclusive()?;
        Ok(ResourceExclusive { inner: self.inner, lock })
    }

    /// Attempt to release this resource.
    pub fn try_release(self) -> Result<Either<Self, ResourceFree<R>>, CoordinateError<R::Error>> {
        Ok(match self.lock.try_unlock()? {
            Left(lock) => Left(Self { inner: self.inner, lock }),
            Right(lock) => Right(ResourceFree { inner: self.inner, lock }),
        })
    }

    /// Release this resource. Can block indefinitely.
    pub fn release(self) -> Result<ResourceFree<R>, CoordinateError<R::Error>> {
        let lock = self.lock.unlock()?;
        Ok(ResourceFree { inner: self.inner, lock })
    }
}

impl<R: Subject + FacetShared> ResourceShared<R> {
    /// Return the shared facet of the wrapped resource.
    pub fn facet(&self) -> R::FacetShared<'_> {
        self.inner.facet_shared()
    }
}

// ----------------------------------------------------------------------------

/// A resource held exclusively.
pub struct ResourceExclusive<R: Subject> {
    lock: lock::LockedFileExclusive,
    inner: R,
}

impl<R: Subject> ResourceExclusive<R> {
    pub fn new(lock: lock::LockedFileExclusive, inner: R) -> Self {
        Self { lock, inner }
    }

    /// Attempt to obtain a shared lock on the resource.
    pub fn try_shared(self) -> Result<Either<Self, ResourceShared<R>>, CoordinateError<R::Error>> {
        Ok(match self.lock.try_lock_shared()? {
            Left(lock) => Left(Self { inner: self.inner, lock }),
            Right(lock) => Right(ResourceShared { inner: self.inner, lock }),
        })
    }

    /// Obtain a shared lock on the resource. Can block indefinitely.
    pub fn shared(self) -> Result<ResourceShared<R>, CoordinateError<R::Error>> {
        let lock = self.lock.lock_shared()?;
        Ok(ResourceShared { inner: self.inner, lock })
    }

    /// Attempt to release this resource.
    pub fn try_release(self) -> Result<Either<Self, ResourceFree<R>>, CoordinateError<R::Error>> {
        Ok(match self.lock.try_unlock()? {
            Left(lock) => Left(Self { inner: self.inner, lock }),
            Right(lock) => Right(ResourceFree { inner: self.inner, lock }),
        })
    }

    /// Release this resource. Can block indefinitely.
    pub fn release(self) -> Result<ResourceFree<R>, CoordinateError<R::Error>> {
        let lock = self.lock.unlock()?;
        Ok(ResourceFree { inner: self.inner, lock })
    }
}

impl<R: Subject + FacetExclusive> ResourceExclusive<R> {
    /// Return the exclusive facet of the wrapped resource.
    pub fn facet(&self) -> R::FacetExclusive<'_> {
        self.inner.facet_exclusive()
    }
}
