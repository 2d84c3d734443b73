//! Wrapper types to get and store services.

use crate::service_traits::{ILocal, IShared};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

///////////////////////////////////////////////////////////////////////////////
// Shared Instance
///////////////////////////////////////////////////////////////////////////////

/// A pointer to a shared instance from the service container.
///
/// The container keeps a clone of the pointer until it is closed.
#[repr(transparent)]
pub struct Shared<S: IShared> {
    /// The actual smart pointer to the shared instance.
    inner: Arc<S>,
}

impl<S: IShared> Shared<S> {
    /// Creates a shared instance from a value.
    pub fn new(value: S) -> Self {
        Self {
            inner: Arc::new(value),
        }
    }

    /// Creates a shared instance from an existing smart pointer.
    pub fn from_arc(inner: Arc<S>) -> Self {
        Self { inner }
    }

    /// Returns the inner smart pointer of the shared instance.
    pub fn into_inner(self) -> Arc<S> {
        self.inner
    }

    /// Returns a reference to the inner smart pointer.
    pub fn inner(&self) -> &Arc<S> {
        &self.inner
    }

    /// Returns true if both pointers point to the same instance.
    pub fn is(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<S: IShared> Deref for Shared<S> {
    type Target = S;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<S: IShared> Clone for Shared<S> {
    /// Clones the pointer to the shared instance.
    ///
    /// Only increases the reference count, so this is very cheap.
    fn clone(&self) -> Self {
        Shared {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: IShared + fmt::Debug> fmt::Debug for Shared<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shared")
            .field("inner", &self.inner)
            .finish()
    }
}

///////////////////////////////////////////////////////////////////////////////
// Local Instance
///////////////////////////////////////////////////////////////////////////////

/// A local instance of a service.
///
/// The caller that resolved it is its only owner. The container keeps no
/// reference, so dropping the last `Local` frees the instance. A
/// [`LifecycleTracker`](crate::LifecycleTracker) only observes it.
#[repr(transparent)]
pub struct Local<S: ILocal> {
    /// The actual instance of the service.
    inner: Arc<S>,
}

impl<S: ILocal> Local<S> {
    /// Creates a local service from a value.
    pub fn new(value: S) -> Self {
        Self {
            inner: Arc::new(value),
        }
    }

    /// Returns the inner pointer of the local service.
    pub fn into_inner(self) -> Arc<S> {
        self.inner
    }

    /// Returns a reference to the inner pointer.
    pub fn inner(&self) -> &Arc<S> {
        &self.inner
    }
}

impl<S: ILocal> Deref for Local<S> {
    type Target = S;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<S: ILocal + fmt::Debug> fmt::Debug for Local<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Local").field("inner", &self.inner).finish()
    }
}

///////////////////////////////////////////////////////////////////////////////
// Tests
///////////////////////////////////////////////////////////////////////////////
