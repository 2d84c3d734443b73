//! Internal storage helpers.

use crate::container::ServiceContainer;
use crate::disposable::IDisposable;
use crate::getters::{Local, Shared};
use crate::service_traits::{ILocal, IShared};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A custom constructor for a shared instance.
pub(crate) type SharedCtor<S> =
    fn(&mut ServiceContainer) -> Result<Shared<S>, <S as IShared>::Error>;

/// A custom constructor for a local instance.
pub(crate) type LocalCtor<S> =
    fn(&mut ServiceContainer, <S as ILocal>::Parameters) -> Result<Local<S>, <S as ILocal>::Error>;

/// A service in the container that is type erased.
///
/// Every field is keyed by the `TypeId` of the service, so downcasting back
/// to the concrete type always succeeds.
#[derive(Default)]
pub(crate) struct TypeErasedService {
    /// The shared instance, an `Arc<S>`.
    pub shared_ptr: Option<Arc<dyn Any + Send + Sync>>,
    /// Custom constructor for a shared instance, a `SharedCtor<S>`.
    pub shared_ctor: Option<Box<dyn Any + Send + Sync>>,
    /// Custom constructor for a local instance, a `LocalCtor<S>`.
    pub local_ctor: Option<Box<dyn Any + Send + Sync>>,
}

impl TypeErasedService {
    /// Returns a clone of the shared instance, if there is one.
    pub fn shared<S: IShared>(&self) -> Option<Shared<S>> {
        let ptr = Arc::clone(self.shared_ptr.as_ref()?);
        ptr.downcast::<S>().ok().map(Shared::from_arc)
    }

    /// Returns the custom shared constructor, if there is one.
    pub fn shared_ctor<S: IShared>(&self) -> Option<SharedCtor<S>> {
        self.shared_ctor
            .as_ref()?
            .downcast_ref::<SharedCtor<S>>()
            .copied()
    }

    /// Returns the custom local constructor, if there is one.
    pub fn local_ctor<S: ILocal>(&self) -> Option<LocalCtor<S>> {
        self.local_ctor
            .as_ref()?
            .downcast_ref::<LocalCtor<S>>()
            .copied()
    }
}

impl fmt::Debug for TypeErasedService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeErasedService")
            .field("shared_ptr", &self.shared_ptr.is_some())
            .field("shared_ctor", &self.shared_ctor.is_some())
            .field("local_ctor", &self.local_ctor.is_some())
            .finish()
    }
}

/// A singleton that must be disposed when the container closes.
pub(crate) struct SingletonDisposal {
    pub name: &'static str,
    pub target: Arc<dyn IDisposable>,
}

impl SingletonDisposal {
    /// Remembers the cleanup capability of a shared instance, if it has one.
    pub fn of<S: IShared>(instance: &Shared<S>) -> Option<Self> {
        S::disposable(instance.inner()).map(|target| SingletonDisposal {
            name: S::name(),
            target,
        })
    }
}

impl fmt::Debug for SingletonDisposal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingletonDisposal")
            .field("name", &self.name)
            .finish()
    }
}
