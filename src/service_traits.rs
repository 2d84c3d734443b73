//! Traits for creating services.

use crate::container::ServiceContainer;
use crate::disposable::IDisposable;
use crate::getters::{Local, Shared};
use std::any::type_name;
use std::sync::Arc;

///////////////////////////////////////////////////////////////////////////////
// Scope
///////////////////////////////////////////////////////////////////////////////

/// The lifetime policy an instance was created under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// One shared instance, owned and cleaned up by the container.
    Singleton,
    /// A new instance per request. The container hands it out and keeps no
    /// record of it, so it never cleans it up.
    Prototype,
}

impl Scope {
    /// Returns `true` if the container cleans up instances of this scope.
    pub const fn is_managed(self) -> bool {
        matches!(self, Self::Singleton)
    }
}

///////////////////////////////////////////////////////////////////////////////
// Traits
///////////////////////////////////////////////////////////////////////////////

/// Behaviour shared by every service, whatever its scope.
pub trait IService: Sized + Send + Sync + 'static {
    /// A human readable name, used in logs and shutdown reports.
    fn name() -> &'static str {
        type_name::<Self>()
    }

    /// Called once after the instance is constructed, before post-processors
    /// see it and before it is handed out.
    fn init(_this: &Arc<Self>, _ctn: &mut ServiceContainer) {}

    /// Exposes the cleanup capability of the instance, if it has one.
    ///
    /// Implement this as `Some(this.clone())` for services that implement
    /// [`IDisposable`].
    fn disposable(_this: &Arc<Self>) -> Option<Arc<dyn IDisposable>> {
        None
    }
}

/// A type that can be used as a shared (singleton) service.
pub trait IShared: IService {
    /// The type of the error that can occur when constructing this service.
    type Error: 'static;

    /// Constructs the shared instance.
    fn construct(ctn: &mut ServiceContainer) -> Result<Shared<Self>, Self::Error>;
}

/// A type that can be used as a local (prototype) service.
pub trait ILocal: IService {
    /// Parameters for the `construct` method.
    type Parameters: 'static;

    /// The type of the error that can occur when constructing this service.
    type Error: 'static;

    /// Constructs a new local instance.
    fn construct(
        ctn: &mut ServiceContainer,
        params: Self::Parameters,
    ) -> Result<Local<Self>, Self::Error>;
}

///////////////////////////////////////////////////////////////////////////////
// Implementations
///////////////////////////////////////////////////////////////////////////////

impl IService for () {}

impl IShared for () {
    type Error = ();

    fn construct(_: &mut ServiceContainer) -> Result<Shared<Self>, Self::Error> {
        Ok(Shared::new(()))
    }
}

impl ILocal for () {
    type Parameters = ();
    type Error = ();

    fn construct(
        _: &mut ServiceContainer,
        _: Self::Parameters,
    ) -> Result<Local<Self>, Self::Error> {
        Ok(Local::new(()))
    }
}
