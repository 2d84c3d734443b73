//! Hooks into the creation and shutdown of services.

use crate::disposable::{IDisposable, ShutdownReport};
use crate::service_traits::Scope;
use crate::tracker::TrackedInstance;
use std::fmt;
use std::sync::Arc;

/// A freshly constructed and initialized instance, as seen by a
/// post-processor.
pub struct CreatedInstance<'a> {
    name: &'a str,
    scope: Scope,
    disposable: Option<Arc<dyn IDisposable>>,
}

impl<'a> CreatedInstance<'a> {
    /// Describes a created instance.
    ///
    /// `disposable` is the cleanup capability of the instance, if it has one.
    pub fn new(name: &'a str, scope: Scope, disposable: Option<Arc<dyn IDisposable>>) -> Self {
        Self {
            name,
            scope,
            disposable,
        }
    }

    /// The name of the service.
    pub fn name(&self) -> &'a str {
        self.name
    }

    /// The lifetime policy the instance was created under.
    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// The cleanup capability of the instance.
    pub fn disposable(&self) -> Option<&Arc<dyn IDisposable>> {
        self.disposable.as_ref()
    }

    /// Returns a non-owning handle to the instance that can be tracked until
    /// shutdown.
    pub fn track(&self) -> TrackedInstance {
        match &self.disposable {
            Some(target) => TrackedInstance::from_dyn(self.name, target),
            None => TrackedInstance::opaque(self.name),
        }
    }
}

impl fmt::Debug for CreatedInstance<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreatedInstance")
            .field("name", &self.name)
            .field("scope", &self.scope)
            .field("disposable", &self.disposable.is_some())
            .finish()
    }
}

/// Observes the instances a container creates and takes part in its
/// shutdown.
///
/// Register post-processors with
/// [`ContainerBuilder::with_post_processor`](crate::ContainerBuilder::with_post_processor).
pub trait IPostProcessor: Send + Sync {
    /// Called for every instance after it is constructed and initialized,
    /// before it is handed out.
    fn after_initialization(&self, _created: &CreatedInstance<'_>) {}

    /// Called once when the container closes, before the singletons are
    /// disposed.
    fn shutdown(&self) -> ShutdownReport {
        ShutdownReport::new()
    }
}
