//! Cleanup of prototype services on container shutdown.
//!
//! # Features
//!
//! * Shared (singleton) and local (prototype) services
//! * Dependency Injection through constructors that resolve other services
//! * Optional registration of custom constructors
//! * Init hooks and post-processors that observe every construction
//! * Best effort cleanup on close, for singletons and tracked prototypes
//!
//! # Scopes
//!
//! [**Shared**] instances are constructed once and owned by the container.
//! When the container is [closed], it disposes every shared instance that
//! exposes the [`IDisposable`] capability.
//!
//! [**Local**] instances are constructed each time they are resolved. The
//! container hands them out and keeps no record of them, so on its own it
//! never disposes them. Register a [`LifecycleTracker`] as post-processor to
//! dispose them on close as well. The tracker only holds weak references: it
//! never keeps an instance alive.
//!
//! ```
//! use rslifecycle::{
//!     DisposeError, IDisposable, ILocal, IService, LifecycleTracker, Local, ServiceContainer,
//! };
//! use std::sync::Arc;
//!
//! struct Connection;
//!
//! impl IDisposable for Connection {
//!     fn dispose(&self) -> Result<(), DisposeError> {
//!         println!("closing connection");
//!         Ok(())
//!     }
//! }
//!
//! impl IService for Connection {
//!     fn disposable(this: &Arc<Self>) -> Option<Arc<dyn IDisposable>> {
//!         Some(this.clone())
//!     }
//! }
//!
//! impl ILocal for Connection {
//!     type Parameters = ();
//!     type Error = ();
//!
//!     fn construct(_: &mut ServiceContainer, _: ()) -> Result<Local<Self>, ()> {
//!         Ok(Local::new(Connection))
//!     }
//! }
//!
//! let tracker = Arc::new(LifecycleTracker::new());
//! let mut ctn = ServiceContainer::builder()
//!     .with_post_processor(tracker.clone())
//!     .build();
//!
//! let connection = ctn.local::<Connection>(()).unwrap();
//! assert_eq!(tracker.len(), 1);
//!
//! let report = ctn.close();
//! assert_eq!(report.disposed().count(), 1);
//! drop(connection);
//! ```
//!
//! # Failures
//!
//! A `dispose` that returns an error or panics is logged through the `log`
//! facade and recorded in the returned [`ShutdownReport`]. It never stops
//! the cleanup of the other instances.
//!
//! [**Shared**]: Shared
//! [**Local**]: Local
//! [closed]: ServiceContainer::close

mod builder;
mod container;
mod disposable;
mod getters;
mod internal_helpers;
mod post_processor;
mod service_traits;
mod tracker;


pub use crate::builder::ContainerBuilder;
pub use crate::container::ServiceContainer;
pub use crate::disposable::{
    CleanupFailure, CleanupOutcome, DisposeError, IDisposable, ShutdownReport,
};
pub use crate::getters::{Local, Shared};
pub use crate::post_processor::{CreatedInstance, IPostProcessor};
pub use crate::service_traits::{ILocal, IService, IShared, Scope};
pub use crate::tracker::{LifecycleTracker, TrackedInstance};
