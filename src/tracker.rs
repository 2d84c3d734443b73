//! Cleanup of prototype instances on shutdown.
//!
//! The container hands out local instances without keeping a record of
//! them, so it cannot clean them up when it closes. A [`LifecycleTracker`]
//! registered as post-processor remembers every local instance and disposes
//! them all on [`shutdown`](LifecycleTracker::shutdown).

use crate::disposable::{dispose_isolated, CleanupOutcome, IDisposable, ShutdownReport};
use crate::post_processor::{CreatedInstance, IPostProcessor};
use log::{debug, trace, warn};
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

///////////////////////////////////////////////////////////////////////////////
// Tracked Instance
///////////////////////////////////////////////////////////////////////////////

/// A non-owning handle to an instance that may need cleanup.
#[derive(Debug)]
pub struct TrackedInstance {
    name: String,
    target: Option<Weak<dyn IDisposable>>,
}

impl TrackedInstance {
    /// Tracks an instance that exposes a cleanup capability.
    pub fn new<T: IDisposable + 'static>(name: impl Into<String>, instance: &Arc<T>) -> Self {
        let target = Arc::downgrade(instance) as Weak<dyn IDisposable>;
        Self {
            name: name.into(),
            target: Some(target),
        }
    }

    /// Tracks a type erased instance that exposes a cleanup capability.
    pub fn from_dyn(name: impl Into<String>, instance: &Arc<dyn IDisposable>) -> Self {
        Self {
            name: name.into(),
            target: Some(Arc::downgrade(instance)),
        }
    }

    /// Tracks an instance without a cleanup capability. It is skipped on
    /// shutdown.
    pub fn opaque(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: None,
        }
    }

    /// The name used in logs and reports.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` if the instance exposes a cleanup capability.
    pub fn is_disposable(&self) -> bool {
        self.target.is_some()
    }

    fn cleanup(self) -> (String, CleanupOutcome) {
        let outcome = match &self.target {
            None => {
                trace!("{} has no cleanup capability", self.name);
                CleanupOutcome::NotDisposable
            }
            Some(weak) => match weak.upgrade() {
                Some(target) => dispose_isolated(&self.name, &*target),
                None => {
                    debug!("{} was dropped before shutdown", self.name);
                    CleanupOutcome::Dropped
                }
            },
        };
        (self.name, outcome)
    }
}

///////////////////////////////////////////////////////////////////////////////
// Tracker
///////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Accepting,
    Drained,
}

#[derive(Debug)]
struct Registry {
    state: State,
    instances: Vec<TrackedInstance>,
}

/// Tracks instances whose lifetime the container does not manage and
/// disposes them on shutdown.
///
/// Share it through an `Arc`: register one clone with the container builder
/// and keep another if you want to inspect it.
///
/// A tracker is single-use. After [`shutdown`](Self::shutdown) it ignores
/// new records.
#[derive(Debug)]
pub struct LifecycleTracker {
    registry: Mutex<Registry>,
}

impl Default for LifecycleTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleTracker {
    /// Creates a new, empty tracker.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates a new tracker with room for `capacity` instances.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            registry: Mutex::new(Registry {
                state: State::Accepting,
                instances: Vec::with_capacity(capacity),
            }),
        }
    }

    /// The registry is consistent after every critical section, so a poisoned
    /// lock is safe to recover.
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a freshly constructed and initialized instance.
    ///
    /// Only instances with a non-managed lifetime are kept; the container
    /// cleans up the others itself.
    pub fn record(&self, instance: TrackedInstance, non_managed: bool) {
        if !non_managed {
            trace!("Not tracking {}, its lifetime is managed", instance.name);
            return;
        }

        let mut registry = self.registry();
        match registry.state {
            State::Accepting => {
                trace!("Tracking {}", instance.name);
                registry.instances.push(instance);
            }
            State::Drained => {
                drop(registry);
                warn!("Ignoring {}, it was created after shutdown", instance.name);
            }
        }
    }

    /// Disposes every tracked instance, in the order they were recorded.
    ///
    /// The registry is drained under the lock and the cleanup operations run
    /// after it is released. A failing cleanup is logged and reported, and
    /// never stops the others. Calling this again returns an empty report.
    pub fn shutdown(&self) -> ShutdownReport {
        let drained = {
            let mut registry = self.registry();
            registry.state = State::Drained;
            mem::take(&mut registry.instances)
        };

        debug!("Shutting down {} tracked instance(s)", drained.len());

        let mut report = ShutdownReport::with_capacity(drained.len());
        for instance in drained {
            let (name, outcome) = instance.cleanup();
            report.push(name, outcome);
        }
        report
    }

    /// The number of instances waiting for shutdown.
    pub fn len(&self) -> usize {
        self.registry().instances.len()
    }

    /// Returns `true` if no instance is waiting for shutdown.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        self.registry().state == State::Drained
    }
}

impl IPostProcessor for LifecycleTracker {
    fn after_initialization(&self, created: &CreatedInstance<'_>) {
        if created.scope().is_managed() {
            trace!("Not tracking {}, its lifetime is managed", created.name());
            return;
        }
        self.record(created.track(), true);
    }

    fn shutdown(&self) -> ShutdownReport {
        LifecycleTracker::shutdown(self)
    }
}

///////////////////////////////////////////////////////////////////////////////
// Tests
///////////////////////////////////////////////////////////////////////////////
