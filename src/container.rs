//! The service container.

use crate::builder::ContainerBuilder;
use crate::disposable::{
    dispose_isolated, panic_message, CleanupFailure, CleanupOutcome, IDisposable, ShutdownReport,
};
use crate::getters::{Local, Shared};
use crate::internal_helpers::{SingletonDisposal, TypeErasedService};
use crate::post_processor::{CreatedInstance, IPostProcessor};
use crate::service_traits::{ILocal, IShared, Scope};
use fnv::FnvHashMap;
use log::{debug, error, trace};
use std::any::{Any, TypeId};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

///////////////////////////////////////////////////////////////////////////////
// Container
///////////////////////////////////////////////////////////////////////////////

/// Container for all the services of an application.
///
/// Shared instances are owned by the container and disposed when it is
/// [closed](ServiceContainer::close). Local instances are handed out and
/// forgotten; register a [`LifecycleTracker`](crate::LifecycleTracker) to
/// dispose them as well.
///
/// Dropping a container without closing it disposes nothing.
#[derive(Default)]
pub struct ServiceContainer {
    /// The services in the container.
    services: FnvHashMap<TypeId, TypeErasedService>,
    /// Notified after every construction and on close.
    post_processors: Vec<Arc<dyn IPostProcessor>>,
    /// Disposable singletons, in creation order.
    disposals: Vec<SingletonDisposal>,
}

impl ServiceContainer {
    /// Creates a new service container.
    pub fn new() -> Self {
        ServiceContainer {
            services: FnvHashMap::default(),
            post_processors: Vec::new(),
            disposals: Vec::new(),
        }
    }

    /// Creates a new service container with a specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        ServiceContainer {
            services: FnvHashMap::with_capacity_and_hasher(capacity, Default::default()),
            post_processors: Vec::new(),
            disposals: Vec::new(),
        }
    }

    /// Creates a container that is already built by the ContainerBuilder.
    pub(crate) fn new_built(
        services: FnvHashMap<TypeId, TypeErasedService>,
        post_processors: Vec<Arc<dyn IPostProcessor>>,
        disposals: Vec<SingletonDisposal>,
    ) -> Self {
        Self {
            services,
            post_processors,
            disposals,
        }
    }

    /// Creates a ContainerBuilder.
    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::new()
    }

    /// Creates a ContainerBuilder with the specified capacity.
    pub fn builder_with_capacity(capacity: usize) -> ContainerBuilder {
        ContainerBuilder::with_capacity(capacity)
    }

    /// Returns the inner hashmap for testing purposes.
    #[cfg(test)]
    #[allow(unused)]
    pub(crate) fn inner(&self) -> &FnvHashMap<TypeId, TypeErasedService> {
        &self.services
    }

    ///////////////////////////////////////////////////////////////////////////
    // Shared Instances
    ///////////////////////////////////////////////////////////////////////////

    /// Inserts a shared instance.
    ///
    /// Panics if the instance already exists, because a shared instance may
    /// not be replaced once other services could have resolved it.
    pub fn insert<S: IShared>(&mut self, instance: Shared<S>) {
        assert!(
            !self.contains::<S>(),
            "shared instance of {} already exists",
            S::name()
        );
        self.remember_disposal(&instance);
        self.store(instance);
    }

    /// Stores a shared instance, so that later resolves return it.
    fn store<S: IShared>(&mut self, instance: Shared<S>) {
        let ptr: Arc<dyn Any + Send + Sync> = instance.into_inner();
        self.services.entry(TypeId::of::<S>()).or_default().shared_ptr = Some(ptr);
    }

    /// Remembers a shared instance for disposal on close, if it is disposable.
    fn remember_disposal<S: IShared>(&mut self, instance: &Shared<S>) {
        if let Some(disposal) = SingletonDisposal::of(instance) {
            self.disposals.push(disposal);
        }
    }

    /// Returns true if a shared instance of `S` resides in the container.
    pub fn contains<S: IShared>(&self) -> bool {
        self.services
            .get(&TypeId::of::<S>())
            .map_or(false, |service| service.shared_ptr.is_some())
    }

    /// Returns the number of shared instances in the container.
    pub fn num_singletons(&self) -> usize {
        self.services
            .values()
            .filter(|service| service.shared_ptr.is_some())
            .count()
    }

    ///////////////////////////////////////////////////////////////////////////
    // Resolve Methods
    ///////////////////////////////////////////////////////////////////////////

    /// Resolves a shared instance.
    ///
    /// The first time, the instance is constructed with the custom constructor
    /// if one is registered, or the default one otherwise. It is stored before
    /// its init hook runs, so an `init` that resolves `S` again gets the same
    /// instance. After `init` it is remembered for disposal and reported to
    /// the post-processors. A failing constructor stores nothing.
    pub fn shared<S: IShared>(&mut self) -> Result<Shared<S>, S::Error> {
        trace!("Resolving shared {}", S::name());

        let service = self.services.get(&TypeId::of::<S>());
        if let Some(instance) = service.and_then(|s| s.shared::<S>()) {
            return Ok(instance);
        }

        let instance = match service.and_then(|s| s.shared_ctor::<S>()) {
            Some(ctor) => ctor(self)?,
            None => S::construct(self)?,
        };

        self.store(instance.clone());
        S::init(instance.inner(), self);
        self.remember_disposal(&instance);
        self.notify(S::name(), Scope::Singleton, S::disposable(instance.inner()));
        Ok(instance)
    }

    /// Resolves a new local instance.
    ///
    /// The container does not keep the instance, so it will not dispose it.
    pub fn local<S: ILocal>(&mut self, params: S::Parameters) -> Result<Local<S>, S::Error> {
        trace!("Resolving local {}", S::name());

        let ctor = self
            .services
            .get(&TypeId::of::<S>())
            .and_then(|s| s.local_ctor::<S>());

        let instance = match ctor {
            Some(ctor) => ctor(self, params)?,
            None => S::construct(self, params)?,
        };

        S::init(instance.inner(), self);
        self.notify(S::name(), Scope::Prototype, S::disposable(instance.inner()));
        Ok(instance)
    }

    /// Reports a constructed and initialized instance to the post-processors.
    fn notify(&self, name: &str, scope: Scope, disposable: Option<Arc<dyn IDisposable>>) {
        if self.post_processors.is_empty() {
            return;
        }
        let created = CreatedInstance::new(name, scope, disposable);
        for processor in &self.post_processors {
            processor.after_initialization(&created);
        }
    }

    ///////////////////////////////////////////////////////////////////////////
    // Shutdown
    ///////////////////////////////////////////////////////////////////////////

    /// Closes the container.
    ///
    /// First every post-processor shuts down, in registration order, while
    /// the shared instances are still alive. Then the disposable shared
    /// instances are disposed in reverse creation order. A failing cleanup is
    /// logged and reported, and never stops the others. This includes a
    /// post-processor whose shutdown panics: it is reported as
    /// `post-processor #<index>`.
    pub fn close(mut self) -> ShutdownReport {
        debug!(
            "Closing container with {} post-processor(s) and {} disposable singleton(s)",
            self.post_processors.len(),
            self.disposals.len()
        );

        let mut report = ShutdownReport::new();
        for (index, processor) in self.post_processors.iter().enumerate() {
            match panic::catch_unwind(AssertUnwindSafe(|| processor.shutdown())) {
                Ok(processed) => report.append(processed),
                Err(payload) => {
                    let failure = CleanupFailure::Panicked {
                        name: format!("post-processor #{}", index),
                        message: panic_message(payload.as_ref()),
                    };
                    error!("{}", failure);
                    report.push(failure.name().to_owned(), CleanupOutcome::Failed(failure));
                }
            }
        }

        for disposal in self.disposals.drain(..).rev() {
            let outcome = dispose_isolated(disposal.name, &*disposal.target);
            report.push(disposal.name.to_owned(), outcome);
        }

        report
    }
}

impl fmt::Debug for ServiceContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceContainer")
            .field("services", &self.services)
            .field("post_processors", &self.post_processors.len())
            .field("disposals", &self.disposals)
            .finish()
    }
}

///////////////////////////////////////////////////////////////////////////////
// Tests
///////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disposable::DisposeError;
    use crate::service_traits::IService;
    use crate::LifecycleTracker;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug)]
    struct Number(u32);

    impl IService for Number {}

    impl IShared for Number {
        type Error = ();

        fn construct(_: &mut ServiceContainer) -> Result<Shared<Self>, Self::Error> {
            Ok(Shared::new(Number(1234)))
        }
    }

    impl ILocal for Number {
        type Parameters = u32;
        type Error = ();

        fn construct(
            _: &mut ServiceContainer,
            params: Self::Parameters,
        ) -> Result<Local<Self>, Self::Error> {
            Ok(Local::new(Number(params)))
        }
    }

    struct Failing;

    impl IService for Failing {}

    impl IShared for Failing {
        type Error = &'static str;

        fn construct(_: &mut ServiceContainer) -> Result<Shared<Self>, Self::Error> {
            Err("error")
        }
    }

    /// Writes its name to a shared log when disposed.
    struct Resource {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl IDisposable for Resource {
        fn dispose(&self) -> Result<(), DisposeError> {
            self.log.lock().unwrap().push(self.name);
            Ok(())
        }
    }

    impl IService for Resource {
        fn disposable(this: &Arc<Self>) -> Option<Arc<dyn IDisposable>> {
            Some(Arc::clone(this) as Arc<dyn IDisposable>)
        }
    }

    impl IShared for Resource {
        type Error = ();

        fn construct(_: &mut ServiceContainer) -> Result<Shared<Self>, Self::Error> {
            Err(())
        }
    }

    impl ILocal for Resource {
        type Parameters = (&'static str, Arc<Mutex<Vec<&'static str>>>);
        type Error = ();

        fn construct(
            _: &mut ServiceContainer,
            (name, log): Self::Parameters,
        ) -> Result<Local<Self>, Self::Error> {
            Ok(Local::new(Resource { name, log }))
        }
    }

    /// Counts the notifications per scope.
    #[derive(Default)]
    struct Counting {
        singletons: AtomicUsize,
        prototypes: AtomicUsize,
        shutdowns: AtomicUsize,
    }

    impl IPostProcessor for Counting {
        fn after_initialization(&self, created: &CreatedInstance<'_>) {
            match created.scope() {
                Scope::Singleton => self.singletons.fetch_add(1, Ordering::SeqCst),
                Scope::Prototype => self.prototypes.fetch_add(1, Ordering::SeqCst),
            };
        }

        fn shutdown(&self) -> ShutdownReport {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
            ShutdownReport::new()
        }
    }

    /// A post-processor whose shutdown always panics.
    struct Exploding;

    impl IPostProcessor for Exploding {
        fn shutdown(&self) -> ShutdownReport {
            panic!("exploded on shutdown");
        }
    }

    static SELF_RESOLVING_CONSTRUCTED: AtomicUsize = AtomicUsize::new(0);

    /// Resolves itself from its init hook.
    struct SelfResolving {
        resolved_itself: Mutex<bool>,
    }

    impl IDisposable for SelfResolving {
        fn dispose(&self) -> Result<(), DisposeError> {
            Ok(())
        }
    }

    impl IService for SelfResolving {
        fn init(this: &Arc<Self>, ctn: &mut ServiceContainer) {
            let again = ctn.shared::<SelfResolving>().unwrap();
            *this.resolved_itself.lock().unwrap() = Arc::ptr_eq(again.inner(), this);
        }

        fn disposable(this: &Arc<Self>) -> Option<Arc<dyn IDisposable>> {
            Some(Arc::clone(this) as Arc<dyn IDisposable>)
        }
    }

    impl IShared for SelfResolving {
        type Error = ();

        fn construct(_: &mut ServiceContainer) -> Result<Shared<Self>, Self::Error> {
            SELF_RESOLVING_CONSTRUCTED.fetch_add(1, Ordering::SeqCst);
            Ok(Shared::new(SelfResolving {
                resolved_itself: Mutex::new(false),
            }))
        }
    }

    /// A singleton log that the constructed singletons below write to.
    #[derive(Default)]
    struct EventLog(Mutex<Vec<&'static str>>);

    impl IService for EventLog {}

    impl IShared for EventLog {
        type Error = ();

        fn construct(_: &mut ServiceContainer) -> Result<Shared<Self>, Self::Error> {
            Ok(Shared::new(EventLog::default()))
        }
    }

    struct Database {
        log: Shared<EventLog>,
    }

    impl IDisposable for Database {
        fn dispose(&self) -> Result<(), DisposeError> {
            self.log.0.lock().unwrap().push("database");
            Ok(())
        }
    }

    impl IService for Database {
        fn disposable(this: &Arc<Self>) -> Option<Arc<dyn IDisposable>> {
            Some(Arc::clone(this) as Arc<dyn IDisposable>)
        }
    }

    impl IShared for Database {
        type Error = ();

        fn construct(ctn: &mut ServiceContainer) -> Result<Shared<Self>, Self::Error> {
            let log = ctn.shared::<EventLog>()?;
            Ok(Shared::new(Database { log }))
        }
    }

    struct Cache {
        log: Shared<EventLog>,
    }

    impl IDisposable for Cache {
        fn dispose(&self) -> Result<(), DisposeError> {
            self.log.0.lock().unwrap().push("cache");
            Ok(())
        }
    }

    impl IService for Cache {
        fn disposable(this: &Arc<Self>) -> Option<Arc<dyn IDisposable>> {
            Some(Arc::clone(this) as Arc<dyn IDisposable>)
        }
    }

    impl IShared for Cache {
        type Error = ();

        fn construct(ctn: &mut ServiceContainer) -> Result<Shared<Self>, Self::Error> {
            let log = ctn.shared::<EventLog>()?;
            Ok(Shared::new(Cache { log }))
        }
    }

    #[test]
    fn new() {
        let ctn = ServiceContainer::new();
        assert_eq!(ctn.inner().capacity(), 0);
        assert_eq!(ctn.num_singletons(), 0);
    }

    #[test]
    fn with_capacity() {
        let ctn = ServiceContainer::with_capacity(50);
        assert!(ctn.inner().capacity() >= 50);

        let ctn = ServiceContainer::with_capacity(1350);
        assert!(ctn.inner().capacity() >= 1350);
    }

    #[test]
    fn insert() {
        let mut ctn = ServiceContainer::new();
        ctn.insert::<()>(Shared::new(()));

        assert_eq!(ctn.inner().len(), 1);
        assert!(ctn.contains::<()>());
    }

    #[test]
    #[should_panic]
    fn insert_twice_panics() {
        let mut ctn = ServiceContainer::new();
        ctn.insert::<()>(Shared::new(()));
        ctn.insert::<()>(Shared::new(()));
    }

    #[test]
    fn resolve_inserted() {
        let mut ctn = ServiceContainer::new();
        let instance = Shared::new(Number(5));
        ctn.insert(instance.clone());

        let resolved: Shared<Number> = ctn.shared().unwrap();
        assert!(resolved.is(&instance));
    }

    #[test]
    fn resolve_shared_returns_same_instance() {
        let mut ctn = ServiceContainer::new();
        let first = ctn.shared::<Number>().unwrap();
        let second = ctn.shared::<Number>().unwrap();

        assert!(first.is(&second));
        assert_eq!(first.0, 1234);
        assert_eq!(ctn.num_singletons(), 1);
    }

    #[test]
    fn container_drop_decreases_ref_count() {
        let mut ctn = ServiceContainer::new();
        let instance = ctn.shared::<Number>().unwrap();
        assert_eq!(Arc::strong_count(instance.inner()), 2);

        drop(ctn);

        assert_eq!(Arc::strong_count(instance.inner()), 1);
    }

    #[test]
    fn resolve_shared_custom_constructor() {
        let mut ctn = ServiceContainer::builder()
            .with_shared_constructor::<Number>(|_| Ok(Shared::new(Number(5678))))
            .build();

        let instance = ctn.shared::<Number>().unwrap();
        assert_eq!(instance.0, 5678);
    }

    #[test]
    fn resolve_shared_failing() {
        let mut ctn = ServiceContainer::new();
        let result = ctn.shared::<Failing>();
        assert!(matches!(result, Err("error")));
    }

    #[test]
    fn failing_should_not_insert() {
        let mut ctn = ServiceContainer::new();
        let _ = ctn.shared::<Failing>();
        assert!(!ctn.contains::<Failing>());
    }

    #[test]
    fn resolve_local() {
        let mut ctn = ServiceContainer::new();
        let instance = ctn.local::<Number>(2468).unwrap();
        assert_eq!(instance.0, 2468);
        assert!(!ctn.contains::<Number>());
    }

    #[test]
    fn resolve_local_custom_constructor() {
        let mut ctn = ServiceContainer::builder()
            .with_local_constructor::<Number>(|_, n| Ok(Local::new(Number(n * 2))))
            .build();

        let instance = ctn.local::<Number>(10).unwrap();
        assert_eq!(instance.0, 20);
    }

    #[test]
    fn resolve_local_returns_new_instances() {
        let mut ctn = ServiceContainer::new();
        let first = ctn.local::<Number>(1).unwrap();
        let second = ctn.local::<Number>(1).unwrap();
        assert!(!Arc::ptr_eq(first.inner(), second.inner()));
    }

    #[test]
    fn post_processors_see_every_construction() {
        let counting = Arc::new(Counting::default());
        let mut ctn = ServiceContainer::builder()
            .with_post_processor(counting.clone())
            .build();

        ctn.shared::<Number>().unwrap();
        ctn.shared::<Number>().unwrap();
        ctn.local::<Number>(1).unwrap();
        ctn.local::<Number>(2).unwrap();
        ctn.local::<Number>(3).unwrap();

        assert_eq!(counting.singletons.load(Ordering::SeqCst), 1);
        assert_eq!(counting.prototypes.load(Ordering::SeqCst), 3);

        ctn.close();
        assert_eq!(counting.shutdowns.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn close_without_tracker_leaks_locals() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let ctn_log = Arc::clone(&log);
        let mut ctn = ServiceContainer::new();
        let _local = ctn.local::<Resource>(("local", ctn_log)).unwrap();

        let report = ctn.close();

        assert!(report.is_empty());
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn close_disposes_tracked_locals() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let tracker = Arc::new(LifecycleTracker::new());
        let mut ctn = ServiceContainer::builder()
            .with_post_processor(tracker.clone())
            .build();

        let _a = ctn.local::<Resource>(("a", Arc::clone(&log))).unwrap();
        let _b = ctn.local::<Resource>(("b", Arc::clone(&log))).unwrap();
        assert_eq!(tracker.len(), 2);

        let report = ctn.close();

        assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
        assert_eq!(report.disposed().count(), 2);
        assert!(tracker.is_shut_down());
    }

    #[test]
    fn close_disposes_locals_before_singletons() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let tracker = Arc::new(LifecycleTracker::new());
        let mut ctn = ServiceContainer::builder()
            .with_post_processor(tracker)
            .with_shared(Shared::new(Resource {
                name: "singleton",
                log: Arc::clone(&log),
            }))
            .build();

        let _local = ctn.local::<Resource>(("local", Arc::clone(&log))).unwrap();

        let report = ctn.close();

        assert_eq!(*log.lock().unwrap(), vec!["local", "singleton"]);
        assert!(report.is_success());
    }

    #[test]
    fn close_disposes_constructed_singletons_in_reverse_order() {
        let mut ctn = ServiceContainer::new();
        let log = ctn.shared::<EventLog>().unwrap();

        ctn.shared::<Database>().unwrap();
        ctn.shared::<Cache>().unwrap();
        assert_eq!(ctn.num_singletons(), 3);

        let report = ctn.close();

        assert_eq!(*log.0.lock().unwrap(), vec!["cache", "database"]);
        assert_eq!(
            report.disposed().collect::<Vec<_>>(),
            vec![Cache::name(), Database::name()]
        );
    }

    #[test]
    fn init_resolving_itself_constructs_once() {
        let mut ctn = ServiceContainer::new();

        let instance = ctn.shared::<SelfResolving>().unwrap();
        let again = ctn.shared::<SelfResolving>().unwrap();

        assert_eq!(SELF_RESOLVING_CONSTRUCTED.load(Ordering::SeqCst), 1);
        assert!(*instance.resolved_itself.lock().unwrap());
        assert!(instance.is(&again));
        assert_eq!(ctn.num_singletons(), 1);

        let report = ctn.close();
        assert_eq!(report.len(), 1);
        assert_eq!(report.disposed().count(), 1);
    }

    #[test]
    fn panicking_post_processor_does_not_stop_close() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let tracker = Arc::new(LifecycleTracker::new());
        let mut ctn = ServiceContainer::builder()
            .with_post_processor(Arc::new(Exploding))
            .with_post_processor(tracker.clone())
            .with_shared(Shared::new(Resource {
                name: "singleton",
                log: Arc::clone(&log),
            }))
            .build();

        let _local = ctn.local::<Resource>(("local", Arc::clone(&log))).unwrap();

        let report = ctn.close();

        assert_eq!(*log.lock().unwrap(), vec!["local", "singleton"]);
        assert!(tracker.is_shut_down());
        let failures: Vec<_> = report.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].name(), "post-processor #0");
        assert!(matches!(failures[0], CleanupFailure::Panicked { .. }));
        assert_eq!(report.disposed().count(), 2);
    }
}
