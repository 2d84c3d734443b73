//! Create a container with the builder pattern.

use crate::container::ServiceContainer;
use crate::getters::Shared;
use crate::internal_helpers::{LocalCtor, SharedCtor, SingletonDisposal, TypeErasedService};
use crate::post_processor::IPostProcessor;
use crate::service_traits::{ILocal, IShared};
use fnv::FnvHashMap;
use std::any::{Any, TypeId};
use std::sync::Arc;

/// Create a container with the builder pattern.
///
/// This is where the wiring of an application lives: which constructors
/// build which services, and which post-processors observe them.
#[derive(Default)]
pub struct ContainerBuilder {
    /// The services in the container.
    services: FnvHashMap<TypeId, TypeErasedService>,
    /// The post-processors, in registration order.
    post_processors: Vec<Arc<dyn IPostProcessor>>,
    /// Disposable shared instances inserted through the builder.
    disposals: Vec<SingletonDisposal>,
}

impl ContainerBuilder {
    /// Creates a new ContainerBuilder.
    pub fn new() -> Self {
        Self {
            services: FnvHashMap::default(),
            post_processors: Vec::new(),
            disposals: Vec::new(),
        }
    }

    /// Creates a new ContainerBuilder with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        ContainerBuilder {
            services: FnvHashMap::with_capacity_and_hasher(capacity, Default::default()),
            post_processors: Vec::new(),
            disposals: Vec::new(),
        }
    }

    /// Returns the inner hashmap for testing purposes.
    #[cfg(test)]
    #[allow(unused)]
    fn inner(&self) -> &FnvHashMap<TypeId, TypeErasedService> {
        &self.services
    }

    /// Returns an entry in the service container.
    fn entry(&mut self, key: TypeId) -> &mut TypeErasedService {
        self.services.entry(key).or_default()
    }

    /// Inserts a shared instance.
    ///
    /// If the instance is disposable, the container disposes it on close.
    pub fn with_shared<S: IShared>(mut self, shared: Shared<S>) -> Self {
        if let Some(disposal) = SingletonDisposal::of(&shared) {
            self.disposals.push(disposal);
        }
        let ptr: Arc<dyn Any + Send + Sync> = shared.into_inner();
        self.entry(TypeId::of::<S>()).shared_ptr = Some(ptr);
        self
    }

    /// Sets a custom constructor for a shared instance.
    pub fn with_shared_constructor<S: IShared>(mut self, ctor: SharedCtor<S>) -> Self {
        self.entry(TypeId::of::<S>()).shared_ctor =
            Some(Box::new(ctor) as Box<dyn Any + Send + Sync>);
        self
    }

    /// Sets a custom constructor for a local instance.
    pub fn with_local_constructor<S: ILocal>(mut self, ctor: LocalCtor<S>) -> Self {
        self.entry(TypeId::of::<S>()).local_ctor =
            Some(Box::new(ctor) as Box<dyn Any + Send + Sync>);
        self
    }

    /// Sets custom contructors for a local and shared intance.
    pub fn with_constructors<S: ILocal + IShared>(
        mut self,
        local: LocalCtor<S>,
        shared: SharedCtor<S>,
    ) -> Self {
        let entry = self.entry(TypeId::of::<S>());
        entry.shared_ctor = Some(Box::new(shared) as Box<dyn Any + Send + Sync>);
        entry.local_ctor = Some(Box::new(local) as Box<dyn Any + Send + Sync>);
        self
    }

    /// Registers a post-processor.
    ///
    /// Post-processors are notified in registration order after every
    /// construction, and shut down in the same order when the container
    /// closes.
    pub fn with_post_processor(mut self, processor: Arc<dyn IPostProcessor>) -> Self {
        self.post_processors.push(processor);
        self
    }

    /// Builds the container.
    pub fn build(self) -> ServiceContainer {
        ServiceContainer::new_built(self.services, self.post_processors, self.disposals)
    }
}

///////////////////////////////////////////////////////////////////////////////
// Tests
///////////////////////////////////////////////////////////////////////////////
