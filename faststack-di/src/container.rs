//! Containers group named [providers](crate::provider) and manage their lifecycle as a whole.
//!
//! A container can be a hand-written struct with typed provider fields implementing
//! [BaseContainer], or a dynamic [Container] built at runtime. Containers can be
//! [connected](BaseContainer::connect_containers) to each other, so tearing down the root container
//! tears down everything reachable from it, and named resolution falls back to connected
//! containers.

use crate::error::{ContainerError, ResolveError};
use crate::instance_provider::{ComponentInstanceAnyPtr, ComponentInstancePtr};
use crate::provider::AnyProvider;
use futures::future::BoxFuture;
use futures::FutureExt;
use fxhash::FxHashSet;
use std::any::type_name;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

pub type ContainerPtr = Arc<dyn BaseContainer>;

/// Set of containers connected to another one.
#[derive(Default)]
pub struct ConnectedContainers {
    containers: Mutex<Vec<ContainerPtr>>,
}

impl ConnectedContainers {
    /// Adds given containers, skipping ones already connected.
    pub fn connect<I: IntoIterator<Item = ContainerPtr>>(&self, containers: I) {
        let mut connected = self
            .containers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        for container in containers {
            if !connected
                .iter()
                .any(|existing| Arc::ptr_eq(existing, &container))
            {
                connected.push(container);
            }
        }
    }

    /// Returns a snapshot of connected containers.
    pub fn all(&self) -> Vec<ContainerPtr> {
        self.containers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Base trait for containers of named providers.
pub trait BaseContainer: Send + Sync {
    /// Name of this container, used for diagnostics.
    fn name(&self) -> &str;

    /// All providers declared by this container, with their names.
    fn providers(&self) -> Vec<(&str, &dyn AnyProvider)>;

    /// Containers connected to this one.
    fn connected_containers(&self) -> &ConnectedContainers;

    /// Connects other containers, so they are torn down together with this one.
    fn connect_containers(&self, containers: Vec<ContainerPtr>) {
        self.connected_containers().connect(containers);
    }

    /// Returns a provider declared directly in this container.
    fn provider(&self, name: &str) -> Option<&dyn AnyProvider> {
        self.providers()
            .into_iter()
            .find(|(provider_name, _)| *provider_name == name)
            .map(|(_, provider)| provider)
    }

    /// Resolves a type-erased instance by provider name, looking in connected containers if this
    /// one doesn't declare it.
    fn resolve_by_name(
        &self,
        name: &str,
    ) -> BoxFuture<'_, Result<ComponentInstanceAnyPtr, ResolveError>> {
        let name = name.to_string();
        async move {
            let mut visited = FxHashSet::default();
            resolve_in_tree(self, &name, &mut visited)
                .await
                .unwrap_or(Err(ResolveError::NoNamedProvider(name)))
        }
        .boxed()
    }

    /// Releases all singletons of this container and every container reachable from it. Each
    /// container is torn down once, even if connections form a cycle.
    fn tear_down(&self) -> BoxFuture<'_, ()> {
        async move {
            let mut visited = FxHashSet::default();
            tear_down_tree(self, &mut visited).await;
        }
        .boxed()
    }
}

fn container_id<C: BaseContainer + ?Sized>(container: &C) -> usize {
    container as *const C as *const () as usize
}

// None when no container reachable from `container` declares `name`
fn resolve_in_tree<'a, C: BaseContainer + ?Sized>(
    container: &'a C,
    name: &'a str,
    visited: &'a mut FxHashSet<usize>,
) -> BoxFuture<'a, Option<Result<ComponentInstanceAnyPtr, ResolveError>>> {
    async move {
        if !visited.insert(container_id(container)) {
            return None;
        }

        if let Some(provider) = container.provider(name) {
            return Some(provider.resolve_any().await);
        }

        for connected in container.connected_containers().all() {
            if let Some(result) = resolve_in_tree(connected.as_ref(), name, visited).await {
                return Some(result);
            }
        }

        None
    }
    .boxed()
}

fn tear_down_tree<'a, C: BaseContainer + ?Sized>(
    container: &'a C,
    visited: &'a mut FxHashSet<usize>,
) -> BoxFuture<'a, ()> {
    async move {
        if !visited.insert(container_id(container)) {
            return;
        }

        debug!(container = container.name(), "Tearing down container.");

        for (_, provider) in container.providers() {
            provider.tear_down().await;
        }

        for connected in container.connected_containers().all() {
            tear_down_tree(connected.as_ref(), visited).await;
        }
    }
    .boxed()
}

/// Helper trait for [BaseContainer] providing strongly-typed access.
pub trait TypedContainer {
    /// Typesafe version of [BaseContainer::resolve_by_name].
    fn resolve_typed<T: Send + Sync + 'static>(
        &self,
        name: &str,
    ) -> BoxFuture<'_, Result<ComponentInstancePtr<T>, ResolveError>>;
}

impl<C: BaseContainer + ?Sized> TypedContainer for C {
    fn resolve_typed<T: Send + Sync + 'static>(
        &self,
        name: &str,
    ) -> BoxFuture<'_, Result<ComponentInstancePtr<T>, ResolveError>> {
        let name = name.to_string();
        async move {
            self.resolve_by_name(&name)
                .await?
                .downcast::<T>()
                .map_err(|_| ResolveError::IncompatibleProvider {
                    name,
                    target_type: type_name::<T>(),
                })
        }
        .boxed()
    }
}

/// Builder for [Container].
pub struct ContainerBuilder {
    name: String,
    providers: Vec<(String, Arc<dyn AnyProvider>)>,
}

impl ContainerBuilder {
    /// Adds a named provider.
    pub fn with_provider<N: Into<String>, P: AnyProvider + 'static>(
        mut self,
        name: N,
        provider: P,
    ) -> Self {
        self.providers
            .push((name.into(), Arc::new(provider) as Arc<dyn AnyProvider>));
        self
    }

    /// Builds resulting [Container]. Fails if provider names are not unique.
    pub fn build(self) -> Result<Container, ContainerError> {
        let mut names = FxHashSet::default();
        for (name, _) in &self.providers {
            if !names.insert(name.as_str()) {
                return Err(ContainerError::DuplicateProviderName(name.clone()));
            }
        }

        Ok(Container {
            name: self.name,
            providers: self.providers,
            connected: Default::default(),
        })
    }
}

/// Container with providers registered at runtime.
pub struct Container {
    name: String,
    providers: Vec<(String, Arc<dyn AnyProvider>)>,
    connected: ConnectedContainers,
}

impl Container {
    pub fn builder<N: Into<String>>(name: N) -> ContainerBuilder {
        ContainerBuilder {
            name: name.into(),
            providers: vec![],
        }
    }
}

impl BaseContainer for Container {
    fn name(&self) -> &str {
        &self.name
    }

    fn providers(&self) -> Vec<(&str, &dyn AnyProvider)> {
        self.providers
            .iter()
            .map(|(name, provider)| (name.as_str(), provider.as_ref()))
            .collect()
    }

    fn connected_containers(&self) -> &ConnectedContainers {
        &self.connected
    }
}
