//! Providers describe how to construct an instance and how long it should be shared. Constructors
//! are async closures returning `Result<T, ErrorPtr>`, and can resolve other providers, which forms
//! the dependency graph:
//!
//! ```
//! use faststack_di::instance_provider::convert_error;
//! use faststack_di::provider::{Factory, Provider, Singleton};
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let base_url = Singleton::new(|| async { Ok("http://localhost".to_string()) });
//! let endpoint = Factory::new({
//!     let base_url = base_url.clone();
//!     move || {
//!         let base_url = base_url.clone();
//!         async move {
//!             let base_url = base_url.resolve().await.map_err(convert_error)?;
//!             Ok(format!("{base_url}/health"))
//!         }
//!     }
//! });
//!
//! assert_eq!(*endpoint.resolve().await.unwrap(), "http://localhost/health");
//! # });
//! ```
//!
//! Available providers:
//!
//! * [Singleton] - one instance until [teardown](AnyProvider::tear_down)
//! * [Factory] - a new instance on each resolution
//! * [ContextResource] - one instance per active [ContainerContext](crate::context::ContainerContext)

use crate::context::current_state;
use crate::error::ResolveError;
use crate::instance_provider::{ComponentInstanceAnyPtr, ComponentInstancePtr, ErrorPtr};
use crate::scope::{ProviderId, Scope, ScopeKind, SingletonScope};
use derivative::Derivative;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::type_name;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

type Constructor<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, ErrorPtr>> + Send + Sync>;

type FinalizerFn<T> =
    Arc<dyn Fn(ComponentInstancePtr<T>) -> BoxFuture<'static, Result<(), ErrorPtr>> + Send + Sync>;

fn boxed_constructor<T, F, Fut>(constructor: F) -> Constructor<T>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ErrorPtr>> + Send + 'static,
{
    Arc::new(move || constructor().boxed())
}

fn boxed_finalizer<T, F, Fut>(finalizer: F) -> FinalizerFn<T>
where
    F: Fn(ComponentInstancePtr<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ErrorPtr>> + Send + 'static,
{
    Arc::new(move |instance| finalizer(instance).boxed())
}

async fn construct<T: Send + Sync + 'static>(
    constructor: &Constructor<T>,
) -> Result<ComponentInstancePtr<T>, ResolveError> {
    constructor()
        .await
        .map(ComponentInstancePtr::new)
        .map_err(|source| ResolveError::ConstructionError {
            type_name: type_name::<T>(),
            source,
        })
}

fn downcast_instance<T: Send + Sync + 'static>(
    instance: ComponentInstanceAnyPtr,
) -> Result<ComponentInstancePtr<T>, ResolveError> {
    instance
        .downcast::<T>()
        .map_err(|_| ResolveError::IncompatibleProvider {
            name: type_name::<T>().to_string(),
            target_type: type_name::<T>(),
        })
}

fn is_same_instance(first: &ComponentInstanceAnyPtr, second: &ComponentInstanceAnyPtr) -> bool {
    std::ptr::eq(
        ComponentInstancePtr::as_ptr(first) as *const (),
        ComponentInstancePtr::as_ptr(second) as *const (),
    )
}

/// Type-erased view of a provider, used by [containers](crate::container) to resolve instances by
/// name and to tear them down.
pub trait AnyProvider: Send + Sync {
    /// Unique id of this provider.
    fn id(&self) -> ProviderId;

    /// Sharing policy of provided instances.
    fn scope_kind(&self) -> ScopeKind;

    /// Name of the provided type.
    fn type_name(&self) -> &'static str;

    /// Resolves a type-erased instance.
    fn resolve_any(&self) -> BoxFuture<'_, Result<ComponentInstanceAnyPtr, ResolveError>>;

    /// Releases any cached instances, running finalizers if present.
    fn tear_down(&self) -> BoxFuture<'_, ()>;
}

/// Strongly-typed provider of instances.
pub trait Provider: AnyProvider {
    type Output: Send + Sync + 'static;

    /// Resolves an instance according to the sharing policy of this provider.
    fn resolve(&self) -> BoxFuture<'_, Result<ComponentInstancePtr<Self::Output>, ResolveError>>;
}

struct SingletonInner<T> {
    id: ProviderId,
    constructor: Constructor<T>,
    finalizer: Option<FinalizerFn<T>>,
    scope: Mutex<SingletonScope>,
}

/// Provider creating a single instance, shared until the provider is torn down. Concurrent first
/// resolutions may construct more than one instance, but only the first stored one is ever handed
/// out.
#[derive(Derivative)]
#[derivative(Clone(bound = ""))]
pub struct Singleton<T> {
    inner: Arc<SingletonInner<T>>,
}

impl<T: Send + Sync + 'static> Singleton<T> {
    pub fn new<F, Fut>(constructor: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ErrorPtr>> + Send + 'static,
    {
        Self::create(boxed_constructor(constructor), None)
    }

    /// Creates a singleton with a finalizer, which is run on teardown.
    pub fn with_finalizer<F, Fut, FF, FFut>(constructor: F, finalizer: FF) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ErrorPtr>> + Send + 'static,
        FF: Fn(ComponentInstancePtr<T>) -> FFut + Send + Sync + 'static,
        FFut: Future<Output = Result<(), ErrorPtr>> + Send + 'static,
    {
        Self::create(
            boxed_constructor(constructor),
            Some(boxed_finalizer(finalizer)),
        )
    }

    fn create(constructor: Constructor<T>, finalizer: Option<FinalizerFn<T>>) -> Self {
        Self {
            inner: Arc::new(SingletonInner {
                id: ProviderId::next(),
                constructor,
                finalizer,
                scope: Default::default(),
            }),
        }
    }

    /// Checks if an instance is currently cached.
    pub fn is_initialized(&self) -> bool {
        self.lock_scope().instance(self.inner.id).is_some()
    }

    fn lock_scope(&self) -> MutexGuard<'_, SingletonScope> {
        self.inner
            .scope
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Send + Sync + 'static> AnyProvider for Singleton<T> {
    fn id(&self) -> ProviderId {
        self.inner.id
    }

    fn scope_kind(&self) -> ScopeKind {
        ScopeKind::Singleton
    }

    fn type_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn resolve_any(&self) -> BoxFuture<'_, Result<ComponentInstanceAnyPtr, ResolveError>> {
        self.resolve()
            .map(|result| result.map(|instance| instance as ComponentInstanceAnyPtr))
            .boxed()
    }

    fn tear_down(&self) -> BoxFuture<'_, ()> {
        async move {
            let instance = {
                let mut scope = self.lock_scope();
                let instance = scope.instance(self.inner.id);
                scope.clear();
                instance
            };

            let (Some(instance), Some(finalizer)) = (instance, &self.inner.finalizer) else {
                return;
            };

            debug!(type_name = type_name::<T>(), "Finalizing singleton instance.");

            match instance.downcast::<T>() {
                Ok(instance) => {
                    if let Err(error) = finalizer(instance).await {
                        warn!(type_name = type_name::<T>(), %error, "Error finalizing singleton.");
                    }
                }
                Err(_) => warn!(
                    type_name = type_name::<T>(),
                    "Cached singleton has an unexpected type."
                ),
            }
        }
        .boxed()
    }
}

impl<T: Send + Sync + 'static> Provider for Singleton<T> {
    type Output = T;

    fn resolve(&self) -> BoxFuture<'_, Result<ComponentInstancePtr<T>, ResolveError>> {
        async move {
            let cached = self.lock_scope().instance(self.inner.id);
            if let Some(instance) = cached {
                return downcast_instance(instance);
            }

            debug!(type_name = type_name::<T>(), "Creating singleton instance.");

            let instance = construct(&self.inner.constructor).await?;
            let stored = self
                .lock_scope()
                .store_instance(self.inner.id, instance as ComponentInstanceAnyPtr);

            downcast_instance(stored)
        }
        .boxed()
    }
}

struct FactoryInner<T> {
    id: ProviderId,
    constructor: Constructor<T>,
}

/// Provider creating a new instance on each resolution.
#[derive(Derivative)]
#[derivative(Clone(bound = ""))]
pub struct Factory<T> {
    inner: Arc<FactoryInner<T>>,
}

impl<T: Send + Sync + 'static> Factory<T> {
    pub fn new<F, Fut>(constructor: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ErrorPtr>> + Send + 'static,
    {
        Self {
            inner: Arc::new(FactoryInner {
                id: ProviderId::next(),
                constructor: boxed_constructor(constructor),
            }),
        }
    }
}

impl<T: Send + Sync + 'static> AnyProvider for Factory<T> {
    fn id(&self) -> ProviderId {
        self.inner.id
    }

    fn scope_kind(&self) -> ScopeKind {
        ScopeKind::Prototype
    }

    fn type_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn resolve_any(&self) -> BoxFuture<'_, Result<ComponentInstanceAnyPtr, ResolveError>> {
        self.resolve()
            .map(|result| result.map(|instance| instance as ComponentInstanceAnyPtr))
            .boxed()
    }

    fn tear_down(&self) -> BoxFuture<'_, ()> {
        async {}.boxed()
    }
}

impl<T: Send + Sync + 'static> Provider for Factory<T> {
    type Output = T;

    fn resolve(&self) -> BoxFuture<'_, Result<ComponentInstancePtr<T>, ResolveError>> {
        construct(&self.inner.constructor).boxed()
    }
}

struct ContextResourceInner<T> {
    id: ProviderId,
    constructor: Constructor<T>,
    finalizer: Option<FinalizerFn<T>>,
}

/// Provider creating one instance per active [ContainerContext](crate::context::ContainerContext).
/// The instance is released, and its finalizer run, when the context exits. Resolving outside of an
/// active context fails with [ResolveError::NoActiveContext].
#[derive(Derivative)]
#[derivative(Clone(bound = ""))]
pub struct ContextResource<T> {
    inner: Arc<ContextResourceInner<T>>,
}

impl<T: Send + Sync + 'static> ContextResource<T> {
    pub fn new<F, Fut>(constructor: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ErrorPtr>> + Send + 'static,
    {
        Self::create(boxed_constructor(constructor), None)
    }

    /// Creates a context resource with a finalizer, which is run when the owning context exits.
    pub fn with_finalizer<F, Fut, FF, FFut>(constructor: F, finalizer: FF) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ErrorPtr>> + Send + 'static,
        FF: Fn(ComponentInstancePtr<T>) -> FFut + Send + Sync + 'static,
        FFut: Future<Output = Result<(), ErrorPtr>> + Send + 'static,
    {
        Self::create(
            boxed_constructor(constructor),
            Some(boxed_finalizer(finalizer)),
        )
    }

    fn create(constructor: Constructor<T>, finalizer: Option<FinalizerFn<T>>) -> Self {
        Self {
            inner: Arc::new(ContextResourceInner {
                id: ProviderId::next(),
                constructor,
                finalizer,
            }),
        }
    }
}

impl<T: Send + Sync + 'static> AnyProvider for ContextResource<T> {
    fn id(&self) -> ProviderId {
        self.inner.id
    }

    fn scope_kind(&self) -> ScopeKind {
        ScopeKind::Context
    }

    fn type_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn resolve_any(&self) -> BoxFuture<'_, Result<ComponentInstanceAnyPtr, ResolveError>> {
        self.resolve()
            .map(|result| result.map(|instance| instance as ComponentInstanceAnyPtr))
            .boxed()
    }

    fn tear_down(&self) -> BoxFuture<'_, ()> {
        // instances live in their contexts, not in the provider
        async {}.boxed()
    }
}

impl<T: Send + Sync + 'static> Provider for ContextResource<T> {
    type Output = T;

    fn resolve(&self) -> BoxFuture<'_, Result<ComponentInstancePtr<T>, ResolveError>> {
        async move {
            let state = current_state().ok_or(ResolveError::NoActiveContext(type_name::<T>()))?;

            let cached = state.with_scope(|scope| scope.instance(self.inner.id));
            if let Some(instance) = cached {
                return downcast_instance(instance);
            }

            debug!(type_name = type_name::<T>(), "Creating context resource.");

            let instance = construct(&self.inner.constructor).await?;
            let any_instance = instance.clone() as ComponentInstanceAnyPtr;

            let stored = state.with_scope(|scope| {
                let stored = scope.store_instance(self.inner.id, any_instance.clone());
                if is_same_instance(&stored, &any_instance) {
                    if let Some(finalizer) = &self.inner.finalizer {
                        let finalizer = finalizer.clone();
                        let instance = instance.clone();
                        scope.register_finalizer(
                            type_name::<T>(),
                            Box::new(move || finalizer(instance)),
                        );
                    }
                }

                stored
            });

            if !is_same_instance(&stored, &any_instance) {
                // lost a race with a concurrent resolution in the same context
                if let Some(finalizer) = &self.inner.finalizer {
                    if let Err(error) = finalizer(instance).await {
                        warn!(type_name = type_name::<T>(), %error, "Error finalizing context resource.");
                    }
                }
            }

            downcast_instance(stored)
        }
        .boxed()
    }
}
