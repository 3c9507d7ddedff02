//! Request-scoped container context.
//!
//! A [ContainerContext] publishes items (e.g. the current HTTP request) and hosts the
//! [ContextScope] for [ContextResource](crate::provider::ContextResource)s while a future runs.
//! The context is bound to the current tokio task, so code running inside
//! [ContainerContext::scope] can call [fetch_context_item] without the item being passed
//! explicitly.
//!
//! Long-lived work spawned from inside a context (e.g. a WebSocket handler running after the
//! upgrade response has been sent) can [capture](ContainerContext::capture) the context and
//! re-enter it later. Context resources are finalized only after the last holder exits.

use crate::error::ResolveError;
use crate::instance_provider::{ComponentInstanceAnyPtr, ComponentInstancePtr, ErrorPtr};
use crate::scope::{ProviderId, Scope};
use futures::future::BoxFuture;
use fxhash::FxHashMap;
use std::any::type_name;
use std::future::Future;
use std::mem;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

/// Async cleanup action registered for a context resource.
pub type Finalizer = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), ErrorPtr>> + Send>;

tokio::task_local! {
    static CURRENT_CONTEXT: Arc<ContextState>;
}

/// Scope holding context resource instances and their finalizers.
#[derive(Default)]
pub struct ContextScope {
    instances: FxHashMap<ProviderId, ComponentInstanceAnyPtr>,
    finalizers: Vec<(&'static str, Finalizer)>,
}

impl ContextScope {
    /// Registers a finalizer which will be run when the owning context exits. Finalizers run in
    /// reverse registration order.
    pub fn register_finalizer(&mut self, type_name: &'static str, finalizer: Finalizer) {
        self.finalizers.push((type_name, finalizer));
    }

    fn take_finalizers(&mut self) -> Vec<(&'static str, Finalizer)> {
        self.instances.clear();
        mem::take(&mut self.finalizers)
    }
}

impl Scope for ContextScope {
    #[inline]
    fn instance(&self, id: ProviderId) -> Option<ComponentInstanceAnyPtr> {
        self.instances.get(&id).cloned()
    }

    #[inline]
    fn store_instance(
        &mut self,
        id: ProviderId,
        instance: ComponentInstanceAnyPtr,
    ) -> ComponentInstanceAnyPtr {
        self.instances.entry(id).or_insert(instance).clone()
    }
}

pub(crate) struct ContextState {
    items: FxHashMap<String, ComponentInstanceAnyPtr>,
    scope: Mutex<ContextScope>,
    holders: AtomicUsize,
}

impl ContextState {
    fn new(items: FxHashMap<String, ComponentInstanceAnyPtr>) -> Arc<Self> {
        Arc::new(Self {
            items,
            scope: Default::default(),
            holders: AtomicUsize::new(0),
        })
    }

    pub(crate) fn with_scope<R>(&self, f: impl FnOnce(&mut ContextScope) -> R) -> R {
        let mut scope = self.scope.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut scope)
    }

    async fn release(&self) {
        if self.holders.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }

        let finalizers = self.with_scope(ContextScope::take_finalizers);
        if !finalizers.is_empty() {
            debug!(count = finalizers.len(), "Finalizing context resources.");
        }

        for (type_name, finalizer) in finalizers.into_iter().rev() {
            if let Err(error) = finalizer().await {
                warn!(type_name, %error, "Error finalizing context resource.");
            }
        }
    }
}

struct ContextHolder(Option<Arc<ContextState>>);

impl ContextHolder {
    fn acquire(state: Arc<ContextState>) -> Self {
        state.holders.fetch_add(1, Ordering::AcqRel);
        Self(Some(state))
    }

    fn state(&self) -> Option<Arc<ContextState>> {
        self.0.clone()
    }

    async fn release(mut self) {
        if let Some(state) = self.0.take() {
            state.release().await;
        }
    }
}

impl Drop for ContextHolder {
    // a holder is only dropped without release when its future got cancelled
    fn drop(&mut self) {
        if let Some(state) = self.0.take() {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move { state.release().await });
                }
                Err(_) => warn!("Container context dropped outside of a runtime; skipping finalizers."),
            }
        }
    }
}

/// Builder and entrypoint for an active container context. See module documentation for details.
#[derive(Default)]
pub struct ContainerContext {
    items: FxHashMap<String, ComponentInstanceAnyPtr>,
}

impl ContainerContext {
    pub fn new() -> Self {
        Default::default()
    }

    /// Publishes an item under given key. Items of an enclosing context are inherited, unless
    /// overridden here.
    pub fn with_item<K: Into<String>, T: Send + Sync + 'static>(mut self, key: K, value: T) -> Self {
        self.items.insert(
            key.into(),
            ComponentInstancePtr::new(value) as ComponentInstanceAnyPtr,
        );
        self
    }

    /// Runs given future with this context active. Context resources created while it runs are
    /// finalized after it completes and every [captured](Self::capture) handle has exited.
    pub async fn scope<F: Future>(self, future: F) -> F::Output {
        let mut items = CURRENT_CONTEXT
            .try_with(|state| state.items.clone())
            .unwrap_or_default();
        items.extend(self.items);

        let state = ContextState::new(items);
        let holder = ContextHolder::acquire(state.clone());
        let output = CURRENT_CONTEXT.scope(state, future).await;
        holder.release().await;

        output
    }

    /// Captures the currently active context, keeping its resources alive until the returned
    /// handle exits. Capturing outside of a context returns a handle which runs futures without any
    /// context.
    pub fn capture() -> CapturedContext {
        CapturedContext {
            holder: current_state().map(ContextHolder::acquire),
        }
    }

    /// Checks if there's an active context in the current task.
    pub fn is_active() -> bool {
        CURRENT_CONTEXT.try_with(|_| ()).is_ok()
    }
}

/// Handle to a context captured by [ContainerContext::capture].
pub struct CapturedContext {
    holder: Option<ContextHolder>,
}

impl CapturedContext {
    /// Runs given future inside the captured context.
    pub async fn scope<F: Future>(self, future: F) -> F::Output {
        match self.holder {
            Some(holder) => match holder.state() {
                Some(state) => {
                    let output = CURRENT_CONTEXT.scope(state, future).await;
                    holder.release().await;
                    output
                }
                None => future.await,
            },
            None => future.await,
        }
    }
}

/// Captures the current context and returns a future running given one inside it. Useful for work
/// which will be polled outside of the current task.
pub fn propagate_context<F: Future>(future: F) -> impl Future<Output = F::Output> {
    ContainerContext::capture().scope(future)
}

/// Fetches an item published in the active context.
pub fn fetch_context_item<T: Send + Sync + 'static>(
    key: &str,
) -> Result<ComponentInstancePtr<T>, ResolveError> {
    let item = CURRENT_CONTEXT
        .try_with(|state| state.items.get(key).cloned())
        .map_err(|_| ResolveError::NoActiveContext(type_name::<T>()))?
        .ok_or_else(|| ResolveError::MissingContextItem(key.to_string()))?;

    item.downcast::<T>()
        .map_err(|_| ResolveError::IncompatibleContextItem {
            key: key.to_string(),
            target_type: type_name::<T>(),
        })
}

pub(crate) fn current_state() -> Option<Arc<ContextState>> {
    CURRENT_CONTEXT.try_with(Arc::clone).ok()
}
