//! Instances are contained in [Scope]s - containers which decide when to reuse or create an
//! instance. Each [Singleton](crate::provider::Singleton) owns a [SingletonScope] living as long as
//! the process (or until teardown), while [ContextResource](crate::provider::ContextResource)s
//! store their instances in the [ContextScope](crate::context::ContextScope) of the currently
//! active request context. [Factories](crate::provider::Factory) use the [PrototypeScope], which
//! never stores anything.
//!
//! Note: scope resolution happens at instantiation time, which can lead to unexpected consequences
//! if incompatible scopes are mixed together, e.g. a singleton can depend on a context resource. In
//! such case the singleton will keep the resource alive long after its context has been finalized.

use crate::instance_provider::ComponentInstanceAnyPtr;
use fxhash::FxHashMap;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};

/// Name of the [ScopeKind::Singleton] scope.
pub const SINGLETON: &str = "SINGLETON";

/// Name of the [ScopeKind::Prototype] scope.
pub const PROTOTYPE: &str = "PROTOTYPE";

/// Name of the [ScopeKind::Context] scope.
pub const CONTEXT: &str = "CONTEXT";

/// Sharing policy of a provider.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ScopeKind {
    /// One instance for the process lifetime.
    Singleton,
    /// New instance per resolution.
    Prototype,
    /// One instance per active container context, finalized when the context exits.
    Context,
}

impl ScopeKind {
    pub fn name(&self) -> &'static str {
        match self {
            ScopeKind::Singleton => SINGLETON,
            ScopeKind::Prototype => PROTOTYPE,
            ScopeKind::Context => CONTEXT,
        }
    }
}

impl Display for ScopeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Unique identifier of a provider, used as the key for instances stored in scopes.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct ProviderId(u64);

impl ProviderId {
    /// Allocates a new, process-unique id.
    pub fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(0);
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A scope containing instances. See module documentation for information on scopes.
pub trait Scope {
    /// Gets an instance stored for given provider, if available in this scope.
    fn instance(&self, id: ProviderId) -> Option<ComponentInstanceAnyPtr>;

    /// Stores given instance in the scope, unless one is already present. Returns the instance
    /// which ends up stored, so a racing constructor can use the winner. The scope might not
    /// support storing instances and return the given one.
    fn store_instance(
        &mut self,
        id: ProviderId,
        instance: ComponentInstanceAnyPtr,
    ) -> ComponentInstanceAnyPtr;
}

/// Scope for instances shared for the whole process lifetime.
#[derive(Default)]
pub struct SingletonScope {
    instances: FxHashMap<ProviderId, ComponentInstanceAnyPtr>,
}

impl SingletonScope {
    /// Removes all stored instances.
    pub fn clear(&mut self) {
        self.instances.clear();
    }
}

impl Scope for SingletonScope {
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

/// A scope which creates a new instance on each request.
#[derive(Default, Copy, Clone, Eq, PartialEq)]
pub struct PrototypeScope;

impl Scope for PrototypeScope {
    #[inline]
    fn instance(&self, _id: ProviderId) -> Option<ComponentInstanceAnyPtr> {
        None
    }

    #[inline]
    fn store_instance(
        &mut self,
        _id: ProviderId,
        instance: ComponentInstanceAnyPtr,
    ) -> ComponentInstanceAnyPtr {
        instance
    }
}

#[cfg(test)]
mod tests {
    use crate::instance_provider::{ComponentInstanceAnyPtr, ComponentInstancePtr};
    use crate::scope::{PrototypeScope, ProviderId, Scope, SingletonScope};

    #[test]
    fn should_support_singletons() {
        let id = ProviderId::next();
        let mut scope = SingletonScope::default();

        let instance = ComponentInstancePtr::new(0) as ComponentInstanceAnyPtr;
        scope.store_instance(id, instance.clone());

        assert!(scope.instance(id).is_some());
        assert!(scope.instance(ProviderId::next()).is_none());
    }

    #[test]
    fn should_keep_first_stored_singleton() {
        let id = ProviderId::next();
        let mut scope = SingletonScope::default();

        let first = ComponentInstancePtr::new(1) as ComponentInstanceAnyPtr;
        let second = ComponentInstancePtr::new(2) as ComponentInstanceAnyPtr;
        scope.store_instance(id, first.clone());
        let stored = scope.store_instance(id, second);

        assert!(ComponentInstancePtr::ptr_eq(&stored, &first));
    }

    #[test]
    fn should_clear_singletons() {
        let id = ProviderId::next();
        let mut scope = SingletonScope::default();
        scope.store_instance(id, ComponentInstancePtr::new(0) as ComponentInstanceAnyPtr);

        scope.clear();

        assert!(scope.instance(id).is_none());
    }

    #[test]
    fn should_support_prototypes() {
        let id = ProviderId::next();
        let mut scope = PrototypeScope;

        let instance = ComponentInstancePtr::new(0) as ComponentInstanceAnyPtr;
        scope.store_instance(id, instance.clone());

        assert!(scope.instance(id).is_none());
    }

    #[test]
    fn should_allocate_unique_ids() {
        assert_ne!(ProviderId::next(), ProviderId::next());
    }
}
