use faststack_di::container::{
    BaseContainer, ConnectedContainers, Container, ContainerPtr, TypedContainer,
};
use faststack_di::context::ContainerContext;
use faststack_di::instance_provider::convert_error;
use faststack_di::provider::{AnyProvider, ContextResource, Factory, Provider, Singleton};
use faststack_di::{ContainerError, ResolveError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct TestContainer {
    counter: Arc<AtomicUsize>,
    counter_singleton: Singleton<usize>,
    label: Factory<String>,
    request_id: ContextResource<u64>,
    connected: ConnectedContainers,
}

impl TestContainer {
    fn new() -> Self {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_singleton = Singleton::new({
            let counter = counter.clone();
            move || {
                let counter = counter.clone();
                async move { Ok(counter.fetch_add(1, Ordering::SeqCst)) }
            }
        });
        let label = Factory::new({
            let counter_singleton = counter_singleton.clone();
            move || {
                let counter_singleton = counter_singleton.clone();
                async move {
                    let value = counter_singleton.resolve().await.map_err(convert_error)?;
                    Ok(format!("label-{value}"))
                }
            }
        });

        Self {
            counter,
            counter_singleton,
            label,
            request_id: ContextResource::new(|| async { Ok(7u64) }),
            connected: Default::default(),
        }
    }
}

impl BaseContainer for TestContainer {
    fn name(&self) -> &str {
        "TestContainer"
    }

    fn providers(&self) -> Vec<(&str, &dyn AnyProvider)> {
        vec![
            ("counter", &self.counter_singleton as &dyn AnyProvider),
            ("label", &self.label as &dyn AnyProvider),
            ("request_id", &self.request_id as &dyn AnyProvider),
        ]
    }

    fn connected_containers(&self) -> &ConnectedContainers {
        &self.connected
    }
}

#[tokio::test]
async fn should_resolve_by_name() {
    let container = TestContainer::new();

    let label = container.resolve_typed::<String>("label").await.unwrap();

    assert_eq!(*label, "label-0");
}

#[tokio::test]
async fn should_not_resolve_missing_name() {
    let container = TestContainer::new();

    assert!(matches!(
        container.resolve_by_name("missing").await.unwrap_err(),
        ResolveError::NoNamedProvider(name) if name == "missing"
    ));
}

#[tokio::test]
async fn should_not_resolve_incompatible_type() {
    let container = TestContainer::new();

    assert!(matches!(
        container.resolve_typed::<u8>("label").await.unwrap_err(),
        ResolveError::IncompatibleProvider { name, .. } if name == "label"
    ));
}

#[tokio::test]
async fn should_resolve_context_resource_by_name_only_in_context() {
    let container = TestContainer::new();

    assert!(matches!(
        container.resolve_by_name("request_id").await.unwrap_err(),
        ResolveError::NoActiveContext(_)
    ));

    let request_id = ContainerContext::new()
        .scope(container.resolve_typed::<u64>("request_id"))
        .await
        .unwrap();
    assert_eq!(*request_id, 7);
}

#[tokio::test]
async fn should_resolve_from_connected_container() {
    let root = Container::builder("root").build().unwrap();
    let child = Arc::new(TestContainer::new());
    root.connect_containers(vec![child.clone() as ContainerPtr]);

    let label = root.resolve_typed::<String>("label").await.unwrap();

    assert_eq!(*label, "label-0");
}

#[tokio::test]
async fn should_tear_down_connected_containers() {
    let root = Container::builder("root")
        .with_provider("root_value", Singleton::new(|| async { Ok(1u8) }))
        .build()
        .unwrap();
    let child = Arc::new(TestContainer::new());
    root.connect_containers(vec![child.clone() as ContainerPtr]);

    assert_eq!(*child.counter_singleton.resolve().await.unwrap(), 0);
    assert!(child.counter_singleton.is_initialized());

    root.tear_down().await;

    assert!(!child.counter_singleton.is_initialized());
    assert_eq!(*child.counter_singleton.resolve().await.unwrap(), 1);
    assert_eq!(child.counter.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn should_tear_down_cyclic_connections_once() {
    let first = Arc::new(TestContainer::new());
    let second = Arc::new(TestContainer::new());
    first.connect_containers(vec![second.clone() as ContainerPtr]);
    second.connect_containers(vec![first.clone() as ContainerPtr]);

    first.counter_singleton.resolve().await.unwrap();
    second.counter_singleton.resolve().await.unwrap();

    first.tear_down().await;

    assert!(!first.counter_singleton.is_initialized());
    assert!(!second.counter_singleton.is_initialized());
}

#[tokio::test]
async fn should_resolve_through_cyclic_connections() {
    let first = Arc::new(Container::builder("first").build().unwrap());
    let second = Arc::new(
        Container::builder("second")
            .with_provider("value", Factory::new(|| async { Ok(3u8) }))
            .build()
            .unwrap(),
    );
    first.connect_containers(vec![second.clone() as ContainerPtr]);
    second.connect_containers(vec![first.clone() as ContainerPtr]);

    assert_eq!(*first.resolve_typed::<u8>("value").await.unwrap(), 3);
    assert!(matches!(
        first.resolve_by_name("missing").await,
        Err(ResolveError::NoNamedProvider(name)) if name == "missing"
    ));
    assert!(matches!(
        second.resolve_by_name("missing").await,
        Err(ResolveError::NoNamedProvider(_))
    ));
}

#[tokio::test]
async fn should_not_connect_container_twice() {
    let root = Container::builder("root").build().unwrap();
    let child = Arc::new(TestContainer::new()) as ContainerPtr;

    root.connect_containers(vec![child.clone(), child.clone()]);
    root.connect_containers(vec![child]);

    assert_eq!(root.connected_containers().all().len(), 1);
}

#[test]
fn should_reject_duplicate_provider_names() {
    let result = Container::builder("duplicates")
        .with_provider("value", Factory::new(|| async { Ok(1u8) }))
        .with_provider("value", Factory::new(|| async { Ok(2u8) }))
        .build();

    assert_eq!(
        result.err(),
        Some(ContainerError::DuplicateProviderName("value".to_string()))
    );
}
