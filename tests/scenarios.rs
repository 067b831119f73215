use std::sync::atomic::{AtomicUsize, Ordering};
use strata::prelude::*;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[derive(Injectable)]
pub struct Greeting {}

#[derive(Injectable)]
pub struct Welcome {
    #[inject(guard = "USE_SERVICE")]
    greeting: Arc<Greeting>,
}

static DATABASES_BUILT: AtomicUsize = AtomicUsize::new(0);

pub struct Database;

impl strata::Injectable for Database {
    fn construct(_args: Arguments) -> Result<Self> {
        DATABASES_BUILT.fetch_add(1, Ordering::SeqCst);
        Ok(Database)
    }
}

#[derive(Injectable)]
pub struct OrderRepository {
    #[inject(property, guard = "USE_DB")]
    db: Option<Arc<Database>>,
}

#[derive(Injectable)]
pub struct PlaceOrder {
    #[inject(property, guard = "USE_DB")]
    db: Option<Arc<Database>>,
}

#[derive(Injectable)]
pub struct Settings {}

#[derive(Injectable, Debug)]
pub struct Cart {}

fn current_request_id() -> Option<String> {
    let container = strata::context::current()?;
    let request = container.system::<RequestContext>().ok()?;
    Some(request.id().to_string())
}

#[test]
fn test_guarded_parameter_matches_direct_resolution() {
    init_tracing();
    let registry = Registry::new();
    registry.service::<Greeting>().register().unwrap();
    registry.action::<Welcome>().register().unwrap();

    let container = registry.container("container-x");
    let welcome = registry
        .resolve_as::<Welcome>(&container, Category::Action, &ServiceId::of::<Welcome>())
        .unwrap();
    let greeting = registry
        .resolve_as::<Greeting>(&container, Category::Service, &ServiceId::of::<Greeting>())
        .unwrap();
    assert!(Arc::ptr_eq(&welcome.greeting, &greeting));
}

#[test]
fn test_database_guard_only_for_repositories() {
    init_tracing();
    let registry = Registry::new();
    registry.system::<Database>().register().unwrap();

    let err = registry.action::<PlaceOrder>().register().unwrap_err();
    assert!(err.is_layering_violation());
    assert!(!registry.has(Category::Action, &ServiceId::of::<PlaceOrder>()));
    assert_eq!(DATABASES_BUILT.load(Ordering::SeqCst), 0);

    registry.repository::<OrderRepository>().register().unwrap();
    let repo = registry
        .container("req-1")
        .get::<OrderRepository>(Category::Repository)
        .unwrap();
    assert!(repo.db.is_some());
    assert_eq!(DATABASES_BUILT.load(Ordering::SeqCst), 1);
}

#[test]
fn test_scopes_across_containers() {
    let registry = Registry::new();
    registry.global_service::<Settings>().register().unwrap();
    registry.service::<Cart>().register().unwrap();

    let a = registry.container("req-a");
    let b = registry.container("req-b");

    assert!(Arc::ptr_eq(
        &a.global::<Settings>().unwrap(),
        &b.global::<Settings>().unwrap()
    ));
    assert!(!Arc::ptr_eq(
        &a.get::<Cart>(Category::Service).unwrap(),
        &b.get::<Cart>(Category::Service).unwrap()
    ));
}

#[test]
fn test_removed_value_is_not_resurrected() {
    let registry = Registry::new();
    registry.service::<Cart>().register().unwrap();
    let container = registry.container("req-1");
    let before = container.get::<Cart>(Category::Service).unwrap();

    registry.remove(ServiceId::of::<Cart>());
    assert!(container.get::<Cart>(Category::Service).unwrap_err().is_not_found());

    registry.service::<Cart>().register().unwrap();
    let after = container.get::<Cart>(Category::Service).unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
}

#[tokio::test]
async fn test_ambient_container_reaches_nested_calls() {
    init_tracing();
    let registry = Registry::new();
    assert_eq!(current_request_id(), None);

    let (seen, container) = registry
        .within_container("job", |container| async move {
            tokio::task::yield_now().await;
            Ok::<_, StrataError>((current_request_id(), container))
        })
        .await
        .unwrap();

    assert_eq!(seen.as_deref(), Some(container.id()));
    assert!(container.is_released());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_containers_are_isolated() {
    let registry = Registry::new();
    registry.service::<Cart>().register().unwrap();
    registry.global_service::<Settings>().register().unwrap();
    let settings = registry.global().global::<Settings>().unwrap();

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let registry = registry.clone();
            tokio::spawn(async move {
                let container = registry.container(&format!("req-{}", i));
                let first = container.get::<Cart>(Category::Service).unwrap();
                tokio::task::yield_now().await;
                let second = container.get::<Cart>(Category::Service).unwrap();
                assert!(Arc::ptr_eq(&first, &second));
                let settings = container.global::<Settings>().unwrap();
                registry.reset(container.id());
                (first, settings)
            })
        })
        .collect();

    let mut carts = Vec::new();
    for task in tasks {
        let (cart, shared) = task.await.unwrap();
        assert!(Arc::ptr_eq(&shared, &settings));
        carts.push(cart);
    }

    for (i, cart) in carts.iter().enumerate() {
        for other in &carts[i + 1..] {
            assert!(!Arc::ptr_eq(cart, other));
        }
    }
    assert_eq!(registry.container_count(), 0);
}
