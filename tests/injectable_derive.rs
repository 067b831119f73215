use std::sync::atomic::{AtomicUsize, Ordering};
use strata::prelude::*;

#[derive(Injectable)]
pub struct Database {}

#[derive(Injectable)]
pub struct UserCache {}

#[derive(Injectable)]
pub struct UserRepository {
    #[inject(guard = "USE_DB")]
    db: Arc<Database>,
    cache: Option<Arc<UserCache>>,
    container: ContainerHandle,
    #[inject(default)]
    page_size: usize,
}

#[derive(Injectable)]
pub struct Logger {}

#[derive(Injectable)]
pub struct AuditedAction {
    #[inject(property, guard = "USE_GLOBAL")]
    logger: Option<Arc<Logger>>,
}

#[derive(Injectable)]
pub struct Mailer {}

#[derive(Injectable)]
pub struct SignupAction {
    #[inject(guard = "USE_SERVICE", id = "mailer")]
    mailer: Arc<Mailer>,
    #[inject(id = "greeting")]
    greeting: Arc<String>,
}

static CONNECTIONS_CLOSED: AtomicUsize = AtomicUsize::new(0);

#[derive(Injectable)]
#[injectable(destroy = "close", registrator = "warm_up")]
pub struct Connection {}

impl Connection {
    fn close(&self) -> strata::anyhow::Result<()> {
        CONNECTIONS_CLOSED.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn warm_up() -> Registrator {
    registrator(|registry| async move {
        registry.register(Category::Global, Registration::value("warmed", true));
        Ok(())
    })
}

#[derive(Injectable)]
pub struct AuditBase {}

#[derive(Injectable)]
#[injectable(base = "AuditBase")]
pub struct Report {
    #[inject(default)]
    title: String,
}

#[test]
fn test_declared_parameters() {
    let names: Vec<_> = UserRepository::parameters()
        .iter()
        .map(|parameter| parameter.name())
        .collect();
    assert_eq!(names, vec![Some("db"), Some("cache")]);
    assert!(UserRepository::parameters()[1].is_optional());
    assert_eq!(UserRepository::injections().len(), 1);
    assert_eq!(Report::bases(), vec![ServiceId::of::<AuditBase>()]);
}

#[test]
fn test_derived_constructor() {
    let registry = Registry::new();
    registry.system::<Database>().register().unwrap();
    registry.repository::<UserRepository>().register().unwrap();

    let container = registry.container("req-1");
    let repo = container.get::<UserRepository>(Category::Repository).unwrap();
    assert!(Arc::ptr_eq(&repo.db, &container.system::<Database>().unwrap()));
    assert!(repo.cache.is_none());
    assert_eq!(repo.container.id(), "req-1");
    assert_eq!(repo.page_size, 0);
}

#[test]
fn test_derived_guard_rejects_wrong_layer() {
    let registry = Registry::new();
    let err = registry.action::<UserRepository>().register().unwrap_err();
    assert!(err.is_layering_violation());
}

#[test]
fn test_derived_property() {
    let registry = Registry::new();
    registry.global_service::<Logger>().register().unwrap();
    registry.action::<AuditedAction>().register().unwrap();

    let action = registry.container("req-1").action::<AuditedAction>().unwrap();
    let logger = registry.global().global::<Logger>().unwrap();
    assert!(Arc::ptr_eq(action.logger.as_ref().unwrap(), &logger));
}

#[test]
fn test_derived_ids() {
    let registry = Registry::new();
    registry.service::<Mailer>().id("mailer").register().unwrap();
    registry.register(
        Category::Action,
        Registration::value("greeting", "welcome".to_string()),
    );
    registry.action::<SignupAction>().register().unwrap();

    let container = registry.container("req-1");
    let signup = container.action::<SignupAction>().unwrap();
    assert_eq!(signup.greeting.as_str(), "welcome");

    let mailer = container
        .get_by(Category::Service, "mailer")
        .and_then(strata::downcast::<Mailer>)
        .unwrap();
    assert!(Arc::ptr_eq(&signup.mailer, &mailer));
}

#[test]
fn test_default_fields() {
    let registry = Registry::new();
    registry.service::<Report>().register().unwrap();
    let report = registry.global().get::<Report>(Category::Service).unwrap();
    assert!(report.title.is_empty());
}

#[tokio::test]
async fn test_derived_lifecycle_hooks() {
    let registry = Registry::new();
    registry.global_service::<Connection>().register().unwrap();
    assert_eq!(registry.pending_registrators(), 1);

    registry.run_registrators().await.unwrap();
    assert!(registry.has(Category::Global, &ServiceId::from("warmed")));

    registry.global().global::<Connection>().unwrap();
    registry.remove(ServiceId::of::<Connection>());
    assert_eq!(CONNECTIONS_CLOSED.load(Ordering::SeqCst), 1);
}
