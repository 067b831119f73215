#![cfg(feature = "http")]

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use axum::routing::get;
use strata::prelude::*;
use strata::http::REQUEST_ID_HEADER;
use tokio::sync::Notify;
use tower::ServiceExt;

#[derive(Injectable)]
pub struct Greeter {
    #[inject(guard = "USE_REQUEST")]
    request: Arc<RequestContext>,
}

#[derive(Injectable)]
pub struct Cart {}

pub struct Unregistered;

async fn greet(Action(greeter): Action<Greeter>) -> String {
    format!(
        "hello {}",
        greeter.request.correlation_id().unwrap_or("anonymous")
    )
}

async fn whoami(container: ContainerHandle) -> String {
    container.id().to_string()
}

async fn ambient(container: ContainerHandle) -> String {
    let same = current().is_some_and(|ambient| ambient.id() == container.id());
    format!("{}", same)
}

async fn missing(Action(_): Action<Unregistered>) -> &'static str {
    "unreachable"
}

fn app(registry: &Registry) -> Router {
    Router::new()
        .route("/greet", get(greet))
        .route("/ambient", get(ambient))
        .route("/whoami", get(whoami))
        .route("/missing", get(missing))
        .layer(ContainerLayer::new(registry.clone()))
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn registry() -> Registry {
    let registry = Registry::new();
    registry.action::<Greeter>().register().unwrap();
    registry.action::<Cart>().register().unwrap();
    registry
}

fn with_request_id(uri: &str, request_id: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(REQUEST_ID_HEADER, request_id)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_request_id_is_correlation_only() {
    let registry = registry();

    let response = app(&registry)
        .oneshot(with_request_id("/greet", "req-42"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "hello req-42");

    let response = app(&registry)
        .oneshot(with_request_id("/whoami", "req-42"))
        .await
        .unwrap();
    let id = body_text(response).await;
    assert_ne!(id, "req-42");
    assert!(uuid::Uuid::parse_str(&id).is_ok());

    let response = app(&registry)
        .oneshot(Request::builder().uri("/greet").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(body_text(response).await, "hello anonymous");
    assert_eq!(registry.container_count(), 0);
}

#[tokio::test]
async fn test_overlapping_requests_with_same_id_are_isolated() {
    let registry = registry();
    let entered = Arc::new(Notify::new());
    let proceed = Arc::new(Notify::new());

    let slow = {
        let (entered, proceed) = (Arc::clone(&entered), Arc::clone(&proceed));
        move |container: ContainerHandle| async move {
            let first = container.action::<Cart>().unwrap();
            entered.notify_one();
            proceed.notified().await;
            match container.action::<Cart>() {
                Ok(second) => format!("{} {}", container.id(), Arc::ptr_eq(&first, &second)),
                Err(e) => e.to_string(),
            }
        }
    };
    let fast = |container: ContainerHandle| async move {
        container.action::<Cart>().unwrap();
        container.id().to_string()
    };

    let app = Router::new()
        .route("/slow", get(slow))
        .route("/fast", get(fast))
        .layer(ContainerLayer::new(registry.clone()));

    let pending = tokio::spawn(app.clone().oneshot(with_request_id("/slow", "shared")));
    entered.notified().await;
    assert_eq!(registry.container_count(), 1);

    let response = app.clone().oneshot(with_request_id("/fast", "shared")).await.unwrap();
    let fast_id = body_text(response).await;
    proceed.notify_one();

    let response = pending.await.unwrap().unwrap();
    let slow = body_text(response).await;
    let (slow_id, same_cart) = slow.split_once(' ').unwrap_or_else(|| panic!("{}", slow));
    assert_eq!(same_cart, "true");
    assert_ne!(slow_id, fast_id);
    assert_eq!(registry.container_count(), 0);
}

#[tokio::test]
async fn test_request_container_is_ambient() {
    let registry = registry();

    let response = app(&registry)
        .oneshot(Request::builder().uri("/ambient").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(body_text(response).await, "true");
    assert_eq!(registry.container_count(), 0);
}

#[tokio::test]
async fn test_resolution_failure_is_internal_error() {
    let registry = registry();

    let response = app(&registry)
        .oneshot(Request::builder().uri("/missing").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_text(response).await.contains("Service not found"));
    assert_eq!(registry.container_count(), 0);
}

#[tokio::test]
async fn test_missing_layer() {
    let response = Router::new()
        .route("/ambient", get(ambient))
        .oneshot(Request::builder().uri("/ambient").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
