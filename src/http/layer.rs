use crate::context;
use crate::di::{Category, ContainerGuard, Registry, ServiceId};
use crate::request::RequestContext;
use axum::{body::Body, http::Request, response::Response};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use uuid::Uuid;

/// Header carrying the caller's correlation id, exposed through
/// [`RequestContext::correlation_id`].
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Tower layer creating one container per request.
///
/// Every request gets a container named by a fresh uuid, so two requests never
/// share one even when they send the same [`REQUEST_ID_HEADER`].
#[derive(Clone)]
pub struct ContainerLayer {
    registry: Registry,
}

impl ContainerLayer {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }
}

impl<S> Layer<S> for ContainerLayer {
    type Service = ContainerMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ContainerMiddleware {
            inner,
            registry: self.registry.clone(),
        }
    }
}

#[derive(Clone)]
pub struct ContainerMiddleware<S> {
    inner: S,
    registry: Registry,
}

impl<S> Service<Request<Body>> for ContainerMiddleware<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let registry = self.registry.clone();
        // The clone is not ready; keep the polled service for this call.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let guard = ContainerGuard::new(registry.container(&Uuid::new_v4().to_string()));
            let container = guard.container().clone();

            let correlation_id = req
                .headers()
                .get(REQUEST_ID_HEADER)
                .and_then(|value| value.to_str().ok())
                .filter(|value| !value.is_empty());
            if let Some(correlation_id) = correlation_id {
                let request = RequestContext::new(container.id()).with_correlation_id(correlation_id);
                if let Err(e) = container.set(
                    Category::System,
                    ServiceId::of::<RequestContext>(),
                    request,
                ) {
                    tracing::warn!("Failed to seed request context: {}", e);
                }
            }

            req.extensions_mut().insert(container.clone());

            let response = context::scope(container, inner.call(req)).await;
            drop(guard);
            response
        })
    }
}
