use chrono::{DateTime, Utc};
use std::sync::Arc;

/// The request (or invocation) a container serves.
///
/// Registered by default as a `system` service built from the owning
/// container's id, and injected with [`USE_REQUEST`](crate::USE_REQUEST).
/// The correlation id is whatever the caller sent to tie its logs to this
/// request; it never names a container.
#[derive(Debug, Clone)]
pub struct RequestContext {
    id: Arc<str>,
    correlation_id: Option<Arc<str>>,
    started_at: DateTime<Utc>,
}

impl RequestContext {
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self {
            id: id.into(),
            correlation_id: None,
            started_at: Utc::now(),
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<Arc<str>>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn elapsed(&self) -> chrono::Duration {
        Utc::now() - self.started_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::di::{Category, Registry, ServiceId};
    use std::sync::Arc;

    #[test]
    fn test_built_per_container() {
        let registry = Registry::new();
        let a = registry.container("req-a");
        let b = registry.container("req-b");

        let ctx_a = a.system::<RequestContext>().unwrap();
        assert_eq!(ctx_a.id(), "req-a");
        assert!(Arc::ptr_eq(&ctx_a, &a.system::<RequestContext>().unwrap()));
        assert_eq!(b.get::<RequestContext>(Category::System).unwrap().id(), "req-b");
    }

    #[test]
    fn test_seeded_correlation_id() {
        let registry = Registry::new();
        let container = registry.container("req-c");
        container
            .set(
                Category::System,
                ServiceId::of::<RequestContext>(),
                RequestContext::new(container.id()).with_correlation_id("trace-7"),
            )
            .unwrap();

        let ctx = container.system::<RequestContext>().unwrap();
        assert_eq!(ctx.id(), "req-c");
        assert_eq!(ctx.correlation_id(), Some("trace-7"));
        assert_eq!(RequestContext::new("req-d").correlation_id(), None);
    }

    #[test]
    fn test_elapsed_is_non_negative() {
        let ctx = RequestContext::new("job-1");
        assert!(ctx.elapsed() >= chrono::Duration::zero());
    }
}
