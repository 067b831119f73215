//! Ambient container propagation
//!
//! Work started from a request or a background invocation runs inside one
//! container. The container is carried in a task-local so that code deep in the
//! call chain can reach it with [`current`] without threading a handle through
//! every signature.

use crate::di::{ContainerGuard, ContainerHandle, Registry};
use std::fmt::Display;
use std::future::Future;

tokio::task_local! {
    static CURRENT: ContainerHandle;
}

/// Run `fut` with `container` as the ambient container.
pub async fn scope<F: Future>(container: ContainerHandle, fut: F) -> F::Output {
    CURRENT.scope(container, fut).await
}

/// The ambient container of the running task, if any.
pub fn current() -> Option<ContainerHandle> {
    CURRENT.try_with(ContainerHandle::clone).ok()
}

impl Registry {
    /// Run `f` inside a fresh container named `"<prefix>.<uuid>"`.
    ///
    /// The container is the ambient one while `f` runs and is reset
    /// afterwards, also when `f` fails, panics, or is cancelled. A failure is
    /// logged and returned.
    pub async fn within_container<F, Fut, T, E>(&self, prefix: &str, f: F) -> Result<T, E>
    where
        F: FnOnce(ContainerHandle) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let guard = ContainerGuard::new(self.create_container(prefix));
        let container = guard.container().clone();
        let id = container.id().to_string();

        let result = scope(container.clone(), f(container)).await;
        match &result {
            Ok(_) => tracing::debug!("Container {} finished", id),
            Err(e) => tracing::error!("Container {} failed: {}", id, e),
        }
        drop(guard);
        result
    }

    /// [`within_container`](Self::within_container) with the configured worker prefix.
    pub async fn within_worker_container<F, Fut, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(ContainerHandle) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let prefix = self.config().worker_prefix.clone();
        self.within_container(&prefix, f).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StrataError;
    use crate::request::RequestContext;

    #[tokio::test]
    async fn test_no_ambient_container_outside_scope() {
        assert!(current().is_none());
    }

    #[tokio::test]
    async fn test_within_container_sets_and_releases() {
        let registry = Registry::new();

        let (id, handle) = registry
            .within_container("job", |container| async move {
                let ambient = current().expect("ambient container");
                assert_eq!(ambient.id(), container.id());
                let ctx = ambient.system::<RequestContext>()?;
                Ok::<_, StrataError>((ctx.id().to_string(), container))
            })
            .await
            .unwrap();

        assert!(id.starts_with("job."));
        assert!(handle.is_released());
        assert!(!registry.has_container(&id));
        assert!(current().is_none());
    }

    #[tokio::test]
    async fn test_within_container_releases_on_error() {
        let registry = Registry::new();
        let mut seen = None;

        let result: Result<(), anyhow::Error> = registry
            .within_worker_container(|container| {
                seen = Some(container.clone());
                async { Err(anyhow::anyhow!("job failed")) }
            })
            .await;

        assert!(result.is_err());
        let seen = seen.unwrap();
        assert!(seen.id().starts_with("worker."));
        assert!(seen.is_released());
        assert_eq!(registry.container_count(), 0);
    }
}
