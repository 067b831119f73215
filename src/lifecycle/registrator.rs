//! Deferred registration
//!
//! Some services need asynchronous setup (opening a pool, subscribing to a
//! topic) before they can be resolved. Their registrators are queued while
//! components are registered and awaited once during startup.

use crate::di::Registry;
use crate::error::{Result, StrataError};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

pub type RegistratorFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// Asynchronous setup hook, consumed by its single run.
pub type Registrator = Box<dyn FnOnce(Registry) -> RegistratorFuture + Send>;

/// Box an async closure into a [`Registrator`].
///
/// # Example
///
/// ```rust,ignore
/// impl Injectable for PgPool {
///     fn registrator() -> Option<Registrator> {
///         Some(registrator(|registry| async move {
///             let pool = connect(&registry.global().global::<ConfigService>()?).await?;
///             registry.register(Category::Global, Registration::value(ServiceId::of::<Pool>(), pool));
///             Ok(())
///         }))
///     }
/// }
/// ```
pub fn registrator<F, Fut>(run: F) -> Registrator
where
    F: FnOnce(Registry) -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Box::new(move |registry| Box::pin(run(registry)))
}

struct Pending {
    service: String,
    run: Registrator,
}

/// Registrators waiting for startup, in registration order.
#[derive(Default)]
pub(crate) struct RegistratorQueue {
    pending: Mutex<Vec<Pending>>,
}

impl RegistratorQueue {
    pub(crate) fn push(&self, service: String, run: Registrator) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Pending { service, run });
    }

    fn drain(&self) -> Vec<Pending> {
        std::mem::take(&mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub(crate) fn len(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Registry {
    /// Queue a registrator to run at startup.
    pub fn add_registrator(&self, service: impl Into<String>, registrator: Registrator) {
        let service = service.into();
        tracing::debug!("Queued registrator for {}", service);
        self.registrators().push(service, registrator);
    }

    pub fn pending_registrators(&self) -> usize {
        self.registrators().len()
    }

    /// Run every queued registrator once.
    ///
    /// Registrators run in the order they were queued. Those queued while this
    /// runs are left for the next call.
    ///
    /// # Errors
    ///
    /// Stops at the first failing registrator.
    pub async fn run_registrators(&self) -> Result<usize> {
        let pending = self.registrators().drain();
        let count = pending.len();
        tracing::info!("Running registrators...");

        for Pending { service, run } in pending {
            tracing::debug!("Registering: {}", service);
            run(self.clone()).await.map_err(|e| {
                tracing::error!("Registrator failed for {}: {}", service, e);
                StrataError::Registrator {
                    service: service.clone(),
                    message: e.to_string(),
                }
            })?;
            tracing::debug!("Registered: {}", service);
        }

        tracing::info!("Registrators complete ({} executed)", count);
        Ok(count)
    }

    /// Run every queued registrator with a timeout over the whole run.
    pub async fn run_registrators_with_timeout(&self, timeout: Duration) -> Result<usize> {
        tokio::time::timeout(timeout, self.run_registrators())
            .await
            .map_err(|_| StrataError::Timeout {
                phase: "registrators".to_string(),
                message: format!("Timeout after {:?}", timeout),
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::di::{Category, Registration, ServiceId};
    use std::sync::Arc;
    use tokio::sync::RwLock;

    #[tokio::test]
    async fn test_registrators_run_in_order_once() {
        let registry = Registry::new();
        let order = Arc::new(RwLock::new(Vec::new()));

        for i in 0..3 {
            let order = Arc::clone(&order);
            registry.add_registrator(
                format!("Service{}", i),
                registrator(move |_| async move {
                    order.write().await.push(i);
                    Ok(())
                }),
            );
        }

        assert_eq!(registry.pending_registrators(), 3);
        assert_eq!(registry.run_registrators().await.unwrap(), 3);
        assert_eq!(*order.read().await, vec![0, 1, 2]);

        assert_eq!(registry.run_registrators().await.unwrap(), 0);
        assert_eq!(order.read().await.len(), 3);
    }

    #[tokio::test]
    async fn test_registrator_can_register_services() {
        let registry = Registry::new();
        registry.add_registrator(
            "Pool",
            registrator(|registry| async move {
                registry.register(Category::Global, Registration::value("pool", 42u32));
                Ok(())
            }),
        );

        assert!(!registry.has(Category::Global, &ServiceId::from("pool")));
        registry.run_registrators().await.unwrap();

        let pool = registry
            .global()
            .get_by(Category::Global, "pool")
            .unwrap()
            .downcast::<u32>()
            .unwrap();
        assert_eq!(*pool, 42);
    }

    #[tokio::test]
    async fn test_failing_registrator() {
        let registry = Registry::new();
        registry.add_registrator(
            "Broken",
            registrator(|_| async { Err(anyhow::anyhow!("connection refused")) }),
        );

        let err = registry.run_registrators().await.unwrap_err();
        assert!(matches!(err, StrataError::Registrator { ref service, .. } if service == "Broken"));
    }

    #[tokio::test]
    async fn test_registrator_timeout() {
        let registry = Registry::new();
        registry.add_registrator(
            "Slow",
            registrator(|_| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            }),
        );

        let err = registry
            .run_registrators_with_timeout(Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, StrataError::Timeout { .. }));
    }
}
