//! Named background workers
//!
//! A worker is a long-lived background unit (a queue consumer, a scheduled
//! job) registered under a unique name. Each startup runs inside its own
//! container named `"<worker_prefix>.<name>"`, which is reset once startup
//! returns.

use crate::di::{ContainerHandle, Registry};
use crate::error::{Result, StrataError};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[async_trait]
pub trait Worker: Send + Sync + 'static {
    /// Called once when workers are started.
    async fn startup(&self, _container: &ContainerHandle) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called once when workers are stopped. Failures are logged, never raised.
    async fn shutdown(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

struct Registered {
    worker: Arc<dyn Worker>,
    enabled: bool,
    order: usize,
}

/// Registered workers, keyed by unique name.
#[derive(Default)]
pub struct Workers {
    entries: DashMap<String, Registered>,
    next: AtomicUsize,
}

impl Workers {
    /// # Errors
    /// Returns [`StrataError::DuplicateRegistration`] if `name` is taken.
    pub fn register(&self, name: impl Into<String>, worker: impl Worker, enabled: bool) -> Result<()> {
        let name = name.into();
        match self.entries.entry(name) {
            Entry::Occupied(entry) => Err(StrataError::DuplicateRegistration {
                kind: "worker".to_string(),
                id: entry.key().clone(),
            }),
            Entry::Vacant(entry) => {
                tracing::debug!(enabled, "Registered worker {}", entry.key());
                entry.insert(Registered {
                    worker: Arc::new(worker),
                    enabled,
                    order: self.next.fetch_add(1, Ordering::Relaxed),
                });
                Ok(())
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.ordered().into_iter().map(|(name, _, _)| name).collect()
    }

    fn ordered(&self) -> Vec<(String, Arc<dyn Worker>, bool)> {
        let mut entries: Vec<(usize, String, Arc<dyn Worker>, bool)> = self
            .entries
            .iter()
            .map(|entry| {
                (
                    entry.order,
                    entry.key().clone(),
                    Arc::clone(&entry.worker),
                    entry.enabled,
                )
            })
            .collect();
        entries.sort_by_key(|(order, ..)| *order);
        entries
            .into_iter()
            .map(|(_, name, worker, enabled)| (name, worker, enabled))
            .collect()
    }
}

impl Registry {
    /// Start every enabled worker, in registration order.
    ///
    /// # Errors
    /// Stops at the first worker whose startup fails.
    pub async fn run_workers(&self) -> Result<usize> {
        let prefix = self.config().worker_prefix.clone();
        let mut started = 0;

        for (name, worker, enabled) in self.workers().ordered() {
            if !enabled {
                tracing::debug!("Worker {} is disabled", name);
                continue;
            }

            let container = self.container(&format!("{}.{}", prefix, name));
            let _guard = crate::di::ContainerGuard::new(container.clone());

            tracing::info!("Starting worker {}", name);
            crate::context::scope(container.clone(), worker.startup(&container))
                .await
                .map_err(|e| {
                    tracing::error!("Worker {} failed to start: {}", name, e);
                    StrataError::WorkerFailed {
                        name: name.clone(),
                        message: e.to_string(),
                    }
                })?;
            started += 1;
        }

        tracing::info!("Workers started ({} running)", started);
        Ok(started)
    }

    /// Shut every worker down. Failures are logged and skipped.
    pub async fn stop_workers(&self) {
        for (name, worker, _) in self.workers().ordered() {
            if let Err(e) = worker.shutdown().await {
                tracing::warn!("Worker {} failed to shut down: {}", name, e);
            }
        }
        tracing::info!("Workers stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::RequestContext;
    use tokio::sync::RwLock;

    struct Recorder {
        name: &'static str,
        log: Arc<RwLock<Vec<String>>>,
        fail_startup: bool,
    }

    #[async_trait]
    impl Worker for Recorder {
        async fn startup(&self, container: &ContainerHandle) -> anyhow::Result<()> {
            let ctx = container.system::<RequestContext>()?;
            self.log.write().await.push(format!("start {}", ctx.id()));
            if self.fail_startup {
                anyhow::bail!("queue unreachable");
            }
            Ok(())
        }

        async fn shutdown(&self) -> anyhow::Result<()> {
            self.log.write().await.push(format!("stop {}", self.name));
            anyhow::bail!("already closed")
        }
    }

    fn recorder(name: &'static str, log: &Arc<RwLock<Vec<String>>>) -> Recorder {
        Recorder {
            name,
            log: Arc::clone(log),
            fail_startup: false,
        }
    }

    #[tokio::test]
    async fn test_duplicate_worker_name() {
        let registry = Registry::new();
        let log = Arc::new(RwLock::new(Vec::new()));
        registry.workers().register("mailer", recorder("mailer", &log), true).unwrap();

        let err = registry
            .workers()
            .register("mailer", recorder("mailer", &log), true)
            .unwrap_err();
        assert!(matches!(err, StrataError::DuplicateRegistration { ref kind, .. } if kind == "worker"));
        assert_eq!(registry.workers().len(), 1);
    }

    #[tokio::test]
    async fn test_run_and_stop_in_order() {
        let registry = Registry::new();
        let log = Arc::new(RwLock::new(Vec::new()));
        registry.workers().register("b", recorder("b", &log), true).unwrap();
        registry.workers().register("a", recorder("a", &log), true).unwrap();
        registry.workers().register("off", recorder("off", &log), false).unwrap();

        assert_eq!(registry.run_workers().await.unwrap(), 2);
        assert_eq!(registry.container_count(), 0);

        registry.stop_workers().await;
        assert_eq!(
            *log.read().await,
            vec![
                "start worker.b",
                "start worker.a",
                "stop b",
                "stop a",
                "stop off"
            ]
        );
    }

    #[tokio::test]
    async fn test_failing_startup() {
        let registry = Registry::new();
        let log = Arc::new(RwLock::new(Vec::new()));
        let mut worker = recorder("broken", &log);
        worker.fail_startup = true;
        registry.workers().register("broken", worker, true).unwrap();

        let err = registry.run_workers().await.unwrap_err();
        assert!(matches!(err, StrataError::WorkerFailed { ref name, .. } if name == "broken"));
        assert!(!registry.has_container("worker.broken"));
    }
}
