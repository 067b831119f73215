use crate::di::{Category, Instance, ServiceRecord};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;

/// A destroy hook that failed during a container reset or a removal.
#[derive(Debug, Clone, Serialize)]
pub struct TeardownFailure {
    pub container: String,
    pub category: Category,
    pub id: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Side channel for swallowed destroy failures.
pub(crate) struct TeardownChannel {
    sender: broadcast::Sender<TeardownFailure>,
    failures: AtomicU64,
}

impl TeardownChannel {
    pub(crate) fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            failures: AtomicU64::new(0),
        }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<TeardownFailure> {
        self.sender.subscribe()
    }

    pub(crate) fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    fn report(&self, failure: TeardownFailure) {
        tracing::warn!(
            container = %failure.container,
            category = %failure.category,
            "Destroy failed for {}: {}",
            failure.id,
            failure.message
        );
        self.failures.fetch_add(1, Ordering::Relaxed);
        // No subscribers is fine; the log line and counter remain.
        let _ = self.sender.send(failure);
    }

    /// Run the record's destroy hook on `instance`. Never fails, never panics.
    pub(crate) fn destroy(&self, container: &str, record: &ServiceRecord, instance: &Instance) {
        let Some(hook) = record.destroy_hook() else {
            return;
        };

        let message = match catch_unwind(AssertUnwindSafe(|| hook(instance))) {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e.to_string(),
            Err(panic) => panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "destroy panicked".to_string()),
        };

        self.report(TeardownFailure {
            container: container.to_string(),
            category: record.category(),
            id: record.id().to_string(),
            message,
            at: Utc::now(),
        });
    }
}
