use crate::di::{Category, Instance, Registry, ServiceId, downcast};
use crate::error::Result;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;

pub(crate) const GLOBAL_CONTAINER_ID: &str = "global";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ContainerKey(pub(crate) u64);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct RecordKey {
    pub(crate) category: Category,
    pub(crate) id: ServiceId,
}

impl RecordKey {
    pub(crate) fn new(category: Category, id: ServiceId) -> Self {
        Self { category, id }
    }
}

/// Instances cached by one container.
pub(crate) struct ScopeState {
    pub(crate) name: Arc<str>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) instances: DashMap<RecordKey, Instance>,
}

impl ScopeState {
    pub(crate) fn new(name: Arc<str>) -> Self {
        Self {
            name,
            created_at: Utc::now(),
            instances: DashMap::new(),
        }
    }

    pub(crate) fn cached(&self, key: &RecordKey) -> Option<Instance> {
        self.instances.get(key).map(|entry| entry.value().clone())
    }
}

#[derive(Clone)]
pub(crate) enum Slot {
    Global,
    Scoped { key: ContainerKey, name: Arc<str> },
}

/// A resolution scope tied to one request or background invocation.
///
/// Handles are cheap to clone. Every `container`-scoped resolution through
/// handles of the same container returns the same instance until the container
/// is reset; after that, the handle reports
/// [`StrataError::ContainerReleased`](crate::StrataError::ContainerReleased).
///
/// # Example
/// ```
/// use strata::{Category, Registry};
///
/// let registry = Registry::new();
/// let container = registry.container("req-1");
/// assert_eq!(container.id(), "req-1");
/// registry.reset("req-1");
/// assert!(container.is_released());
/// ```
#[derive(Clone)]
pub struct ContainerHandle {
    registry: Registry,
    slot: Slot,
}

impl ContainerHandle {
    pub(crate) fn new(registry: Registry, slot: Slot) -> Self {
        Self { registry, slot }
    }

    pub(crate) fn slot(&self) -> &Slot {
        &self.slot
    }

    pub fn id(&self) -> &str {
        match &self.slot {
            Slot::Global => GLOBAL_CONTAINER_ID,
            Slot::Scoped { name, .. } => name,
        }
    }

    pub fn is_global(&self) -> bool {
        matches!(self.slot, Slot::Global)
    }

    pub fn is_released(&self) -> bool {
        match &self.slot {
            Slot::Global => false,
            Slot::Scoped { key, .. } => !self.registry.has_container_key(*key),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn has(&self, category: Category, id: impl Into<ServiceId>) -> bool {
        self.registry.has(category, &id.into())
    }

    /// Resolve a component registered under its own type.
    pub fn get<T: Send + Sync + 'static>(&self, category: Category) -> Result<Arc<T>> {
        self.get_by(category, ServiceId::of::<T>())
            .and_then(downcast::<T>)
    }

    pub fn get_by(&self, category: Category, id: impl Into<ServiceId>) -> Result<Instance> {
        self.registry.resolve(self, category, &id.into())
    }

    pub fn global<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.get(Category::Global)
    }

    pub fn system<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.get(Category::System)
    }

    pub fn action<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.get(Category::Action)
    }

    pub fn validation<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.get(Category::Validation)
    }

    /// Seed this container's cache with a ready-made instance.
    pub fn set<T: Send + Sync + 'static>(
        &self,
        category: Category,
        id: impl Into<ServiceId>,
        value: T,
    ) -> Result<()> {
        self.set_instance(category, id, Arc::new(value))
    }

    pub fn set_instance(
        &self,
        category: Category,
        id: impl Into<ServiceId>,
        value: Instance,
    ) -> Result<()> {
        let state = self.registry.scope_state(self)?;
        state
            .instances
            .insert(RecordKey::new(category, id.into()), value);
        Ok(())
    }

    /// Reset the container this handle points to. No-op for the global container.
    pub fn release(&self) -> bool {
        match &self.slot {
            Slot::Global => false,
            Slot::Scoped { name, .. } => self.registry.reset(name),
        }
    }
}

impl std::fmt::Debug for ContainerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerHandle")
            .field("id", &self.id())
            .finish()
    }
}

/// Resets its container when dropped, including on panic or cancellation.
pub struct ContainerGuard {
    container: ContainerHandle,
}

impl ContainerGuard {
    pub fn new(container: ContainerHandle) -> Self {
        Self { container }
    }

    pub fn container(&self) -> &ContainerHandle {
        &self.container
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        self.container.release();
    }
}
