use crate::config::{ConfigService, RegistryConfig};
use crate::di::container::{ContainerKey, RecordKey, ScopeState, Slot, GLOBAL_CONTAINER_ID};
use crate::di::{
    Arguments, Category, Constructor, ContainerHandle, Factory, InjectionHandler, Instance,
    Registration, Scope, ServiceId, ServiceRecord, Site,
};
use crate::error::{Result, StrataError};
use crate::lifecycle::{RegistratorQueue, TeardownChannel, TeardownFailure};
use crate::request::RequestContext;
use crate::worker::Workers;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use std::any::TypeId;
use std::cell::RefCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use uuid::Uuid;

thread_local! {
    /// Records being built on this thread, outermost first.
    static BUILDING: RefCell<Vec<RecordKey>> = const { RefCell::new(Vec::new()) };
}

/// Marks one record as under construction until dropped.
struct BuildFrame;

impl BuildFrame {
    fn enter(key: &RecordKey) -> Result<Self> {
        BUILDING.with(|building| {
            let mut building = building.borrow_mut();
            if let Some(start) = building.iter().position(|entry| entry == key) {
                let cycle = building[start..]
                    .iter()
                    .chain(std::iter::once(key))
                    .map(|entry| format!("{}:{}", entry.category, entry.id))
                    .collect::<Vec<_>>()
                    .join(" -> ");
                return Err(StrataError::construction(
                    &key.id,
                    format!("dependency cycle {}", cycle),
                ));
            }
            building.push(key.clone());
            Ok(BuildFrame)
        })
    }
}

impl Drop for BuildFrame {
    fn drop(&mut self) {
        BUILDING.with(|building| {
            building.borrow_mut().pop();
        });
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct HandlerKey {
    owner: TypeId,
    site: Site,
}

struct RegistryInner {
    config: RegistryConfig,
    records: DashMap<RecordKey, Arc<ServiceRecord>>,
    handlers: DashMap<HandlerKey, Arc<InjectionHandler>>,
    /// Types whose declared injections are installed.
    declared: DashMap<TypeId, ()>,
    global: Arc<ScopeState>,
    containers: DashMap<ContainerKey, Arc<ScopeState>>,
    names: DashMap<Arc<str>, ContainerKey>,
    next_container: AtomicU64,
    registrators: RegistratorQueue,
    teardown: TeardownChannel,
    workers: Workers,
}

/// The service catalogue and resolution engine.
///
/// One registry per process: create it at startup and hand clones to
/// everything that registers or resolves. Clones share the same catalogue.
///
/// # Example
/// ```
/// use strata::{Arguments, Category, Injectable, Registry, Result};
///
/// struct Clock;
///
/// impl Injectable for Clock {
///     fn construct(_args: Arguments) -> Result<Self> {
///         Ok(Clock)
///     }
/// }
///
/// let registry = Registry::new();
/// registry.service::<Clock>().register().unwrap();
///
/// let container = registry.container("req-1");
/// let a = container.get::<Clock>(Category::Service).unwrap();
/// let b = container.get::<Clock>(Category::Service).unwrap();
/// assert!(std::sync::Arc::ptr_eq(&a, &b));
/// ```
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

impl Registry {
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        let teardown = TeardownChannel::new(config.teardown_channel_capacity);
        let registry = Self {
            inner: Arc::new(RegistryInner {
                config,
                records: DashMap::new(),
                handlers: DashMap::new(),
                declared: DashMap::new(),
                global: Arc::new(ScopeState::new(GLOBAL_CONTAINER_ID.into())),
                containers: DashMap::new(),
                names: DashMap::new(),
                next_container: AtomicU64::new(1),
                registrators: RegistratorQueue::default(),
                teardown,
                workers: Workers::default(),
            }),
        };
        registry.register_defaults();
        registry
    }

    fn register_defaults(&self) {
        self.register(
            Category::System,
            ServiceRecord::new(Category::System, ServiceId::of::<RequestContext>()).with_factory(
                Factory::function(|container, _| Ok(RequestContext::new(container.id()))),
            ),
        );
        self.register(
            Category::Global,
            ServiceRecord::new(Category::Global, ServiceId::of::<ConfigService>())
                .with_factory(Factory::function(|_, _| Ok(ConfigService::new()))),
        );
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    // --- catalogue ---

    /// Add a record to the catalogue, replacing any record with the same
    /// category and id. Instances built from a replaced record are destroyed.
    ///
    /// Accepts an id bound to a value, a constructible type, or a full record.
    /// `global` records are always singletons. Duplicate policy belongs to the
    /// caller; see [`ComponentBuilder::on_duplicate`](crate::ComponentBuilder::on_duplicate).
    pub fn register(&self, category: Category, registration: impl Into<Registration>) -> ServiceId {
        let record = registration.into().into_record(category);
        let id = record.id().clone();
        tracing::debug!(
            category = %category,
            scope = %record.scope(),
            "Registered {} ({})",
            id,
            record.kind()
        );
        let key = RecordKey::new(category, id.clone());
        if let Some(previous) = self.inner.records.insert(key.clone(), Arc::new(record)) {
            tracing::debug!("Replaced record {} in {}", id, category);
            self.drop_instances(&key, &previous);
        }
        id
    }

    pub fn lookup(&self, category: Category, id: &ServiceId) -> Option<Arc<ServiceRecord>> {
        self.inner
            .records
            .get(&RecordKey::new(category, id.clone()))
            .map(|record| Arc::clone(record.value()))
    }

    pub fn has(&self, category: Category, id: &ServiceId) -> bool {
        self.inner
            .records
            .contains_key(&RecordKey::new(category, id.clone()))
    }

    pub fn len(&self) -> usize {
        self.inner.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.records.is_empty()
    }

    /// Remove every record with this id, in any category.
    ///
    /// Built instances of the removed records are destroyed, in every
    /// container; destroy failures are reported, never raised. Returns the
    /// number of records removed.
    pub fn remove(&self, id: impl Into<ServiceId>) -> usize {
        let id = id.into();
        let keys: Vec<RecordKey> = self
            .inner
            .records
            .iter()
            .filter(|entry| entry.key().id == id)
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for key in keys {
            if let Some((key, record)) = self.inner.records.remove(&key) {
                self.drop_instances(&key, &record);
                removed += 1;
            }
        }

        tracing::debug!("Removed {} record(s) for {}", removed, id);
        removed
    }

    pub fn remove_all<I, T>(&self, ids: I) -> usize
    where
        I: IntoIterator<Item = T>,
        T: Into<ServiceId>,
    {
        ids.into_iter().map(|id| self.remove(id)).sum()
    }

    pub(crate) fn remove_record(&self, category: Category, id: &ServiceId) {
        if let Some((key, record)) = self
            .inner
            .records
            .remove(&RecordKey::new(category, id.clone()))
        {
            self.drop_instances(&key, &record);
        }
    }

    fn drop_instances(&self, key: &RecordKey, record: &ServiceRecord) {
        let mut states = vec![Arc::clone(&self.inner.global)];
        states.extend(
            self.inner
                .containers
                .iter()
                .map(|entry| Arc::clone(entry.value())),
        );

        for state in states {
            if let Some((_, instance)) = state.instances.remove(key) {
                self.inner.teardown.destroy(&state.name, record, &instance);
            }
        }
    }

    // --- handlers ---

    /// Install an injection handler.
    ///
    /// # Errors
    /// Returns [`StrataError::DuplicateHandler`] if the site already has one,
    /// unless duplicate rejection is switched off, in which case the last
    /// handler wins.
    pub fn register_handler(&self, handler: InjectionHandler) -> Result<()> {
        let key = HandlerKey {
            owner: handler.owner(),
            site: handler.site().clone(),
        };

        match self.inner.handlers.entry(key) {
            Entry::Occupied(mut entry) => {
                if self.inner.config.reject_duplicate_handlers {
                    return Err(StrataError::DuplicateHandler {
                        owner: handler.owner_name().to_string(),
                        site: handler.site().to_string(),
                    });
                }
                tracing::warn!(
                    "Replacing handler for {} -> {}",
                    handler.owner_name(),
                    handler.site()
                );
                entry.insert(Arc::new(handler));
            }
            Entry::Vacant(entry) => {
                tracing::debug!(
                    guard = handler.guard().name(),
                    "Registered handler {} -> {}",
                    handler.owner_name(),
                    handler.site()
                );
                entry.insert(Arc::new(handler));
            }
        }
        Ok(())
    }

    /// Install a component's declared handlers, once per type.
    pub(crate) fn install_handlers(
        &self,
        owner: TypeId,
        handlers: Vec<InjectionHandler>,
    ) -> Result<()> {
        if self.inner.declared.contains_key(&owner) {
            return Ok(());
        }

        for handler in &handlers {
            let key = HandlerKey {
                owner: handler.owner(),
                site: handler.site().clone(),
            };
            if self.inner.config.reject_duplicate_handlers
                && self.inner.handlers.contains_key(&key)
            {
                return Err(StrataError::DuplicateHandler {
                    owner: handler.owner_name().to_string(),
                    site: handler.site().to_string(),
                });
            }
        }

        for handler in handlers {
            self.register_handler(handler)?;
        }
        self.inner.declared.insert(owner, ());
        Ok(())
    }

    pub fn handler_count(&self) -> usize {
        self.inner.handlers.len()
    }

    fn parameter_handler(&self, owner: TypeId, index: usize) -> Option<Arc<InjectionHandler>> {
        self.inner
            .handlers
            .get(&HandlerKey {
                owner,
                site: Site::Parameter(index),
            })
            .map(|handler| Arc::clone(handler.value()))
    }

    fn property_handlers(&self, constructor: &Constructor) -> Vec<Arc<InjectionHandler>> {
        let mut handlers: Vec<Arc<InjectionHandler>> = self
            .inner
            .handlers
            .iter()
            .filter(|entry| {
                matches!(entry.key().site, Site::Property(_))
                    && constructor.inherits(entry.key().owner)
            })
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        handlers.sort_by(|a, b| a.site().to_string().cmp(&b.site().to_string()));
        handlers
    }

    // --- resolution ---

    /// Resolve `(category, id)` on behalf of `container`.
    ///
    /// Singletons are cached in the global container and built against it;
    /// `container`-scoped instances are cached in the requesting container;
    /// transient ones are rebuilt every time. A value seeded into the container
    /// with [`ContainerHandle::set`] wins over building, whatever the scope,
    /// and is found even without a record.
    ///
    /// # Errors
    /// [`StrataError::NotFound`] when nothing is registered,
    /// [`StrataError::Construction`] when the record cannot be built or its
    /// dependencies form a cycle, or any error raised while resolving its
    /// dependencies.
    pub fn resolve(
        &self,
        container: &ContainerHandle,
        category: Category,
        id: &ServiceId,
    ) -> Result<Instance> {
        let key = RecordKey::new(category, id.clone());
        let state = self.scope_state(container)?;

        let Some(record) = self.lookup(category, id) else {
            return state
                .cached(&key)
                .ok_or_else(|| StrataError::not_found(category, id));
        };

        if let Some(value) = record.value() {
            return Ok(Arc::clone(value));
        }

        if let Some(instance) = state.cached(&key) {
            return Ok(instance);
        }

        let (memo, builder) = match record.scope() {
            Scope::Singleton => {
                if let Some(instance) = self.inner.global.cached(&key) {
                    return Ok(instance);
                }
                (Some(Arc::clone(&self.inner.global)), self.global())
            }
            Scope::Container => (Some(state), container.clone()),
            Scope::Transient => (None, container.clone()),
        };

        let instance = {
            let _frame = BuildFrame::enter(&key)?;
            self.build(&builder, &record)?
        };

        // Concurrent first resolutions may both build; the last write wins.
        if let Some(memo) = memo {
            memo.instances.insert(key, Arc::clone(&instance));
        }
        Ok(instance)
    }

    /// Resolve and downcast in one step.
    pub fn resolve_as<T: Send + Sync + 'static>(
        &self,
        container: &ContainerHandle,
        category: Category,
        id: &ServiceId,
    ) -> Result<Arc<T>> {
        self.resolve(container, category, id)
            .and_then(crate::di::downcast::<T>)
    }

    fn build(&self, container: &ContainerHandle, record: &ServiceRecord) -> Result<Instance> {
        let instance = match (record.factory(), record.constructor()) {
            (Some(Factory::Function(factory)), _) => factory(container, record.id())?,
            (
                Some(Factory::Method {
                    helper,
                    method,
                    bare,
                    call,
                }),
                _,
            ) => {
                let helper_instance = if self.has(record.category(), helper) {
                    self.resolve(container, record.category(), helper)?
                } else {
                    tracing::debug!("Building unregistered helper {} bare", helper);
                    bare()
                };
                tracing::trace!("Calling {}::{} for {}", helper, method, record.id());
                call(&helper_instance, container, record.id())?
            }
            (None, Some(constructor)) => {
                let args = self.arguments(container, record, constructor)?;
                constructor.build(args)?
            }
            (None, None) => {
                return Err(StrataError::construction(
                    record.id(),
                    "no factory or constructible type",
                ));
            }
        };

        match record.constructor() {
            Some(constructor) if !constructor.accepts(&instance) => {
                Err(StrataError::construction(
                    record.id(),
                    format!("factory did not return a {}", constructor.type_name()),
                ))
            }
            Some(constructor) => self.apply_properties(container, record, constructor, instance),
            None => Ok(instance),
        }
    }

    fn arguments(
        &self,
        container: &ContainerHandle,
        record: &ServiceRecord,
        constructor: &Constructor,
    ) -> Result<Arguments> {
        let requester = record.id().to_string();
        let mut values = Vec::with_capacity(constructor.parameters().len());

        for (index, parameter) in constructor.parameters().iter().enumerate() {
            let value = if let Some(handler) = self.parameter_handler(constructor.type_id(), index)
            {
                Some(handler.resolve(container, &requester, record.category())?)
            } else if let Some(target) = parameter.target() {
                if parameter.is_optional() && !self.has(record.category(), target) {
                    None
                } else {
                    Some(self.resolve(container, record.category(), target)?)
                }
            } else {
                None
            };
            values.push(value);
        }

        Ok(Arguments::new(
            constructor.type_name(),
            values,
            container.clone(),
        ))
    }

    fn apply_properties(
        &self,
        container: &ContainerHandle,
        record: &ServiceRecord,
        constructor: &Constructor,
        mut instance: Instance,
    ) -> Result<Instance> {
        let handlers = self.property_handlers(constructor);
        if handlers.is_empty() {
            return Ok(instance);
        }

        let requester = record.id().to_string();
        for handler in handlers {
            let Site::Property(name) = handler.site() else {
                continue;
            };
            let value = handler.resolve(container, &requester, record.category())?;
            let target = Arc::get_mut(&mut instance).ok_or_else(|| {
                StrataError::construction(
                    record.id(),
                    format!("cannot inject '{}' into a shared instance", name),
                )
            })?;
            constructor.set_property(target, name, value)?;
        }
        Ok(instance)
    }

    // --- containers ---

    /// The process-lifetime container.
    pub fn global(&self) -> ContainerHandle {
        ContainerHandle::new(self.clone(), Slot::Global)
    }

    /// Fetch the container named `id`, creating it on first use.
    pub fn container(&self, id: &str) -> ContainerHandle {
        let name: Arc<str> = Arc::from(id);
        let key = *self
            .inner
            .names
            .entry(Arc::clone(&name))
            .or_insert_with(|| {
                let key = ContainerKey(self.inner.next_container.fetch_add(1, Ordering::Relaxed));
                self.inner
                    .containers
                    .insert(key, Arc::new(ScopeState::new(Arc::clone(&name))));
                tracing::debug!("Created container {}", name);
                key
            });

        ContainerHandle::new(self.clone(), Slot::Scoped { key, name })
    }

    /// Create a container named `"<prefix>.<uuid>"`.
    pub fn create_container(&self, prefix: &str) -> ContainerHandle {
        self.container(&format!("{}.{}", prefix, Uuid::new_v4()))
    }

    pub fn has_container(&self, id: &str) -> bool {
        self.inner.names.contains_key(id)
    }

    pub(crate) fn has_container_key(&self, key: ContainerKey) -> bool {
        self.inner.containers.contains_key(&key)
    }

    pub fn container_count(&self) -> usize {
        self.inner.containers.len()
    }

    /// Drop a container and destroy everything it cached.
    ///
    /// Destroy failures are reported on the teardown channel and never abort
    /// the reset. Returns `false` if no such container exists.
    pub fn reset(&self, id: &str) -> bool {
        let Some((_, key)) = self.inner.names.remove(id) else {
            return false;
        };
        let Some((_, state)) = self.inner.containers.remove(&key) else {
            return false;
        };

        let cached: Vec<(RecordKey, Instance)> = state
            .instances
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();
        state.instances.clear();

        for (key, instance) in &cached {
            if let Some(record) = self.lookup(key.category, &key.id) {
                self.inner.teardown.destroy(&state.name, &record, instance);
            }
        }

        tracing::debug!(
            "Reset container {} ({} instance(s), alive {}ms)",
            id,
            cached.len(),
            (chrono::Utc::now() - state.created_at).num_milliseconds()
        );
        true
    }

    pub(crate) fn scope_state(&self, container: &ContainerHandle) -> Result<Arc<ScopeState>> {
        match container.slot() {
            Slot::Global => Ok(Arc::clone(&self.inner.global)),
            Slot::Scoped { key, name } => self
                .inner
                .containers
                .get(key)
                .map(|state| Arc::clone(state.value()))
                .ok_or_else(|| StrataError::ContainerReleased {
                    id: name.to_string(),
                }),
        }
    }

    // --- lifecycle plumbing ---

    pub(crate) fn registrators(&self) -> &RegistratorQueue {
        &self.inner.registrators
    }

    pub fn workers(&self) -> &Workers {
        &self.inner.workers
    }

    /// Receive every destroy failure from now on.
    pub fn subscribe_teardown(&self) -> broadcast::Receiver<TeardownFailure> {
        self.inner.teardown.subscribe()
    }

    /// Number of destroy failures swallowed so far.
    pub fn teardown_failures(&self) -> u64 {
        self.inner.teardown.failures()
    }

    // --- introspection ---

    pub fn describe(&self) -> RegistrySnapshot {
        let mut records: Vec<RecordInfo> = self
            .inner
            .records
            .iter()
            .map(|entry| RecordInfo {
                category: entry.category(),
                id: entry.id().to_string(),
                scope: entry.scope(),
                kind: entry.kind(),
            })
            .collect();
        records.sort_by(|a, b| (a.category.as_ref(), &a.id).cmp(&(b.category.as_ref(), &b.id)));

        let mut handlers: Vec<HandlerInfo> = self
            .inner
            .handlers
            .iter()
            .map(|entry| HandlerInfo {
                owner: entry.owner_name().to_string(),
                site: entry.site().to_string(),
                guard: entry.guard().name(),
                target: entry.target_label(),
            })
            .collect();
        handlers.sort_by(|a, b| (&a.owner, &a.site).cmp(&(&b.owner, &b.site)));

        RegistrySnapshot {
            records,
            handlers,
            containers: self.container_count(),
        }
    }

    pub fn describe_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.describe())
            .map_err(|e| StrataError::Internal(format!("Failed to serialize registry: {}", e)))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordInfo {
    pub category: Category,
    pub id: String,
    pub scope: Scope,
    pub kind: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct HandlerInfo {
    pub owner: String,
    pub site: String,
    pub guard: &'static str,
    pub target: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistrySnapshot {
    pub records: Vec<RecordInfo>,
    pub handlers: Vec<HandlerInfo>,
    pub containers: usize,
}
