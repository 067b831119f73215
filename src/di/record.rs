use crate::di::{
    Arguments, Category, ContainerHandle, Injectable, Instance, Parameter, Scope, ServiceId,
    downcast,
};
use crate::error::{Result, StrataError};
use std::any::{Any, TypeId};
use std::sync::Arc;

pub type FactoryFn = Arc<dyn Fn(&ContainerHandle, &ServiceId) -> Result<Instance> + Send + Sync>;
pub type MethodFn =
    Arc<dyn Fn(&Instance, &ContainerHandle, &ServiceId) -> Result<Instance> + Send + Sync>;
pub type DestroyFn = Arc<dyn Fn(&Instance) -> anyhow::Result<()> + Send + Sync>;

type BuildFn = fn(Arguments) -> Result<Instance>;
type PropertyFn = fn(&mut (dyn Any + Send + Sync), &str, Instance) -> Result<()>;
type AcceptsFn = fn(&Instance) -> bool;

/// Custom construction for a record.
#[derive(Clone)]
pub enum Factory {
    /// Called with the requesting container and the record id.
    Function(FactoryFn),
    /// Resolve `helper` from the record's category (or build it bare when it is
    /// not registered), then call `method` on it.
    Method {
        helper: ServiceId,
        method: &'static str,
        bare: fn() -> Instance,
        call: MethodFn,
    },
}

impl Factory {
    pub fn function<T, F>(factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&ContainerHandle, &ServiceId) -> Result<T> + Send + Sync + 'static,
    {
        Factory::Function(Arc::new(move |container: &ContainerHandle, id: &ServiceId| {
            Ok(Arc::new(factory(container, id)?) as Instance)
        }))
    }

    pub fn method<H, T, F>(method: &'static str, call: F) -> Self
    where
        H: Default + Send + Sync + 'static,
        T: Send + Sync + 'static,
        F: Fn(&H, &ContainerHandle, &ServiceId) -> Result<T> + Send + Sync + 'static,
    {
        Factory::Method {
            helper: ServiceId::of::<H>(),
            method,
            bare: bare_instance::<H>,
            call: Arc::new(move |helper: &Instance, container: &ContainerHandle, id: &ServiceId| {
                let helper = downcast::<H>(helper.clone())?;
                Ok(Arc::new(call(&helper, container, id)?) as Instance)
            }),
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Factory::Function(_) => "factory",
            Factory::Method { .. } => "method",
        }
    }
}

fn bare_instance<H: Default + Send + Sync + 'static>() -> Instance {
    Arc::new(H::default())
}

/// Type-erased constructor of an [`Injectable`] component.
#[derive(Clone)]
pub struct Constructor {
    type_id: TypeId,
    type_name: &'static str,
    parameters: Vec<Parameter>,
    bases: Vec<TypeId>,
    build: BuildFn,
    set_property: PropertyFn,
    accepts: AcceptsFn,
}

impl Constructor {
    pub fn of<T: Injectable>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            parameters: T::parameters(),
            bases: T::bases().iter().filter_map(ServiceId::type_id).collect(),
            build: build::<T>,
            set_property: set_property::<T>,
            accepts: accepts::<T>,
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Whether property handlers declared on `owner` apply to this type.
    pub(crate) fn inherits(&self, owner: TypeId) -> bool {
        self.type_id == owner || self.bases.contains(&owner)
    }

    pub(crate) fn build(&self, args: Arguments) -> Result<Instance> {
        (self.build)(args)
    }

    /// Whether `instance` is of the constructed type.
    pub(crate) fn accepts(&self, instance: &Instance) -> bool {
        (self.accepts)(instance)
    }

    pub(crate) fn set_property(
        &self,
        target: &mut (dyn Any + Send + Sync),
        name: &str,
        value: Instance,
    ) -> Result<()> {
        (self.set_property)(target, name, value)
    }
}

fn build<T: Injectable>(args: Arguments) -> Result<Instance> {
    Ok(Arc::new(T::construct(args)?) as Instance)
}

fn accepts<T: Injectable>(instance: &Instance) -> bool {
    instance.is::<T>()
}

fn set_property<T: Injectable>(
    target: &mut (dyn Any + Send + Sync),
    name: &str,
    value: Instance,
) -> Result<()> {
    let target = target
        .downcast_mut::<T>()
        .ok_or_else(|| StrataError::DowncastFailed {
            type_name: std::any::type_name::<T>().to_string(),
        })?;
    target.set_property(name, value)
}

fn destroy<T: Injectable>(instance: &Instance) -> anyhow::Result<()> {
    match (**instance).downcast_ref::<T>() {
        Some(service) => service.destroy(),
        None => Ok(()),
    }
}

/// Catalogue entry: how to build and cache one identifier within one category.
#[derive(Clone)]
pub struct ServiceRecord {
    id: ServiceId,
    category: Category,
    scope: Scope,
    constructor: Option<Constructor>,
    factory: Option<Factory>,
    value: Option<Instance>,
    destroy: Option<DestroyFn>,
}

impl ServiceRecord {
    pub fn new(category: Category, id: impl Into<ServiceId>) -> Self {
        Self {
            id: id.into(),
            category,
            scope: category.default_scope(),
            constructor: None,
            factory: None,
            value: None,
            destroy: None,
        }
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Also installs `T::destroy` as the teardown hook.
    pub fn with_constructor<T: Injectable>(mut self) -> Self {
        self.constructor = Some(Constructor::of::<T>());
        self.destroy = Some(Arc::new(destroy::<T>));
        self
    }

    pub fn with_factory(mut self, factory: Factory) -> Self {
        self.factory = Some(factory);
        self
    }

    /// A pre-built value, returned as-is by every resolution.
    pub fn with_value(mut self, value: Instance) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_destroy<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Instance) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.destroy = Some(Arc::new(hook));
        self
    }

    pub fn id(&self) -> &ServiceId {
        &self.id
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn constructor(&self) -> Option<&Constructor> {
        self.constructor.as_ref()
    }

    pub fn factory(&self) -> Option<&Factory> {
        self.factory.as_ref()
    }

    pub fn value(&self) -> Option<&Instance> {
        self.value.as_ref()
    }

    pub(crate) fn destroy_hook(&self) -> Option<&DestroyFn> {
        self.destroy.as_ref()
    }

    pub(crate) fn set_category(&mut self, category: Category) {
        self.category = category;
    }

    pub(crate) fn set_scope(&mut self, scope: Scope) {
        self.scope = scope;
    }

    pub(crate) fn kind(&self) -> &'static str {
        match (&self.value, &self.factory, &self.constructor) {
            (Some(_), _, _) => "value",
            (None, Some(factory), _) => factory.kind(),
            (None, None, Some(_)) => "constructor",
            (None, None, None) => "empty",
        }
    }
}

/// The accepted shapes of [`Registry::register`](crate::Registry::register).
pub enum Registration {
    /// An identifier bound to a pre-built value.
    Value { id: ServiceId, value: Instance },
    /// A constructible type registered under its own type id.
    Type(Constructor, DestroyFn),
    /// A full record.
    Record(ServiceRecord),
}

impl Registration {
    pub fn value<T: Send + Sync + 'static>(id: impl Into<ServiceId>, value: T) -> Self {
        Registration::Value {
            id: id.into(),
            value: Arc::new(value),
        }
    }

    pub fn instance(id: impl Into<ServiceId>, value: Instance) -> Self {
        Registration::Value {
            id: id.into(),
            value,
        }
    }

    pub fn constructible<T: Injectable>() -> Self {
        Registration::Type(Constructor::of::<T>(), Arc::new(destroy::<T>))
    }

    pub(crate) fn into_record(self, category: Category) -> ServiceRecord {
        let mut record = match self {
            Registration::Value { id, value } => {
                ServiceRecord::new(category, id).with_value(value)
            }
            Registration::Type(constructor, destroy) => {
                let id = ServiceId::Type {
                    id: constructor.type_id(),
                    name: constructor.type_name(),
                };
                ServiceRecord {
                    constructor: Some(constructor),
                    destroy: Some(destroy),
                    ..ServiceRecord::new(category, id)
                }
            }
            Registration::Record(record) => record,
        };
        record.set_category(category);
        if category == Category::Global {
            record.set_scope(Scope::Singleton);
        }
        record
    }
}

impl From<ServiceRecord> for Registration {
    fn from(record: ServiceRecord) -> Self {
        Registration::Record(record)
    }
}
