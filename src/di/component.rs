//! Category registration
//!
//! Every component enters the catalogue through a [`ComponentBuilder`], which
//! validates the component's declared injection sites before anything is
//! registered. A site whose target cannot be determined, or whose guard forbids
//! the component's category, fails registration.

use crate::di::{
    Category, Factory, Injectable, InjectionHandler, Registry, Scope, ServiceId, ServiceRecord,
    Site,
};
use crate::error::{Result, StrataError};
use std::any::TypeId;
use std::marker::PhantomData;

/// What to do when `(category, id)` is already registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Duplicate {
    #[default]
    Reject,
    /// Remove the existing record, destroying its built instances.
    Replace,
    /// Keep the existing record.
    Skip,
}

pub struct ComponentBuilder<'r, T> {
    registry: &'r Registry,
    category: Category,
    id: ServiceId,
    scope: Option<Scope>,
    factory: Option<Factory>,
    duplicate: Duplicate,
    _marker: PhantomData<fn() -> T>,
}

impl<'r, T: Injectable> ComponentBuilder<'r, T> {
    fn new(registry: &'r Registry, category: Category) -> Self {
        Self {
            registry,
            category,
            id: ServiceId::of::<T>(),
            scope: None,
            factory: None,
            duplicate: Duplicate::default(),
            _marker: PhantomData,
        }
    }

    /// Register under a token or name instead of the type itself.
    pub fn id(mut self, id: impl Into<ServiceId>) -> Self {
        self.id = id.into();
        self
    }

    /// Ignored for `global` components, which are always singletons.
    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Build the component with `factory` instead of [`Injectable::construct`].
    ///
    /// The factory must produce a `T`: the component's destroy hook and
    /// property injection still apply to it. Resolving a record whose factory
    /// returns another type fails with [`StrataError::Construction`].
    pub fn factory(mut self, factory: Factory) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn on_duplicate(mut self, duplicate: Duplicate) -> Self {
        self.duplicate = duplicate;
        self
    }

    /// Validate the component's injection sites and add it to the catalogue.
    ///
    /// # Errors
    /// - [`StrataError::InjectionConfig`] for a site with no usable target
    /// - [`StrataError::LayeringViolation`] for a site the category may not hold
    /// - [`StrataError::DuplicateRegistration`] when the id is taken and the
    ///   policy is [`Duplicate::Reject`]
    /// - [`StrataError::DuplicateHandler`] when a site already has a handler
    pub fn register(self) -> Result<ServiceId> {
        let handlers = self.declare_handlers()?;

        if self.registry.has(self.category, &self.id) {
            match self.duplicate {
                Duplicate::Reject => {
                    return Err(StrataError::DuplicateRegistration {
                        kind: self.category.to_string(),
                        id: self.id.to_string(),
                    });
                }
                Duplicate::Skip => {
                    tracing::debug!("Keeping existing {} {}", self.category, self.id);
                    return Ok(self.id);
                }
                Duplicate::Replace => self.registry.remove_record(self.category, &self.id),
            }
        }

        self.registry.install_handlers(TypeId::of::<T>(), handlers)?;

        let mut record = ServiceRecord::new(self.category, self.id.clone()).with_constructor::<T>();
        if let Some(scope) = self.scope {
            record = record.with_scope(scope);
        }
        if let Some(factory) = self.factory {
            record = record.with_factory(factory);
        }
        let id = self.registry.register(self.category, record);

        if let Some(registrator) = T::registrator() {
            self.registry.add_registrator(id.short_name(), registrator);
        }
        Ok(id)
    }

    fn declare_handlers(&self) -> Result<Vec<InjectionHandler>> {
        let owner_name = std::any::type_name::<T>();
        let parameters = T::parameters();
        let requester = self.id.to_string();

        T::injections()
            .into_iter()
            .map(|injection| {
                let declared = match injection.site() {
                    Site::Parameter(index) => match parameters.get(*index) {
                        Some(parameter) => parameter.target().cloned(),
                        None => {
                            return Err(StrataError::injection_config(
                                owner_name,
                                injection.site(),
                                format!("constructor takes {} parameter(s)", parameters.len()),
                            ));
                        }
                    },
                    Site::Property(_) => injection.declared().cloned(),
                };

                let handler =
                    InjectionHandler::declare(TypeId::of::<T>(), owner_name, injection, declared)?;
                handler.check_requester(&requester, self.category)?;
                Ok(handler)
            })
            .collect()
    }
}

impl Registry {
    /// Start registering `T` under `category`.
    pub fn component<T: Injectable>(&self, category: Category) -> ComponentBuilder<'_, T> {
        ComponentBuilder::new(self, category)
    }
}

macro_rules! category_shortcuts {
    ($($(#[$meta:meta])* $name:ident => $category:ident),* $(,)?) => {
        impl Registry {
            $(
                $(#[$meta])*
                pub fn $name<T: Injectable>(&self) -> ComponentBuilder<'_, T> {
                    self.component::<T>(Category::$category)
                }
            )*
        }
    };
}

category_shortcuts! {
    /// A process-wide singleton.
    global_service => Global,
    system => System,
    service => Service,
    repository => Repository,
    action => Action,
    validation => Validation,
    socket => Socket,
    cache => Cache,
    pubsub => Pubsub,
    warehouse => Warehouse,
}
