//! Injection guards
//!
//! A guard marks one constructor parameter or property as "fill this from the
//! registry" and states which layers may do so. Every guard is the same
//! template specialised by data: the category its target is resolved from,
//! the requesting categories it admits, and optionally the type name the
//! target must carry. [`check_layering`] is the single place where the
//! layering rules are enforced.

use crate::di::identifier::short_type_name;
use crate::di::{Category, ContainerHandle, Instance, ServiceId};
use crate::error::{Result, StrataError};
use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

/// Requesting categories admitted by a guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requesters {
    Only(&'static [Category]),
    Except(&'static [Category]),
}

impl Requesters {
    pub fn permits(&self, category: Category) -> bool {
        match self {
            Requesters::Only(allowed) => allowed.contains(&category),
            Requesters::Except(denied) => !denied.contains(&category),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Guard {
    name: &'static str,
    target: Category,
    requesters: Requesters,
    expects: Option<&'static str>,
}

impl Guard {
    pub const fn new(name: &'static str, target: Category, requesters: Requesters) -> Self {
        Self {
            name,
            target,
            requesters,
            expects: None,
        }
    }

    /// Require the injected type to carry this short type name.
    pub const fn expecting(mut self, type_name: &'static str) -> Self {
        self.expects = Some(type_name);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Category the target is resolved from.
    pub fn target(&self) -> Category {
        self.target
    }

    pub fn requesters(&self) -> Requesters {
        self.requesters
    }

    pub fn expects(&self) -> Option<&'static str> {
        self.expects
    }
}

/// Database client handle; repositories only.
pub const USE_DB: Guard = Guard::new(
    "use_db",
    Category::System,
    Requesters::Only(&[Category::Repository]),
)
.expecting("Database");

/// Transaction/query helper over the database client.
pub const USE_DB_HELPER: Guard = Guard::new(
    "use_db_helper",
    Category::System,
    Requesters::Only(&[Category::Repository, Category::Action]),
)
.expecting("DatabaseHelper");

/// Raw cache client; cache services only.
pub const USE_CACHE_CLIENT: Guard = Guard::new(
    "use_cache_client",
    Category::System,
    Requesters::Only(&[Category::Cache]),
)
.expecting("CacheClient");

/// Request-context accessor; anything but process-wide singletons.
pub const USE_REQUEST: Guard = Guard::new(
    "use_request",
    Category::System,
    Requesters::Except(&[Category::Global]),
)
.expecting("RequestContext");

pub const USE_TELEGRAM: Guard = Guard::new(
    "use_telegram",
    Category::System,
    Requesters::Only(&[Category::Action]),
)
.expecting("TelegramClient");

pub const USE_ACTION: Guard = Guard::new(
    "use_action",
    Category::Action,
    Requesters::Only(&[Category::Action, Category::Validation]),
);

pub const USE_GLOBAL: Guard = Guard::new(
    "use_global",
    Category::Global,
    Requesters::Only(&[Category::Action]),
);

pub const USE_SOCKET: Guard = Guard::new(
    "use_socket",
    Category::Socket,
    Requesters::Only(&[Category::Action]),
);

pub const USE_PUBSUB: Guard = Guard::new(
    "use_pubsub",
    Category::Pubsub,
    Requesters::Only(&[Category::Action, Category::Service]),
);

pub const USE_CACHE: Guard = Guard::new(
    "use_cache",
    Category::Cache,
    Requesters::Only(&[Category::Action, Category::Service]),
);

pub const USE_SERVICE: Guard = Guard::new(
    "use_service",
    Category::Service,
    Requesters::Only(&[Category::Action, Category::Validation, Category::Service]),
);

pub const USE_REPOSITORY: Guard = Guard::new(
    "use_repository",
    Category::Repository,
    Requesters::Only(&[Category::Action, Category::Service]),
);

pub const USE_WAREHOUSE: Guard = Guard::new(
    "use_warehouse",
    Category::Warehouse,
    Requesters::Only(&[Category::Repository, Category::Action]),
);

pub const BUILTIN_GUARDS: &[Guard] = &[
    USE_DB,
    USE_DB_HELPER,
    USE_CACHE_CLIENT,
    USE_REQUEST,
    USE_TELEGRAM,
    USE_ACTION,
    USE_GLOBAL,
    USE_SOCKET,
    USE_PUBSUB,
    USE_CACHE,
    USE_SERVICE,
    USE_REPOSITORY,
    USE_WAREHOUSE,
];

/// Where an injected value lands.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Site {
    Parameter(usize),
    Property(&'static str),
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Site::Parameter(index) => write!(f, "#{}", index),
            Site::Property(name) => f.write_str(name),
        }
    }
}

type LazyFn = Arc<dyn Fn() -> Option<ServiceId> + Send + Sync>;

/// What an injection site resolves to.
#[derive(Clone)]
pub enum Target {
    /// Use the declared type of the parameter or property.
    Inferred,
    Id(ServiceId),
    /// Evaluated on every resolution; may name a type that is registered later.
    Lazy(LazyFn),
}

impl Target {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Target::Id(ServiceId::of::<T>())
    }

    pub fn id(id: impl Into<ServiceId>) -> Self {
        Target::Id(id.into())
    }

    pub fn lazy<F>(resolve: F) -> Self
    where
        F: Fn() -> Option<ServiceId> + Send + Sync + 'static,
    {
        Target::Lazy(Arc::new(resolve))
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Inferred => f.write_str("Inferred"),
            Target::Id(id) => write!(f, "Id({:?})", id),
            Target::Lazy(_) => f.write_str("Lazy"),
        }
    }
}

/// A guarded injection site as declared by a component.
#[derive(Debug, Clone)]
pub struct Injection {
    site: Site,
    guard: Guard,
    target: Target,
    declared: Option<ServiceId>,
}

impl Injection {
    /// Guard the constructor parameter at `index`.
    pub fn parameter(index: usize, guard: Guard) -> Self {
        Self {
            site: Site::Parameter(index),
            guard,
            target: Target::Inferred,
            declared: None,
        }
    }

    /// Guard a property whose declared type is `T`.
    pub fn property<T: ?Sized + 'static>(name: &'static str, guard: Guard) -> Self {
        Self {
            site: Site::Property(name),
            guard,
            target: Target::Inferred,
            declared: Some(ServiceId::of::<T>()),
        }
    }

    /// Guard a property with no declared type; needs an explicit target.
    pub fn untyped_property(name: &'static str, guard: Guard) -> Self {
        Self {
            site: Site::Property(name),
            guard,
            target: Target::Inferred,
            declared: None,
        }
    }

    pub fn target(mut self, target: Target) -> Self {
        self.target = target;
        self
    }

    pub fn site(&self) -> &Site {
        &self.site
    }

    pub fn guard(&self) -> &Guard {
        &self.guard
    }

    pub(crate) fn declared(&self) -> Option<&ServiceId> {
        self.declared.as_ref()
    }
}

/// A registered injection site, validated at declaration.
pub struct InjectionHandler {
    owner: TypeId,
    owner_name: &'static str,
    site: Site,
    guard: Guard,
    target: Target,
}

impl InjectionHandler {
    /// Validate an injection site and turn it into a handler.
    ///
    /// `declared` is the parameter's or property's declared type, used when the
    /// injection carries no explicit target.
    ///
    /// # Errors
    /// Returns [`StrataError::InjectionConfig`] when no usable target can be
    /// determined or the target does not match the guard's expected type.
    pub fn declare(
        owner: TypeId,
        owner_name: &'static str,
        injection: Injection,
        declared: Option<ServiceId>,
    ) -> Result<Self> {
        let Injection {
            site, guard, target, ..
        } = injection;

        let target = match target {
            Target::Inferred => match declared {
                Some(id) => Target::Id(id),
                None => {
                    return Err(StrataError::injection_config(
                        owner_name,
                        &site,
                        "cannot determine the type to inject",
                    ));
                }
            },
            other => other,
        };

        if let Target::Id(id) = &target {
            validate_target(owner_name, &site, &guard, id)?;
        }

        Ok(Self {
            owner,
            owner_name,
            site,
            guard,
            target,
        })
    }

    pub fn owner(&self) -> TypeId {
        self.owner
    }

    pub fn owner_name(&self) -> &'static str {
        self.owner_name
    }

    pub fn site(&self) -> &Site {
        &self.site
    }

    pub fn guard(&self) -> &Guard {
        &self.guard
    }

    pub(crate) fn target_label(&self) -> String {
        match &self.target {
            Target::Id(id) => id.short_name(),
            Target::Lazy(_) => "<lazy>".to_string(),
            Target::Inferred => "<inferred>".to_string(),
        }
    }

    /// Check that a service of `category` may hold this injection.
    pub fn check_requester(&self, requester: &str, category: Category) -> Result<()> {
        check_layering(&self.guard, requester, category, &self.site, &self.target_label())
    }

    /// Resolve the injected value on behalf of `requester`.
    pub fn resolve(
        &self,
        container: &ContainerHandle,
        requester: &str,
        category: Category,
    ) -> Result<Instance> {
        self.check_requester(requester, category)?;

        let target = match &self.target {
            Target::Id(id) => id.clone(),
            Target::Lazy(evaluate) => {
                let id = evaluate().ok_or_else(|| {
                    StrataError::injection_config(
                        self.owner_name,
                        &self.site,
                        "lazy target resolved to nothing",
                    )
                })?;
                validate_target(self.owner_name, &self.site, &self.guard, &id)?;
                id
            }
            Target::Inferred => {
                return Err(StrataError::injection_config(
                    self.owner_name,
                    &self.site,
                    "cannot determine the type to inject",
                ));
            }
        };

        container
            .registry()
            .resolve(container, self.guard.target(), &target)
    }
}

fn validate_target(owner: &str, site: &Site, guard: &Guard, id: &ServiceId) -> Result<()> {
    if let ServiceId::Name(name) = id {
        if name.is_empty() {
            return Err(StrataError::injection_config(
                owner,
                site,
                "empty service name",
            ));
        }
    }

    if let Some(expected) = guard.expects() {
        let matches = match id {
            ServiceId::Type { name, .. } => short_type_name(name) == expected,
            _ => false,
        };
        if !matches {
            return Err(StrataError::injection_config(
                owner,
                site,
                format!("{} can only inject {}, got {}", guard.name(), expected, id),
            ));
        }
    }

    Ok(())
}

/// The single layering rule: may `category` hold what `guard` injects?
pub fn check_layering(
    guard: &Guard,
    requester: &str,
    category: Category,
    site: &Site,
    target: &str,
) -> Result<()> {
    if guard.requesters().permits(category) {
        return Ok(());
    }

    Err(StrataError::LayeringViolation {
        requester: requester.to_string(),
        requester_category: category.to_string(),
        site: site.to_string(),
        target: target.to_string(),
        guard: guard.name().to_string(),
    })
}
