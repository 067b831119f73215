use crate::di::{ContainerHandle, Injection, ServiceId};
use crate::error::{Result, StrataError};
use crate::lifecycle::Registrator;
use std::any::Any;
use std::sync::Arc;

/// A built service, type-erased.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Trait for types that can be built by the registry
///
/// A component declares its dependencies as data: an ordered list of
/// constructor [`Parameter`]s and a list of guarded [`Injection`] sites. The
/// registry resolves them and hands the results to [`Injectable::construct`].
///
/// This trait is typically implemented via `#[derive(Injectable)]`.
///
/// # Example
/// ```
/// use strata::{Arguments, Injectable, Parameter, Result};
/// use std::sync::Arc;
///
/// pub struct Mailer;
///
/// impl Injectable for Mailer {
///     fn construct(_args: Arguments) -> Result<Self> {
///         Ok(Mailer)
///     }
/// }
///
/// pub struct SignupService {
///     mailer: Arc<Mailer>,
/// }
///
/// impl Injectable for SignupService {
///     fn parameters() -> Vec<Parameter> {
///         vec![Parameter::of::<Mailer>()]
///     }
///
///     fn construct(mut args: Arguments) -> Result<Self> {
///         Ok(Self { mailer: args.take(0)? })
///     }
/// }
/// ```
pub trait Injectable: Sized + Send + Sync + 'static {
    /// Constructor parameters in declaration order.
    fn parameters() -> Vec<Parameter> {
        Vec::new()
    }

    /// Guarded constructor parameters and properties.
    fn injections() -> Vec<Injection> {
        Vec::new()
    }

    /// Types whose property injections also apply to this one.
    fn bases() -> Vec<ServiceId> {
        Vec::new()
    }

    /// Build the instance from resolved arguments.
    ///
    /// # Errors
    /// Returns an error if a required argument is missing or of the wrong type.
    fn construct(args: Arguments) -> Result<Self>;

    /// Fill a property after construction.
    fn set_property(&mut self, name: &str, _value: Instance) -> Result<()> {
        Err(StrataError::construction(
            std::any::type_name::<Self>(),
            format!("no injectable property '{}'", name),
        ))
    }

    /// Called when a cached instance is dropped by a container reset or a removal.
    /// Failures are reported but never propagated.
    fn destroy(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Deferred asynchronous setup, run once at startup.
    fn registrator() -> Option<Registrator> {
        None
    }
}

/// One declared constructor parameter.
#[derive(Debug, Clone)]
pub struct Parameter {
    name: Option<&'static str>,
    target: Option<ServiceId>,
    optional: bool,
}

impl Parameter {
    /// A parameter resolved from the same category as the component.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            name: None,
            target: Some(ServiceId::of::<T>()),
            optional: false,
        }
    }

    /// Like [`Parameter::of`], but absent instead of failing when not registered.
    pub fn optional<T: ?Sized + 'static>() -> Self {
        Self {
            optional: true,
            ..Self::of::<T>()
        }
    }

    /// A parameter keyed by a token or name instead of a type.
    pub fn id(id: impl Into<ServiceId>) -> Self {
        Self {
            name: None,
            target: Some(id.into()),
            optional: false,
        }
    }

    /// A plain value the registry never resolves on its own.
    pub fn primitive() -> Self {
        Self {
            name: None,
            target: None,
            optional: true,
        }
    }

    pub fn named(mut self, name: &'static str) -> Self {
        self.name = Some(name);
        self
    }

    pub fn name(&self) -> Option<&'static str> {
        self.name
    }

    pub fn target(&self) -> Option<&ServiceId> {
        self.target.as_ref()
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }
}

/// Resolved constructor arguments, plus the container the instance is built in.
pub struct Arguments {
    owner: &'static str,
    values: Vec<Option<Instance>>,
    container: ContainerHandle,
}

impl Arguments {
    pub(crate) fn new(
        owner: &'static str,
        values: Vec<Option<Instance>>,
        container: ContainerHandle,
    ) -> Self {
        Self {
            owner,
            values,
            container,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The container that requested this instance.
    pub fn container(&self) -> &ContainerHandle {
        &self.container
    }

    /// Take a required argument.
    pub fn take<T: Send + Sync + 'static>(&mut self, index: usize) -> Result<Arc<T>> {
        self.take_optional(index)?.ok_or_else(|| {
            StrataError::construction(
                self.owner,
                format!("constructor parameter #{} was not resolved", index),
            )
        })
    }

    pub fn take_optional<T: Send + Sync + 'static>(
        &mut self,
        index: usize,
    ) -> Result<Option<Arc<T>>> {
        self.take_instance(index).map(downcast::<T>).transpose()
    }

    pub fn take_instance(&mut self, index: usize) -> Option<Instance> {
        self.values.get_mut(index).and_then(Option::take)
    }
}

/// Downcast a built instance to its concrete type.
pub fn downcast<T: Send + Sync + 'static>(instance: Instance) -> Result<Arc<T>> {
    instance
        .downcast::<T>()
        .map_err(|_| StrataError::DowncastFailed {
            type_name: std::any::type_name::<T>().to_string(),
        })
}
