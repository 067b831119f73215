mod category;
mod component;
pub(crate) mod container;
mod guard;
pub(crate) mod identifier;
mod injectable;
mod record;
mod registry;

pub use category::{Category, Scope};
pub use component::{ComponentBuilder, Duplicate};
pub use container::{ContainerGuard, ContainerHandle};
pub use guard::{
    BUILTIN_GUARDS, Guard, Injection, InjectionHandler, Requesters, Site, Target, USE_ACTION,
    USE_CACHE, USE_CACHE_CLIENT, USE_DB, USE_DB_HELPER, USE_GLOBAL, USE_PUBSUB, USE_REPOSITORY,
    USE_REQUEST, USE_SERVICE, USE_SOCKET, USE_TELEGRAM, USE_WAREHOUSE, check_layering,
};
pub use identifier::{ServiceId, Token};
pub use injectable::{Arguments, Injectable, Instance, Parameter, downcast};
pub use record::{Constructor, DestroyFn, Factory, FactoryFn, MethodFn, Registration, ServiceRecord};
pub use registry::{HandlerInfo, RecordInfo, Registry, RegistrySnapshot};
