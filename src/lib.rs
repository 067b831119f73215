//! # Strata
//!
//! A layered service registry and dependency resolution engine for Rust
//! backends.
//!
//! Services are registered under an architectural category (`repository`,
//! `action`, `system`, ...) with a lifetime scope, and resolved through
//! containers tied to a request or a background invocation. Injection guards
//! enforce which layers may depend on which.
//!
//! ## Features
//!
//! - **Categories and scopes**: `singleton`, per-`container` and `transient` lifetimes
//! - **Guarded injection**: layering rules checked at registration and at resolution
//! - **Request containers**: one container per request through a tower layer
//! - **Observable teardown**: destroy failures never abort a reset, and are broadcast
//!
//! ## Quick Start
//!
//! ```rust
//! use strata::prelude::*;
//!
//! #[derive(Injectable)]
//! pub struct Database {}
//!
//! #[derive(Injectable)]
//! pub struct UserRepository {
//!     #[inject(guard = "USE_DB")]
//!     db: Arc<Database>,
//! }
//!
//! #[derive(Injectable)]
//! pub struct SignupAction {
//!     #[inject(guard = "USE_REPOSITORY")]
//!     users: Arc<UserRepository>,
//! }
//!
//! # fn main() -> strata::Result<()> {
//! let registry = Registry::new();
//! registry.system::<Database>().register()?;
//! registry.repository::<UserRepository>().register()?;
//! registry.action::<SignupAction>().register()?;
//!
//! let container = registry.container("req-1");
//! let action = container.action::<SignupAction>()?;
//! assert!(Arc::ptr_eq(&action.users, &container.get::<UserRepository>(Category::Repository)?));
//! registry.reset("req-1");
//! # Ok(())
//! # }
//! ```

extern crate self as strata;

pub mod config;
pub mod context;
pub mod di;
pub mod error;
#[cfg(feature = "http")]
pub mod http;
pub mod lifecycle;
pub mod request;
pub mod worker;

// Re-export core types
pub use config::{ConfigService, RegistryConfig};
pub use di::*;
pub use error::{Result, StrataError};
pub use lifecycle::{Registrator, RegistratorFuture, TeardownFailure, registrator};
pub use request::RequestContext;
pub use worker::{Worker, Workers};

// Re-export macros
pub use strata_macro::Injectable as DeriveInjectable;

// Re-export commonly used types from dependencies
pub use anyhow;
pub use async_trait::async_trait;

/// Prelude module for convenient imports
///
/// ```
/// use strata::prelude::*;
/// ```
pub mod prelude {
    pub use crate::DeriveInjectable as Injectable;
    pub use crate::config::{ConfigService, RegistryConfig};
    pub use crate::context::current;
    pub use crate::di::{
        Arguments, Category, ContainerGuard, ContainerHandle, Duplicate, Factory, Guard,
        Injectable, Injection, Instance, Parameter, Registration, Registry, Scope, ServiceId,
        ServiceRecord, Target, Token, USE_ACTION, USE_CACHE, USE_CACHE_CLIENT, USE_DB,
        USE_DB_HELPER, USE_GLOBAL, USE_PUBSUB, USE_REPOSITORY, USE_REQUEST, USE_SERVICE,
        USE_SOCKET, USE_TELEGRAM, USE_WAREHOUSE,
    };
    pub use crate::error::{Result, StrataError};
    #[cfg(feature = "http")]
    pub use crate::http::{Action, ContainerLayer, Validation};
    pub use crate::lifecycle::{Registrator, registrator};
    pub use crate::request::RequestContext;
    pub use crate::worker::Worker;
    pub use async_trait::async_trait;
    pub use std::sync::Arc;
}
