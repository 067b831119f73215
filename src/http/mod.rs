//! Request containers for axum
//!
//! [`ContainerLayer`] gives every request its own container, makes it the
//! ambient container while the handler runs, and resets it when the response
//! is produced. Handlers reach it through the extractors in this module.

mod extractor;
mod layer;

pub use extractor::{Action, Validation};
pub use layer::{ContainerLayer, ContainerMiddleware, REQUEST_ID_HEADER};
