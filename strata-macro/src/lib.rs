use proc_macro::TokenStream;

mod injectable;

/// Derive macro implementing `strata::Injectable` for a struct with named fields
///
/// Every field is filled at construction:
///
/// - `Arc<T>`: a constructor parameter resolved from the component's own
///   category, or through a guard with `#[inject(guard = "...")]`
/// - `Option<Arc<T>>`: an optional parameter, `None` when `T` is not registered
/// - `ContainerHandle` (or `#[inject(container)]`): the building container
/// - `#[inject(default)]`: `Default::default()`, never resolved
/// - `#[inject(property, guard = "...")]` on `Option<Arc<T>>`: a guarded
///   property filled after construction
///
/// `#[inject(id = "...")]` resolves a name instead of the field's type.
///
/// Struct-level options: `#[injectable(destroy = "method")]` names a
/// `fn(&self) -> anyhow::Result<()>` teardown hook,
/// `#[injectable(registrator = "path")]` a `fn() -> Registrator`, and
/// `#[injectable(base = "Type")]` (repeatable) the base types whose property
/// injections also apply.
///
/// # Example
/// ```ignore
/// use strata::prelude::*;
///
/// #[derive(Injectable)]
/// pub struct UserRepository {
///     #[inject(guard = "USE_DB")]
///     db: Arc<Database>,
///     cache: Option<Arc<UserCache>>,
/// }
/// ```
#[proc_macro_derive(Injectable, attributes(injectable, inject))]
pub fn derive_injectable(input: TokenStream) -> TokenStream {
    injectable::derive_injectable(input)
}
