use crate::di::ContainerHandle;
use crate::error::StrataError;
use axum::{extract::FromRequestParts, http::request::Parts};
use std::sync::Arc;

/// The request container installed by [`ContainerLayer`](super::ContainerLayer).
impl<S> FromRequestParts<S> for ContainerHandle
where
    S: Send + Sync,
{
    type Rejection = StrataError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<ContainerHandle>()
            .cloned()
            .ok_or_else(|| {
                StrataError::Internal("no request container; is ContainerLayer installed?".into())
            })
    }
}

/// Axum extractor resolving an `action` from the request container
///
/// # Example
/// ```rust,ignore
/// async fn create_user(
///     Action(create): Action<CreateUser>,
///     Json(body): Json<NewUser>,
/// ) -> Result<Json<User>, ApiError> {
///     Ok(Json(create.run(body).await?))
/// }
/// ```
pub struct Action<T>(pub Arc<T>);

impl<S, T> FromRequestParts<S> for Action<T>
where
    S: Send + Sync,
    T: Send + Sync + 'static,
{
    type Rejection = StrataError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let container = ContainerHandle::from_request_parts(parts, state).await?;
        container.action::<T>().map(Action)
    }
}

impl<T> std::ops::Deref for Action<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> Clone for Action<T> {
    fn clone(&self) -> Self {
        Action(Arc::clone(&self.0))
    }
}

/// Axum extractor resolving a `validation` from the request container
pub struct Validation<T>(pub Arc<T>);

impl<S, T> FromRequestParts<S> for Validation<T>
where
    S: Send + Sync,
    T: Send + Sync + 'static,
{
    type Rejection = StrataError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let container = ContainerHandle::from_request_parts(parts, state).await?;
        container.validation::<T>().map(Validation)
    }
}

impl<T> std::ops::Deref for Validation<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> Clone for Validation<T> {
    fn clone(&self) -> Self {
        Validation(Arc::clone(&self.0))
    }
}
