use thiserror::Error;

pub type Result<T> = std::result::Result<T, StrataError>;

#[derive(Debug, Error)]
pub enum StrataError {
    #[error("Service not found: {id} in category '{category}'")]
    NotFound { category: String, id: String },

    #[error("Failed to construct {id}: {reason}")]
    Construction { id: String, reason: String },

    /// An injection site whose target cannot be determined.
    #[error("Invalid injection site {owner} -> {site}: {reason}")]
    InjectionConfig {
        owner: String,
        site: String,
        reason: String,
    },

    #[error(
        "Layering violation: {requester} ({requester_category}) -> {site} -> {target} is not allowed here ({guard})"
    )]
    LayeringViolation {
        requester: String,
        requester_category: String,
        site: String,
        target: String,
        guard: String,
    },

    #[error("{kind} \"{id}\" is already registered")]
    DuplicateRegistration { kind: String, id: String },

    #[error("Injection site {owner} -> {site} already has a handler")]
    DuplicateHandler { owner: String, site: String },

    #[error("Failed to downcast type: {type_name}")]
    DowncastFailed { type_name: String },

    #[error("Container '{id}' has been released")]
    ContainerReleased { id: String },

    #[error("Registrator failed for {service}: {message}")]
    Registrator { service: String, message: String },

    #[error("Worker {name} failed: {message}")]
    WorkerFailed { name: String, message: String },

    #[error("Timeout during {phase}: {message}")]
    Timeout { phase: String, message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StrataError {
    pub fn not_found(category: impl ToString, id: impl ToString) -> Self {
        Self::NotFound {
            category: category.to_string(),
            id: id.to_string(),
        }
    }

    pub fn construction(id: impl ToString, reason: impl Into<String>) -> Self {
        Self::Construction {
            id: id.to_string(),
            reason: reason.into(),
        }
    }

    pub fn injection_config(
        owner: impl Into<String>,
        site: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        Self::InjectionConfig {
            owner: owner.into(),
            site: site.to_string(),
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_layering_violation(&self) -> bool {
        matches!(self, Self::LayeringViolation { .. })
    }
}

#[cfg(feature = "http")]
impl axum::response::IntoResponse for StrataError {
    fn into_response(self) -> axum::response::Response {
        // Every kind stems from broken wiring, never from the caller's input.
        let status = axum::http::StatusCode::INTERNAL_SERVER_ERROR;
        tracing::error!("Resolution failed while serving request: {}", self);
        (status, self.to_string()).into_response()
    }
}
