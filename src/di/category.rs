use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// Architectural layer a service belongs to.
///
/// Fixed at registration. Injection guards compare the category of the
/// requesting service against their allow-list.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Process-wide singletons: logger, database pool, cache client.
    Global,
    /// Infrastructure reachable from the request layer.
    System,
    Service,
    /// Data-access boundary; the only layer allowed to hold database handles.
    Repository,
    /// Use-case orchestration invoked by routes.
    Action,
    Validation,
    Socket,
    Cache,
    Pubsub,
    Warehouse,
}

impl Category {
    pub fn default_scope(self) -> Scope {
        match self {
            Category::Global => Scope::Singleton,
            _ => Scope::Container,
        }
    }
}

/// Instance lifetime policy.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    AsRefStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// One instance per process, cached in the global container.
    Singleton,
    /// One instance per container.
    Container,
    /// A new instance on every resolution.
    Transient,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn test_only_global_defaults_to_singleton() {
        for category in Category::iter() {
            let expected = if category == Category::Global {
                Scope::Singleton
            } else {
                Scope::Container
            };
            assert_eq!(category.default_scope(), expected, "{}", category);
        }
    }

    #[test]
    fn test_category_names() {
        assert_eq!(Category::Repository.to_string(), "repository");
        assert_eq!(Category::from_str("pubsub").unwrap(), Category::Pubsub);
        assert_eq!(Scope::from_str("transient").unwrap(), Scope::Transient);
    }
}
