use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::sync::Arc;

/// Configuration service
///
/// Registered by default as a `global` singleton, so any component can
/// depend on it.
#[derive(Clone, Default, Debug)]
pub struct ConfigService {
    config: Arc<DashMap<String, String>>,
}

impl ConfigService {
    /// Load every process environment variable.
    pub fn new() -> Self {
        let service = Self::empty();
        for (key, value) in env::vars() {
            service.set(&key, &value);
        }
        service
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.config.get(key).map(|v| v.clone())
    }

    /// Parse a value, ignoring it when it does not parse.
    pub fn get_parsed<T: FromStr>(&self, key: &str) -> Option<T> {
        let raw = self.get(key)?;
        match raw.trim().parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring unparsable config value {}={}", key, raw);
                None
            }
        }
    }

    pub fn set(&self, key: &str, value: &str) {
        self.config.insert(key.to_string(), value.to_string());
    }
}

/// Registry behaviour switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Reject a second handler for an injection site that already has one.
    pub reject_duplicate_handlers: bool,
    /// Container name prefix for worker invocations.
    pub worker_prefix: String,
    pub teardown_channel_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            reject_duplicate_handlers: true,
            worker_prefix: "worker".to_string(),
            teardown_channel_capacity: 64,
        }
    }
}

impl RegistryConfig {
    pub const REJECT_DUPLICATE_HANDLERS: &'static str = "STRATA_REJECT_DUPLICATE_HANDLERS";
    pub const WORKER_PREFIX: &'static str = "STRATA_WORKER_PREFIX";
    pub const TEARDOWN_CHANNEL_CAPACITY: &'static str = "STRATA_TEARDOWN_CHANNEL_CAPACITY";

    pub fn from_config(config: &ConfigService) -> Self {
        let defaults = Self::default();
        Self {
            reject_duplicate_handlers: config
                .get_parsed(Self::REJECT_DUPLICATE_HANDLERS)
                .unwrap_or(defaults.reject_duplicate_handlers),
            worker_prefix: config
                .get(Self::WORKER_PREFIX)
                .filter(|prefix| !prefix.is_empty())
                .unwrap_or(defaults.worker_prefix),
            teardown_channel_capacity: config
                .get_parsed::<usize>(Self::TEARDOWN_CHANNEL_CAPACITY)
                .filter(|capacity| *capacity > 0)
                .unwrap_or(defaults.teardown_channel_capacity),
        }
    }

    pub fn from_env() -> Self {
        Self::from_config(&ConfigService::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_unset() {
        let config = RegistryConfig::from_config(&ConfigService::empty());
        assert_eq!(config, RegistryConfig::default());
    }

    #[test]
    fn test_overrides() {
        let service = ConfigService::empty();
        service.set(RegistryConfig::REJECT_DUPLICATE_HANDLERS, "false");
        service.set(RegistryConfig::WORKER_PREFIX, "cron");
        service.set(RegistryConfig::TEARDOWN_CHANNEL_CAPACITY, "not-a-number");

        let config = RegistryConfig::from_config(&service);
        assert!(!config.reject_duplicate_handlers);
        assert_eq!(config.worker_prefix, "cron");
        assert_eq!(config.teardown_channel_capacity, 64);
    }

    #[test]
    fn test_partial_json() {
        let config: RegistryConfig =
            serde_json::from_str(r#"{ "worker_prefix": "jobs" }"#).unwrap();
        assert_eq!(config.worker_prefix, "jobs");
        assert!(config.reject_duplicate_handlers);
    }
}
