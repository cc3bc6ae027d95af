//! Provider configuration.
//!
//! Loaded from TOML; every field has a default, so an empty document is a
//! valid configuration. `M365_GRAPH_URL` and `M365_API_VERSION` override
//! the corresponding keys after parsing.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ReconcileError, ReconcileResult};
use crate::guard::{GuardContext, RetryPolicy};

pub const GRAPH_URL_ENV: &str = "M365_GRAPH_URL";
pub const API_VERSION_ENV: &str = "M365_API_VERSION";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderConfig {
    pub graph_url: String,
    pub api_version: String,
    pub create_retry: RetrySettings,
    pub update_retry: RetrySettings,
    /// Upper bound for one resource operation, including retries.
    pub operation_timeout_secs: Option<u64>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            graph_url: "https://graph.microsoft.com".to_string(),
            api_version: "v1.0".to_string(),
            create_retry: RetrySettings::create_defaults(),
            update_retry: RetrySettings::update_defaults(),
            operation_timeout_secs: None,
        }
    }
}

impl ProviderConfig {
    pub fn from_toml_str(source: &str) -> ReconcileResult<Self> {
        let config: Self = toml::from_str(source).map_err(|e| ReconcileError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read `path`, then apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> ReconcileResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| ReconcileError::Config(format!("cannot read {}: {e}", path.display())))?;
        let mut config = Self::from_toml_str(&source)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply overrides from `lookup`, normally `std::env::var`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(GRAPH_URL_ENV).filter(|v| !v.is_empty()) {
            self.graph_url = url;
        }
        if let Some(version) = lookup(API_VERSION_ENV).filter(|v| !v.is_empty()) {
            self.api_version = version;
        }
    }

    pub fn validate(&self) -> ReconcileResult<()> {
        if self.graph_url.trim().is_empty() {
            return Err(ReconcileError::Config("graph_url must not be empty".to_string()));
        }
        self.create_retry.to_policy()?;
        self.update_retry.to_policy()?;
        Ok(())
    }

    /// Service root including the API version, e.g. `https://graph.microsoft.com/v1.0`.
    pub fn base_url(&self) -> String {
        format!(
            "{}/{}",
            self.graph_url.trim_end_matches('/'),
            self.api_version.trim_matches('/')
        )
    }

    /// A fresh context carrying the configured operation timeout.
    pub fn guard_context(&self) -> GuardContext {
        match self.operation_timeout_secs {
            Some(secs) => GuardContext::new().with_timeout(Duration::from_secs(secs)),
            None => GuardContext::new(),
        }
    }
}

/// Retry schedule in configuration form; delays are in milliseconds.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub backoff_multiplier: f64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default)]
    pub settle_window_ms: u64,
    #[serde(default)]
    pub exit_on_convergence: bool,
}

fn default_max_delay_ms() -> u64 {
    10_000
}

impl RetrySettings {
    pub fn create_defaults() -> Self {
        Self {
            max_attempts: 8,
            initial_delay_ms: 1_000,
            backoff_multiplier: 1.5,
            max_delay_ms: default_max_delay_ms(),
            settle_window_ms: 0,
            exit_on_convergence: false,
        }
    }

    pub fn update_defaults() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 1_000,
            backoff_multiplier: 2.0,
            max_delay_ms: default_max_delay_ms(),
            settle_window_ms: 7_000,
            exit_on_convergence: false,
        }
    }

    pub fn to_policy(&self) -> ReconcileResult<RetryPolicy> {
        let policy = RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.initial_delay_ms),
            self.backoff_multiplier,
        )?
        .with_max_delay(Duration::from_millis(self.max_delay_ms))
        .with_settle_window(Duration::from_millis(self.settle_window_ms))
        .with_exit_on_convergence(self.exit_on_convergence);
        policy.validate()?;
        Ok(policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = ProviderConfig::from_toml_str("").unwrap();
        assert_eq!(config, ProviderConfig::default());
        assert_eq!(config.base_url(), "https://graph.microsoft.com/v1.0");
        assert_eq!(config.create_retry.to_policy().unwrap(), RetryPolicy::for_create());
        assert_eq!(config.update_retry.to_policy().unwrap(), RetryPolicy::for_update());
    }

    #[test]
    fn retry_tables_override_defaults() {
        let config = ProviderConfig::from_toml_str(
            r#"
            api_version = "beta"
            operation_timeout_secs = 120

            [update_retry]
            max_attempts = 3
            initial_delay_ms = 250
            backoff_multiplier = 2.0
            settle_window_ms = 2000
            exit_on_convergence = true
            "#,
        )
        .unwrap();
        assert_eq!(config.base_url(), "https://graph.microsoft.com/beta");
        let policy = config.update_retry.to_policy().unwrap();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.settle_window, Duration::from_secs(2));
        assert_eq!(policy.max_delay, Duration::from_secs(10));
        assert!(policy.exit_on_convergence);
        assert_eq!(config.create_retry, RetrySettings::create_defaults());
        assert!(config.guard_context().deadline().is_some());
    }

    #[test]
    fn invalid_retry_settings_are_rejected() {
        let err = ProviderConfig::from_toml_str(
            r#"
            [create_retry]
            max_attempts = 0
            initial_delay_ms = 100
            backoff_multiplier = 1.5
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ReconcileError::Config(_)));
    }

    #[tokio::test]
    async fn extreme_but_valid_values_do_not_overflow() {
        let config = ProviderConfig::from_toml_str(
            r#"
            operation_timeout_secs = 9223372036854775807

            [create_retry]
            max_attempts = 2
            initial_delay_ms = 1
            backoff_multiplier = 1e300
            "#,
        )
        .unwrap();
        assert!(config.guard_context().deadline().is_none());
        let policy = config.create_retry.to_policy().unwrap();
        assert_eq!(policy.backoff_multiplier, 1e300);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(ProviderConfig::from_toml_str("graph_uri = \"x\"").is_err());
    }

    #[test]
    fn environment_overrides_apply_after_parsing() {
        let mut config = ProviderConfig::default();
        config.apply_env_overrides(|key| match key {
            GRAPH_URL_ENV => Some("http://127.0.0.1:3000/".to_string()),
            API_VERSION_ENV => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.base_url(), "http://127.0.0.1:3000/v1.0");
    }
}
