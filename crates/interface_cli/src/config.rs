//! CLI configuration

use serde::Deserialize;

/// Runtime configuration for the `claims` binary
#[derive(Debug, Clone, Deserialize)]
pub struct CliConfig {
    /// PostgreSQL connection string
    pub database_url: String,
    /// Base URL of the automation-bridge sidecar
    pub bridge_url: String,
    /// Bearer token for the bridge, if it requires one
    #[serde(default)]
    pub bridge_token: Option<String>,
    /// Per-request bridge timeout in seconds. Portal form fills can sit on
    /// slow page loads, so this is generous by default.
    #[serde(default = "default_bridge_timeout_secs")]
    pub bridge_timeout_secs: u64,
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_bridge_timeout_secs() -> u64 {
    120
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/clinic_claims".to_string(),
            bridge_url: "http://127.0.0.1:8787".to_string(),
            bridge_token: None,
            bridge_timeout_secs: default_bridge_timeout_secs(),
            log_level: default_log_level(),
        }
    }
}

impl CliConfig {
    /// Loads configuration from environment variables with the `CLAIMS_`
    /// prefix (e.g., `CLAIMS_DATABASE_URL`)
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::Environment::with_prefix("CLAIMS"))
            .build()?
            .try_deserialize()
    }

    /// Loads from the prefixed environment, falling back to common
    /// unprefixed variables and defaults for local development
    pub fn load() -> Self {
        Self::from_env().unwrap_or_else(|_| Self {
            database_url: std::env::var("DATABASE_URL")
                .or_else(|_| std::env::var("CLAIMS_DATABASE_URL"))
                .unwrap_or_else(|_| "postgres://localhost/clinic_claims".to_string()),
            bridge_url: std::env::var("CLAIMS_BRIDGE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8787".to_string()),
            bridge_token: std::env::var("CLAIMS_BRIDGE_TOKEN").ok(),
            bridge_timeout_secs: std::env::var("CLAIMS_BRIDGE_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(default_bridge_timeout_secs),
            log_level: std::env::var("CLAIMS_LOG_LEVEL")
                .or_else(|_| std::env::var("RUST_LOG"))
                .unwrap_or_else(|_| default_log_level()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_point_at_local_services() {
        let config = CliConfig::default();
        assert!(config.database_url.starts_with("postgres://localhost"));
        assert!(config.bridge_url.starts_with("http://127.0.0.1"));
        assert_eq!(config.bridge_timeout_secs, 120);
        assert_eq!(config.log_level, "info");
    }
}
