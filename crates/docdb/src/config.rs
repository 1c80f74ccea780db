//! Repository configuration.
//!
//! Configuration is read from command line arguments or the environment.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `DOCDB_ENDPOINT` | (required) | Account endpoint URL |
//! | `DOCDB_AUTH_KEY` | (required) | Base64 master key |
//! | `DOCDB_DATABASE` | (required) | Database id |
//! | `DOCDB_COLLECTION` | (required) | Collection id |
//! | `DOCDB_APP_REGION` | (required) | Region this instance runs in |
//! | `DOCDB_CONNECTION_MODE` | direct | `gateway` or `direct` |
//! | `DOCDB_PROTOCOL` | https | `https` or `tcp` |
//! | `DOCDB_OFFER_THROUGHPUT` | 1000 | Throughput provisioned for a new collection |
//! | `DOCDB_MAX_ITEM_COUNT` | -1 | Query page size (-1 lets the service decide) |
//! | `DOCDB_REQUEST_TIMEOUT_MS` | 30000 | Per-request timeout |
//! | `DOCDB_MAX_RETRY_ATTEMPTS` | 9 | Retries of a throttled request |
//! | `DOCDB_MAX_RETRY_WAIT_MS` | 30000 | Cumulative wait across throttling retries |
//! | `DOCDB_LOG_LEVEL` | info | Log level |
//!
//! # Example
//!
//! ```rust
//! use helios_docdb::RepositoryConfig;
//!
//! let config = RepositoryConfig {
//!     database: Some("ToDoList".to_string()),
//!     collection: Some("Items".to_string()),
//!     ..RepositoryConfig::for_testing()
//! };
//! assert!(config.validate().is_ok());
//! ```

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use clap::Parser;
use url::Url;

use crate::error::ConfigError;
use crate::policy::{ConnectionMode, ConnectionPolicy, Protocol};

/// Key of the well-known local emulator.
const EMULATOR_KEY: &str =
    "C2y6yDjf5/R+ob0N8A7Cgv30VRDJIWEHLM+4QDU5DE2nQ9nDuVTqobD4b8mGGyPMbIZnqyMsEcaGQy67XIw/Jw==";

/// Configuration for a document repository.
#[derive(Debug, Clone, Parser)]
#[command(name = "docdb")]
#[command(about = "Document database repository")]
pub struct RepositoryConfig {
    /// Account endpoint URL.
    #[arg(long, env = "DOCDB_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Base64-encoded master key.
    #[arg(long, env = "DOCDB_AUTH_KEY", hide_env_values = true)]
    pub auth_key: Option<String>,

    /// Database id.
    #[arg(long, env = "DOCDB_DATABASE")]
    pub database: Option<String>,

    /// Collection id.
    #[arg(long, env = "DOCDB_COLLECTION")]
    pub collection: Option<String>,

    /// Region this application instance runs in; preferred for reads.
    #[arg(long, env = "DOCDB_APP_REGION")]
    pub app_region: Option<String>,

    /// Connection mode.
    #[arg(long, env = "DOCDB_CONNECTION_MODE", value_enum, default_value = "direct")]
    pub connection_mode: ConnectionMode,

    /// Wire protocol for direct mode.
    #[arg(long, env = "DOCDB_PROTOCOL", value_enum, default_value = "https")]
    pub protocol: Protocol,

    /// Throughput provisioned when the collection has to be created.
    #[arg(long, env = "DOCDB_OFFER_THROUGHPUT", default_value = "1000")]
    pub offer_throughput: u32,

    /// Query page size; -1 lets the service decide.
    #[arg(
        long,
        env = "DOCDB_MAX_ITEM_COUNT",
        default_value = "-1",
        allow_negative_numbers = true
    )]
    pub max_item_count: i32,

    /// Per-request timeout in milliseconds.
    #[arg(long, env = "DOCDB_REQUEST_TIMEOUT_MS", default_value = "30000")]
    pub request_timeout_ms: u64,

    /// Maximum retries of a throttled request.
    #[arg(long, env = "DOCDB_MAX_RETRY_ATTEMPTS", default_value = "9")]
    pub max_retry_attempts: u32,

    /// Maximum cumulative wait across throttling retries, in milliseconds.
    #[arg(long, env = "DOCDB_MAX_RETRY_WAIT_MS", default_value = "30000")]
    pub max_retry_wait_ms: u64,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, env = "DOCDB_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            auth_key: None,
            database: None,
            collection: None,
            app_region: None,
            connection_mode: ConnectionMode::Direct,
            protocol: Protocol::Https,
            offer_throughput: 1000,
            max_item_count: -1,
            request_timeout_ms: 30_000,
            max_retry_attempts: 9,
            max_retry_wait_ms: 30_000,
            log_level: "info".to_string(),
        }
    }
}

/// Required connection values, checked and parsed.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Account endpoint.
    pub endpoint: Url,
    /// Base64-encoded master key.
    pub auth_key: String,
    /// Database id.
    pub database: String,
    /// Collection id.
    pub collection: String,
    /// Home region.
    pub app_region: String,
}

impl RepositoryConfig {
    /// Creates a configuration from environment variables only.
    pub fn from_env() -> Self {
        Self::try_parse_from(["docdb"]).unwrap_or_default()
    }

    /// Validates the configuration and returns every problem found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        for (key, value) in self.required_values() {
            if value.map(str::trim).unwrap_or_default().is_empty() {
                errors.push(format!("{key} is required"));
            }
        }

        if let Some(endpoint) = self.endpoint.as_deref().filter(|e| !e.trim().is_empty()) {
            if let Err(message) = parse_endpoint(endpoint) {
                errors.push(format!("endpoint {message}"));
            }
        }

        if let Some(key) = self.auth_key.as_deref().filter(|k| !k.trim().is_empty()) {
            if STANDARD.decode(key.trim()).is_err() {
                errors.push("authKey must be base64".to_string());
            }
        }

        if self.request_timeout_ms == 0 {
            errors.push("Request timeout cannot be 0".to_string());
        }

        if self.max_item_count == 0 || self.max_item_count < -1 {
            errors.push("Max item count must be positive or -1".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Returns the required connection values, or the first problem with them.
    pub fn settings(&self) -> Result<ConnectionSettings, ConfigError> {
        let endpoint = require("endpoint", &self.endpoint)?;
        let endpoint = parse_endpoint(&endpoint).map_err(|message| ConfigError::Invalid {
            key: "endpoint".to_string(),
            message,
        })?;

        let auth_key = require("authKey", &self.auth_key)?;
        if STANDARD.decode(&auth_key).is_err() {
            return Err(ConfigError::Invalid {
                key: "authKey".to_string(),
                message: "must be base64".to_string(),
            });
        }

        Ok(ConnectionSettings {
            endpoint,
            auth_key,
            database: require("database", &self.database)?,
            collection: require("collection", &self.collection)?,
            app_region: require("appRegion", &self.app_region)?,
        })
    }

    /// Builds the base connection policy (transport and timeouts, no regions yet).
    pub fn connection_policy(&self) -> ConnectionPolicy {
        ConnectionPolicy::new(self.connection_mode, self.protocol)
            .with_request_timeout(Duration::from_millis(self.request_timeout_ms))
            .with_retry_options(
                self.max_retry_attempts,
                Duration::from_millis(self.max_retry_wait_ms),
            )
    }

    /// Creates a configuration pointing at a local emulator.
    pub fn for_testing() -> Self {
        Self {
            endpoint: Some("https://localhost:8081/".to_string()),
            auth_key: Some(EMULATOR_KEY.to_string()),
            database: Some("test-db".to_string()),
            collection: Some("test-items".to_string()),
            app_region: Some("South Central US".to_string()),
            connection_mode: ConnectionMode::Gateway,
            request_timeout_ms: 5_000,
            log_level: "debug".to_string(),
            ..Default::default()
        }
    }

    fn required_values(&self) -> [(&'static str, Option<&str>); 5] {
        [
            ("endpoint", self.endpoint.as_deref()),
            ("authKey", self.auth_key.as_deref()),
            ("database", self.database.as_deref()),
            ("collection", self.collection.as_deref()),
            ("appRegion", self.app_region.as_deref()),
        ]
    }
}

fn require(key: &str, value: &Option<String>) -> Result<String, ConfigError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ConfigError::Missing {
            key: key.to_string(),
        })
}

fn parse_endpoint(endpoint: &str) -> Result<Url, String> {
    let url = Url::parse(endpoint.trim()).map_err(|e| format!("is not a valid URL: {e}"))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(format!("must use http or https, got '{other}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RepositoryConfig::default();
        assert_eq!(config.connection_mode, ConnectionMode::Direct);
        assert_eq!(config.protocol, Protocol::Https);
        assert_eq!(config.offer_throughput, 1000);
        assert_eq!(config.max_item_count, -1);
    }

    #[test]
    fn test_testing_config_is_valid() {
        let config = RepositoryConfig::for_testing();
        assert!(config.validate().is_ok());

        let settings = config.settings().unwrap();
        assert_eq!(settings.endpoint.host_str(), Some("localhost"));
        assert_eq!(settings.database, "test-db");
        assert_eq!(settings.app_region, "South Central US");
    }

    #[test]
    fn test_validate_reports_every_missing_key() {
        let errors = RepositoryConfig::default().validate().unwrap_err();
        for key in ["endpoint", "authKey", "database", "collection", "appRegion"] {
            assert!(
                errors.iter().any(|e| e == &format!("{key} is required")),
                "missing error for {key}: {errors:?}"
            );
        }
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = RepositoryConfig {
            endpoint: Some("ftp://example.com".to_string()),
            auth_key: Some("not base64!".to_string()),
            request_timeout_ms: 0,
            max_item_count: -5,
            ..RepositoryConfig::for_testing()
        };

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 4, "{errors:?}");
    }

    #[test]
    fn test_settings_reports_missing_key() {
        let config = RepositoryConfig {
            database: None,
            ..RepositoryConfig::for_testing()
        };
        assert_eq!(
            config.settings().unwrap_err(),
            ConfigError::Missing {
                key: "database".to_string()
            }
        );
    }

    #[test]
    fn test_settings_trims_whitespace() {
        let config = RepositoryConfig {
            collection: Some("  Items ".to_string()),
            ..RepositoryConfig::for_testing()
        };
        assert_eq!(config.settings().unwrap().collection, "Items");
    }

    #[test]
    fn test_parse_from_args() {
        let config = RepositoryConfig::try_parse_from([
            "docdb",
            "--endpoint",
            "https://todo.documents.azure.com:443/",
            "--auth-key",
            EMULATOR_KEY,
            "--database",
            "ToDoList",
            "--collection",
            "Items",
            "--app-region",
            "Japan East",
            "--connection-mode",
            "gateway",
            "--max-item-count",
            "50",
        ])
        .unwrap();

        assert_eq!(config.connection_mode, ConnectionMode::Gateway);
        assert_eq!(config.max_item_count, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_connection_policy_carries_transport_settings() {
        let config = RepositoryConfig {
            request_timeout_ms: 1234,
            max_retry_attempts: 2,
            ..RepositoryConfig::for_testing()
        };
        let policy = config.connection_policy();
        assert_eq!(policy.connection_mode, ConnectionMode::Gateway);
        assert_eq!(policy.request_timeout, Duration::from_millis(1234));
        assert_eq!(policy.max_retry_attempts, 2);
        assert!(policy.preferred_locations.is_empty());
    }
}
