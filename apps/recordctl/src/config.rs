//! Centralized configuration for recordctl.
//!
//! All environment variables are loaded and validated at startup to fail fast
//! on misconfiguration rather than on the first query.

use std::env;
use std::fmt;

use domain::service::SaveStrategy;
use fauna::{FaunaConfig, FaunaError};

/// Storage backend provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageProvider {
    /// In-memory storage (data lost when the process exits)
    Memory,
    /// FaunaDB over HTTPS
    Fauna,
}

impl StorageProvider {
    fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("memory") {
            Self::Memory
        } else {
            Self::Fauna
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub struct ConfigError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Configuration error for {}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

impl From<FaunaError> for ConfigError {
    fn from(err: FaunaError) -> Self {
        let field = match &err {
            FaunaError::InvalidConfig { field, .. } => *field,
            _ => "FAUNA_DB_SECRET",
        };
        Self {
            field,
            message: err.to_string(),
        }
    }
}

/// Tool configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Storage provider
    pub storage_provider: StorageProvider,
    /// Create-vs-replace strategy for saves
    pub save_strategy: SaveStrategy,
    /// Fauna connection settings (only when storage is Fauna)
    pub fauna: Option<FaunaConfig>,
    /// Log format
    pub log_format: LogFormat,
}

impl Config {
    /// Load and validate configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Storage provider
        let storage_provider = StorageProvider::from_str(
            &env::var("STORAGE_PROVIDER").unwrap_or_else(|_| "fauna".into()),
        );

        // Save strategy
        let raw_strategy = env::var("SAVE_STRATEGY").unwrap_or_else(|_| "atomic".into());
        let save_strategy = SaveStrategy::parse(&raw_strategy).ok_or_else(|| ConfigError {
            field: "SAVE_STRATEGY",
            message: format!("expected 'atomic' or 'read-then-write', got '{raw_strategy}'"),
        })?;

        // Fauna settings are only required when Fauna is the backend
        let fauna = match storage_provider {
            StorageProvider::Fauna => Some(FaunaConfig::from_env()?),
            StorageProvider::Memory => None,
        };

        // Log format
        let log_format =
            LogFormat::from_str(&env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".into()));

        Ok(Self {
            storage_provider,
            save_strategy,
            fauna,
            log_format,
        })
    }

    /// Log notes about configurations that behave unlike production.
    pub fn warn_if_ephemeral(&self) {
        if self.storage_provider == StorageProvider::Memory {
            tracing::warn!(
                "STORAGE_PROVIDER=memory: records live only for this invocation."
            );
        }
        if self.save_strategy == SaveStrategy::ReadThenWrite {
            tracing::warn!(
                "SAVE_STRATEGY=read-then-write: concurrent saves of a new key can create \
                 duplicate records."
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_provider_parsing() {
        assert_eq!(StorageProvider::from_str("memory"), StorageProvider::Memory);
        assert_eq!(StorageProvider::from_str("MEMORY"), StorageProvider::Memory);
        assert_eq!(StorageProvider::from_str("fauna"), StorageProvider::Fauna);
        assert_eq!(StorageProvider::from_str("anything"), StorageProvider::Fauna);
    }

    #[test]
    fn log_format_parsing() {
        assert_eq!(LogFormat::from_str("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::from_str("json"), LogFormat::Json);
        assert_eq!(LogFormat::from_str("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::from_str("anything"), LogFormat::Pretty);
    }

    #[test]
    fn fauna_errors_name_their_variable() {
        let err = ConfigError::from(FaunaError::MissingSecret);
        assert_eq!(err.field, "FAUNA_DB_SECRET");

        let err = ConfigError::from(FaunaError::InvalidConfig {
            field: "FAUNA_TIMEOUT_SECS",
            message: "bad".into(),
        });
        assert_eq!(err.field, "FAUNA_TIMEOUT_SECS");
    }
}
