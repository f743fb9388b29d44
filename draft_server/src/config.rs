//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use snake_draft::{EngineConfig, db::DatabaseConfig};

/// Where contest and draft state is kept
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageMode {
    Postgres,
    /// In-process storage seeded with a demo contest
    Memory,
}

/// Complete server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Storage backend
    pub storage: StorageMode,
    /// Database configuration (ignored in memory mode)
    pub database: DatabaseConfig,
    /// Draft and admission settings
    pub engine: EngineConfig,
    /// Depth of each position column in the synthetic player pool
    pub pool_depth: usize,
    /// Demo accounts created in memory mode
    pub demo_users: usize,
    /// Balance given to each demo account
    pub demo_balance: i64,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Arguments
    ///
    /// * `database_url_override` - Optional database URL override (from CLI args)
    /// * `memory` - Use in-memory storage instead of PostgreSQL
    ///
    /// # Errors
    ///
    /// Returns error if a variable holds an invalid value
    pub fn from_env(
        database_url_override: Option<String>,
        memory: bool,
    ) -> Result<Self, ConfigError> {
        let memory = memory || parse_env_or("DRAFT_MEMORY_MODE", false);

        let mut database = DatabaseConfig::from_env();
        if let Some(url) = database_url_override {
            database.database_url = url;
        }

        let config = ServerConfig {
            storage: if memory {
                StorageMode::Memory
            } else {
                StorageMode::Postgres
            },
            database,
            engine: EngineConfig::from_env(),
            pool_depth: parse_env_or("DRAFT_POOL_DEPTH", 3),
            demo_users: parse_env_or("DRAFT_DEMO_USERS", 5),
            demo_balance: parse_env_or("DRAFT_DEMO_BALANCE", 1_000),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine.validate().map_err(|reason| ConfigError::Invalid {
            var: "DRAFT_*".to_string(),
            reason,
        })?;

        // FLEX needs a second player per price tier
        if self.pool_depth < 2 {
            return Err(ConfigError::Invalid {
                var: "DRAFT_POOL_DEPTH".to_string(),
                reason: "Must be at least 2".to_string(),
            });
        }

        if self.storage == StorageMode::Postgres && self.database.database_url.is_empty() {
            return Err(ConfigError::MissingRequired {
                var: "DATABASE_URL".to_string(),
                hint: "Pass --db-url or run with --memory".to_string(),
            });
        }

        if self.demo_balance < 0 {
            return Err(ConfigError::Invalid {
                var: "DRAFT_DEMO_BALANCE".to_string(),
                reason: "Must not be negative".to_string(),
            });
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Helper to parse environment variable with default fallback
fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn config() -> ServerConfig {
        ServerConfig {
            storage: StorageMode::Memory,
            database: DatabaseConfig::development(),
            engine: EngineConfig::default(),
            pool_depth: 3,
            demo_users: 5,
            demo_balance: 100,
        }
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::MissingRequired {
            var: "DATABASE_URL".to_string(),
            hint: "Use --memory".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("DATABASE_URL"));
        assert!(msg.contains("Use --memory"));
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_shallow_pool_rejected() {
        let mut config = config();
        config.pool_depth = 1;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { var, .. }) if var == "DRAFT_POOL_DEPTH"
        ));
    }

    #[test]
    fn test_postgres_requires_url() {
        let mut config = config();
        config.storage = StorageMode::Postgres;
        config.database.database_url.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingRequired { .. })
        ));
    }

    #[test]
    fn test_invalid_engine_config_rejected() {
        let mut config = config();
        config.engine.draft.turn_limit_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_memory_mode_from_env() {
        unsafe {
            std::env::set_var("DRAFT_MEMORY_MODE", "true");
            std::env::set_var("DRAFT_POOL_DEPTH", "4");
        }
        let config = ServerConfig::from_env(None, false).unwrap();
        unsafe {
            std::env::remove_var("DRAFT_MEMORY_MODE");
            std::env::remove_var("DRAFT_POOL_DEPTH");
        }

        assert_eq!(config.storage, StorageMode::Memory);
        assert_eq!(config.pool_depth, 4);
    }
}
