//! Service configuration management

use serde::{Deserialize, Serialize};
use standings_engine::{EngineConfig, OverallSource};

use crate::error::{Result, ServiceError};

/// Database configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

/// Main service configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub engine: EngineConfig,

    /// Apply pending schema migrations on connect
    pub run_migrations: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: "postgresql://localhost/pick_pool".to_string(), max_connections: 5 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "pretty".to_string() }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
            engine: EngineConfig::default(),
            run_migrations: true,
        }
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ServiceError::config(format!("Invalid {}: {}", name, value))),
    }
}

impl ServiceConfig {
    /// Load a `.env` file if present, then read configuration from the environment
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from `lookup`, which maps variable names to values
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(url) = lookup("DATABASE_URL") {
            config.database.url = url;
        }

        if let Some(max) = lookup("STANDINGS_DB_MAX_CONNECTIONS") {
            config.database.max_connections = max.trim().parse::<u32>().map_err(|_| {
                ServiceError::config(format!("Invalid STANDINGS_DB_MAX_CONNECTIONS: {}", max))
            })?;
        }

        if let Some(level) = lookup("STANDINGS_LOG_LEVEL") {
            config.logging.level = level.trim().to_ascii_lowercase();
        }

        if let Some(format) = lookup("STANDINGS_LOG_FORMAT") {
            config.logging.format = format.trim().to_ascii_lowercase();
        }

        if let Some(source) = lookup("STANDINGS_OVERALL_SOURCE") {
            config.engine.overall_source = source.parse::<OverallSource>()?;
        }

        if let Some(required) = lookup("STANDINGS_REQUIRE_TIEBREAKERS") {
            config.engine.require_tiebreakers = parse_bool("STANDINGS_REQUIRE_TIEBREAKERS", &required)?;
        }

        if let Some(migrate) = lookup("STANDINGS_RUN_MIGRATIONS") {
            config.run_migrations = parse_bool("STANDINGS_RUN_MIGRATIONS", &migrate)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.database.url.trim().is_empty() {
            return Err(ServiceError::config("DATABASE_URL must not be empty"));
        }

        if self.database.max_connections == 0 {
            return Err(ServiceError::config("Database pool needs at least one connection"));
        }

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => return Err(ServiceError::config(format!("Invalid log level: {}", self.logging.level))),
        }

        match self.logging.format.as_str() {
            "json" | "pretty" | "compact" => {}
            _ => return Err(ServiceError::config(format!("Invalid log format: {}", self.logging.format))),
        }

        self.engine.validate()?;
        Ok(())
    }
}
