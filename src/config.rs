use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::fees::late_fee::LateFeePolicy;

/// Main configuration structure for Backlot
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BacklotConfig {
    /// Branch and operator identity
    pub branch: BranchConfig,
    /// Storage backend selection
    pub storage: StorageConfig,
    /// Late fee policy knobs
    pub fees: FeeConfig,
    /// Logging settings
    pub observability: ObservabilityConfig,
    /// Session cache settings
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BranchConfig {
    /// Branch code stamped into logs, e.g. "AMS-01"
    pub code: String,
    /// Operator id for step attribution (can be set via env var)
    pub operator_id: Option<String>,
    /// Operator display name
    pub operator_name: Option<String>,
    /// Directory for per-contract session locks
    pub lock_dir: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Which backend to run against
    pub backend: StorageBackend,
    /// Data directory for the file backend
    pub data_dir: String,
    /// Database settings (sqlite backend only)
    pub database: Option<DatabaseConfig>,
}

/// Selectable storage backends. `Sqlite` additionally needs the
/// `database` build feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Volatile, for demos and tests
    Memory,
    /// One JSON document per contract under the data directory
    File,
    /// Shared database for multi-workstation branches
    Sqlite,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Database URL (SQLite file path or connection string)
    pub url: String,
    /// Maximum connections in pool
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeeConfig {
    /// Minutes past the due time before any fee accrues
    pub grace_minutes: i64,
    /// Rate per started hour beyond the grace period, in cents
    pub hourly_rate_cents: i64,
}

impl FeeConfig {
    pub fn policy(&self) -> LateFeePolicy {
        LateFeePolicy {
            grace_minutes: self.grace_minutes,
            hourly_rate_cents: self.hourly_rate_cents,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level
    pub log_level: String,
    /// Emit JSON lines instead of human-readable logs
    pub json_logs: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Seconds a cached session snapshot may be served
    pub session_ttl_seconds: u64,
    /// Maximum cached sessions
    pub capacity: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_seconds)
    }
}

impl Default for BacklotConfig {
    fn default() -> Self {
        Self {
            branch: BranchConfig {
                code: "MAIN".to_string(),
                operator_id: None, // Will be read from env var or backlot.toml
                operator_name: None,
                lock_dir: ".backlot/locks".to_string(),
            },
            storage: StorageConfig {
                backend: StorageBackend::File,
                data_dir: ".backlot".to_string(),
                database: Some(DatabaseConfig {
                    url: "sqlite://.backlot/backlot.db".to_string(),
                    max_connections: 5,
                }),
            },
            fees: FeeConfig {
                grace_minutes: 30,
                hourly_rate_cents: 1_500, // $15 per started hour
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                json_logs: false,
            },
            cache: CacheConfig {
                session_ttl_seconds: 30,
                capacity: 200,
            },
        }
    }
}

impl BacklotConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration files (backlot.toml, .backlotrc)
    /// 3. Environment variables (BACKLOT__ prefixed, e.g.
    ///    BACKLOT__FEES__GRACE_MINUTES)
    pub fn load() -> Result<Self> {
        let defaults = Config::try_from(&BacklotConfig::default())?;
        let mut builder = Config::builder().add_source(defaults);

        if Path::new("backlot.toml").exists() {
            builder = builder.add_source(File::with_name("backlot"));
        }

        if Path::new(".backlotrc").exists() {
            builder = builder.add_source(File::with_name(".backlotrc"));
        }

        // Override with environment variables
        builder = builder.add_source(
            Environment::with_prefix("BACKLOT")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        let mut backlot_config: BacklotConfig = config.try_deserialize()?;

        // Special handling for the operator - desk stations usually set
        // it per shift rather than in the config file
        if backlot_config.branch.operator_id.is_none() {
            if let Ok(operator) = std::env::var("BACKLOT_OPERATOR") {
                backlot_config.branch.operator_id = Some(operator);
            }
        }

        // DATABASE_URL wins over the configured value, matching what
        // every other sqlx tool expects
        if let Ok(url) = std::env::var("DATABASE_URL") {
            if let Some(database) = backlot_config.storage.database.as_mut() {
                database.url = url;
            } else {
                backlot_config.storage.database = Some(DatabaseConfig {
                    url,
                    max_connections: 5,
                });
            }
        }

        Ok(backlot_config)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<BacklotConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        // Load .env file first
        let _ = BacklotConfig::load_env_file();
        BacklotConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static BacklotConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}

/// Initialize configuration (called at startup)
pub fn init_config() -> Result<()> {
    let _config = config()?;
    tracing::info!("Configuration loaded successfully");
    Ok(())
}
