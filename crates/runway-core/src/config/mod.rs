//! Runtime configuration schemas.
//!
//! All configuration structs are deserialized from TOML files via the
//! `config` crate. Each sub-module represents a logical configuration
//! section.

pub mod batch;
pub mod command;
pub mod database;
pub mod job_executor;
pub mod logging;

use serde::{Deserialize, Serialize};

pub use self::batch::BatchConfig;
pub use self::command::CommandConfig;
pub use self::database::DatabaseConfig;
pub use self::job_executor::{JobExecutorConfig, RetryBackoffConfig};
pub use self::logging::LoggingConfig;

use crate::error::AppError;

/// Root runtime configuration.
///
/// This struct is the top-level deserialization target for the merged
/// TOML configuration files (default.toml + environment overlay).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Datastore settings.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Command pipeline settings.
    #[serde(default)]
    pub command: CommandConfig,
    /// Job executor settings.
    #[serde(default)]
    pub job_executor: JobExecutorConfig,
    /// Batch settings.
    #[serde(default)]
    pub batch: BatchConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from TOML files.
    ///
    /// Merges the default configuration with an environment-specific overlay
    /// and environment variables prefixed with `RUNWAY__`.
    pub fn load(env: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("RUNWAY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))
    }
}
