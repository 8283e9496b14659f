use crate::error::ConfigError;
use std::path::Path;

// Declare the modules that make up this crate.
pub mod error;
pub mod settings;
pub mod telemetry;

// Re-export the core types to provide a clean public API.
pub use settings::{ApiConfig, Config, DrawingConfig, LoggingConfig, RegionDefaults, WindowConfig};
pub use telemetry::init_tracing;

/// Prefix for environment overrides, e.g. `ZONECAST__WINDOW__DEFAULT_END=48`.
pub const ENV_PREFIX: &str = "ZONECAST";

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Loads the application configuration from `config.toml` in the working directory.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(Path::new(DEFAULT_CONFIG_PATH))
}

/// Loads the configuration from `path`, layered under `ZONECAST__` environment variables.
///
/// The file is optional; every missing key falls back to its default. The result is
/// validated before it is returned.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()?;

    // Attempt to deserialize the entire configuration into our `Config` struct
    let config = builder.try_deserialize::<Config>()?;
    config.validate()?;
    tracing::debug!(path = %path.display(), "Configuration loaded.");

    Ok(config)
}

/// Command-line flag selecting the configuration file.
#[cfg(feature = "clap")]
#[derive(Debug, Clone, clap::Args)]
pub struct ConfigArgs {
    /// Path to the configuration file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: std::path::PathBuf,
}

#[cfg(feature = "clap")]
impl ConfigArgs {
    pub fn load(&self) -> Result<Config, ConfigError> {
        load_config_from(&self.config)
    }
}
