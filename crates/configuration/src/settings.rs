use core_types::fields::{DEFAULT_FIELD, DEFAULT_SOURCE};
use core_types::{TemporalWindow, WINDOW_HORIZON};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// The root configuration structure for the entire application.
///
/// Every section has defaults, so an absent `config.toml` yields a working setup.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub drawing: DrawingConfig,
    pub window: WindowConfig,
    pub regions: RegionDefaults,
    pub logging: LoggingConfig,
}

/// Endpoints of the two metric sources.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Retrospective source, serves data before today.
    pub archive_url: String,
    /// Forward-looking source, serves data from today onward.
    pub forecast_url: String,
    pub timeout_secs: u64,
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            archive_url: "https://archive-api.open-meteo.com/v1/archive".to_string(),
            forecast_url: "https://api.open-meteo.com/v1/forecast".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Parameters for the polygon drawing controller.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DrawingConfig {
    /// Idle time after the last click before a polygon with 3+ points finalizes itself.
    pub auto_finalize_ms: u64,
}

impl DrawingConfig {
    pub fn auto_finalize_delay(&self) -> Duration {
        Duration::from_millis(self.auto_finalize_ms)
    }
}

impl Default for DrawingConfig {
    fn default() -> Self {
        Self {
            auto_finalize_ms: 1500,
        }
    }
}

/// The timeline: how far it reaches either side of today and where the window starts.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub horizon: usize,
    pub days_before: u32,
    pub days_after: u32,
    pub default_start: usize,
    pub default_end: usize,
}

impl WindowConfig {
    /// The window a new session starts with.
    pub fn initial_window(&self) -> Result<TemporalWindow, ConfigError> {
        TemporalWindow::with_horizon(self.default_start, self.default_end, self.horizon)
            .map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            horizon: WINDOW_HORIZON,
            days_before: 15,
            days_after: 15,
            default_start: 0,
            default_end: 24,
        }
    }
}

/// What a newly created region tracks.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegionDefaults {
    /// The field regions are classified on.
    pub field: String,
    pub source: String,
    /// Additional fields fetched alongside `field`, kept in the series but not classified.
    pub extra_fields: Vec<String>,
}

impl RegionDefaults {
    /// `field` followed by `extra_fields`, without duplicates.
    pub fn requested_fields(&self) -> Vec<String> {
        self.fields_for(&self.field)
    }

    /// `primary` followed by `extra_fields`, without duplicates. The primary field stays first.
    pub fn fields_for(&self, primary: &str) -> Vec<String> {
        let mut fields = vec![primary.to_string()];
        for extra in &self.extra_fields {
            if !fields.contains(extra) {
                fields.push(extra.clone());
            }
        }
        fields
    }
}

impl Default for RegionDefaults {
    fn default() -> Self {
        Self {
            field: DEFAULT_FIELD.to_string(),
            source: DEFAULT_SOURCE.to_string(),
            extra_fields: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set.
    pub level: String,
    /// Directory for daily-rolling log files. Empty disables file logging.
    pub directory: String,
}

impl LoggingConfig {
    pub fn file_directory(&self) -> Option<PathBuf> {
        let dir = self.directory.trim();
        (!dir.is_empty()).then(|| PathBuf::from(dir))
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: String::new(),
        }
    }
}

impl Config {
    /// Checks cross-field invariants that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.drawing.auto_finalize_ms == 0 {
            return Err(ConfigError::ValidationError(
                "drawing.auto_finalize_ms must be greater than 0".to_string(),
            ));
        }
        let expected = 24 * (self.window.days_before + self.window.days_after) as usize;
        if self.window.horizon != expected {
            return Err(ConfigError::ValidationError(format!(
                "window.horizon ({}) must equal 24 * (days_before + days_after) = {}",
                self.window.horizon, expected
            )));
        }
        self.window.initial_window()?;
        if self.regions.field.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "regions.field must not be empty".to_string(),
            ));
        }
        if self.api.archive_url.is_empty() || self.api.forecast_url.is_empty() {
            return Err(ConfigError::ValidationError(
                "api.archive_url and api.forecast_url must be set".to_string(),
            ));
        }
        Ok(())
    }
}
