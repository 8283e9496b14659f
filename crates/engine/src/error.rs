use api_client::error::ApiError;
use chrono::NaiveDate;
use core_types::{CoreError, RegionId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Validation error: {0}")]
    Validation(#[from] CoreError),

    #[error("Acquisition from the {source_name} source failed: {error}")]
    Acquisition {
        source_name: String,
        #[source]
        error: ApiError,
    },

    #[error("Merged series is malformed: {0}")]
    SeriesShape(String),

    #[error("Invalid date range: {start} is after {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("Region with id '{0}' not found in the store.")]
    RegionNotFound(RegionId),

    #[error("Rule edit error: {0}")]
    RuleEdit(#[from] analytics::AnalyticsError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] configuration::error::ConfigError),

    #[error("Metric source setup failed: {0}")]
    SourceSetup(ApiError),
}

impl EngineError {
    /// Whether this error is a rejected input rather than a failed fetch.
    pub fn is_validation(&self) -> bool {
        matches!(self, EngineError::Validation(_) | EngineError::RuleEdit(_))
    }
}
