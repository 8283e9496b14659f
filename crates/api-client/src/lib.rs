use crate::error::ApiError;
use async_trait::async_trait;
use chrono::NaiveDate;
use configuration::ApiConfig;
use core_types::LatLng;
use std::time::Duration;

pub mod error;
pub mod responses;

// --- Public API ---
pub use responses::{ApiErrorResponse, ForecastResponse, HourlyTable, SourceSeries};

/// Date format the endpoints expect for `start_date` / `end_date`.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// A logical request for hourly data at one point over an inclusive date range.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesRequest {
    pub location: LatLng,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub fields: Vec<String>,
}

impl SeriesRequest {
    /// The same request restricted to `[start_date, end_date]`.
    pub fn with_dates(&self, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            location: self.location,
            start_date,
            end_date,
            fields: self.fields.clone(),
        }
    }

    /// The field the caller classifies on. It is the only one every source must serve.
    pub fn primary_field(&self) -> Option<&str> {
        self.fields.first().map(String::as_str)
    }

    /// Query parameters in the order the endpoints document them.
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("latitude", format!("{:.4}", self.location.lat)),
            ("longitude", format!("{:.4}", self.location.lng)),
            ("start_date", self.start_date.format(DATE_FORMAT).to_string()),
            ("end_date", self.end_date.format(DATE_FORMAT).to_string()),
            ("hourly", self.fields.join(",")),
            ("timezone", "auto".to_string()),
        ]
    }
}

/// The generic, abstract interface for a metric data source.
/// The merge service holds two of these (retrospective and forward-looking), allowing the
/// underlying implementation (HTTP or in-memory) to be swapped out.
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Short name used in logs, e.g. `"archive"`.
    fn name(&self) -> &str;

    /// Fetches the hourly table for `request`.
    async fn fetch_hourly(&self, request: &SeriesRequest) -> Result<SourceSeries, ApiError>;
}

/// A concrete `MetricSource` for one Open-Meteo endpoint.
#[derive(Clone)]
pub struct OpenMeteoClient {
    client: reqwest::Client,
    name: String,
    base_url: String,
}

impl OpenMeteoClient {
    pub fn new(name: &str, base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            name: name.to_string(),
            base_url: base_url.to_string(),
        })
    }

    /// The retrospective source (historical data up to today).
    pub fn archive(config: &ApiConfig) -> Result<Self, ApiError> {
        Self::new("archive", &config.archive_url, config.timeout())
    }

    /// The forward-looking source (today onward).
    pub fn forecast(config: &ApiConfig) -> Result<Self, ApiError> {
        Self::new("forecast", &config.forecast_url, config.timeout())
    }

    pub fn build_request(&self, request: &SeriesRequest) -> Result<reqwest::Request, ApiError> {
        Ok(self
            .client
            .get(&self.base_url)
            .query(&request.query_params())
            .build()?)
    }
}

#[async_trait]
impl MetricSource for OpenMeteoClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_hourly(&self, request: &SeriesRequest) -> Result<SourceSeries, ApiError> {
        let http_request = self.build_request(request)?;
        tracing::debug!(source = %self.name, url = %http_request.url(), "Requesting hourly series.");

        let response = self.client.execute(http_request).await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let reason = serde_json::from_str::<ApiErrorResponse>(&text)
                .map(|e| e.reason)
                .unwrap_or(text);
            return Err(ApiError::Upstream(status.as_u16(), reason));
        }

        let body: ForecastResponse =
            serde_json::from_str(&text).map_err(|e| ApiError::Deserialization(e.to_string()))?;
        body.into_source_series(&request.fields)
    }
}
