use crate::error::ApiError;
use chrono::NaiveDateTime;
use core_types::{LatLng, TimeSeries};
use serde::Deserialize;
use std::collections::BTreeMap;

// Open-Meteo reports hourly timestamps without seconds, in the location's local time.
const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M";
const TIME_FORMAT_SECONDS: &str = "%Y-%m-%dT%H:%M:%S";

/// The body of a successful archive or forecast request.
#[derive(Debug, Clone, Deserialize)]
pub struct ForecastResponse {
    pub latitude: f64,
    pub longitude: f64,
    pub generationtime_ms: Option<f64>,
    pub utc_offset_seconds: Option<i32>,
    pub timezone: Option<String>,
    pub elevation: Option<f64>,
    /// Unit per field, including `"time": "iso8601"`.
    #[serde(default)]
    pub hourly_units: BTreeMap<String, String>,
    pub hourly: HourlyTable,
}

/// The hourly table: a shared `time` column plus one column per requested field.
#[derive(Debug, Clone, Deserialize)]
pub struct HourlyTable {
    pub time: Vec<String>,
    // Samples can be null, e.g. the archive lags a few days behind today.
    #[serde(flatten)]
    pub values: BTreeMap<String, Vec<Option<f64>>>,
}

/// The body Open-Meteo sends with a 4xx status.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    #[serde(default)]
    pub error: bool,
    pub reason: String,
}

/// A source's answer, reduced to what the merge step needs.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSeries {
    /// The grid point the source actually used, which is close to but not exactly the request.
    pub location: LatLng,
    pub units: BTreeMap<String, String>,
    pub series: TimeSeries,
}

impl ForecastResponse {
    /// Converts the wire table into a `SourceSeries`. Null samples become `NaN`.
    ///
    /// Only the primary (first) requested field must be present; other fields an endpoint does
    /// not serve are simply absent from the result.
    pub fn into_source_series(self, requested: &[String]) -> Result<SourceSeries, ApiError> {
        if let Some(primary) = requested.first() {
            if !self.hourly.values.contains_key(primary) {
                return Err(ApiError::InvalidData(format!(
                    "field '{}' missing from hourly table",
                    primary
                )));
            }
        }

        let timestamps = self
            .hourly
            .time
            .iter()
            .map(|raw| parse_timestamp(raw))
            .collect::<Result<Vec<_>, _>>()?;

        let fields: BTreeMap<String, Vec<f64>> = self
            .hourly
            .values
            .into_iter()
            .map(|(name, samples)| {
                let values = samples.into_iter().map(|s| s.unwrap_or(f64::NAN)).collect();
                (name, values)
            })
            .collect();

        let series = TimeSeries::new(timestamps, fields)
            .map_err(|e| ApiError::InvalidData(e.to_string()))?;

        Ok(SourceSeries {
            location: LatLng::new(self.latitude, self.longitude),
            units: self.hourly_units,
            series,
        })
    }
}

fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, ApiError> {
    NaiveDateTime::parse_from_str(raw, TIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(raw, TIME_FORMAT_SECONDS))
        .map_err(|e| ApiError::InvalidData(format!("Invalid timestamp '{}': {}", raw, e)))
}
