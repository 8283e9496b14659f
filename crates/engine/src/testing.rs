//! In-memory metric sources and fixtures shared by the engine's tests.

use api_client::error::ApiError;
use api_client::{MetricSource, SeriesRequest, SourceSeries};
use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use core_types::{LatLng, TimeSeries};
use std::collections::BTreeMap;
use std::sync::Mutex;

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

fn hour(start: NaiveDateTime, offset: usize) -> NaiveDateTime {
    start + Duration::hours(offset as i64)
}

/// A `temperature_2m` series with one sample per hour from 2024-03-01T00:00.
pub fn hourly_series(values: &[f64]) -> TimeSeries {
    let start = date(2024, 3, 1).and_hms_opt(0, 0, 0).unwrap();
    let timestamps = (0..values.len()).map(|i| hour(start, i)).collect();
    let mut fields = BTreeMap::new();
    fields.insert("temperature_2m".to_string(), values.to_vec());
    TimeSeries::new(timestamps, fields).unwrap()
}

/// `n` points spread around a small loop near Kolkata.
pub fn square(n: usize) -> Vec<LatLng> {
    (0..n)
        .map(|i| {
            let angle = i as f64 / n as f64 * std::f64::consts::TAU;
            LatLng::new(22.57 + 0.01 * angle.sin(), 88.36 + 0.01 * angle.cos())
        })
        .collect()
}

/// Answers every request with a constant value for each requested field.
pub struct FakeSource {
    name: String,
    value: f64,
    extra_fields: Vec<String>,
    omitted: Vec<String>,
    calls: Mutex<Vec<(NaiveDate, NaiveDate)>>,
}

impl FakeSource {
    pub fn new(name: &str, value: f64) -> Self {
        Self {
            name: name.to_string(),
            value,
            extra_fields: Vec::new(),
            omitted: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_extra_field(mut self, field: &str) -> Self {
        self.extra_fields.push(field.to_string());
        self
    }

    /// Leaves `field` out of every answer, like an endpoint that does not serve it.
    pub fn without_field(mut self, field: &str) -> Self {
        self.omitted.push(field.to_string());
        self
    }

    /// The grid point this source pretends to snap requests to.
    pub fn location(&self) -> LatLng {
        LatLng::new(22.5, 88.375)
    }

    /// Date ranges requested so far, in order.
    pub fn calls(&self) -> Vec<(NaiveDate, NaiveDate)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn series_for(&self, start: NaiveDate, end: NaiveDate) -> SourceSeries {
        self.build(start, end, &["temperature_2m".to_string()])
    }

    fn build(&self, start: NaiveDate, end: NaiveDate, fields: &[String]) -> SourceSeries {
        let days = (end - start).num_days() as usize + 1;
        let first = start.and_hms_opt(0, 0, 0).unwrap();
        let timestamps: Vec<_> = (0..days * 24).map(|i| hour(first, i)).collect();

        let mut values = BTreeMap::new();
        let mut units = BTreeMap::new();
        for field in fields
            .iter()
            .chain(&self.extra_fields)
            .filter(|f| !self.omitted.contains(f))
        {
            values.insert(field.clone(), vec![self.value; timestamps.len()]);
            units.insert(field.clone(), "°C".to_string());
        }
        SourceSeries {
            location: self.location(),
            units,
            series: TimeSeries::new(timestamps, values).unwrap(),
        }
    }
}

#[async_trait]
impl MetricSource for FakeSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_hourly(&self, request: &SeriesRequest) -> Result<SourceSeries, ApiError> {
        self.calls
            .lock()
            .unwrap()
            .push((request.start_date, request.end_date));
        Ok(self.build(request.start_date, request.end_date, &request.fields))
    }
}

/// Fails every request as an upstream error.
pub struct FailingSource {
    name: String,
}

impl FailingSource {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl MetricSource for FailingSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_hourly(&self, _request: &SeriesRequest) -> Result<SourceSeries, ApiError> {
        Err(ApiError::Upstream(500, "service unavailable".to_string()))
    }
}
