use crate::error::EngineError;
use api_client::{MetricSource, SeriesRequest, SourceSeries};
use chrono::{Days, NaiveDate};
use core_types::TimeSeries;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Which sub-ranges of a request each source has to serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitPlan {
    /// `[start, yesterday]` clipped to the request, if any of it lies before today.
    pub retrospective: Option<(NaiveDate, NaiveDate)>,
    /// `[today, end]` clipped to the request, if any of it lies on or after today.
    pub forward: Option<(NaiveDate, NaiveDate)>,
}

impl SplitPlan {
    /// Splits `[start, end]` at `today`. The two halves are disjoint and contiguous.
    pub fn split(start: NaiveDate, end: NaiveDate, today: NaiveDate) -> Result<Self, EngineError> {
        if start > end {
            return Err(EngineError::InvalidDateRange { start, end });
        }
        let retrospective = (start < today).then(|| {
            let yesterday = today.pred_opt().unwrap_or(today);
            (start, end.min(yesterday))
        });
        let forward = (end >= today).then(|| (start.max(today), end));
        Ok(Self {
            retrospective,
            forward,
        })
    }
}

/// Acquires a point's hourly series from the retrospective and forward-looking sources.
#[derive(Clone)]
pub struct SeriesMergeService {
    retrospective: Arc<dyn MetricSource>,
    forward: Arc<dyn MetricSource>,
    days_before: u32,
    days_after: u32,
}

impl SeriesMergeService {
    pub fn new(
        retrospective: Arc<dyn MetricSource>,
        forward: Arc<dyn MetricSource>,
        days_before: u32,
        days_after: u32,
    ) -> Self {
        Self {
            retrospective,
            forward,
            days_before,
            days_after,
        }
    }

    /// The timeline's date range around `today`.
    pub fn default_range(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let start = today
            .checked_sub_days(Days::new(self.days_before as u64))
            .unwrap_or(today);
        let end = today
            .checked_add_days(Days::new(self.days_after as u64))
            .unwrap_or(today);
        (start, end)
    }

    /// Fetches `request`, splitting it at `today` across the two sources.
    ///
    /// If both halves are needed they are fetched concurrently and concatenated
    /// retrospective-first. Any source failure aborts the whole acquisition.
    pub async fn acquire(
        &self,
        request: &SeriesRequest,
        today: NaiveDate,
    ) -> Result<SourceSeries, EngineError> {
        let plan = SplitPlan::split(request.start_date, request.end_date, today)?;
        let primary = request
            .primary_field()
            .ok_or_else(|| EngineError::SeriesShape("request names no fields".to_string()))?;
        tracing::debug!(?plan, location = ?request.location, "Acquiring series.");

        match (plan.retrospective, plan.forward) {
            (Some((r_start, r_end)), Some((f_start, f_end))) => {
                let past = request.with_dates(r_start, r_end);
                let future = request.with_dates(f_start, f_end);
                let (past, future) = tokio::try_join!(
                    fetch(self.retrospective.as_ref(), &past),
                    fetch(self.forward.as_ref(), &future),
                )?;
                merge(past, future, primary)
            }
            (Some((r_start, r_end)), None) => {
                fetch(self.retrospective.as_ref(), &request.with_dates(r_start, r_end)).await
            }
            (None, Some((f_start, f_end))) => {
                fetch(self.forward.as_ref(), &request.with_dates(f_start, f_end)).await
            }
            // `split` always yields at least one half for a valid range.
            (None, None) => Err(EngineError::InvalidDateRange {
                start: request.start_date,
                end: request.end_date,
            }),
        }
    }
}

async fn fetch(source: &dyn MetricSource, request: &SeriesRequest) -> Result<SourceSeries, EngineError> {
    source
        .fetch_hourly(request)
        .await
        .map_err(|error| EngineError::Acquisition {
            source_name: source.name().to_string(),
            error,
        })
}

/// Concatenates two contiguous, non-overlapping halves.
///
/// Keeps the retrospective half's location and units. A field survives only if both halves
/// carry it; `primary_field` must.
pub fn merge(
    past: SourceSeries,
    future: SourceSeries,
    primary_field: &str,
) -> Result<SourceSeries, EngineError> {
    if !past.series.has_field(primary_field) || !future.series.has_field(primary_field) {
        return Err(EngineError::SeriesShape(format!(
            "field '{}' is missing from one of the halves",
            primary_field
        )));
    }

    let (mut timestamps, mut past_fields) = past.series.into_parts();
    let (future_timestamps, mut future_fields) = future.series.into_parts();
    timestamps.extend(future_timestamps);

    let mut fields = BTreeMap::new();
    for (name, mut values) in std::mem::take(&mut past_fields) {
        match future_fields.remove(&name) {
            Some(later) => {
                values.extend(later);
                fields.insert(name, values);
            }
            None => tracing::debug!(field = %name, "Dropping field missing from the forward half."),
        }
    }

    let series = TimeSeries::new(timestamps, fields)
        .map_err(|e| EngineError::SeriesShape(e.to_string()))?;

    Ok(SourceSeries {
        location: past.location,
        units: past.units,
        series,
    })
}
