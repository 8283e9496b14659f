use core_types::TemporalWindow;

/// A stateless calculator reducing a window of an hourly series to one scalar.
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowAggregator {}

impl WindowAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// The arithmetic mean of `values[start..=min(end, len - 1)]`.
    ///
    /// Non-finite samples (missing data) are skipped. Returns `None` when nothing usable is left,
    /// e.g. when the window starts past the end of the series; callers must treat that as
    /// "no classification possible".
    pub fn mean(&self, values: &[f64], window: TemporalWindow) -> Option<f64> {
        let start = window.start();
        let end = window.end().min(values.len().checked_sub(1)?);
        if start > end {
            tracing::trace!(start, len = values.len(), "Window starts past the end of the series.");
            return None;
        }

        let (sum, count) = values[start..=end]
            .iter()
            .filter(|v| v.is_finite())
            .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));

        (count > 0).then(|| sum / count as f64)
    }
}
