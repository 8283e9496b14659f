use crate::error::EventsError;
use chrono::{DateTime, Utc};
use core_types::{Color, Region, RegionId, TemporalWindow};
use serde::{Deserialize, Serialize};

/// A region's classification result after a recompute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionColor {
    pub region_id: RegionId,
    pub color: Color,
    /// The window mean that produced `color`; `None` when no value could be aggregated.
    pub value: Option<f64>,
}

/// A failed series acquisition for one region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionFailure {
    pub region_id: RegionId,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

/// Every change the region store publishes.
///
/// Serialized with `#[serde(tag = "type", content = "payload")]`, so a deletion looks like
/// `{ "type": "RegionDeleted", "payload": "<uuid>" }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum StoreEvent {
    /// A new region was added (before its series arrives).
    RegionCreated(Region),
    /// A region's editable fields changed.
    RegionUpdated(Region),
    RegionDeleted(RegionId),
    /// The selected region changed; `None` means nothing is selected.
    SelectionChanged(Option<RegionId>),
    WindowChanged(TemporalWindow),
    /// A recompute produced a (possibly unchanged) color.
    RegionRecolored(RegionColor),
    AcquisitionFailed(AcquisitionFailure),
    /// Whether any acquisition is in flight.
    LoadingChanged(bool),
}

impl StoreEvent {
    /// The region this event concerns, if it concerns exactly one.
    pub fn region_id(&self) -> Option<RegionId> {
        match self {
            StoreEvent::RegionCreated(region) | StoreEvent::RegionUpdated(region) => Some(region.id),
            StoreEvent::RegionDeleted(id) => Some(*id),
            StoreEvent::RegionRecolored(color) => Some(color.region_id),
            StoreEvent::AcquisitionFailed(failure) => Some(failure.region_id),
            StoreEvent::SelectionChanged(_)
            | StoreEvent::WindowChanged(_)
            | StoreEvent::LoadingChanged(_) => None,
        }
    }

    pub fn to_json(&self) -> Result<String, EventsError> {
        Ok(serde_json::to_string(self)?)
    }
}
