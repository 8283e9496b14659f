pub mod enums;
pub mod error;
pub mod fields;
pub mod geo;
pub mod structs;

// Re-export the core types to provide a clean public API.
pub use enums::ComparisonOp;
pub use error::CoreError;
pub use geo::{BoundingBox, LatLng};
pub use structs::{
    Color, ColorRule, EQUALITY_TOLERANCE, MAX_VERTICES, MIN_VERTICES, Region, RegionId, RuleId,
    TemporalWindow, TimeSeries, WINDOW_HORIZON, validate_name, validate_vertex_count,
};
