use crate::enums::ComparisonOp;
use crate::error::CoreError;
use crate::geo::{BoundingBox, LatLng};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Smallest polygon a user can finalize.
pub const MIN_VERTICES: usize = 3;
/// Largest polygon a user can draw; the twelfth point finalizes immediately.
pub const MAX_VERTICES: usize = 12;
/// Half-width of the band inside which an `=` rule matches.
pub const EQUALITY_TOLERANCE: f64 = 0.1;
/// Number of hourly steps covered by the timeline (15 days either side of the reference date).
pub const WINDOW_HORIZON: usize = 720;

// ==============================================================================
// Identifiers
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionId(pub Uuid);

impl RegionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RegionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(pub Uuid);

impl RuleId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RuleId {
    fn default() -> Self {
        Self::new()
    }
}

// ==============================================================================
// Color
// ==============================================================================

/// A display color in `#rrggbb` form, stored lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color(String);

impl Color {
    pub const NEUTRAL: &'static str = "#808080";
    pub const COLD: &'static str = "#0066cc";
    pub const MODERATE: &'static str = "#00cc66";
    pub const WARM: &'static str = "#cc6600";
    pub const HOT: &'static str = "#cc0000";

    pub fn parse(hex: &str) -> Result<Self, CoreError> {
        let hex = hex.trim();
        let digits = hex
            .strip_prefix('#')
            .ok_or_else(|| CoreError::InvalidInput("color".to_string(), hex.to_string()))?;
        if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(CoreError::InvalidInput("color".to_string(), hex.to_string()));
        }
        Ok(Self(format!("#{}", digits.to_ascii_lowercase())))
    }

    /// The color shown when no rule matches or no value is available.
    pub fn neutral() -> Self {
        Self(Self::NEUTRAL.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    // Only for the palette constants above, which are known to be well-formed.
    fn from_static(hex: &'static str) -> Self {
        Self(hex.to_string())
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::neutral()
    }
}

impl TryFrom<String> for Color {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Color::parse(&value)
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.0
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ==============================================================================
// Rules and regions
// ==============================================================================

/// One threshold test and the color it assigns when it matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorRule {
    pub id: RuleId,
    pub operator: ComparisonOp,
    pub threshold: f64,
    pub color: Color,
}

impl ColorRule {
    pub fn new(operator: ComparisonOp, threshold: f64, color: Color) -> Self {
        Self {
            id: RuleId::new(),
            operator,
            threshold,
            color,
        }
    }

    /// Whether `value` satisfies this rule's comparison.
    pub fn matches(&self, value: f64) -> bool {
        match self.operator {
            ComparisonOp::Lt => value < self.threshold,
            ComparisonOp::Gt => value > self.threshold,
            ComparisonOp::Le => value <= self.threshold,
            ComparisonOp::Ge => value >= self.threshold,
            ComparisonOp::Eq => (value - self.threshold).abs() < EQUALITY_TOLERANCE,
        }
    }

    /// The rule set every new region starts with: cold, moderate, warm, hot.
    ///
    /// Evaluation is first-match, so with this ordering any value >= 10 lands on the
    /// moderate rule. Users reorder the list to get the warmer bands.
    pub fn default_set() -> Vec<ColorRule> {
        vec![
            ColorRule::new(ComparisonOp::Lt, 10.0, Color::from_static(Color::COLD)),
            ColorRule::new(ComparisonOp::Ge, 10.0, Color::from_static(Color::MODERATE)),
            ColorRule::new(ComparisonOp::Ge, 25.0, Color::from_static(Color::WARM)),
            ColorRule::new(ComparisonOp::Ge, 35.0, Color::from_static(Color::HOT)),
        ]
    }
}

/// A user-drawn polygon with an attached metric and classification rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub id: RegionId,
    pub name: String,
    pub vertices: Vec<LatLng>,
    /// Name of the hourly field this region is classified on.
    pub field: String,
    pub source: String,
    pub rules: Vec<ColorRule>,
    pub current_color: Color,
    pub centroid: LatLng,
    pub bounding_box: BoundingBox,
}

impl Region {
    /// Validates the name and vertex count and derives the centroid and bounding box.
    pub fn new(
        name: &str,
        vertices: Vec<LatLng>,
        field: &str,
        source: &str,
        rules: Vec<ColorRule>,
    ) -> Result<Self, CoreError> {
        let name = validate_name(name)?;
        validate_vertex_count(vertices.len())?;
        let centroid = LatLng::mean(&vertices).ok_or(CoreError::VertexCount {
            min: MIN_VERTICES,
            max: MAX_VERTICES,
            actual: 0,
        })?;
        let bounding_box = BoundingBox::from_points(&vertices);

        Ok(Self {
            id: RegionId::new(),
            name,
            vertices,
            field: field.to_string(),
            source: source.to_string(),
            rules,
            current_color: Color::neutral(),
            centroid,
            bounding_box,
        })
    }
}

/// Trims a region name, rejecting names that are empty afterwards.
pub fn validate_name(name: &str) -> Result<String, CoreError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(CoreError::EmptyName);
    }
    Ok(trimmed.to_string())
}

pub fn validate_vertex_count(count: usize) -> Result<(), CoreError> {
    if !(MIN_VERTICES..=MAX_VERTICES).contains(&count) {
        return Err(CoreError::VertexCount {
            min: MIN_VERTICES,
            max: MAX_VERTICES,
            actual: count,
        });
    }
    Ok(())
}

// ==============================================================================
// Time
// ==============================================================================

/// Inclusive index range `[start, end]` into an hourly series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporalWindow {
    start: usize,
    end: usize,
}

impl TemporalWindow {
    /// Creates a window bounded by the standard 720-step horizon.
    pub fn new(start: usize, end: usize) -> Result<Self, CoreError> {
        Self::with_horizon(start, end, WINDOW_HORIZON)
    }

    pub fn with_horizon(start: usize, end: usize, horizon: usize) -> Result<Self, CoreError> {
        if start > end || end > horizon {
            return Err(CoreError::WindowOutOfBounds {
                start,
                end,
                horizon,
            });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    /// Number of hours spanned, as shown under the timeline.
    pub fn span_hours(&self) -> usize {
        self.end - self.start
    }
}

impl Default for TemporalWindow {
    /// The first day of the timeline.
    fn default() -> Self {
        Self { start: 0, end: 24 }
    }
}

/// Hourly timestamps with one aligned value array per field.
///
/// Missing samples are stored as `NaN` so every array keeps the timestamp length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    timestamps: Vec<NaiveDateTime>,
    fields: BTreeMap<String, Vec<f64>>,
}

impl TimeSeries {
    pub fn new(
        timestamps: Vec<NaiveDateTime>,
        fields: BTreeMap<String, Vec<f64>>,
    ) -> Result<Self, CoreError> {
        for (field, values) in &fields {
            if values.len() != timestamps.len() {
                return Err(CoreError::MisalignedSeries {
                    field: field.clone(),
                    expected: timestamps.len(),
                    actual: values.len(),
                });
            }
        }
        Ok(Self { timestamps, fields })
    }

    pub fn timestamps(&self) -> &[NaiveDateTime] {
        &self.timestamps
    }

    pub fn values(&self, field: &str) -> Option<&[f64]> {
        self.fields.get(field).map(Vec::as_slice)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn into_parts(self) -> (Vec<NaiveDateTime>, BTreeMap<String, Vec<f64>>) {
        (self.timestamps, self.fields)
    }
}
