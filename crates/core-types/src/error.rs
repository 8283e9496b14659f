use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("Invalid input for {0}: {1}")]
    InvalidInput(String, String),

    #[error("Polygon must have between {min} and {max} vertices, got {actual}")]
    VertexCount { min: usize, max: usize, actual: usize },

    #[error("Region name must not be empty")]
    EmptyName,

    #[error("Time window [{start}, {end}] is outside [0, {horizon}] or reversed")]
    WindowOutOfBounds { start: usize, end: usize, horizon: usize },

    #[error("Series field '{field}' has {actual} samples but there are {expected} timestamps")]
    MisalignedSeries { field: String, expected: usize, actual: usize },
}
