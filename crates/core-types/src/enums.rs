use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The comparison a `ColorRule` applies between a metric value and its threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonOp {
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">=")]
    Ge,
    /// Tolerant equality, see `EQUALITY_TOLERANCE`.
    #[serde(rename = "=")]
    Eq,
}

impl ComparisonOp {
    pub const ALL: [ComparisonOp; 5] = [
        ComparisonOp::Lt,
        ComparisonOp::Gt,
        ComparisonOp::Le,
        ComparisonOp::Ge,
        ComparisonOp::Eq,
    ];

    /// The operator as written in rule definitions (`"<"`, `">="`, ...).
    pub fn symbol(&self) -> &'static str {
        match self {
            ComparisonOp::Lt => "<",
            ComparisonOp::Gt => ">",
            ComparisonOp::Le => "<=",
            ComparisonOp::Ge => ">=",
            ComparisonOp::Eq => "=",
        }
    }

    /// Human-readable label for rule editors.
    pub fn label(&self) -> &'static str {
        match self {
            ComparisonOp::Lt => "Less than",
            ComparisonOp::Gt => "Greater than",
            ComparisonOp::Le => "Less than or equal",
            ComparisonOp::Ge => "Greater than or equal",
            ComparisonOp::Eq => "Equal to",
        }
    }
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for ComparisonOp {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ComparisonOp::ALL
            .into_iter()
            .find(|op| op.symbol() == s.trim())
            .ok_or_else(|| CoreError::InvalidInput("operator".to_string(), s.to_string()))
    }
}
