use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum AnalyticsError {
    #[error("Rule index {index} is out of range for a list of {len} rules")]
    RuleIndexOutOfRange { index: usize, len: usize },

    #[error("Invalid rule edit: {0}")]
    InvalidEdit(String),
}
