//! Engine error type.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SchellingError {
    /// Bad construction arguments or an out-of-range threshold write.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// An agent had to move but every home was occupied.
    #[error("agent at ({row}, {col}) must move but no home is empty")]
    NoVacancy { row: usize, col: usize },

    /// No home has a non-empty neighbour, so the mean similarity has no terms.
    #[error("mean similarity is undefined: no home has a non-empty neighbour")]
    Undefined,
}

pub type SchellingResult<T> = Result<T, SchellingError>;

pub(crate) fn invalid(msg: impl Into<String>) -> SchellingError {
    SchellingError::InvalidParameter(msg.into())
}
