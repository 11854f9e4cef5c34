use thiserror::Error;

use crate::core::storage::StorageError;
use crate::core::timespan::TimespanError;

/// The result type of metric operations.
pub type Result<T> = std::result::Result<T, MetricError>;

/// The errors which can occur while recording a metric.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetricError {
    #[error("lifetime {0} is unknown")]
    UnknownLifetime(String),
    /// The timer of the metric was used incorrectly.
    #[error("invalid timespan state, {0}")]
    Timespan(TimespanError),
    /// The measured value couldn't be stored.
    #[error("failed to store metric value, {0}")]
    Storage(StorageError),
}

impl From<TimespanError> for MetricError {
    fn from(error: TimespanError) -> Self {
        MetricError::Timespan(error)
    }
}

impl From<StorageError> for MetricError {
    fn from(error: StorageError) -> Self {
        MetricError::Storage(error)
    }
}

/// The kind of recording errors which are tracked per metric.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorType {
    /// The metric was used in a state which doesn't allow the operation.
    InvalidState,
    /// The measured value is invalid, e.g. a negative interval.
    InvalidValue,
}

impl From<&TimespanError> for ErrorType {
    fn from(error: &TimespanError) -> Self {
        match error {
            TimespanError::InvalidInterval(_, _) | TimespanError::UnknownTimeUnit(_) => {
                ErrorType::InvalidValue
            }
            _ => ErrorType::InvalidState,
        }
    }
}
