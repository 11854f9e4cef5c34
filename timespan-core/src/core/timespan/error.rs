use thiserror::Error;

/// The result type of timespan operations.
pub type Result<T> = std::result::Result<T, TimespanError>;

/// The errors which are returned by the timespan accumulator and its units.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimespanError {
    /// The timer was started while it was already running.
    #[error("timespan timer is already running")]
    AlreadyRunning,
    /// The timer was stopped while it wasn't running.
    #[error("timespan timer is not running")]
    NotRunning,
    /// The stop reading lies before the start reading.
    #[error("timespan interval is invalid, stopped at {1} before starting at {0}")]
    InvalidInterval(u64, u64),
    /// An explicit value was set while the timer was running.
    #[error("timespan value cannot be set while the timer is running")]
    RunningConflict,
    #[error("time unit {0} is unknown")]
    UnknownTimeUnit(String),
}
