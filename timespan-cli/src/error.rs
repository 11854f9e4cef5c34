use thiserror::Error;

use timespan_core::core::config::ConfigError;
use timespan_core::core::metrics::MetricError;
use timespan_core::core::storage::StorageError;

/// The command line specific results.
pub type Result<T> = std::result::Result<T, CliError>;

/// The errors of the command line tool.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("failed to load the config, {0}")]
    Config(#[from] ConfigError),
    #[error("failed to initialize the logger, {0}")]
    Logger(#[from] timespan_logging::Error),
    #[error("invalid metric declaration, {0}")]
    Declaration(#[from] MetricError),
    #[error("failed to execute {0}, {1}")]
    ExecuteFailed(String, String),
    #[error("metric {0} failed to record with {1} error(s)")]
    RecordingFailed(String, u32),
    #[error("storage operation failed, {0}")]
    Storage(#[from] StorageError),
}
