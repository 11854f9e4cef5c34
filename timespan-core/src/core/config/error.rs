use thiserror::Error;

/// The result type of the config package.
pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("config file {0} doesn't exist")]
    NotFound(String),
    #[error("failed to read config file {0}, {1}")]
    Io(String, String),
}
