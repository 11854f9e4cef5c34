use std::{io, result};
use thiserror::Error;

/// The result type of logging operations.
pub type Result<T> = result::Result<T, Error>;

/// The errors of the logging crate.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum Error {
    #[error("a logger instance has already been initialized")]
    AlreadyInitialized,
    #[error("logging config {0} does not exist")]
    NotFound(String),
    #[error("logging configuration is invalid, {0}")]
    InvalidConfig(String),
    #[error("an io error occurred, {0}")]
    Io(String),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err.to_string())
    }
}
