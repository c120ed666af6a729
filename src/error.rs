//! Error types for valvo
//!
//! Call-path failures are always `tonic::Status` and pass through the
//! interceptor chain untouched. This crate's own error type covers the
//! fallible edges only: metric construction and configuration.

use thiserror::Error;

/// Result type alias for valvo operations
pub type Result<T> = std::result::Result<T, Error>;

/// Construction and configuration errors
#[derive(Error, Debug)]
pub enum Error {
    /// Metric family registration or construction failed
    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Invalid configuration value
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<Error> for tonic::Status {
    fn from(err: Error) -> Self {
        match err {
            Error::Metrics(e) => tonic::Status::internal(format!("metrics: {e}")),
            Error::Config(msg) => tonic::Status::invalid_argument(msg),
        }
    }
}
