//! Configuration Error Types

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// An explicitly requested configuration file does not exist
    #[display("configuration file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// File extension is not one of toml, yaml, yml or json
    #[display("unsupported configuration format: {}", _0.display())]
    UnsupportedFormat(#[error(not(source))] PathBuf),
    /// Merged layers did not deserialize
    #[display("invalid configuration")]
    Extract,
    /// Skip pattern is not a valid regular expression
    #[display("invalid skip pattern `{_0}`")]
    InvalidSkip(#[error(not(source))] String),
    /// Worker count outside `1..=MAX_WORKERS`
    #[display("invalid worker count {_0}: must be between 1 and {}", crate::MAX_WORKERS)]
    InvalidWorkers(#[error(not(source))] usize),
    /// Upload method name not recognised
    #[display("invalid upload method `{_0}`")]
    InvalidMethod(#[error(not(source))] String),
    /// A duration that must be positive was zero
    #[display("`{_0}` must be greater than zero")]
    ZeroDuration(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
