//! Storage Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::{Path, PathBuf};

/// A storage error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Local file to transfer does not exist
    #[display("file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// Local file to transfer is not readable
    #[display("permission denied: {}", _0.display())]
    PermissionDenied(#[error(not(source))] PathBuf),
    /// Underlying I/O error
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// Connection-level failure (DNS, TLS, reset, timeout)
    #[display("network error: {_0}")]
    Network(#[error(not(source))] String),
    /// Remote answered with a non-success HTTP status
    #[display("transfer rejected with HTTP {_0}")]
    Rejected(#[error(not(source))] u16),
    /// Object-store specific error
    #[display("backend error: {_0}")]
    BackendError(#[error(not(source))] String),
    /// Object key is empty or escapes its destination prefix
    #[display("invalid object key: {}", _0.display())]
    InvalidKey(#[error(not(source))] PathBuf),
    /// Credential expiry is not an ISO-8601 timestamp
    #[display("unparseable credential expiry: {_0}")]
    InvalidExpiry(#[error(not(source))] String),
    /// Issuer handed out a credential that had already expired
    #[display("credential already expired at {_0}")]
    Expired(#[error(not(source))] String),
    /// Issuer refused or failed to provide a credential
    #[display("credential issuer failed: {_0}")]
    Issuer(#[error(not(source))] String),
    /// No unexpired credential could be obtained; the transfer was not attempted
    #[display("no usable credential for destination {_0}")]
    NoUsableCredential(#[error(not(source))] String),
    /// Every permitted attempt failed
    #[display("transfer failed after {_0} attempts")]
    Exhausted(#[error(not(source))] u32),
}

impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    pub(crate) fn from_io(err: IoError, path: &Path) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io(err),
        }
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Io(_) | Self::Network(_) | Self::BackendError(_) => true,
            Self::Rejected(status) => *status >= 500 || *status == 408 || *status == 429,
            _ => false,
        }
    }
}
