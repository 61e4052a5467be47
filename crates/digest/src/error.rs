//! Digest Error Types
//!
//! Walk errors are fatal to the whole run. Every other kind is recorded on
//! the [`Digest`](crate::Digest) of the file it concerns and never stops the
//! pool.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::{Path, PathBuf};

/// A digest error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for digest operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// File or directory does not exist
    #[display("file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// Access denied while reading or traversing
    #[display("permission denied: {}", _0.display())]
    PermissionDenied(#[error(not(source))] PathBuf),
    /// Walk root exists but is not a directory
    #[display("not a directory: {}", _0.display())]
    NotADirectory(#[error(not(source))] PathBuf),
    /// Path resolved to something other than a regular file
    #[display("not a regular file: {}", _0.display())]
    NotAFile(#[error(not(source))] PathBuf),
    /// Underlying I/O error
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// Images-only digestion was asked to digest something else
    #[display("not an image: {}", _0.display())]
    NotAnImage(#[error(not(source))] PathBuf),
    /// Sniffed as an image but its dimensions could not be read
    #[display("unknown image dimensions: {}", _0.display())]
    Dimensions(#[error(not(source))] PathBuf),
    /// Content could not be hashed
    #[display("checksum failed: {}", _0.display())]
    Checksum(#[error(not(source))] PathBuf),
    /// The walk task went away without reporting an outcome
    #[display("walk interrupted before reporting an outcome")]
    Interrupted,
    /// A blocking digest task could not be joined
    #[display("digest task failed: {}", _0.display())]
    Task(#[error(not(source))] PathBuf),
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
        matches!(self, Self::Io(_) | Self::Task(_))
    }
}
