//! Upload Error Types
//!
//! Every kind here is terminal for the item it concerns and never for the
//! run: batch and coordinator callers carry on with the next item.

use crate::params::Method;
use derive_more::{Display, Error};
use std::path::PathBuf;

/// An upload error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for upload operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Content with this checksum is already present at the destination
    #[display("content already exists at destination (checksum {_0})")]
    AlreadyExists(#[error(not(source))] String),
    /// The remote refused or failed to create a record
    #[display("registration failed for {_0}")]
    Registration(#[error(not(source))] String),
    /// Bytes could not be moved, after whatever retries the method allows
    #[display("transfer failed for {_0}")]
    Transfer(#[error(not(source))] String),
    /// No unexpired object-store credential could be obtained
    #[display("no usable credential for destination {_0}")]
    NoUsableCredential(#[error(not(source))] String),
    /// A remote state query failed while waiting for a terminal state
    #[display("state query failed for remote id {_0}")]
    Poll(#[error(not(source))] String),
    /// The selected transfer method has no implementation
    #[display("upload method {_0} is not implemented")]
    NotImplemented(#[error(not(source))] Method),
    /// The selected method has no transport configured
    #[display("no transport configured for upload method {_0}")]
    MissingTransport(#[error(not(source))] Method),
    /// Direct transfer needs a reachable source URL
    #[display("direct upload requires a source URL: {}", _0.display())]
    MissingUrl(#[error(not(source))] PathBuf),
    /// Items can only be uploaded once their checksum is known
    #[display("no checksum for {}", _0.display())]
    MissingChecksum(#[error(not(source))] PathBuf),
    /// Remote collaborator error
    #[display("remote error: {_0}")]
    Remote(#[error(not(source))] String),
    /// Method name not recognised
    #[display("unknown upload method `{_0}`")]
    UnknownMethod(#[error(not(source))] String),
    /// Remote reported a state this client does not know
    #[display("unknown remote state: {_0}")]
    UnknownState(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transfer(_) | Self::Poll(_) | Self::Remote(_) | Self::NoUsableCredential(_))
    }
}
