//! Object-store trait and implementations.
//!
//! An [`ObjectStore`] is bound to exactly one credential. It is built by a
//! [`StoreConnector`] whenever the [`CredentialBroker`](crate::CredentialBroker)
//! obtains a fresh credential, and dropped once the last transfer holding it
//! finishes.

#[cfg(any(test, feature = "mock"))]
mod mock;
#[cfg(feature = "s3")]
mod s3;

#[cfg(any(test, feature = "mock"))]
pub use self::mock::{MockConnector, MockIssuer, MockStore};
#[cfg(feature = "s3")]
pub use self::s3::{S3Connector, S3Store};
use crate::credential::Credential;
use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

pub type StoreHandle = Arc<dyn ObjectStore>;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Name of the store (used for logging only).
    fn name(&self) -> &str;

    /// Upload the file at `path` as `key`, streaming it from disk.
    ///
    /// `key` is the full object key, already scoped to its destination.
    async fn put(&self, key: &str, path: &Path, content_type: &str) -> Result<()>;
}

/// Builds an [`ObjectStore`] bound to one credential.
pub trait StoreConnector: Send + Sync {
    fn connect(&self, credential: &Credential) -> Result<StoreHandle>;
}
