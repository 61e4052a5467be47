//! Boundary to the remote registration and state services.
//!
//! The wire protocol belongs to whoever implements these traits; this crate
//! only drives them.

use crate::error::Result;
use crate::state::State;
use async_trait::async_trait;

/// What a new remote record is created from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Bytes follow through an object store; the record is keyed by checksum.
    Checksum {
        filename: String,
        checksum: String,
        content_type: String,
    },
    /// Bytes are reachable at a URL.
    Url { filename: String, url: String },
}

impl Source {
    pub fn filename(&self) -> &str {
        match self {
            Self::Checksum { filename, .. } | Self::Url { filename, .. } => filename,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub remote_id: String,
    pub state: State,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateReport {
    pub state: State,
    /// Remote explanation, usually only present for failures.
    pub error: Option<String>,
}

#[async_trait]
pub trait RegistrationService: Send + Sync {
    /// Whether content with `checksum` is already present at `destination`.
    async fn exists(&self, destination: &str, checksum: &str) -> Result<bool>;

    /// Create a remote record. Irreversible.
    async fn register(&self, destination: &str, source: Source) -> Result<Registration>;
}

#[async_trait]
pub trait StateService: Send + Sync {
    async fn query_state(&self, destination: &str, remote_id: &str) -> Result<StateReport>;
}
