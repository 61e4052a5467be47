use crate::error::{ErrorKind, Result};
use crate::state::{Phase, State};
use exn::OptionExt;
use ferry_digest::Digest;
use std::path::PathBuf;

/// One file on its way to a destination.
///
/// Owned and mutated by a single coordinator run at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadItem {
    pub local_path: PathBuf,
    pub destination: String,
    /// Assigned by the remote on registration.
    pub remote_id: Option<String>,
    pub filename: String,
    pub content_type: String,
    pub checksum: Option<String>,
    pub size: u64,
    /// Reachable URL the direct method uploads to.
    pub source_url: Option<String>,
    pub phase: Phase,
    pub state: Option<State>,
    pub error: Option<String>,
}

impl UploadItem {
    pub fn new(local_path: impl Into<PathBuf>, destination: impl Into<String>) -> Self {
        let local_path = local_path.into();
        let filename = local_path.file_name().map(|name| name.to_string_lossy().into_owned()).unwrap_or_default();
        Self {
            local_path,
            destination: destination.into(),
            remote_id: None,
            filename,
            content_type: ferry_digest::classify::DEFAULT_CONTENT_TYPE.to_string(),
            checksum: None,
            size: 0,
            source_url: None,
            phase: Phase::NotStarted,
            state: None,
            error: None,
        }
    }

    /// Build an item from a successful digest.
    ///
    /// Digests that recorded an error (and so have no checksum) are refused.
    pub fn from_digest(digest: &Digest, destination: impl Into<String>) -> Result<Self> {
        if digest.error.is_some() {
            exn::bail!(ErrorKind::MissingChecksum(digest.path.clone()));
        }
        let checksum = digest.checksum.clone().ok_or_raise(|| ErrorKind::MissingChecksum(digest.path.clone()))?;
        let mut item = Self::new(&digest.path, destination);
        item.filename = digest.filename.clone();
        item.content_type = digest.content_type.clone();
        item.checksum = Some(checksum);
        item.size = digest.size;
        Ok(item)
    }

    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }
}
