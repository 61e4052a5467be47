use crate::error::{Error, ErrorKind};
use derive_more::Display;
use ferry_storage::RetryPolicy;
use std::str::FromStr;
use std::time::Duration;

const BYTES_PER_MIB: u64 = 1024 * 1024;
/// Floor applied to derived poll deadlines.
pub const MIN_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How bytes reach the destination.
#[derive(Debug, Display, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// One HTTP PUT to a caller-supplied URL, never retried.
    #[display("direct")]
    Direct,
    /// PUT through the credential broker's object store, with retries.
    #[default]
    #[display("object-store")]
    ObjectStore,
    /// Reserved; every item gets [`NotImplemented`](ErrorKind::NotImplemented).
    #[display("alternate-object-store")]
    AlternateObjectStore,
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "direct" | "http" => Self::Direct,
            "object-store" | "s3" => Self::ObjectStore,
            "alternate-object-store" => Self::AlternateObjectStore,
            _ => exn::bail!(ErrorKind::UnknownMethod(s.to_string())),
        })
    }
}

/// Everything a coordinator needs to know about how to upload, passed in
/// explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadParams {
    pub method: Method,
    /// Poll deadline. Derived from the item size when unset.
    pub timeout: Option<Duration>,
    pub retry: RetryPolicy,
    pub poll_interval: Duration,
}

impl Default for UploadParams {
    fn default() -> Self {
        Self {
            method: Method::default(),
            timeout: None,
            retry: RetryPolicy::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Poll deadline for an item of `size` bytes: the explicit value if given,
/// otherwise one second per MiB with a floor of [`MIN_TIMEOUT`].
pub fn derive_timeout(size: u64, explicit: Option<Duration>) -> Duration {
    explicit.unwrap_or_else(|| Duration::from_secs(size / BYTES_PER_MIB).max(MIN_TIMEOUT))
}
