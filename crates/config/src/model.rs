use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use ferry_asyncutils::default_workers;
use ferry_digest::DigestOptions;
use ferry_storage::RetryPolicy;
use ferry_upload::{DEFAULT_POLL_INTERVAL, Method, UploadParams};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound on any configured worker count.
pub const MAX_WORKERS: usize = 512;

/// Configuration as written in files and environment variables.
///
/// Nothing here is validated; [`Config::into_settings`] does that.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub digest: DigestConfig,
    pub upload: UploadConfig,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DigestConfig {
    /// Regular expression matched against full file paths to leave out.
    pub skip: Option<String>,
    /// Defaults to the available parallelism.
    pub workers: Option<usize>,
    pub images_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub method: String,
    /// Poll deadline; derived from each item's size when unset.
    pub timeout_secs: Option<u64>,
    pub retry_attempts: u32,
    pub retry_delay_secs: u64,
    pub poll_interval_secs: u64,
    /// Batch upload workers. Defaults to the available parallelism.
    pub workers: Option<usize>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            method: Method::default().to_string(),
            timeout_secs: None,
            retry_attempts: retry.attempts,
            retry_delay_secs: retry.delay.as_secs(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL.as_secs(),
            workers: None,
        }
    }
}

/// Validated configuration, in the types the rest of the workspace consumes.
#[derive(Debug, Clone)]
pub struct Settings {
    pub digest: DigestSettings,
    pub upload: UploadSettings,
}

#[derive(Debug, Clone)]
pub struct DigestSettings {
    pub options: DigestOptions,
    pub skip: Option<Regex>,
    pub workers: usize,
}

#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub params: UploadParams,
    pub workers: usize,
}

impl Config {
    pub fn into_settings(self) -> Result<Settings> {
        Ok(Settings {
            digest: self.digest.into_settings()?,
            upload: self.upload.into_settings()?,
        })
    }
}

impl DigestConfig {
    fn into_settings(self) -> Result<DigestSettings> {
        let skip = match self.skip.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(pattern) => Some(Regex::new(pattern).or_raise(|| ErrorKind::InvalidSkip(pattern.to_string()))?),
        };
        Ok(DigestSettings {
            options: DigestOptions {
                images_only: self.images_only,
            },
            skip,
            workers: workers(self.workers)?,
        })
    }
}

impl UploadConfig {
    fn into_settings(self) -> Result<UploadSettings> {
        let method: Method = self.method.parse::<Method>().or_raise(|| ErrorKind::InvalidMethod(self.method.clone()))?;
        if self.timeout_secs == Some(0) {
            exn::bail!(ErrorKind::ZeroDuration("upload.timeout_secs"));
        }
        if self.poll_interval_secs == 0 {
            exn::bail!(ErrorKind::ZeroDuration("upload.poll_interval_secs"));
        }
        Ok(UploadSettings {
            params: UploadParams {
                method,
                timeout: self.timeout_secs.map(Duration::from_secs),
                retry: RetryPolicy {
                    attempts: self.retry_attempts,
                    delay: Duration::from_secs(self.retry_delay_secs),
                },
                poll_interval: Duration::from_secs(self.poll_interval_secs),
            },
            workers: workers(self.workers)?,
        })
    }
}

fn workers(configured: Option<usize>) -> Result<usize> {
    match configured {
        None => Ok(default_workers().min(MAX_WORKERS)),
        Some(n) if (1..=MAX_WORKERS).contains(&n) => Ok(n),
        Some(n) => exn::bail!(ErrorKind::InvalidWorkers(n)),
    }
}
