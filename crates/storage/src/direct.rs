//! Direct HTTP transfer to a pre-authorized URL.

use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use std::path::Path;

/// Single-request upload of a local file to a URL the remote side handed out.
///
/// Implementations make exactly one attempt.
#[async_trait]
pub trait DirectTransfer: Send + Sync {
    async fn put(&self, url: &str, path: &Path, content_type: &str) -> Result<()>;
}

#[cfg(feature = "http")]
pub use self::http::HttpTransfer;
#[cfg(any(test, feature = "mock"))]
pub use self::mock::MockDirect;

#[cfg(any(test, feature = "mock"))]
mod mock {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records every URL it is asked to PUT to, optionally rejecting them all.
    #[derive(Default)]
    pub struct MockDirect {
        reject_with: Option<u16>,
        attempts: AtomicUsize,
        urls: Mutex<Vec<String>>,
    }

    impl MockDirect {
        pub fn rejecting(status: u16) -> Self {
            Self {
                reject_with: Some(status),
                ..Self::default()
            }
        }

        pub fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }

        /// URLs successfully "uploaded" to, in order.
        pub fn urls(&self) -> Vec<String> {
            self.urls.lock().map(|urls| urls.clone()).unwrap_or_default()
        }
    }

    #[async_trait]
    impl DirectTransfer for MockDirect {
        async fn put(&self, url: &str, path: &Path, _content_type: &str) -> Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            tokio::fs::metadata(path).await.map_err(|e| ErrorKind::from_io(e, path))?;
            if let Some(status) = self.reject_with {
                exn::bail!(ErrorKind::Rejected(status));
            }
            if let Ok(mut urls) = self.urls.lock() {
                urls.push(url.to_string());
            }
            Ok(())
        }
    }
}

#[cfg(feature = "http")]
mod http {
    use super::*;
    use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
    use reqwest::{Body, Client};

    #[derive(Debug, Clone, Default)]
    pub struct HttpTransfer {
        client: Client,
    }

    impl HttpTransfer {
        pub fn new(client: Client) -> Self {
            Self { client }
        }
    }

    #[async_trait]
    impl DirectTransfer for HttpTransfer {
        #[tracing::instrument(skip(self, path, content_type))]
        async fn put(&self, url: &str, path: &Path, content_type: &str) -> Result<()> {
            let file = tokio::fs::File::open(path).await.map_err(|e| ErrorKind::from_io(e, path))?;
            let length = file.metadata().await.map_err(|e| ErrorKind::from_io(e, path))?.len();
            let response = self
                .client
                .put(url)
                .header(CONTENT_TYPE, content_type)
                .header(CONTENT_LENGTH, length)
                .body(Body::from(file))
                .send()
                .await
                .map_err(|e| ErrorKind::Network(e.to_string()))?;
            let status = response.status();
            if !status.is_success() {
                exn::bail!(ErrorKind::Rejected(status.as_u16()));
            }
            tracing::debug!(%status, bytes = length, "direct transfer complete");
            Ok(())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn test_missing_file_fails_before_request() {
            let dir = tempfile::tempdir().unwrap();
            let err = HttpTransfer::default()
                .put("http://127.0.0.1:9/upload", &dir.path().join("absent.png"), "image/png")
                .await
                .unwrap_err();
            assert!(matches!(&*err, ErrorKind::NotFound(_)));
        }

        #[tokio::test]
        async fn test_unreachable_host_is_network_error() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("photo.png");
            std::fs::write(&path, b"pixels").unwrap();
            // Port 9 (discard) is not expected to be listening on loopback.
            let err = HttpTransfer::default().put("http://127.0.0.1:9/upload", &path, "image/png").await.unwrap_err();
            assert!(matches!(&*err, ErrorKind::Network(_)));
            assert!(err.is_retryable());
        }
    }
}
