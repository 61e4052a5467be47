//! S3-compatible object store.
//!
//! Works against AWS S3 and the S3-compatible services an issuer may point
//! at (Backblaze B2, MinIO, Tigris...). Credentials are temporary: each
//! [`S3Store`] carries one session token and is discarded when the broker
//! refreshes.

use crate::backend::{ObjectStore, StoreConnector, StoreHandle};
use crate::credential::Credential;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::{BehaviorVersion, Credentials, Region, retry::RetryConfig},
    error::{DisplayErrorContext, SdkError},
    primitives::ByteStream,
};
use exn::ResultExt;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

const PROVIDER_NAME: &str = "ferry-broker";

#[derive(Debug, Clone)]
pub struct S3Store {
    name: String,
    client: Client,
    bucket: String,
}

impl S3Store {
    /// Build a client for the bucket and endpoint named by `credential`.
    pub fn new(credential: &Credential) -> Result<Self> {
        let expires_at = credential.expires_at()?;
        let session_token = Some(credential.session_token.clone()).filter(|token| !token.is_empty());
        let credentials = Credentials::new(
            &credential.id,
            &credential.secret,
            session_token,
            Some(SystemTime::from(expires_at)),
            PROVIDER_NAME,
        );
        let mut config_builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new(credential.region().to_string()))
            // Attempts are owned by `RetryPolicy`, not the SDK.
            .retry_config(RetryConfig::disabled())
            // Use path-style addressing for better compatibility with
            // S3-compatible services (Backblaze, MinIO, etc.)
            .force_path_style(true);
        if !credential.endpoint.is_empty() {
            config_builder = config_builder.endpoint_url(&credential.endpoint);
        }
        let client = Client::from_conf(config_builder.build());
        Ok(Self::from_client(credential.endpoint.clone(), client, credential.bucket.clone()))
    }

    pub fn from_client(name: impl Into<String>, client: Client, bucket: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            client,
            bucket: bucket.into(),
        }
    }

    fn map_sdk_error<E, R>(err: SdkError<E, R>) -> ErrorKind
    where
        E: std::error::Error + 'static,
        R: std::fmt::Debug,
    {
        let message = DisplayErrorContext(&err).to_string();
        match err {
            SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => ErrorKind::Network(message),
            _ => ErrorKind::BackendError(message),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    fn name(&self) -> &str {
        &self.name
    }

    #[tracing::instrument(skip(self, path, content_type), fields(bucket = %self.bucket))]
    async fn put(&self, key: &str, path: &Path, content_type: &str) -> Result<()> {
        // Surface a missing local file as NotFound rather than an opaque stream error.
        tokio::fs::metadata(path).await.map_err(|e| ErrorKind::from_io(e, path))?;
        let body = ByteStream::from_path(path)
            .await
            .or_raise(|| ErrorKind::BackendError(format!("cannot stream {}", path.display())))?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(body)
            .send()
            .await
            .map_err(Self::map_sdk_error)?;
        tracing::debug!("object stored");
        Ok(())
    }
}

/// [`StoreConnector`] producing an [`S3Store`] per credential.
#[derive(Debug, Default, Clone, Copy)]
pub struct S3Connector;

impl StoreConnector for S3Connector {
    fn connect(&self, credential: &Credential) -> Result<StoreHandle> {
        Ok(Arc::new(S3Store::new(credential)?))
    }
}
