//! In-memory object store for testing.

use crate::backend::{ObjectStore, StoreConnector, StoreHandle};
use crate::broker::CredentialIssuer;
use crate::credential::Credential;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};
use tokio::sync::RwLock;

/// In-memory object store for testing.
///
/// Objects are stored in a `HashMap` behind a [`RwLock`]. The store can be
/// told to fail its next N puts, and counts every attempt it sees.
#[derive(Default)]
pub struct MockStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
    fail_next: AtomicU32,
    attempts: AtomicUsize,
}

impl MockStore {
    /// Fail the next `failures` puts with a retryable backend error.
    pub fn failing(self, failures: u32) -> Self {
        self.fail_next.store(failures, Ordering::SeqCst);
        self
    }

    /// Number of puts attempted, including failed ones.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub async fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.read().await.get(key).cloned()
    }

    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ObjectStore for MockStore {
    fn name(&self) -> &str {
        "mock"
    }

    async fn put(&self, key: &str, path: &Path, _content_type: &str) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let should_fail = self.fail_next.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok();
        if should_fail {
            exn::bail!(ErrorKind::BackendError("injected failure".to_string()));
        }
        let data = tokio::fs::read(path).await.map_err(|e| ErrorKind::from_io(e, path))?;
        self.objects.write().await.insert(key.to_string(), data);
        Ok(())
    }
}

/// Hands out one shared [`MockStore`] for every credential, remembering
/// which credential ids it was asked to connect with.
#[derive(Default)]
pub struct MockConnector {
    store: Arc<MockStore>,
    connected: std::sync::Mutex<Vec<String>>,
}

impl MockConnector {
    pub fn new(store: Arc<MockStore>) -> Self {
        Self {
            store,
            connected: Default::default(),
        }
    }

    pub fn store(&self) -> &Arc<MockStore> {
        &self.store
    }

    /// Credential ids passed to [`connect`](StoreConnector::connect), in order.
    pub fn connected(&self) -> Vec<String> {
        self.connected.lock().map(|ids| ids.clone()).unwrap_or_default()
    }
}

impl StoreConnector for MockConnector {
    fn connect(&self, credential: &Credential) -> Result<StoreHandle> {
        if let Ok(mut ids) = self.connected.lock() {
            ids.push(credential.id.clone());
        }
        Ok(self.store.clone())
    }
}

/// Issues credentials valid for a fixed window from "now", or refuses.
pub struct MockIssuer {
    validity: Option<Duration>,
    issued: AtomicUsize,
}

impl MockIssuer {
    /// Every credential expires `validity` after it is issued. A negative
    /// window hands out credentials that are already expired.
    pub fn valid_for(validity: Duration) -> Self {
        Self {
            validity: Some(validity),
            issued: AtomicUsize::new(0),
        }
    }

    pub fn refusing() -> Self {
        Self {
            validity: None,
            issued: AtomicUsize::new(0),
        }
    }

    /// Number of issue requests seen, including refused ones.
    pub fn issued(&self) -> usize {
        self.issued.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialIssuer for MockIssuer {
    async fn issue(&self, destination: &str) -> Result<Credential> {
        let serial = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let Some(validity) = self.validity else {
            exn::bail!(ErrorKind::Issuer(format!("refusing to issue for {destination}")));
        };
        let expiry = (OffsetDateTime::now_utc() + validity)
            .format(&Rfc3339)
            .or_raise(|| ErrorKind::Issuer("unformattable expiry".to_string()))?;
        Ok(Credential {
            id: format!("mock-{serial}"),
            secret: "mock-secret".to_string(),
            session_token: "mock-token".to_string(),
            bucket: "mock-bucket".to_string(),
            endpoint: "http://localhost:9000".to_string(),
            region: None,
            expiry,
        })
    }
}
