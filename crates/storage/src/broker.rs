//! Time-boxed credential ownership.
//!
//! The broker is the only holder of the current credential. Transfers take a
//! snapshot ([`Session`]) and keep using it even if the broker refreshes
//! underneath them; the next transfer re-checks expiry on its own.

use crate::backend::{StoreConnector, StoreHandle};
use crate::credential::Credential;
use crate::error::{ErrorKind, Result};
use crate::key::object_key;
use async_trait::async_trait;
use exn::ResultExt;
use std::path::Path;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::instrument;

/// External service handing out object-store credentials for a destination.
#[async_trait]
pub trait CredentialIssuer: Send + Sync {
    async fn issue(&self, destination: &str) -> Result<Credential>;
}

/// A credential paired with the store handle built from it.
pub struct Session {
    credential: Credential,
    expires_at: OffsetDateTime,
    store: StoreHandle,
}

impl Session {
    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    pub fn expires_at(&self) -> OffsetDateTime {
        self.expires_at
    }

    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at <= now
    }
}

pub struct CredentialBroker {
    destination: String,
    issuer: Arc<dyn CredentialIssuer>,
    connector: Arc<dyn StoreConnector>,
    current: RwLock<Option<Arc<Session>>>,
}

impl CredentialBroker {
    /// Create a broker for `destination`. No credential is requested until
    /// the first transfer.
    pub fn new(
        destination: impl Into<String>,
        issuer: Arc<dyn CredentialIssuer>,
        connector: Arc<dyn StoreConnector>,
    ) -> Self {
        Self {
            destination: destination.into(),
            issuer,
            connector,
            current: RwLock::new(None),
        }
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Current session, refreshed first if it is missing or expired.
    ///
    /// Fails with [`NoUsableCredential`](ErrorKind::NoUsableCredential) when
    /// the issuer fails or hands back a credential that is already expired.
    pub async fn session(&self) -> Result<Arc<Session>> {
        {
            let current = self.current.read().await;
            if let Some(session) = current.as_ref()
                && !session.is_expired_at(OffsetDateTime::now_utc())
            {
                return Ok(session.clone());
            }
        }

        let mut current = self.current.write().await;
        // Another transfer may have refreshed while we waited for the lock.
        if let Some(session) = current.as_ref()
            && !session.is_expired_at(OffsetDateTime::now_utc())
        {
            return Ok(session.clone());
        }
        let session = self.refresh().await.or_raise(|| ErrorKind::NoUsableCredential(self.destination.clone()))?;
        *current = Some(session.clone());
        Ok(session)
    }

    #[instrument(skip(self), fields(destination = %self.destination))]
    async fn refresh(&self) -> Result<Arc<Session>> {
        let credential = self.issuer.issue(&self.destination).await?;
        let expires_at = credential.expires_at()?;
        if expires_at <= OffsetDateTime::now_utc() {
            exn::bail!(ErrorKind::Expired(credential.expiry.clone()));
        }
        let store = self.connector.connect(&credential)?;
        tracing::info!(credential = %credential.id, %expires_at, store = store.name(), "credential refreshed");
        Ok(Arc::new(Session {
            credential,
            expires_at,
            store,
        }))
    }

    /// Upload `path` as `key` under this broker's destination.
    ///
    /// Expiry is checked before the upload; no PUT is attempted without a
    /// usable credential.
    pub async fn put(&self, key: &str, path: &Path, content_type: &str) -> Result<String> {
        let full_key = object_key(&self.destination, key)?;
        let session = self.session().await?;
        session.store().put(&full_key, path, content_type).await?;
        Ok(full_key)
    }
}
