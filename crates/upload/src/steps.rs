//! Register and transfer steps shared by the single-item coordinator and the
//! batch uploader.

use crate::error::{Error, ErrorKind, Result};
use crate::item::UploadItem;
use crate::params::Method;
use crate::remote::{Registration, RegistrationService, Source};
use crate::state::Phase;
use exn::{OptionExt, ResultExt};
use ferry_storage::error::{Error as StorageError, ErrorKind as StorageErrorKind};
use ferry_storage::{CredentialBroker, DirectTransfer, RetryPolicy};
use std::sync::Arc;

/// Transfer backends available to an uploader. Only the one matching the
/// selected [`Method`] needs to be set.
#[derive(Clone, Default)]
pub struct Transports {
    pub broker: Option<Arc<CredentialBroker>>,
    pub direct: Option<Arc<dyn DirectTransfer>>,
}

impl Transports {
    pub fn object_store(broker: Arc<CredentialBroker>) -> Self {
        Self {
            broker: Some(broker),
            direct: None,
        }
    }

    pub fn direct(direct: Arc<dyn DirectTransfer>) -> Self {
        Self {
            broker: None,
            direct: Some(direct),
        }
    }
}

pub(crate) struct Steps {
    registry: Arc<dyn RegistrationService>,
    transports: Transports,
}

impl Steps {
    pub(crate) fn new(registry: Arc<dyn RegistrationService>, transports: Transports) -> Self {
        Self { registry, transports }
    }

    pub(crate) fn registry(&self) -> &Arc<dyn RegistrationService> {
        &self.registry
    }

    /// Reject items that cannot possibly be uploaded with `method` before any
    /// remote call is made.
    pub(crate) fn preflight(&self, item: &UploadItem, method: Method) -> Result<()> {
        match method {
            Method::AlternateObjectStore => exn::bail!(ErrorKind::NotImplemented(method)),
            Method::Direct => {
                if item.source_url.is_none() {
                    exn::bail!(ErrorKind::MissingUrl(item.local_path.clone()));
                }
                if self.transports.direct.is_none() {
                    exn::bail!(ErrorKind::MissingTransport(method));
                }
            },
            Method::ObjectStore => {
                if item.checksum.is_none() {
                    exn::bail!(ErrorKind::MissingChecksum(item.local_path.clone()));
                }
                if self.transports.broker.is_none() {
                    exn::bail!(ErrorKind::MissingTransport(method));
                }
            },
        }
        Ok(())
    }

    fn source(item: &UploadItem, method: Method) -> Result<Source> {
        Ok(match method {
            Method::Direct => Source::Url {
                filename: item.filename.clone(),
                url: item.source_url.clone().ok_or_raise(|| ErrorKind::MissingUrl(item.local_path.clone()))?,
            },
            Method::ObjectStore => Source::Checksum {
                filename: item.filename.clone(),
                checksum: item.checksum.clone().ok_or_raise(|| ErrorKind::MissingChecksum(item.local_path.clone()))?,
                content_type: item.content_type.clone(),
            },
            Method::AlternateObjectStore => exn::bail!(ErrorKind::NotImplemented(method)),
        })
    }

    /// Create the remote record and store its id and initial state on the item.
    pub(crate) async fn register(&self, item: &mut UploadItem, method: Method) -> Result<Registration> {
        item.phase = Phase::Registering;
        let source = Self::source(item, method)?;
        let registration = self
            .registry
            .register(&item.destination, source)
            .await
            .or_raise(|| ErrorKind::Registration(item.filename.clone()))?;
        tracing::debug!(remote_id = %registration.remote_id, state = %registration.state, "registered");
        item.remote_id = Some(registration.remote_id.clone());
        item.state = Some(registration.state);
        Ok(registration)
    }

    /// Move the item's bytes with `method`. Direct transfers get one attempt;
    /// object-store transfers follow `retry`.
    pub(crate) async fn transfer(&self, item: &mut UploadItem, method: Method, retry: RetryPolicy) -> Result<()> {
        item.phase = Phase::Transferring;
        let item = &*item;
        let result = match method {
            Method::Direct => {
                let direct = self.transports.direct.as_ref().ok_or_raise(|| ErrorKind::MissingTransport(method))?;
                let url = item.source_url.as_deref().ok_or_raise(|| ErrorKind::MissingUrl(item.local_path.clone()))?;
                direct.put(url, &item.local_path, &item.content_type).await
            },
            Method::ObjectStore => {
                let broker = self.transports.broker.as_ref().ok_or_raise(|| ErrorKind::MissingTransport(method))?;
                let key = Self::object_key(item)?;
                let (key, path, content_type) = (key.as_str(), item.local_path.as_path(), item.content_type.as_str());
                retry
                    .run(move |attempt| {
                        tracing::debug!(attempt, "object-store transfer attempt");
                        async move { broker.put(key, path, content_type).await.map(|_| ()) }
                    })
                    .await
            },
            Method::AlternateObjectStore => exn::bail!(ErrorKind::NotImplemented(method)),
        };
        result.map_err(|err| Self::transfer_error(err, item))
    }

    /// `{checksum}/{filename}`, so same-named files from different folders
    /// never share a key within a destination.
    fn object_key(item: &UploadItem) -> Result<String> {
        let checksum = item.checksum.as_deref().ok_or_raise(|| ErrorKind::MissingChecksum(item.local_path.clone()))?;
        Ok(format!("{checksum}/{}", item.filename))
    }

    fn transfer_error(err: StorageError, item: &UploadItem) -> Error {
        let kind = match &*err {
            StorageErrorKind::NoUsableCredential(_) => ErrorKind::NoUsableCredential(item.destination.clone()),
            _ => ErrorKind::Transfer(item.filename.clone()),
        };
        err.raise(kind)
    }
}
