//! Per-item upload state machine.
//!
//! ```text
//! NotStarted → Checking → Registering → Transferring → Polling → Ready | Failed | ClientTimeout
//!                  └─ AlreadyExists            any failure ─────────────→ Error
//! ```
//!
//! Polling runs in its own task which queries the remote once per interval.
//! The coordinator races that task against a deadline and cancels it on the
//! way out, whichever side wins.

use crate::error::{ErrorKind, Result};
use crate::item::UploadItem;
use crate::params::{UploadParams, derive_timeout};
use crate::remote::{RegistrationService, StateReport, StateService};
use crate::state::{Phase, State};
use crate::steps::{Steps, Transports};
use exn::{OptionExt, ResultExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

pub struct UploadCoordinator {
    steps: Steps,
    states: Arc<dyn StateService>,
    params: UploadParams,
}

impl UploadCoordinator {
    pub fn new(
        registry: Arc<dyn RegistrationService>,
        states: Arc<dyn StateService>,
        transports: Transports,
        params: UploadParams,
    ) -> Self {
        Self {
            steps: Steps::new(registry, transports),
            states,
            params,
        }
    }

    pub fn params(&self) -> &UploadParams {
        &self.params
    }

    /// Drive `item` to an outcome.
    ///
    /// Returns the final [`State`] when the remote answered (`Ready`,
    /// `Failed`) or the deadline passed (`ClientTimeout`). Every other outcome
    /// is an error, and leaves the item in [`State::Error`]. In both cases the
    /// item's `state`, `remote_id` and `error` describe what happened.
    #[instrument(skip_all, fields(file = %item.filename, destination = %item.destination, method = %self.params.method))]
    pub async fn upload(&self, item: &mut UploadItem) -> Result<State> {
        let result = self.drive(item).await;
        item.phase = Phase::Finished;
        match &result {
            Ok(state) => {
                item.state = Some(*state);
                tracing::info!(%state, remote_id = item.remote_id.as_deref(), "upload settled");
            },
            Err(err) => {
                item.state = Some(State::Error);
                item.error = Some((**err).to_string());
                tracing::warn!(error = ?err, "upload failed");
            },
        }
        result
    }

    async fn drive(&self, item: &mut UploadItem) -> Result<State> {
        let method = self.params.method;
        self.steps.preflight(item, method)?;
        let checksum = item.checksum.clone().ok_or_raise(|| ErrorKind::MissingChecksum(item.local_path.clone()))?;

        item.phase = Phase::Checking;
        let exists = self
            .steps
            .registry()
            .exists(&item.destination, &checksum)
            .await
            .or_raise(|| ErrorKind::Registration(item.filename.clone()))?;
        if exists {
            exn::bail!(ErrorKind::AlreadyExists(checksum));
        }

        let registration = self.steps.register(item, method).await?;
        self.steps.transfer(item, method, self.params.retry).await?;

        item.phase = Phase::Polling;
        let timeout = derive_timeout(item.size, self.params.timeout);
        match self.poll(&item.destination, &registration.remote_id, timeout).await? {
            Some(report) => {
                item.error = report.error;
                Ok(report.state)
            },
            None => {
                item.error = Some(format!("no terminal state within {}s", timeout.as_secs()));
                Ok(State::ClientTimeout)
            },
        }
    }

    /// Race the poll task against `timeout`. `None` means the deadline won.
    async fn poll(&self, destination: &str, remote_id: &str, timeout: Duration) -> Result<Option<StateReport>> {
        let cancel = CancellationToken::new();
        // Stops the poll task however this function exits.
        let _guard = cancel.clone().drop_guard();
        let mut task = tokio::spawn(watch(
            self.states.clone(),
            destination.to_string(),
            remote_id.to_string(),
            self.params.poll_interval,
            cancel.clone(),
        ));

        tokio::select! {
            joined = &mut task => match joined {
                Ok(Ok(Some(report))) => Ok(Some(report)),
                Ok(Ok(None)) => exn::bail!(ErrorKind::Poll(remote_id.to_string())),
                Ok(Err(err)) => Err(err),
                Err(join) => {
                    tracing::error!(error = %join, "poll task failed");
                    exn::bail!(ErrorKind::Poll(remote_id.to_string()))
                },
            },
            _ = tokio::time::sleep(timeout) => {
                tracing::warn!(timeout_secs = timeout.as_secs(), "gave up waiting for a terminal state");
                cancel.cancel();
                // The task observes cancellation between queries and during one.
                let _ = task.await;
                Ok(None)
            },
        }
    }
}

/// Query `remote_id` every `interval` until its state leaves `Pending`.
///
/// Returns `Ok(None)` if cancelled first.
async fn watch(
    states: Arc<dyn StateService>,
    destination: String,
    remote_id: String,
    interval: Duration,
    cancel: CancellationToken,
) -> Result<Option<StateReport>> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(None),
            _ = ticker.tick() => {},
        }
        let report = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(None),
            report = states.query_state(&destination, &remote_id) => {
                report.or_raise(|| ErrorKind::Poll(remote_id.clone()))?
            },
        };
        if report.state != State::Pending {
            return Ok(Some(report));
        }
        tracing::trace!(%remote_id, "still pending");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockRemote;
    use crate::params::Method;
    use ferry_storage::backend::{MockConnector, MockIssuer, MockStore};
    use ferry_storage::direct::MockDirect;
    use ferry_storage::{CredentialBroker, RetryPolicy};
    use tokio::time::Instant;

    struct Fixture {
        _dir: tempfile::TempDir,
        item: UploadItem,
        remote: Arc<MockRemote>,
        store: Arc<MockStore>,
        issuer: Arc<MockIssuer>,
    }

    impl Fixture {
        fn new(remote: MockRemote) -> Self {
            Self::with_store(remote, MockStore::default(), MockIssuer::valid_for(time::Duration::hours(1)))
        }

        fn with_store(remote: MockRemote, store: MockStore, issuer: MockIssuer) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("photo.png");
            std::fs::write(&path, b"pixels").unwrap();
            let item = UploadItem::new(&path, "dest-7").with_checksum("abc123").with_size(6);
            Self {
                _dir: dir,
                item,
                remote: Arc::new(remote),
                store: Arc::new(store),
                issuer: Arc::new(issuer),
            }
        }

        fn coordinator(&self, params: UploadParams) -> UploadCoordinator {
            let broker = CredentialBroker::new(
                "dest-7",
                self.issuer.clone(),
                Arc::new(MockConnector::new(self.store.clone())),
            );
            UploadCoordinator::new(
                self.remote.clone(),
                self.remote.clone(),
                Transports::object_store(Arc::new(broker)),
                params,
            )
        }
    }

    fn fast_retry() -> UploadParams {
        UploadParams {
            retry: RetryPolicy {
                attempts: 5,
                delay: Duration::from_secs(1),
            },
            ..UploadParams::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_after_pending() {
        let mut fx = Fixture::new(MockRemote::default().with_states([State::Pending, State::Pending, State::Ready]));
        let started = Instant::now();

        let state = fx.coordinator(UploadParams::default()).upload(&mut fx.item).await.unwrap();
        assert_eq!(state, State::Ready);
        assert_eq!(fx.item.state, Some(State::Ready));
        assert_eq!(fx.item.phase, Phase::Finished);
        assert_eq!(fx.item.remote_id.as_deref(), Some("remote-1"));
        assert!(fx.item.error.is_none());
        assert_eq!(fx.remote.queries(), 3);
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert_eq!(fx.store.keys().await, vec!["dest-7/abc123/photo.png"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_existing_checksum_never_registers() {
        let mut fx = Fixture::new(MockRemote::default().with_existing("abc123"));

        let err = fx.coordinator(UploadParams::default()).upload(&mut fx.item).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::AlreadyExists(c) if c == "abc123"));
        assert_eq!(fx.remote.exists_calls(), 1);
        assert_eq!(fx.remote.register_calls(), 0);
        assert_eq!(fx.store.attempts(), 0);
        assert_eq!(fx.item.state, Some(State::Error));
        assert!(fx.item.error.as_deref().unwrap().contains("already exists"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_failure_is_not_an_error() {
        let mut fx = Fixture::new(MockRemote::default().with_failure("corrupt image"));

        let state = fx.coordinator(UploadParams::default()).upload(&mut fx.item).await.unwrap();
        assert_eq!(state, State::Failed);
        assert_eq!(fx.item.error.as_deref(), Some("corrupt image"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_yields_client_timeout_and_stops_polling() {
        let mut fx = Fixture::new(MockRemote::default().with_states([State::Pending]));
        let params = UploadParams {
            timeout: Some(Duration::from_secs(5)),
            ..UploadParams::default()
        };

        let state = fx.coordinator(params).upload(&mut fx.item).await.unwrap();
        assert_eq!(state, State::ClientTimeout);
        assert_ne!(state, State::Failed);
        assert_eq!(fx.item.state, Some(State::ClientTimeout));

        let queries = fx.remote.queries();
        assert!((5..=6).contains(&queries), "{queries} queries");
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(fx.remote.queries(), queries);
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_error_is_terminal_error() {
        let mut fx = Fixture::new(MockRemote::default().with_query_error());

        let err = fx.coordinator(UploadParams::default()).upload(&mut fx.item).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Poll(id) if id == "remote-1"));
        assert_eq!(fx.item.state, Some(State::Error));
        assert_eq!(fx.remote.queries(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transfer_succeeds_on_fifth_attempt() {
        let mut fx = Fixture::with_store(
            MockRemote::default().with_states([State::Ready]),
            MockStore::default().failing(4),
            MockIssuer::valid_for(time::Duration::hours(1)),
        );

        let state = fx.coordinator(fast_retry()).upload(&mut fx.item).await.unwrap();
        assert_eq!(state, State::Ready);
        assert_eq!(fx.store.attempts(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transfer_exhausted_is_error() {
        let mut fx = Fixture::with_store(
            MockRemote::default().with_states([State::Ready]),
            MockStore::default().failing(5),
            MockIssuer::valid_for(time::Duration::hours(1)),
        );

        let err = fx.coordinator(fast_retry()).upload(&mut fx.item).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Transfer(_)));
        assert_eq!(fx.store.attempts(), 5);
        assert_eq!(fx.remote.queries(), 0);
        assert_eq!(fx.item.state, Some(State::Error));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_credential_aborts_before_put() {
        let mut fx = Fixture::with_store(
            MockRemote::default().with_states([State::Ready]),
            MockStore::default(),
            MockIssuer::valid_for(time::Duration::seconds(-1)),
        );

        let err = fx.coordinator(fast_retry()).upload(&mut fx.item).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NoUsableCredential(d) if d == "dest-7"));
        assert_eq!(fx.store.attempts(), 0);
        // Not retried.
        assert_eq!(fx.issuer.issued(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_direct_is_single_attempt() {
        let fx = Fixture::new(MockRemote::default().with_states([State::Ready]));
        let direct = Arc::new(MockDirect::rejecting(503));
        let coordinator = UploadCoordinator::new(
            fx.remote.clone(),
            fx.remote.clone(),
            Transports::direct(direct.clone()),
            UploadParams {
                method: Method::Direct,
                ..fast_retry()
            },
        );
        let mut item = fx.item.clone().with_source_url("https://uploads.example.com/put/1");

        let err = coordinator.upload(&mut item).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Transfer(_)));
        assert_eq!(direct.attempts(), 1);
        assert_eq!(fx.remote.registered_urls(), vec!["https://uploads.example.com/put/1".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_direct_without_url_makes_no_remote_call() {
        let fx = Fixture::new(MockRemote::default());
        let coordinator = UploadCoordinator::new(
            fx.remote.clone(),
            fx.remote.clone(),
            Transports::direct(Arc::new(MockDirect::default())),
            UploadParams {
                method: Method::Direct,
                ..UploadParams::default()
            },
        );
        let mut item = fx.item.clone();

        let err = coordinator.upload(&mut item).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::MissingUrl(_)));
        assert_eq!(fx.remote.exists_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_alternate_object_store_is_not_implemented() {
        let mut fx = Fixture::new(MockRemote::default());
        let params = UploadParams {
            method: Method::AlternateObjectStore,
            ..UploadParams::default()
        };

        let err = fx.coordinator(params).upload(&mut fx.item).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotImplemented(Method::AlternateObjectStore)));
        assert_eq!(fx.remote.exists_calls(), 0);
        assert_eq!(fx.remote.register_calls(), 0);
        assert_eq!(fx.item.state, Some(State::Error));
    }
}
