//! Scripted remote for testing.

use crate::error::{ErrorKind, Result};
use crate::remote::{Registration, RegistrationService, Source, StateReport, StateService};
use crate::state::State;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// In-memory registration and state service.
///
/// Every state query returns the next state in the script; once the script
/// runs out the last state repeats. Records are numbered `remote-1`,
/// `remote-2`, ... in registration order.
pub struct MockRemote {
    existing: HashSet<String>,
    script: Vec<State>,
    failure: Option<String>,
    query_error: bool,
    reject_register: bool,
    exists_calls: AtomicUsize,
    register_calls: AtomicUsize,
    queries: AtomicUsize,
    registered: Mutex<Vec<Source>>,
}

impl Default for MockRemote {
    fn default() -> Self {
        Self {
            existing: HashSet::new(),
            script: vec![State::Ready],
            failure: None,
            query_error: false,
            reject_register: false,
            exists_calls: AtomicUsize::new(0),
            register_calls: AtomicUsize::new(0),
            queries: AtomicUsize::new(0),
            registered: Mutex::new(Vec::new()),
        }
    }
}

impl MockRemote {
    /// Report content with `checksum` as already present at every destination.
    pub fn with_existing(mut self, checksum: impl Into<String>) -> Self {
        self.existing.insert(checksum.into());
        self
    }

    pub fn with_states(mut self, states: impl IntoIterator<Item = State>) -> Self {
        self.script = states.into_iter().collect();
        if self.script.is_empty() {
            self.script.push(State::Pending);
        }
        self
    }

    /// Every query reports `Failed` with `message`.
    pub fn with_failure(mut self, message: impl Into<String>) -> Self {
        self.script = vec![State::Failed];
        self.failure = Some(message.into());
        self
    }

    /// Every query fails.
    pub fn with_query_error(mut self) -> Self {
        self.query_error = true;
        self
    }

    /// Every registration fails.
    pub fn rejecting_registration(mut self) -> Self {
        self.reject_register = true;
        self
    }

    pub fn exists_calls(&self) -> usize {
        self.exists_calls.load(Ordering::SeqCst)
    }

    pub fn register_calls(&self) -> usize {
        self.register_calls.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Sources of successful registrations, in order.
    pub fn registered(&self) -> Vec<Source> {
        self.registered.lock().map(|sources| sources.clone()).unwrap_or_default()
    }

    /// URLs of successful URL-sourced registrations, in order.
    pub fn registered_urls(&self) -> Vec<String> {
        self.registered()
            .into_iter()
            .filter_map(|source| match source {
                Source::Url { url, .. } => Some(url),
                Source::Checksum { .. } => None,
            })
            .collect()
    }
}

#[async_trait]
impl RegistrationService for MockRemote {
    async fn exists(&self, _destination: &str, checksum: &str) -> Result<bool> {
        self.exists_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.existing.contains(checksum))
    }

    async fn register(&self, destination: &str, source: Source) -> Result<Registration> {
        let n = self.register_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.reject_register {
            exn::bail!(ErrorKind::Remote(format!("{destination} refused {}", source.filename())));
        }
        if let Ok(mut sources) = self.registered.lock() {
            sources.push(source);
        }
        Ok(Registration {
            remote_id: format!("remote-{n}"),
            state: State::Pending,
        })
    }
}

#[async_trait]
impl StateService for MockRemote {
    async fn query_state(&self, _destination: &str, remote_id: &str) -> Result<StateReport> {
        let n = self.queries.fetch_add(1, Ordering::SeqCst);
        if self.query_error {
            exn::bail!(ErrorKind::Remote(format!("state of {remote_id} unavailable")));
        }
        let state = self.script.get(n).or(self.script.last()).copied().unwrap_or(State::Pending);
        let error = if state == State::Failed { self.failure.clone() } else { None };
        Ok(StateReport { state, error })
    }
}
