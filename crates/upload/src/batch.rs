//! Bulk import: register then transfer many items concurrently, without
//! waiting for the remote to process them.

use crate::error::Result;
use crate::item::UploadItem;
use crate::params::{Method, UploadParams};
use crate::remote::RegistrationService;
use crate::state::Phase;
use crate::steps::{Steps, Transports};
use async_trait::async_trait;
use ferry_asyncutils::{PoolHandle, Processor, WorkerPool, spawn_feeder};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::instrument;

/// Outcome for one item of a batch. `result` holds the remote id on success.
#[derive(Debug)]
pub struct BatchResult {
    pub item: UploadItem,
    pub result: Result<String>,
}

impl BatchResult {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// The per-item batch step, run by each pool worker.
pub struct BatchUploader {
    steps: Steps,
    params: UploadParams,
}

impl BatchUploader {
    pub fn new(registry: Arc<dyn RegistrationService>, transports: Transports, params: UploadParams) -> Self {
        Self {
            steps: Steps::new(registry, transports),
            params,
        }
    }

    pub fn method(&self) -> Method {
        self.params.method
    }

    #[instrument(skip_all, fields(file = %item.filename, destination = %item.destination))]
    async fn upload(&self, item: &mut UploadItem) -> Result<String> {
        let method = self.params.method;
        self.steps.preflight(item, method)?;
        let registration = self.steps.register(item, method).await?;
        self.steps.transfer(item, method, self.params.retry).await?;
        Ok(registration.remote_id)
    }
}

#[async_trait]
impl Processor for BatchUploader {
    type Input = UploadItem;
    type Output = BatchResult;

    async fn process(&self, mut item: UploadItem) -> BatchResult {
        let result = self.upload(&mut item).await;
        item.phase = Phase::Finished;
        if let Err(err) = &result {
            tracing::warn!(file = %item.filename, error = ?err, "batch item failed");
            item.error = Some((**err).to_string());
        }
        BatchResult { item, result }
    }
}

/// Fans a stream of items out over a [`WorkerPool`] of [`BatchUploader`]s.
pub struct BatchUploadCoordinator {
    uploader: Arc<BatchUploader>,
    pool: WorkerPool,
}

impl BatchUploadCoordinator {
    pub fn new(uploader: BatchUploader, pool: WorkerPool) -> Self {
        Self {
            uploader: Arc::new(uploader),
            pool,
        }
    }

    /// Process every item received on `items`. One [`BatchResult`] comes out
    /// per item claimed, in completion order.
    pub fn run(&self, items: mpsc::Receiver<UploadItem>) -> PoolHandle<BatchResult> {
        tracing::info!(method = %self.uploader.method(), workers = self.pool.workers(), "starting batch upload");
        self.pool.spawn(self.uploader.clone(), items)
    }

    pub fn run_all<I>(&self, items: I) -> PoolHandle<BatchResult>
    where
        I: IntoIterator<Item = UploadItem> + Send + 'static,
        I::IntoIter: Send,
    {
        let feed = spawn_feeder(items, self.pool.workers(), self.pool.cancellation().clone());
        self.run(feed)
    }
}
