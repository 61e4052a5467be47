//! Bounded fan-out/fan-in over a single-item [`Processor`].
//!
//! Every worker pulls from the same input receiver and writes to the same
//! output sender. A supervisor task owns the original output sender and only
//! drops it once every worker has been joined, so the output channel closes
//! exactly once and never while a worker could still produce a value.
//!
//! Cancellation is observed before an item is claimed. An item that has
//! already been claimed is always processed and its output delivered.

use async_trait::async_trait;
use futures::Stream;
use std::num::NonZeroUsize;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{Mutex, mpsc};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Default output buffer per worker.
const OUTPUT_SLOTS_PER_WORKER: usize = 4;

/// A unit of work applied to one item at a time.
///
/// Implementations must never fail the pool: anything that can go wrong
/// belongs in `Output`.
#[async_trait]
pub trait Processor: Send + Sync + 'static {
    type Input: Send + 'static;
    type Output: Send + 'static;

    async fn process(&self, input: Self::Input) -> Self::Output;
}

/// Number of workers to use when the caller has no preference.
pub fn default_workers() -> usize {
    std::thread::available_parallelism().map(NonZeroUsize::get).unwrap_or(1)
}

/// What the supervisor observed once every worker had exited.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PoolReport {
    /// Items claimed from the input and passed to the processor.
    pub processed: usize,
    /// Items whose output could not be delivered because the receiver was dropped.
    pub undelivered: usize,
    /// Workers that panicked. A panicking worker loses the item it held.
    pub panicked: usize,
    /// Whether the pool stopped because of cancellation.
    pub cancelled: bool,
}

#[derive(Debug, Clone)]
pub struct WorkerPool {
    workers: usize,
    capacity: Option<usize>,
    cancel: CancellationToken,
}

impl WorkerPool {
    /// Create a pool with `workers` concurrent workers (at least one).
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            capacity: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Share an existing cancellation token with the pool.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Override the output channel capacity.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity.max(1));
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Start the workers and return a handle to the merged output.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn<P: Processor>(&self, processor: Arc<P>, input: mpsc::Receiver<P::Input>) -> PoolHandle<P::Output> {
        let capacity = self.capacity.unwrap_or(self.workers * OUTPUT_SLOTS_PER_WORKER);
        let (tx, rx) = mpsc::channel(capacity);
        let input = Arc::new(Mutex::new(input));
        let workers = self.workers;
        let cancel = self.cancel.clone();

        let span = tracing::debug_span!("pool", workers);
        let supervisor = tokio::spawn(
            async move {
                let mut set = JoinSet::new();
                for id in 0..workers {
                    set.spawn(
                        work(processor.clone(), input.clone(), tx.clone(), cancel.clone())
                            .instrument(tracing::trace_span!("worker", id)),
                    );
                }

                let mut report = PoolReport::default();
                while let Some(joined) = set.join_next().await {
                    match joined {
                        Ok(tally) => {
                            report.processed += tally.processed;
                            report.undelivered += tally.undelivered;
                        },
                        Err(err) if err.is_panic() => {
                            tracing::error!(error = %err, "worker panicked");
                            report.panicked += 1;
                        },
                        Err(err) => tracing::warn!(error = %err, "worker aborted"),
                    }
                }
                // Only now can the output close: every worker clone is gone.
                drop(tx);
                report.cancelled = cancel.is_cancelled();
                tracing::debug!(?report, "all workers joined");
                report
            }
            .instrument(span),
        );

        PoolHandle { output: rx, supervisor }
    }
}

#[derive(Default)]
struct Tally {
    processed: usize,
    undelivered: usize,
}

async fn work<P: Processor>(
    processor: Arc<P>,
    input: Arc<Mutex<mpsc::Receiver<P::Input>>>,
    output: mpsc::Sender<P::Output>,
    cancel: CancellationToken,
) -> Tally {
    let mut tally = Tally::default();
    loop {
        let claimed = {
            let mut receiver = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                guard = input.lock() => guard,
            };
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                item = receiver.recv() => item,
            }
        };
        let Some(item) = claimed else {
            break;
        };
        let produced = processor.process(item).await;
        tally.processed += 1;
        if output.send(produced).await.is_err() {
            tracing::debug!("output receiver dropped, worker stopping");
            tally.undelivered += 1;
            break;
        }
    }
    tally
}

/// The merged output of a running [`WorkerPool`].
///
/// Yields `None` exactly once, after every worker has exited.
pub struct PoolHandle<T> {
    output: mpsc::Receiver<T>,
    supervisor: JoinHandle<PoolReport>,
}

impl<T> PoolHandle<T> {
    /// Receive the next output, or `None` once the pool has drained.
    pub async fn recv(&mut self) -> Option<T> {
        self.output.recv().await
    }

    /// Wait for the supervisor. Any output not yet received is discarded.
    pub async fn join(self) -> Result<PoolReport, JoinError> {
        drop(self.output);
        self.supervisor.await
    }

    /// Drain every output, then wait for the supervisor.
    pub async fn collect(mut self) -> Result<(Vec<T>, PoolReport), JoinError> {
        let mut outputs = Vec::new();
        while let Some(value) = self.output.recv().await {
            outputs.push(value);
        }
        let report = self.supervisor.await?;
        Ok((outputs, report))
    }

    pub fn into_parts(self) -> (mpsc::Receiver<T>, JoinHandle<PoolReport>) {
        (self.output, self.supervisor)
    }
}

impl<T> Unpin for PoolHandle<T> {}

impl<T> Stream for PoolHandle<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.get_mut().output.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::spawn_feeder;
    use rstest::rstest;
    use std::time::Duration;

    struct Double;

    #[async_trait]
    impl Processor for Double {
        type Input = u64;
        type Output = u64;

        async fn process(&self, input: u64) -> u64 {
            tokio::task::yield_now().await;
            input * 2
        }
    }

    struct Slow;

    #[async_trait]
    impl Processor for Slow {
        type Input = u64;
        type Output = u64;

        async fn process(&self, input: u64) -> u64 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            input
        }
    }

    struct PanicOn(u64);

    #[async_trait]
    impl Processor for PanicOn {
        type Input = u64;
        type Output = u64;

        async fn process(&self, input: u64) -> u64 {
            if input == self.0 {
                panic!("refusing to process {input}");
            }
            input
        }
    }

    fn filled(n: u64) -> mpsc::Receiver<u64> {
        let (tx, rx) = mpsc::channel((n as usize).max(1));
        for i in 0..n {
            tx.try_send(i).unwrap();
        }
        rx
    }

    #[rstest]
    #[case(0, 1)]
    #[case(1, 1)]
    #[case(10, 3)]
    #[case(100, 8)]
    #[case(5, 32)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_every_input_produces_one_output(#[case] n: u64, #[case] workers: usize) {
        let pool = WorkerPool::new(workers);
        let mut handle = pool.spawn(Arc::new(Double), filled(n));

        let mut outputs = Vec::new();
        while let Some(value) = handle.recv().await {
            outputs.push(value);
        }
        // Closed for good.
        assert!(handle.recv().await.is_none());

        outputs.sort_unstable();
        let expected: Vec<u64> = (0..n).map(|i| i * 2).collect();
        assert_eq!(outputs, expected);

        let report = handle.join().await.unwrap();
        assert_eq!(report.processed, n as usize);
        assert!(!report.cancelled);
    }

    #[tokio::test]
    async fn test_zero_workers_is_clamped() {
        let pool = WorkerPool::new(0);
        assert_eq!(pool.workers(), 1);
        let (outputs, _) = pool.spawn(Arc::new(Double), filled(3)).collect().await.unwrap();
        assert_eq!(outputs.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_claiming_but_finishes_in_flight() {
        let cancel = CancellationToken::new();
        let pool = WorkerPool::new(2).with_capacity(1).with_cancellation(cancel.clone());
        let mut handle = pool.spawn(Arc::new(Slow), filled(100));

        let mut received = 0;
        while received < 5 {
            handle.recv().await.unwrap();
            received += 1;
        }
        cancel.cancel();
        while handle.recv().await.is_some() {
            received += 1;
        }

        let report = handle.join().await.unwrap();
        assert!(report.cancelled);
        assert!(received < 100);
        // Everything that was claimed was delivered.
        assert_eq!(report.processed, received);
        assert_eq!(report.undelivered, 0);
    }

    #[tokio::test]
    async fn test_worker_panic_does_not_poison_output() {
        let pool = WorkerPool::new(2);
        let (outputs, report) = pool.spawn(Arc::new(PanicOn(3)), filled(10)).collect().await.unwrap();
        assert_eq!(report.panicked, 1);
        assert_eq!(outputs.len(), 9);
        assert!(!outputs.contains(&3));
    }

    #[tokio::test]
    async fn test_dropped_output_lets_workers_exit() {
        let pool = WorkerPool::new(2).with_capacity(1);
        let report = pool.spawn(Arc::new(Double), filled(50)).join().await.unwrap();
        assert!(report.processed < 50);
    }

    #[tokio::test]
    async fn test_stream_interface() {
        use futures::StreamExt;

        let cancel = CancellationToken::new();
        let input = spawn_feeder(0..20u64, 4, cancel.clone());
        let pool = WorkerPool::new(3).with_cancellation(cancel);
        let sum: u64 = pool.spawn(Arc::new(Double), input).fold(0, |acc, v| async move { acc + v }).await;
        assert_eq!(sum, (0..20u64).map(|i| i * 2).sum());
    }
}
