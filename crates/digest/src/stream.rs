use crate::digest::{Digest, DigestOptions, DigestProcessor};
use crate::error::Result;
use crate::walk::{PathProducer, WalkOutcome, WalkSummary};
use ferry_asyncutils::{PoolHandle, PoolReport, WorkerPool};
use regex::Regex;
use std::path::PathBuf;
use std::sync::Arc;

/// A walk feeding a digest pool.
///
/// Read [`digests`](Self::digests) until it yields `None`, then call
/// [`finish`](Self::finish) for the walk outcome and pool report.
pub struct DigestRun {
    pub digests: PoolHandle<Digest>,
    outcome: WalkOutcome,
}

impl DigestRun {
    /// Any digest not yet received is discarded.
    pub async fn finish(self) -> Result<(WalkSummary, PoolReport)> {
        // Joining first drops the pool's input, which unblocks a walk still
        // trying to send.
        let report = match self.digests.join().await {
            Ok(report) => report,
            Err(err) => {
                tracing::error!(error = %err, "digest pool supervisor failed");
                PoolReport::default()
            },
        };
        let walk = self.outcome.wait().await?;
        Ok((walk, report))
    }
}

/// Walk `root` and digest every file found, sharing `pool`'s cancellation
/// between the walk and the workers.
pub fn digest_tree(root: impl Into<PathBuf>, skip: Option<Regex>, options: DigestOptions, pool: &WorkerPool) -> DigestRun {
    let walk = PathProducer::new(root).with_skip(skip).spawn(pool.cancellation().clone());
    let digests = pool.spawn(Arc::new(DigestProcessor::new(options)), walk.paths);
    DigestRun {
        digests,
        outcome: walk.outcome,
    }
}

/// Totals over a set of digests.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct DigestSummary {
    pub files: u64,
    pub images: u64,
    pub failures: u64,
    pub bytes: u64,
    pub gigapixels: f64,
}

impl DigestSummary {
    pub fn record(&mut self, digest: &Digest) {
        self.files += 1;
        if digest.error.is_some() {
            self.failures += 1;
            return;
        }
        if digest.is_image {
            self.images += 1;
        }
        self.bytes += digest.size;
        self.gigapixels += digest.gigapixels;
    }
}

impl<'a> FromIterator<&'a Digest> for DigestSummary {
    fn from_iter<I: IntoIterator<Item = &'a Digest>>(iter: I) -> Self {
        let mut summary = Self::default();
        for digest in iter {
            summary.record(digest);
        }
        summary
    }
}
