//! Recursive discovery of candidate files.
//!
//! The walk runs as a single background task. Paths are sent on a bounded
//! channel as they are found; the terminal outcome is delivered separately,
//! after the path channel has closed.

use crate::error::{ErrorKind, Result};
use ferry_asyncutils::CancellationToken;
use regex::Regex;
use std::fs::FileType;
use std::path::{Path, PathBuf};
use tokio::fs::{self, DirEntry};
use tokio::sync::{mpsc, oneshot};
use tracing::instrument;

const DEFAULT_CAPACITY: usize = 256;

enum WalkEntry {
    File(PathBuf),
    Descend(PathBuf),
    Skip,
}

/// Totals reported by a walk that finished without an unrecoverable error.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WalkSummary {
    /// Paths sent downstream.
    pub emitted: u64,
    /// Files excluded by the skip pattern.
    pub skipped: u64,
    /// The walk stopped early because of cancellation.
    pub cancelled: bool,
}

#[derive(Debug, Clone)]
pub struct PathProducer {
    root: PathBuf,
    skip: Option<Regex>,
    capacity: usize,
}

impl PathProducer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            skip: None,
            capacity: DEFAULT_CAPACITY,
        }
    }

    /// Exclude files whose full path matches `skip`. Directories are always
    /// descended.
    pub fn with_skip(mut self, skip: Option<Regex>) -> Self {
        self.skip = skip;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Start walking in the background.
    pub fn spawn(self, cancel: CancellationToken) -> Walk {
        let (paths_tx, paths) = mpsc::channel(self.capacity);
        let (outcome_tx, outcome) = oneshot::channel();
        tokio::spawn(async move {
            let result = self.run(paths_tx, cancel).await;
            match &result {
                Ok(summary) => tracing::debug!(?summary, "walk finished"),
                Err(err) => tracing::warn!(error = ?err, "walk aborted"),
            }
            // Nobody listening for the outcome is fine.
            let _ = outcome_tx.send(result);
        });
        Walk {
            paths,
            outcome: WalkOutcome(outcome),
        }
    }

    fn is_skipped(&self, path: &Path) -> bool {
        self.skip.as_ref().is_some_and(|re| re.is_match(&path.to_string_lossy()))
    }

    // `paths` is moved in so the channel closes as soon as the walk ends.
    #[instrument(skip_all, fields(root = %self.root.display()))]
    async fn run(&self, paths: mpsc::Sender<PathBuf>, cancel: CancellationToken) -> Result<WalkSummary> {
        let metadata = fs::metadata(&self.root).await.map_err(|e| ErrorKind::from_io(e, &self.root))?;
        if !metadata.is_dir() {
            exn::bail!(ErrorKind::NotADirectory(self.root.clone()));
        }

        let mut summary = WalkSummary::default();
        let mut stack = vec![self.root.clone()];
        'dirs: while let Some(current) = stack.pop() {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            let mut entries = fs::read_dir(&current).await.map_err(|e| ErrorKind::from_io(e, &current))?;
            loop {
                // Skipped entries never reach the send below.
                if cancel.is_cancelled() {
                    summary.cancelled = true;
                    break 'dirs;
                }
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(err) => exn::bail!(ErrorKind::from_io(err, &current)),
                };
                let path = match Self::process_entry(entry).await {
                    WalkEntry::File(path) => path,
                    WalkEntry::Descend(dir) => {
                        stack.push(dir);
                        continue;
                    },
                    WalkEntry::Skip => continue,
                };
                if self.is_skipped(&path) {
                    tracing::trace!(path = %path.display(), "skipped by pattern");
                    summary.skipped += 1;
                    continue;
                }
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        summary.cancelled = true;
                        break 'dirs;
                    },
                    sent = paths.send(path) => {
                        if sent.is_err() {
                            tracing::debug!("path receiver dropped, stopping walk");
                            break 'dirs;
                        }
                        summary.emitted += 1;
                    },
                }
            }
        }
        Ok(summary)
    }

    async fn process_entry(entry: DirEntry) -> WalkEntry {
        let path = entry.path();
        let file_type = match entry.file_type().await {
            Ok(file_type) => file_type,
            // Let the digest stage report why this file is unreadable.
            Err(_) => return WalkEntry::File(path),
        };
        if file_type.is_symlink() {
            return match fs::metadata(&path).await {
                // Symlinked directories are not followed.
                Ok(target) if target.is_dir() => WalkEntry::Skip,
                Ok(target) => Self::classify(target.file_type(), path),
                // Dangling link: still a candidate, fails at digestion.
                Err(_) => WalkEntry::File(path),
            };
        }
        if file_type.is_dir() {
            return WalkEntry::Descend(path);
        }
        Self::classify(file_type, path)
    }

    fn classify(file_type: FileType, path: PathBuf) -> WalkEntry {
        if file_type.is_file() { WalkEntry::File(path) } else { WalkEntry::Skip }
    }
}

/// A running walk: its path output and its deferred outcome.
pub struct Walk {
    pub paths: mpsc::Receiver<PathBuf>,
    pub outcome: WalkOutcome,
}

/// Terminal result of a walk, available once the path channel has closed.
pub struct WalkOutcome(oneshot::Receiver<Result<WalkSummary>>);

impl WalkOutcome {
    pub async fn wait(self) -> Result<WalkSummary> {
        match self.0.await {
            Ok(result) => result,
            Err(_) => Err(exn::Exn::from(ErrorKind::Interrupted)),
        }
    }
}
