//! Local file digestion.
//!
//! A [`PathProducer`] walks a directory tree and a
//! [`WorkerPool`](ferry_asyncutils::WorkerPool) running [`DigestProcessor`]
//! turns every path it finds into exactly one [`Digest`].

pub mod checksum;
pub mod classify;
mod digest;
pub mod error;
mod stream;
mod walk;

pub use crate::digest::{Digest, DigestOptions, DigestProcessor, digest_path, gigapixels};
pub use crate::stream::{DigestRun, DigestSummary, digest_tree};
pub use crate::walk::{PathProducer, Walk, WalkOutcome, WalkSummary};
