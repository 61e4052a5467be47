mod feed;
mod pool;

pub use crate::feed::spawn_feeder;
pub use crate::pool::{PoolHandle, PoolReport, Processor, WorkerPool, default_workers};
pub use tokio_util::sync::CancellationToken;
