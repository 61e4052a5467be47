//! Remote upload orchestration.
//!
//! [`UploadCoordinator`] takes one item through checking, registration,
//! transfer and polling. [`BatchUploadCoordinator`] runs the register and
//! transfer steps for many items at once and does not poll.

mod batch;
mod coordinator;
pub mod error;
mod item;
#[cfg(any(test, feature = "mock"))]
mod mock;
mod params;
mod remote;
mod state;
mod steps;

pub use crate::batch::{BatchResult, BatchUploadCoordinator, BatchUploader};
pub use crate::coordinator::UploadCoordinator;
pub use crate::item::UploadItem;
#[cfg(any(test, feature = "mock"))]
pub use crate::mock::MockRemote;
pub use crate::params::{DEFAULT_POLL_INTERVAL, MIN_TIMEOUT, Method, UploadParams, derive_timeout};
pub use crate::remote::{Registration, RegistrationService, Source, StateReport, StateService};
pub use crate::state::{Phase, State};
pub use crate::steps::Transports;
