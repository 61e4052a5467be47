pub mod backend;
mod broker;
mod credential;
pub mod direct;
pub mod error;
mod key;
mod retry;

pub use crate::backend::{ObjectStore, StoreConnector, StoreHandle};
pub use crate::broker::{CredentialBroker, CredentialIssuer, Session};
pub use crate::credential::{Credential, DEFAULT_REGION};
pub use crate::direct::DirectTransfer;
pub use crate::key::{object_key, validate_key};
pub use crate::retry::RetryPolicy;
