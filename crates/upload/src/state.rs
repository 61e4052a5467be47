use crate::error::{Error, ErrorKind};
use derive_more::Display;
use std::str::FromStr;

/// Outcome state of an upload item, as reported by the remote or decided
/// locally.
///
/// Only [`Ready`](Self::Ready) and [`Failed`](Self::Failed) come from the
/// remote as final answers. [`ClientTimeout`](Self::ClientTimeout) means this
/// client stopped waiting; the remote may still finish on its own.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    #[display("PENDING")]
    Pending,
    #[display("READY")]
    Ready,
    #[display("FAILED")]
    Failed,
    #[display("CLIENT_TIMEOUT")]
    ClientTimeout,
    #[display("ERROR")]
    Error,
}

impl State {
    /// Ready and Failed need an external re-trigger to change.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ready | Self::Failed)
    }
}

impl FromStr for State {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Self::Pending,
            "READY" => Self::Ready,
            "FAILED" => Self::Failed,
            "CLIENT_TIMEOUT" => Self::ClientTimeout,
            "ERROR" => Self::Error,
            _ => exn::bail!(ErrorKind::UnknownState(s.to_string())),
        })
    }
}

/// Where the coordinator is in an item's lifecycle.
#[derive(Debug, Display, Default, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    #[default]
    NotStarted,
    Checking,
    Registering,
    Transferring,
    Polling,
    Finished,
}
