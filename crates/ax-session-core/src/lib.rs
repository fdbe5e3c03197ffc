//! Invoice session client.
//!
//! [`Orchestrator`] drives the top-level flows (resume on load, create a new
//! invoice, run until the invoice settles). [`ConnectionManager`] owns the
//! stream lifecycle for the single live [`SessionHandle`] kept in the
//! [`SessionStore`]. All stream events funnel through one channel and are
//! handled on one task, so flows interleave but never run in parallel.

pub mod connection;
pub mod orchestrator;
pub mod render;
pub mod store;
pub mod wait;

#[cfg(test)]
mod testing;

pub use connection::{ConnectionManager, Flow, SessionTimings};
pub use orchestrator::{Command, Orchestrator, ResumeOutcome};
pub use render::RenderingBridge;
pub use store::{SessionHandle, SessionPhase, SessionStore};

use ax_api_types::ClosureReason;
use thiserror::Error;

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Confirmed,
    Expired,
    /// The stream closed normally without a closure reason of ours.
    ClosedCleanly,
    /// Abnormal close and the single reconnect did not help.
    ConnectionLost,
    Unloaded,
}

impl From<ClosureReason> for SessionOutcome {
    fn from(reason: ClosureReason) -> Self {
        match reason {
            ClosureReason::Confirmed => Self::Confirmed,
            ClosureReason::Expired => Self::Expired,
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invoice API request failed: {0:#}")]
    Api(anyhow::Error),

    #[error("failed to open invoice stream: {0:#}")]
    Stream(anyhow::Error),

    #[error("no invoice session")]
    NoSession,
}
