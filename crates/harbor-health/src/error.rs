//! Error types for remote probes.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

/// Result type alias for probe transport operations.
pub type ProbeResult<T> = Result<T, ProbeError>;

/// Failures a probe can hit while talking to a remote node.
///
/// None of these escape a probe: they are folded into the probe's result
/// record and the audit log.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("query failed: {0}")]
    Query(String),

    #[error("command `{command}` failed: {reason}")]
    Command { command: String, reason: String },
}

/// Run `fut` under `timeout`, mapping expiry to [`ProbeError::Timeout`].
pub async fn bounded<T, F>(operation: &'static str, timeout: Duration, fut: F) -> ProbeResult<T>
where
    F: Future<Output = ProbeResult<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(ProbeError::Timeout { operation, timeout }),
    }
}

/// Run a session release under `timeout`. A release that does not finish
/// in time is abandoned; the session is dropped with it.
pub async fn bounded_release<F>(timeout: Duration, fut: F)
where
    F: Future<Output = ()>,
{
    if tokio::time::timeout(timeout, fut).await.is_err() {
        debug!(?timeout, "session release timed out, abandoning it");
    }
}
