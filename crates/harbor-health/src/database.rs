//! Remote database probes.
//!
//! Two point-in-time status probes run over the database wire protocol:
//! Galera membership/sync state for synchronous-tier nodes, and replication
//! thread state for the asynchronous replica. Transport is abstracted behind
//! [`DatabaseConnector`] so the probes can be driven by a mock in tests.
//!
//! Each probe holds exactly one session and closes it on every exit path.
//! Failures never escape: they become `reachable = false` plus a `FAIL:`
//! audit line that escalates the run to `Degraded`.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use harbor_core::{AsyncProbeResult, Credentials, GaleraProbeResult, NodeAddress};

use crate::audit::DiagnosticContext;
use crate::error::{bounded, bounded_release, ProbeError, ProbeResult};

/// Boxed future alias for transport operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Galera status variables read by the synchronous-tier probe.
pub const WSREP_CLUSTER_SIZE: &str = "wsrep_cluster_size";
pub const WSREP_LOCAL_INDEX: &str = "wsrep_local_index";
pub const WSREP_LOCAL_STATE_COMMENT: &str = "wsrep_local_state_comment";

/// Replication thread states from one replica status row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaThreads {
    pub io_running: String,
    pub sql_running: String,
}

/// An open session to a database node.
pub trait DatabaseSession: Send {
    /// Value of a global status variable, or `None` if the server has no
    /// such variable.
    fn status_value<'a>(&'a mut self, variable: &'a str) -> BoxFuture<'a, ProbeResult<Option<String>>>;

    /// Replica thread states, or `None` if replication is not configured.
    fn replica_threads(&mut self) -> BoxFuture<'_, ProbeResult<Option<ReplicaThreads>>>;

    /// Release the session.
    fn close(self: Box<Self>) -> BoxFuture<'static, ()>;
}

/// Opens database sessions.
pub trait DatabaseConnector: Send + Sync {
    fn connect<'a>(
        &'a self,
        address: &'a NodeAddress,
        credentials: &'a Credentials,
        timeout: Duration,
    ) -> BoxFuture<'a, ProbeResult<Box<dyn DatabaseSession>>>;
}

/// Status observed on a reachable Galera node.
struct GaleraStatus {
    cluster_size: Option<u32>,
    local_index: Option<u64>,
    sync_state: Option<String>,
}

/// Probe one synchronous-replication node.
pub async fn probe_synchronous_node(
    connector: &dyn DatabaseConnector,
    ctx: &DiagnosticContext,
    address: &NodeAddress,
    name: Option<&str>,
    credentials: &Credentials,
    timeout: Duration,
) -> GaleraProbeResult {
    let name = name.map(str::to_string);
    ctx.step(format!("Connecting to Galera node at {address}..."));

    let mut session = match bounded("connect", timeout, connector.connect(address, credentials, timeout)).await {
        Ok(session) => session,
        Err(e) => {
            ctx.fail(format!("MariaDB check on {address} failed: {e}"));
            return GaleraProbeResult::unreachable(address.clone(), name, e.to_string());
        }
    };
    ctx.success(format!("Connected to {address}"));

    ctx.step(format!("Checking Galera status on {address}..."));
    let status = read_galera_status(session.as_mut(), timeout).await;
    bounded_release(timeout, session.close()).await;

    match status {
        Ok(status) => {
            ctx.data(format!(
                "{address} Size={}, Index={}, State={}",
                display_opt(status.cluster_size),
                display_opt(status.local_index),
                status.sync_state.as_deref().unwrap_or("Unknown"),
            ));
            GaleraProbeResult {
                address: address.clone(),
                name,
                reachable: true,
                cluster_size: status.cluster_size,
                sync_state: status.sync_state,
                // Ordinal 0 is the conventional "first member", not a write master.
                is_primary_ordinal: status.local_index == Some(0),
                error: None,
            }
        }
        Err(e) => {
            ctx.fail(format!("MariaDB check on {address} failed: {e}"));
            GaleraProbeResult::unreachable(address.clone(), name, e.to_string())
        }
    }
}

async fn read_galera_status(
    session: &mut dyn DatabaseSession,
    timeout: Duration,
) -> ProbeResult<GaleraStatus> {
    let size = bounded("query", timeout, session.status_value(WSREP_CLUSTER_SIZE)).await?;
    let index = bounded("query", timeout, session.status_value(WSREP_LOCAL_INDEX)).await?;
    let state = bounded("query", timeout, session.status_value(WSREP_LOCAL_STATE_COMMENT)).await?;

    let status = GaleraStatus {
        cluster_size: size.and_then(|v| v.trim().parse().ok()),
        local_index: index.and_then(|v| v.trim().parse().ok()),
        sync_state: state,
    };
    // Without membership size and sync state the node is not a usable
    // cluster member, whatever else it answers.
    if status.cluster_size.is_none() || status.sync_state.is_none() {
        return Err(ProbeError::Query("wsrep status unavailable".to_string()));
    }
    Ok(status)
}

/// Probe the asynchronous replica.
pub async fn probe_async_node(
    connector: &dyn DatabaseConnector,
    ctx: &DiagnosticContext,
    address: &NodeAddress,
    credentials: &Credentials,
    timeout: Duration,
) -> AsyncProbeResult {
    ctx.step(format!("Connecting to Async node at {address}..."));

    let mut session = match bounded("connect", timeout, connector.connect(address, credentials, timeout)).await {
        Ok(session) => session,
        Err(e) => {
            ctx.fail(format!("MariaDB check on {address} failed: {e}"));
            return AsyncProbeResult::unreachable(address.clone(), e.to_string());
        }
    };
    ctx.success(format!("Connected to {address}"));

    ctx.step(format!("Checking Async Slave status on {address}..."));
    let threads = bounded("query", timeout, session.replica_threads()).await;
    bounded_release(timeout, session.close()).await;

    match threads {
        Ok(Some(threads)) => {
            ctx.data(format!(
                "{address} IO={}, SQL={}",
                threads.io_running, threads.sql_running
            ));
            AsyncProbeResult {
                address: address.clone(),
                reachable: true,
                io_thread_state: threads.io_running,
                sql_thread_state: threads.sql_running,
                error: None,
            }
        }
        Ok(None) => {
            ctx.warning(format!("No replication found on {address}"));
            AsyncProbeResult::not_configured(address.clone())
        }
        Err(e) => {
            ctx.fail(format!("MariaDB check on {address} failed: {e}"));
            AsyncProbeResult::unreachable(address.clone(), e.to_string())
        }
    }
}

fn display_opt<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "?".to_string(), |v| v.to_string())
}
