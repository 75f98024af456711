//! Shared types used across Harbor crates.
//!
//! These are the records a diagnostic run produces. Every probe result is
//! built once per invocation and never mutated afterwards; the orchestrator
//! collects them into a [`DiagnosticReport`].

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque network address of a node (host, host:port, or name).
///
/// Compared and ordered as a string. Nothing in the engine interprets it
/// beyond display; transports decide how to dial it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeAddress(String);

impl NodeAddress {
    pub fn new(address: impl Into<String>) -> Self {
        NodeAddress(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeAddress {
    fn from(s: &str) -> Self {
        NodeAddress(s.to_string())
    }
}

impl From<String> for NodeAddress {
    fn from(s: String) -> Self {
        NodeAddress(s)
    }
}

// ── Severity ──────────────────────────────────────────────────────

/// Overall health verdict. Ordered `Healthy < Degraded < Critical`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Severity {
    #[default]
    Healthy,
    Degraded,
    #[serde(rename = "CRITICAL")]
    Critical,
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Healthy => "Healthy",
            Severity::Degraded => "Degraded",
            Severity::Critical => "CRITICAL",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Severity::Healthy => "✅",
            Severity::Degraded => "⚠️",
            Severity::Critical => "🚨",
        }
    }

    /// Numeric rank, used for lock-free max-reduction.
    pub fn rank(self) -> u8 {
        self as u8
    }

    /// Inverse of [`Severity::rank`]; out-of-range ranks saturate to `Critical`.
    pub fn from_rank(rank: u8) -> Self {
        match rank {
            0 => Severity::Healthy,
            1 => Severity::Degraded,
            _ => Severity::Critical,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ── Probe results ─────────────────────────────────────────────────

/// Observation of one synchronous-replication (Galera) node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GaleraProbeResult {
    pub address: NodeAddress,
    /// Display name from the topology, if one was configured.
    pub name: Option<String>,
    pub reachable: bool,
    /// Membership size reported by the node (`wsrep_cluster_size`).
    pub cluster_size: Option<u32>,
    /// Sync-state label (`wsrep_local_state_comment`), e.g. "Synced".
    pub sync_state: Option<String>,
    /// Whether the node's membership ordinal is zero. This is a positional
    /// convention only; the cluster is multi-writer.
    pub is_primary_ordinal: bool,
    pub error: Option<String>,
}

impl GaleraProbeResult {
    pub fn unreachable(address: NodeAddress, name: Option<String>, error: String) -> Self {
        Self {
            address,
            name,
            reachable: false,
            cluster_size: None,
            sync_state: None,
            is_primary_ordinal: false,
            error: Some(error),
        }
    }
}

/// Thread state reported for a replica that has no replication configured.
pub const REPLICATION_NOT_CONFIGURED: &str = "No";

/// Thread state reported when the replica could not be queried at all.
pub const THREAD_STATE_UNKNOWN: &str = "Unknown";

/// Observation of the asynchronous replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsyncProbeResult {
    pub address: NodeAddress,
    pub reachable: bool,
    /// `Slave_IO_Running` ("Yes", "No", "Connecting", ...).
    pub io_thread_state: String,
    /// `Slave_SQL_Running`.
    pub sql_thread_state: String,
    pub error: Option<String>,
}

impl AsyncProbeResult {
    /// A reachable replica with no replication row.
    pub fn not_configured(address: NodeAddress) -> Self {
        Self {
            address,
            reachable: true,
            io_thread_state: REPLICATION_NOT_CONFIGURED.to_string(),
            sql_thread_state: REPLICATION_NOT_CONFIGURED.to_string(),
            error: None,
        }
    }

    pub fn unreachable(address: NodeAddress, error: String) -> Self {
        Self {
            address,
            reachable: false,
            io_thread_state: THREAD_STATE_UNKNOWN.to_string(),
            sql_thread_state: THREAD_STATE_UNKNOWN.to_string(),
            error: Some(error),
        }
    }

    /// Both replication threads report "Yes".
    pub fn is_replicating(&self) -> bool {
        self.io_thread_state == "Yes" && self.sql_thread_state == "Yes"
    }
}

/// Observation of one load-balancer (LVS) node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LvsProbeResult {
    pub address: NodeAddress,
    pub command_session_ok: bool,
    /// The node's interfaces carry the virtual address.
    pub holds_virtual_address: bool,
    /// The routing dump lists at least one virtual service.
    pub routing_active: bool,
    /// Backend this node routes VIP traffic to, if any.
    pub candidate_backend: Option<NodeAddress>,
    pub error: Option<String>,
}

impl LvsProbeResult {
    pub fn session_failed(address: NodeAddress, error: String) -> Self {
        Self {
            address,
            command_session_ok: false,
            holds_virtual_address: false,
            routing_active: false,
            candidate_backend: None,
            error: Some(error),
        }
    }
}

/// Agreement among load-balancer nodes on the active backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusResult {
    /// Set only when exactly one candidate was observed.
    pub active_writer: Option<NodeAddress>,
    /// True when more than one distinct candidate was observed.
    pub conflict: bool,
    pub observed_candidates: BTreeSet<NodeAddress>,
}

// ── Report ────────────────────────────────────────────────────────

/// Final output of one diagnostic run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub galera: Vec<GaleraProbeResult>,
    #[serde(rename = "async")]
    pub async_replica: Option<AsyncProbeResult>,
    pub lvs: Vec<LvsProbeResult>,
    pub consensus: ConsensusResult,
    pub overall_status: Severity,
    pub audit_log: Vec<String>,
}

impl DiagnosticReport {
    /// Number of database and load-balancer nodes that could not be reached.
    pub fn unreachable_count(&self) -> usize {
        let galera = self.galera.iter().filter(|g| !g.reachable).count();
        let replica = self
            .async_replica
            .as_ref()
            .map_or(0, |a| usize::from(!a.reachable));
        let lvs = self.lvs.iter().filter(|l| !l.command_session_ok).count();
        galera + replica + lvs
    }

    /// The report with its audit log cleared, for comparing structured
    /// fields across runs.
    pub fn without_audit_log(&self) -> Self {
        Self {
            audit_log: Vec::new(),
            ..self.clone()
        }
    }
}
