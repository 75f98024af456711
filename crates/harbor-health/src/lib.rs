//! harbor-health: the Harbor diagnostic engine.
//!
//! Probes a replicated database deployment through two transports and
//! folds the observations into a single [`DiagnosticReport`]:
//! synchronous-replication (Galera) nodes and the asynchronous replica are
//! queried over the MySQL protocol; load-balancer (LVS) nodes are inspected
//! over SSH. The load balancers act as witnesses: if they disagree on which
//! backend receives VIP traffic, the run is a split brain.
//!
//! # Architecture
//!
//! ```text
//! Diagnostics::run_diagnostics(topology)
//!   ├── DiagnosticContext (audit lines, running severity, optional live sink)
//!   ├── Galera tier   probe_synchronous_node() ── DatabaseConnector (MySqlConnector)
//!   ├── LVS tier      probe_lvs_node()         ── CommandConnector  (SshConnector)
//!   │                   └── RoutingTableParser → candidate backend
//!   ├── aggregate(lvs results) → ConsensusResult
//!   └── Async tier    probe_async_node()       ── DatabaseConnector
//! ```
//!
//! # Severity
//!
//! A run starts `Healthy`. Any unreachable node raises it to `Degraded`;
//! a consensus conflict raises it to `Critical`. It never goes down.
//!
//! Transports are traits so tests can drive the whole engine with
//! in-memory fakes.
//!
//! [`DiagnosticReport`]: harbor_core::DiagnosticReport

pub mod audit;
pub mod command;
pub mod consensus;
pub mod database;
pub mod error;
pub mod mysql;
pub mod orchestrator;
pub mod routing;
pub mod ssh;

pub use audit::{AuditSink, AuditStream, DiagnosticContext};
pub use command::{probe_lvs_node, CommandConnector, CommandSession, LvsCommands};
pub use consensus::aggregate;
pub use database::{
    probe_async_node, probe_synchronous_node, BoxFuture, DatabaseConnector, DatabaseSession,
    ReplicaThreads,
};
pub use error::{ProbeError, ProbeResult};
pub use mysql::MySqlConnector;
pub use orchestrator::{Diagnostics, RunSettings};
pub use routing::{RouteEntry, RouteLookup, RoutingTableParser};
pub use ssh::SshConnector;
