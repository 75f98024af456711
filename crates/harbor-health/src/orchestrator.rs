//! Diagnostic orchestrator: runs every probe tier and assembles the report.
//!
//! A run walks three tiers in order: synchronous-replication nodes,
//! load-balancer nodes (followed by the consensus check), then the
//! asynchronous replica. Severity starts at `Healthy` and only rises:
//! unreachable nodes degrade the run, a consensus conflict makes it
//! critical. A run always yields a report.

use std::future::Future;
use std::time::Duration;

use futures::future::join_all;
use tracing::info;

use harbor_core::config::DEFAULT_TIMEOUT;
use harbor_core::{
    ConsensusResult, DiagnosticReport, HarborConfig, NodeAddress, ProbeMode, Severity, Topology,
};

use crate::audit::{AuditKind, DiagnosticContext};
use crate::command::{probe_lvs_node, CommandConnector, LvsCommands};
use crate::consensus::aggregate;
use crate::database::{probe_async_node, probe_synchronous_node, DatabaseConnector};
use crate::mysql::MySqlConnector;
use crate::routing::RoutingTableParser;
use crate::ssh::SshConnector;

pub const START_BANNER: &str = "--- STARTING HARBOR MASTER DIAGNOSTICS ---";

/// Knobs for one diagnostic run.
#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Bounds each database connect and query.
    pub connect_timeout: Duration,
    /// Bounds each load-balancer session open and command.
    pub command_timeout: Duration,
    pub mode: ProbeMode,
    pub lvs_commands: LvsCommands,
    pub parser: RoutingTableParser,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_TIMEOUT,
            command_timeout: DEFAULT_TIMEOUT,
            mode: ProbeMode::default(),
            lvs_commands: LvsCommands::default(),
            parser: RoutingTableParser::new(),
        }
    }
}

impl From<&HarborConfig> for RunSettings {
    fn from(config: &HarborConfig) -> Self {
        Self {
            connect_timeout: config.probe.connect_timeout,
            command_timeout: config.probe.command_timeout,
            mode: config.probe.mode,
            lvs_commands: LvsCommands::from(&config.commands),
            parser: RoutingTableParser::with_weight_field(config.routing.weight_field),
        }
    }
}

/// Runs diagnostics against a topology through injected transports.
pub struct Diagnostics {
    database: Box<dyn DatabaseConnector>,
    commands: Box<dyn CommandConnector>,
    settings: RunSettings,
}

impl Diagnostics {
    pub fn new(
        database: impl DatabaseConnector + 'static,
        commands: impl CommandConnector + 'static,
    ) -> Self {
        Self {
            database: Box::new(database),
            commands: Box::new(commands),
            settings: RunSettings::default(),
        }
    }

    /// Production transports (MySQL protocol + OpenSSH) configured from `config`.
    pub fn from_config(config: &HarborConfig) -> Self {
        Self::new(MySqlConnector::new(), SshConnector::new(config.ssh.clone()))
            .with_settings(RunSettings::from(config))
    }

    pub fn with_settings(mut self, settings: RunSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_mode(mut self, mode: ProbeMode) -> Self {
        self.settings.mode = mode;
        self
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// Run every probe tier once and return the report.
    pub async fn run_diagnostics(&self, topology: &Topology) -> DiagnosticReport {
        self.run_with_context(topology, DiagnosticContext::new()).await
    }

    /// Like [`run_diagnostics`](Self::run_diagnostics), recording into a
    /// caller-supplied context (for example one created with
    /// [`DiagnosticContext::streaming`]).
    pub async fn run_with_context(&self, topology: &Topology, ctx: DiagnosticContext) -> DiagnosticReport {
        let credentials = topology.credentials();
        let settings = &self.settings;
        info!(
            galera = topology.galera.len(),
            lvs = topology.lvs_nodes.len(),
            async_replica = topology.async_replica.is_some(),
            mode = ?settings.mode,
            "starting diagnostic run"
        );
        ctx.record(AuditKind::Banner, START_BANNER);

        let galera = run_tier(
            settings.mode,
            topology.galera.iter().map(|node| {
                probe_synchronous_node(
                    self.database.as_ref(),
                    &ctx,
                    &node.address,
                    node.name.as_deref(),
                    &credentials,
                    settings.connect_timeout,
                )
            }),
        )
        .await;

        let lvs = run_tier(
            settings.mode,
            topology.lvs_nodes.iter().map(|address| {
                probe_lvs_node(
                    self.commands.as_ref(),
                    &ctx,
                    &settings.lvs_commands,
                    &settings.parser,
                    address,
                    &topology.virtual_address,
                    settings.command_timeout,
                )
            }),
        )
        .await;

        let consensus = aggregate(&lvs);
        record_consensus(&ctx, &consensus, &topology.virtual_address);

        let async_replica = match &topology.async_replica {
            Some(address) => Some(
                probe_async_node(
                    self.database.as_ref(),
                    &ctx,
                    address,
                    &credentials,
                    settings.connect_timeout,
                )
                .await,
            ),
            None => None,
        };

        let status = ctx.severity();
        ctx.record(AuditKind::Banner, format!("--- DIAGNOSTICS COMPLETE: {status} ---"));
        let (audit_log, overall_status) = ctx.finish();

        let report = DiagnosticReport {
            galera,
            async_replica,
            lvs,
            consensus,
            overall_status,
            audit_log,
        };
        info!(
            status = %report.overall_status,
            unreachable = report.unreachable_count(),
            conflict = report.consensus.conflict,
            "diagnostic run complete"
        );
        report
    }
}

/// Await a tier of probes. Results keep input order in both modes.
async fn run_tier<F>(mode: ProbeMode, probes: impl Iterator<Item = F>) -> Vec<F::Output>
where
    F: Future,
{
    match mode {
        ProbeMode::Sequential => {
            let mut results = Vec::new();
            for probe in probes {
                results.push(probe.await);
            }
            results
        }
        ProbeMode::Concurrent => join_all(probes).await,
    }
}

fn record_consensus(ctx: &DiagnosticContext, consensus: &ConsensusResult, virtual_address: &NodeAddress) {
    if consensus.conflict {
        let candidates: Vec<&str> = consensus
            .observed_candidates
            .iter()
            .map(NodeAddress::as_str)
            .collect();
        ctx.record(
            AuditKind::Fail,
            format!(
                "SPLIT BRAIN: LVS nodes route {virtual_address} to different backends: {}",
                candidates.join(", ")
            ),
        );
        ctx.escalate(Severity::Critical);
        return;
    }

    match &consensus.active_writer {
        Some(writer) => ctx.data(format!("LVS consensus: active writer for {virtual_address} is {writer}")),
        None => ctx.data(format!("LVS consensus: no active backend reported for {virtual_address}")),
    }
}
