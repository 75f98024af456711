//! Remote command probe for load-balancer nodes.
//!
//! Opens one command session per node and runs two read-only inspections:
//! the interface listing (does this node hold the VIP?) and the routing
//! dump (which backend does it send VIP traffic to?). The dump is handed
//! to the [`RoutingTableParser`].

use std::time::Duration;

use harbor_core::config::CommandsConfig;
use harbor_core::{LvsProbeResult, NodeAddress};

use crate::audit::DiagnosticContext;
use crate::database::BoxFuture;
use crate::error::{bounded, bounded_release, ProbeResult};
use crate::routing::{has_virtual_services, lists_address, RoutingTableParser};

/// An open remote command session.
pub trait CommandSession: Send {
    /// Run a command and return its standard output.
    fn exec<'a>(&'a mut self, command: &'a str) -> BoxFuture<'a, ProbeResult<String>>;

    /// Release the session.
    fn close(self: Box<Self>) -> BoxFuture<'static, ()>;
}

/// Opens command sessions to load-balancer nodes.
pub trait CommandConnector: Send + Sync {
    fn open<'a>(
        &'a self,
        address: &'a NodeAddress,
        timeout: Duration,
    ) -> BoxFuture<'a, ProbeResult<Box<dyn CommandSession>>>;
}

/// The two inspection commands run on each load-balancer node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LvsCommands {
    pub interface_listing: String,
    pub routing_dump: String,
}

impl Default for LvsCommands {
    fn default() -> Self {
        Self::from(&CommandsConfig::default())
    }
}

impl From<&CommandsConfig> for LvsCommands {
    fn from(config: &CommandsConfig) -> Self {
        Self {
            interface_listing: config.interface_listing.clone(),
            routing_dump: config.routing_dump.clone(),
        }
    }
}

struct LvsObservation {
    holds_virtual_address: bool,
    dump: String,
    errors: Vec<String>,
}

/// Probe one load-balancer node.
pub async fn probe_lvs_node(
    connector: &dyn CommandConnector,
    ctx: &DiagnosticContext,
    commands: &LvsCommands,
    parser: &RoutingTableParser,
    address: &NodeAddress,
    virtual_address: &NodeAddress,
    timeout: Duration,
) -> LvsProbeResult {
    ctx.step(format!("SSH connecting to LVS node {address}..."));

    let mut session = match bounded("session open", timeout, connector.open(address, timeout)).await {
        Ok(session) => session,
        Err(e) => {
            ctx.fail(format!("LVS SSH check on {address} failed: {e}"));
            return LvsProbeResult::session_failed(address.clone(), e.to_string());
        }
    };

    let observed = observe(session.as_mut(), ctx, commands, address, virtual_address, timeout).await;
    bounded_release(timeout, session.close()).await;

    let routing_active = has_virtual_services(&observed.dump);
    let lookup = parser.find_active_backend(&observed.dump, virtual_address.as_str());
    ctx.data(format!("{address} routing for {virtual_address}: {}", lookup.describe()));
    ctx.success(format!(
        "LVS check complete for {address}. VIP={}, Routes={routing_active}",
        observed.holds_virtual_address
    ));

    LvsProbeResult {
        address: address.clone(),
        command_session_ok: true,
        holds_virtual_address: observed.holds_virtual_address,
        routing_active,
        candidate_backend: lookup.candidate().cloned(),
        error: (!observed.errors.is_empty()).then(|| observed.errors.join("; ")),
    }
}

/// Run both inspections. The session is up, so a failed command is a
/// warning and its output counts as empty.
async fn observe(
    session: &mut dyn CommandSession,
    ctx: &DiagnosticContext,
    commands: &LvsCommands,
    address: &NodeAddress,
    virtual_address: &NodeAddress,
    timeout: Duration,
) -> LvsObservation {
    let mut errors = Vec::new();

    ctx.step(format!("Checking VIP {virtual_address} on {address}..."));
    let interfaces = inspect(session, ctx, address, &commands.interface_listing, timeout, &mut errors).await;
    let holds_virtual_address = lists_address(&interfaces, virtual_address.as_str());

    ctx.step(format!("Checking IPVS routes on {address}..."));
    let dump = inspect(session, ctx, address, &commands.routing_dump, timeout, &mut errors).await;

    LvsObservation {
        holds_virtual_address,
        dump,
        errors,
    }
}

async fn inspect(
    session: &mut dyn CommandSession,
    ctx: &DiagnosticContext,
    address: &NodeAddress,
    command: &str,
    timeout: Duration,
    errors: &mut Vec<String>,
) -> String {
    match bounded("command", timeout, session.exec(command)).await {
        Ok(output) => output,
        Err(e) => {
            ctx.warning(format!("LVS command on {address} failed: {e}"));
            errors.push(e.to_string());
            String::new()
        }
    }
}
