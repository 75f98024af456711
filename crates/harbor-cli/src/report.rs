//! Human-readable report formatting.

use harbor_core::DiagnosticReport;

pub fn format_report(report: &DiagnosticReport) -> String {
    let mut out = String::new();
    let status = report.overall_status;

    out.push_str("\n╔══════════════════════════════════════════╗\n");
    out.push_str("║  Harbor Master Diagnostics               ║\n");
    out.push_str("╠══════════════════════════════════════════╣\n");
    out.push_str(&format!("║  Status:      {:<27}║\n", status.label()));
    out.push_str(&format!("║  Unreachable: {:<27}║\n", report.unreachable_count()));
    out.push_str("╚══════════════════════════════════════════╝\n\n");

    out.push_str(&format!("Galera nodes ({}):\n", report.galera.len()));
    for node in &report.galera {
        let label = match &node.name {
            Some(name) => format!("{name} ({})", node.address),
            None => node.address.to_string(),
        };
        if node.reachable {
            let size = node.cluster_size.map_or_else(|| "?".to_string(), |s| s.to_string());
            let state = node.sync_state.as_deref().unwrap_or("Unknown");
            let ordinal = if node.is_primary_ordinal { ", ordinal 0" } else { "" };
            out.push_str(&format!("  ✅ {label}  {state}, size {size}{ordinal}\n"));
        } else {
            out.push_str(&format!("  ❌ {label}  {}\n", node.error.as_deref().unwrap_or("unreachable")));
        }
    }
    out.push('\n');

    out.push_str(&format!("LVS nodes ({}):\n", report.lvs.len()));
    for node in &report.lvs {
        if !node.command_session_ok {
            out.push_str(&format!(
                "  ❌ {}  {}\n",
                node.address,
                node.error.as_deref().unwrap_or("unreachable")
            ));
            continue;
        }
        let vip = if node.holds_virtual_address { "holds VIP" } else { "standby" };
        let route = match &node.candidate_backend {
            Some(backend) => format!("routes to {backend}"),
            None if node.routing_active => "no backend for VIP".to_string(),
            None => "no virtual services".to_string(),
        };
        out.push_str(&format!("  ✅ {}  {vip}, {route}\n", node.address));
    }
    out.push('\n');

    out.push_str("Consensus:\n");
    let consensus = &report.consensus;
    if consensus.conflict {
        let candidates: Vec<&str> = consensus.observed_candidates.iter().map(|c| c.as_str()).collect();
        out.push_str(&format!("  🚨 SPLIT BRAIN: {}\n", candidates.join(", ")));
    } else if let Some(writer) = &consensus.active_writer {
        out.push_str(&format!("  ✅ active writer {writer}\n"));
    } else {
        out.push_str("  ⚠️  no active writer reported\n");
    }
    out.push('\n');

    if let Some(replica) = &report.async_replica {
        out.push_str("Async replica:\n");
        let symbol = if replica.is_replicating() {
            "✅"
        } else if replica.reachable {
            "⚠️ "
        } else {
            "❌"
        };
        out.push_str(&format!(
            "  {symbol} {}  IO={}, SQL={}\n\n",
            replica.address, replica.io_thread_state, replica.sql_thread_state
        ));
    }

    out.push_str("Audit log:\n");
    for line in &report.audit_log {
        out.push_str(&format!("  {line}\n"));
    }
    out.push_str(&format!("\n{} {}\n", status.symbol(), status.label()));

    out
}
