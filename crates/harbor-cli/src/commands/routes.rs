//! `harbor routes`: run the routing parser over a captured dump.

use std::fmt::Write as _;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};

use harbor_health::routing::has_virtual_services;
use harbor_health::RoutingTableParser;

pub fn routes(vip: &str, file: Option<&Path>, weight_field: usize) -> Result<()> {
    let dump = match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut dump = String::new();
            std::io::stdin()
                .read_to_string(&mut dump)
                .context("failed to read routing dump from stdin")?;
            dump
        }
    };

    let parser = RoutingTableParser::with_weight_field(weight_field);
    print!("{}", explain(&parser, &dump, vip));
    Ok(())
}

/// Describe how the parser reads `dump` for `vip`.
pub fn explain(parser: &RoutingTableParser, dump: &str, vip: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Virtual address:  {vip}");
    let _ = writeln!(out, "Weight field:     {}", parser.weight_field());
    let _ = writeln!(out, "Virtual services: {}", if has_virtual_services(dump) { "yes" } else { "no" });

    if let Some(entries) = parser.section_entries(dump, vip) {
        let _ = writeln!(out, "Entries:");
        for entry in &entries {
            let _ = writeln!(out, "  -> {:<20} weight={}", entry.backend.as_str(), entry.weight);
        }
    }

    let lookup = parser.find_active_backend(dump, vip);
    let _ = writeln!(out, "Result:           {}", lookup.describe());
    out
}
