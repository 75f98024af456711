//! `harbor diagnose`: one diagnostic run against the configured topology.

use std::path::Path;
use std::process::ExitCode;

use anyhow::Result;
use tracing::info;

use harbor_core::config::default_config_path;
use harbor_core::{HarborConfig, ProbeMode, Severity};
use harbor_health::{DiagnosticContext, Diagnostics};

use crate::report::format_report;
use crate::OutputFormat;

pub async fn diagnose(
    config_path: Option<&Path>,
    format: OutputFormat,
    concurrent: bool,
    follow: bool,
) -> Result<ExitCode> {
    let path = config_path.map_or_else(default_config_path, Path::to_path_buf);
    let config = HarborConfig::from_file(&path)?;
    info!(config = %path.display(), "loaded configuration");

    let mut diagnostics = Diagnostics::from_config(&config);
    if concurrent {
        diagnostics = diagnostics.with_mode(ProbeMode::Concurrent);
    }

    let report = if follow {
        let (ctx, mut stream) = DiagnosticContext::streaming();
        let printer = tokio::spawn(async move {
            while let Some(line) = stream.recv().await {
                eprintln!("{line}");
            }
        });
        let report = diagnostics.run_with_context(&config.topology, ctx).await;
        // The context is gone, so the stream has ended.
        printer.await?;
        report
    } else {
        diagnostics.run_diagnostics(&config.topology).await
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print!("{}", format_report(&report)),
    }

    Ok(exit_code(report.overall_status))
}

pub fn exit_code(status: Severity) -> ExitCode {
    ExitCode::from(status.rank())
}
