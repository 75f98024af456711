use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use harbor_health::routing::DEFAULT_WEIGHT_FIELD;

mod commands;
mod report;

#[derive(Parser)]
#[command(
    name = "harbor",
    about = "Harbor: replication health and split-brain diagnostics",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Debug logging for harbor crates (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every probe once and print the report.
    ///
    /// Exit code: 0 Healthy, 1 Degraded, 2 Critical.
    Diagnose {
        /// Config file (default: $HARBOR_CONFIG or /etc/harbor/harbor.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        /// Probe nodes within a tier concurrently
        #[arg(long)]
        concurrent: bool,
        /// Stream audit lines to stderr as they are produced
        #[arg(long)]
        follow: bool,
    },
    /// Parse a captured routing dump and show which backend the VIP resolves to.
    Routes {
        /// Virtual address to look up
        #[arg(long)]
        vip: String,
        /// Dump file (default: stdin)
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// 1-based position of the weight among the fields after `->`
        #[arg(short, long, default_value_t = DEFAULT_WEIGHT_FIELD)]
        weight_field: usize,
    },
    /// Write a scaffold harbor.toml
    Init {
        #[arg(short, long, default_value = "harbor.toml")]
        path: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // stdout carries the report; logs go to stderr.
    let default_filter = if cli.verbose {
        "warn,harbor=debug,harbor_core=debug,harbor_health=debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    match cli.command {
        Commands::Diagnose {
            config,
            format,
            concurrent,
            follow,
        } => commands::diagnose::diagnose(config.as_deref(), format, concurrent, follow).await,
        Commands::Routes {
            vip,
            file,
            weight_field,
        } => commands::routes::routes(&vip, file.as_deref(), weight_field).map(|()| ExitCode::SUCCESS),
        Commands::Init { path, force } => {
            commands::init::init(&path, force).map(|()| ExitCode::SUCCESS)
        }
    }
}
