mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "rollout",
    about = "Build a Rust service and roll it onto Cloud Run with its secrets and endpoint wired in"
)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build, push, and deploy a new revision
    Deploy(DeployArgs),
}

#[derive(Args)]
pub struct DeployArgs {
    /// Source tree to build
    #[arg(long, default_value = ".")]
    source: PathBuf,
    /// Config file (default: <source>/rollout.toml)
    #[arg(long)]
    config: Option<PathBuf>,
    /// GCP project, overriding [service].project
    #[arg(long)]
    project: Option<String>,
    /// Cloud Run service name, overriding [service].name
    #[arg(long)]
    service: Option<String>,
    /// Cloud Run region, overriding [service].region
    #[arg(long)]
    region: Option<String>,
    /// Allow deploying with uncommitted changes
    #[arg(long)]
    allow_dirty: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Deploy(args) => commands::deploy(args).await,
    }
}
