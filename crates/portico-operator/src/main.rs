//! Portico - Kubernetes operator for API gateway deployments

use std::time::Duration;

use clap::{Parser, Subcommand};
use kube::Client;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use portico_common::FIELD_MANAGER;
use portico_gateway::ControllerConfig;
use portico_operator::controller_runner::build_gateway_controller;
use portico_operator::startup::{ensure_crds_installed, gateway_crd_yaml};

/// Portico - reconciles Gateway resources into running gateways
#[derive(Parser, Debug)]
#[command(name = "portico", version, about, long_about = None)]
struct Cli {
    /// Generate the CRD manifest and exit
    #[arg(long)]
    crd: bool,

    /// Only watch this namespace (all namespaces when unset)
    #[arg(long, env = "WATCH_NAMESPACE")]
    watch_namespace: Option<String>,

    /// Requeue interval after a clean pass
    #[arg(long, env = "STEADY_REQUEUE_SECS", default_value_t = 30)]
    steady_requeue_secs: u64,

    /// Requeue interval after a failed status write
    #[arg(long, env = "STATUS_RETRY_SECS", default_value_t = 10)]
    status_retry_secs: u64,

    /// Requeue interval after a failed pass
    #[arg(long, env = "ERROR_REQUEUE_SECS", default_value_t = 10)]
    error_requeue_secs: u64,

    /// Field manager for writes and status patches
    #[arg(long, default_value = FIELD_MANAGER)]
    field_manager: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as controller (default mode)
    Controller,
}

impl Cli {
    fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            steady_requeue: Duration::from_secs(self.steady_requeue_secs),
            status_retry: Duration::from_secs(self.status_retry_secs),
            error_requeue: Duration::from_secs(self.error_requeue_secs),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.crd {
        println!("{}", gateway_crd_yaml()?);
        return Ok(());
    }

    match cli.command {
        Some(Commands::Controller) | None => run_controller(&cli).await,
    }
}

async fn run_controller(cli: &Cli) -> anyhow::Result<()> {
    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("failed to create Kubernetes client: {}", e))?;

    ensure_crds_installed(&client, &cli.field_manager).await?;

    tracing::info!("starting controllers");
    build_gateway_controller(
        client,
        cli.watch_namespace.as_deref(),
        &cli.field_manager,
        cli.controller_config(),
    )
    .await;

    tracing::info!("controllers stopped");
    Ok(())
}
