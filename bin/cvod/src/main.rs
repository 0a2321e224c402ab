//! ---
//! cvo_section: "01-core-functionality"
//! cvo_subsection: "binary"
//! cvo_type: "source"
//! cvo_scope: "code"
//! cvo_description: "Binary entrypoint for the cluster version operator daemon."
//! cvo_version: "v0.0.0-prealpha"
//! cvo_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use cvo_common::{flush_tracing, init_tracing, OperatorConfig, VersionInfo, COMPONENT_NAME, POD_NAME_ENV};
use cvo_election::stop_channel;
use cvo_operator::{IdleWorkers, ProcessExit, Startup};
use tokio::signal;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(
    author,
    disable_version_flag = true,
    about = "Cluster version operator",
    long_about = None
)]
struct Cli {
    #[arg(
        long,
        value_name = "FILE",
        help = "Kubeconfig file to access a remote cluster. Warning: for testing only, do not use in production"
    )]
    kubeconfig: Option<PathBuf>,

    #[arg(
        long,
        value_name = "UUID",
        help = "UUID of the cluster that the operator is managing, must be set"
    )]
    cluster_id: Option<String>,

    #[arg(long, value_name = "FILE", env = "CVO_CONFIG", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(
        short = 'V',
        long = "version",
        action = ArgAction::SetTrue,
        help = "Print the version and exit"
    )]
    version: bool,
}

fn version_info() -> VersionInfo {
    VersionInfo::new(
        env!("CARGO_PKG_VERSION"),
        option_env!("VERGEN_GIT_SHA"),
        option_env!("VERGEN_BUILD_TIMESTAMP"),
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let version = version_info();
    if cli.version {
        println!("{}", version.cli_string());
        return Ok(());
    }

    let config = OperatorConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    init_tracing(COMPONENT_NAME, &config.logging)?;
    info!(version = %version.banner(), "starting");

    let result = run(cli, config).await;
    if let Err(err) = &result {
        error!(error = %format!("{err:#}"), "fatal error, exiting");
    }
    flush_tracing();
    result
}

async fn run(cli: Cli, config: OperatorConfig) -> Result<()> {
    let startup = Startup::prepare(
        cli.cluster_id.as_deref().unwrap_or_default(),
        std::env::var(POD_NAME_ENV).ok(),
        cli.kubeconfig.as_deref(),
        &config.client,
    )?;
    let (lock, recorder) = startup.config_map_lock(&config.lock)?;

    let (stop, signal) = stop_channel();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("termination signal received; shutting down");
        stop.stop();
    });

    let termination = startup
        .run(
            &config.election,
            lock,
            recorder,
            Arc::new(IdleWorkers),
            Arc::new(ProcessExit),
            signal,
        )
        .await?;
    info!(?termination, "leader election finished");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        tokio::select! {
            _ = ctrl_c() => {},
            _ = terminate() => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c().await;
    }
}

// A handler that cannot be installed must not look like a shutdown request.
async fn ctrl_c() {
    if let Err(err) = signal::ctrl_c().await {
        warn!(?err, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            term.recv().await;
        }
        Err(err) => {
            warn!(?err, "failed to install SIGTERM handler");
            std::future::pending::<()>().await;
        }
    }
}
