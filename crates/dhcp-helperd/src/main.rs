//! dhcp-helperd - kernel-side helper for a bridged DHCP relay
//!
//! Installs the bridge DHCP firewall for the configured interfaces and keeps
//! it until shutdown. SIGHUP re-reads the configuration and reapplies it.

mod cli;
mod commands;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::process::ExitCode;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use dhcp_helper_common::config::kernel_ifindex;
use dhcp_helper_common::RelayConfig;
use dhcp_helper_netsync::{NetSync, SystemKernel};

use cli::{Cli, Command, LogFormat};

/// Initializes tracing; `RUST_LOG` overrides `level`.
fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("Invalid log level '{}'", level))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let installed = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| anyhow::anyhow!("Failed to set tracing subscriber: {}", e))
}

fn load_config(path: &Path) -> Result<RelayConfig> {
    RelayConfig::load(path).with_context(|| format!("Cannot load {}", path.display()))
}

async fn run(sync: &NetSync<SystemKernel>, config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    commands::apply(sync, &config)?;

    let mut sigterm = signal(SignalKind::terminate()).context("Cannot install SIGTERM handler")?;
    let mut sighup = signal(SignalKind::hangup()).context("Cannot install SIGHUP handler")?;

    info!("Listening for SIGHUP (reload) and SIGINT/SIGTERM (shutdown)");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT");
                break;
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
                break;
            }
            _ = sighup.recv() => {
                info!("Received SIGHUP, reloading configuration");
                match load_config(config_path) {
                    Ok(config) => {
                        if let Err(e) = commands::reload(sync, &config) {
                            error!(error = %e, "Keeping previous firewall");
                        }
                    }
                    Err(e) => warn!(error = %e, "Keeping previous configuration"),
                }
            }
        }
    }

    commands::teardown(sync);
    Ok(())
}

async fn dispatch(cli: Cli) -> Result<()> {
    let sync = NetSync::new(SystemKernel::with_nft(cli.nft.clone()));

    match cli.subcommand() {
        Command::Run => run(&sync, &cli.config).await,
        Command::Apply => {
            let config = load_config(&cli.config)?;
            commands::apply(&sync, &config)?;
            Ok(())
        }
        Command::Teardown => {
            commands::teardown(&sync);
            Ok(())
        }
        Command::AddClient {
            interface,
            mac,
            ip,
        } => {
            let ifindex = kernel_ifindex(&interface)
                .with_context(|| format!("Interface '{}' does not exist", interface))?;
            commands::add_client(&sync, ifindex, mac, ip)?;
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(&cli.log_level, cli.log_format) {
        eprintln!("dhcp-helperd: {:#}", e);
        return ExitCode::FAILURE;
    }

    info!("--- Starting dhcp-helperd ---");

    match dispatch(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{:#}", e), "dhcp-helperd exiting with error");
            ExitCode::FAILURE
        }
    }
}
