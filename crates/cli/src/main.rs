// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `nnc`: operator commands for manual update, chain, and routing
//! operations. Runs against an embedded engine built from the same
//! `nnc-daemon` config and lock as the long-running daemon — a write
//! command refuses to run while `nncd` holds the lock, rather than
//! risking two processes touching the same journal/routing-state files
//! at once.

mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "nnc", about = "Operator CLI for the network-orchestration control plane")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Software update operations (§4.1/§4.2).
    #[command(subcommand)]
    Update(commands::update::UpdateCommand),
    /// Multi-hop routing chain operations (§4.4/§4.5).
    #[command(subcommand)]
    Chain(commands::chain::ChainCommand),
    /// Single-hop device routing operations (§4.3).
    #[command(subcommand)]
    Routing(commands::routing::RoutingCommand),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber_init();
    let cli = Cli::parse();

    let config = nnc_daemon::Config::load()?;
    let result = nnc_daemon::startup(config).await?;
    let daemon = result.daemon;

    match cli.command {
        Command::Update(cmd) => commands::update::run(&daemon, cmd).await?,
        Command::Chain(cmd) => commands::chain::run(&daemon, cmd).await?,
        Command::Routing(cmd) => commands::routing::run(&daemon, cmd).await?,
    }

    Ok(())
}

fn tracing_subscriber_init() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();
}
