//! ipamctl
//!
//! Reserve and unreserve IP addresses in a Prism Central subnet from the
//! command line. Prints reserved addresses one contiguous range per line.

mod cli;
mod commands;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command};
use commands::Polling;
use prism_client::PrismClient;
use std::sync::Arc;
use subnet_ipam::NetworkingClient;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.global.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let endpoint = cli.global.endpoint()?;
    let client = PrismClient::new(&endpoint).context("failed to create Prism Central client")?;
    let networking = NetworkingClient::new(Arc::new(client));

    let subnet = cli.global.subnet()?;
    let cluster = cli.global.aos_cluster.as_deref();
    let polling = Polling {
        interval: cli.global.poll_interval,
        timeout: cli.global.timeout,
    };

    match &cli.command {
        Command::Reserve { addresses } => {
            let request = cli::reserve_request(addresses)?;
            let ips = commands::reserve(&networking, &request, subnet, cluster, polling).await?;
            for line in commands::render(&ips) {
                println!("{line}");
            }
        }
        Command::Unreserve { addresses } => {
            let request = cli::unreserve_request(addresses)?;
            commands::unreserve(&networking, &request, subnet, cluster, polling).await?;
        }
    }

    Ok(())
}
