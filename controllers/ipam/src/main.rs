//! Prism IPAM Controller
//!
//! Cluster API IPAM provider: reconciles `IPAddressClaim`s that reference a
//! `NutanixIPPool` by reserving addresses in the pool's Prism Central subnet
//! and committing them as `IPAddress` objects.

mod backoff;
mod claim;
mod config;
mod controller;
mod credentials;
mod error;
mod metrics;
mod reconcile_helpers;
mod reconciler;
mod server;
#[cfg(test)]
mod test_utils;
mod watcher;

use crate::config::Config;
use crate::error::ControllerError;
use controller::Controller;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // kube and reqwest both pull in rustls; pick one provider for the process
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        warn!("rustls crypto provider was already installed");
    }

    info!("Starting Prism IPAM Controller");

    let config = Config::from_env()?;
    info!("Configuration:");
    info!(
        "  Namespace: {}",
        config.namespace.as_deref().unwrap_or("all namespaces")
    );
    info!("  Task poll requeue: {:?}", config.poll_requeue);
    info!("  Concurrency: {}", config.concurrency);
    info!("  Metrics address: {}", config.metrics_bind_address);

    let controller = Controller::new(&config).await?;
    controller.run().await
}
