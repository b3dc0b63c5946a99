//! Main controller implementation.
//!
//! Wires the reconciler to the watchers and the health/metrics server, and
//! runs until one of them exits.

use crate::config::Config;
use crate::error::ControllerError;
use crate::metrics::Metrics;
use crate::reconciler::Reconciler;
use crate::server::{self, ServerState};
use crate::watcher::{watch_claims, watch_pools};
use crds::{IPAddress, IPAddressClaim, NutanixIPPool};
use kube::{Api, Client};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use subnet_ipam::{ClientCache, PrismClientFactory};
use tokio::task::JoinHandle;
use tracing::info;

/// Main controller for IPAddressClaims backed by NutanixIPPools.
#[derive(Debug)]
pub struct Controller {
    claim_watcher: JoinHandle<Result<(), ControllerError>>,
    pool_watcher: JoinHandle<Result<(), ControllerError>>,
    server: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    pub async fn new(config: &Config) -> Result<Self, ControllerError> {
        info!("Initializing Prism IPAM Controller");

        let client = Client::try_default().await?;
        let metrics = Arc::new(Metrics::new()?);
        let cache = ClientCache::new(Arc::new(PrismClientFactory::default()));
        let reconciler = Arc::new(Reconciler::new(
            client.clone(),
            cache,
            Arc::clone(&metrics),
            config.poll_requeue,
        ));

        let (claim_api, address_api, pool_api): (
            Api<IPAddressClaim>,
            Api<IPAddress>,
            Api<NutanixIPPool>,
        ) = match &config.namespace {
            Some(ns) => (
                Api::namespaced(client.clone(), ns),
                Api::namespaced(client.clone(), ns),
                Api::namespaced(client, ns),
            ),
            None => (Api::all(client.clone()), Api::all(client.clone()), Api::all(client)),
        };

        let ready = Arc::new(AtomicBool::new(false));
        let server_state = ServerState {
            metrics,
            ready: Arc::clone(&ready),
        };
        let bind_address = config.metrics_bind_address;
        let server = tokio::spawn(async move { server::serve(bind_address, server_state).await });

        let concurrency = config.concurrency;
        let claim_reconciler = Arc::clone(&reconciler);
        let claim_pools = pool_api.clone();
        let claim_watcher = tokio::spawn(async move {
            watch_claims(
                claim_api,
                address_api,
                claim_pools,
                claim_reconciler,
                concurrency,
                ready,
            )
            .await
        });
        let pool_watcher = tokio::spawn(async move { watch_pools(pool_api, reconciler).await });

        Ok(Self {
            claim_watcher,
            pool_watcher,
            server,
        })
    }

    /// Runs the controller until shutdown.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("Prism IPAM Controller running");

        tokio::select! {
            result = &mut self.claim_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("IPAddressClaim watcher panicked: {}", e)))??;
            }
            result = &mut self.pool_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("NutanixIPPool watcher panicked: {}", e)))??;
            }
            result = &mut self.server => {
                result.map_err(|e| ControllerError::Server(format!("metrics server panicked: {}", e)))??;
            }
        }

        info!("Prism IPAM Controller stopped");
        Ok(())
    }
}
