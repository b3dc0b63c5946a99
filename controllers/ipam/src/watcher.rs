//! Kubernetes resource watchers.
//!
//! Claims go through `kube_runtime::Controller`, which serialises
//! reconciles per object and requeues them. The controller also reacts to
//! changes of the IPAddresses it owns and to pools being created or
//! unpaused. Pool deletions are observed on a separate plain watch stream.

use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crds::{IPAddress, IPAddressClaim, NutanixIPPool};
use futures::StreamExt;
use kube::{Api, ResourceExt};
use kube_runtime::controller::Config as ControllerConfig;
use kube_runtime::{Controller, WatchStreamExt, watcher};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Runs the IPAddressClaim controller until its stream ends
pub async fn watch_claims(
    api: Api<IPAddressClaim>,
    addresses: Api<IPAddress>,
    pools: Api<NutanixIPPool>,
    reconciler: Arc<Reconciler>,
    concurrency: u16,
    ready: Arc<AtomicBool>,
) -> Result<(), ControllerError> {
    info!("Starting IPAddressClaim watcher");

    let error_policy = |claim: Arc<IPAddressClaim>, error: &ControllerError, ctx: Arc<Reconciler>| {
        ctx.on_error(&claim, error)
    };
    let reconcile = |claim: Arc<IPAddressClaim>, ctx: Arc<Reconciler>| async move {
        debug!("Reconciling IPAddressClaim {}", claim.name_any());
        ctx.reconcile_claim(&claim).await
    };

    // Debounce batches the annotation and status writes of one pass
    let controller_config = ControllerConfig::default()
        .debounce(Duration::from_secs(1))
        .concurrency(concurrency);

    let controller = Controller::new(api, watcher::Config::default());
    let claims = controller.store();
    let mapper = Arc::clone(&reconciler);

    ready.store(true, Ordering::SeqCst);
    controller
        .owns(addresses, watcher::Config::default())
        .watches(pools, watcher::Config::default(), move |pool: NutanixIPPool| {
            mapper.claims_to_wake(&pool, &claims.state())
        })
        .with_config(controller_config)
        .shutdown_on_signal()
        .run(reconcile, error_policy, reconciler)
        .for_each(|res| async move {
            match res {
                Ok((claim, _)) => debug!("Reconciled IPAddressClaim {}", claim.name),
                Err(e) => error!("IPAddressClaim controller error: {}", e),
            }
        })
        .await;
    ready.store(false, Ordering::SeqCst);

    info!("IPAddressClaim watcher stopped");
    Ok(())
}

/// Drops cached clients of deleted pools
pub async fn watch_pools(
    api: Api<NutanixIPPool>,
    reconciler: Arc<Reconciler>,
) -> Result<(), ControllerError> {
    info!("Starting NutanixIPPool watcher");

    let mut stream = Box::pin(watcher(api, watcher::Config::default()).default_backoff());
    while let Some(event) = stream.next().await {
        match event {
            Ok(watcher::Event::Delete(pool)) => {
                let namespace = pool.namespace().unwrap_or_default();
                info!("NutanixIPPool deleted: {}/{}", namespace, pool.name_any());
                reconciler.invalidate_pool(&namespace, &pool.name_any());
            }
            Ok(watcher::Event::Apply(pool) | watcher::Event::InitApply(pool)) => {
                debug!("NutanixIPPool applied: {}", pool.name_any());
            }
            Ok(watcher::Event::Init) => debug!("NutanixIPPool watcher initialized"),
            Ok(watcher::Event::InitDone) => debug!("NutanixIPPool watcher initialization complete"),
            Err(e) => warn!("NutanixIPPool watch error: {}", e),
        }
    }

    Err(ControllerError::Watch(
        "NutanixIPPool watch stream ended".to_string(),
    ))
}
