//! IPAddressClaim reconciliation.
//!
//! One pass per claim key at a time (the runtime never runs two reconciles
//! for the same object concurrently), which is what the engine needs to
//! keep one outstanding request id per claim.

use crate::backoff::{BackoffRegistry, ClaimFingerprint};
use crate::claim::{
    KubeClaim, finalizers_patch, has_finalizer, status_matches, status_patch, without_finalizer,
};
use crate::credentials::load_endpoint;
use crate::error::ControllerError;
use crate::metrics::Metrics;
use crate::reconcile_helpers::{
    DesiredStatus, Next, PoolPauses, ReleaseStep, ReleaseTarget, address_for,
    check_existing_address, claims_for_pool, finalizer_to_add, plan_ensure, plan_release,
    release_target,
};
use crds::{IPAddress, IPAddressClaim, NutanixIPPool};
use kube::api::{Patch, PatchParams, PostParams};
use kube::{Api, Client, ResourceExt};
use kube_runtime::controller::Action;
use kube_runtime::reflector::ObjectRef;
use prism_client::ManagementEndpoint;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use subnet_ipam::{ClientCache, NetworkingClient, Orchestrator, PoolTarget, ReleaseOutcome};
use tracing::{debug, info, warn};

/// `namespace/name` key for cache and backoff entries
pub fn object_key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

/// Reconciles IPAddressClaims against NutanixIPPools.
pub struct Reconciler {
    client: Client,
    cache: ClientCache<ManagementEndpoint>,
    backoff: BackoffRegistry,
    pool_pauses: PoolPauses,
    metrics: Arc<Metrics>,
    poll_requeue: Duration,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("cache", &self.cache)
            .field("poll_requeue", &self.poll_requeue)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(
        client: Client,
        cache: ClientCache<ManagementEndpoint>,
        metrics: Arc<Metrics>,
        poll_requeue: Duration,
    ) -> Self {
        Self {
            client,
            cache,
            backoff: BackoffRegistry::default(),
            pool_pauses: PoolPauses::default(),
            metrics,
            poll_requeue,
        }
    }

    pub async fn reconcile_claim(&self, claim: &IPAddressClaim) -> Result<Action, ControllerError> {
        let name = claim.name_any();
        let namespace = claim.namespace().ok_or_else(|| {
            ControllerError::InvalidConfig(format!("IPAddressClaim {name} has no namespace"))
        })?;
        let key = object_key(&namespace, &name);

        if !claim.spec.pool_ref.is_nutanix_ip_pool() {
            debug!(
                "IPAddressClaim {} references {:?}, not ours",
                key, claim.spec.pool_ref
            );
            self.metrics.record_reconcile("ignored");
            return Ok(Action::await_change());
        }

        let fingerprint = ClaimFingerprint::from(claim);
        if let Some(remaining) = self.backoff.held(&key, fingerprint) {
            debug!("IPAddressClaim {} is held for another {:?}", key, remaining);
            self.metrics.record_reconcile("held");
            return Ok(Action::requeue(remaining));
        }

        let claims: Api<IPAddressClaim> = Api::namespaced(self.client.clone(), &namespace);
        let result = if claim.metadata.deletion_timestamp.is_some() {
            self.release(claim, &claims, &namespace).await
        } else {
            let result = self.ensure(claim, &claims, &namespace).await;
            if let Err(e) = &result {
                self.update_status(&claims, claim, &DesiredStatus::failed(e)).await;
            }
            result
        };

        match result {
            Ok(Next::Done) => {
                self.backoff.reset(&key);
                Ok(Action::await_change())
            }
            Ok(Next::PollAgain) => {
                self.backoff.reset(&key);
                self.backoff.hold(&key, self.poll_requeue, fingerprint);
                Ok(Action::requeue(self.poll_requeue))
            }
            Err(e) => {
                // Hold before returning so our own status write cannot start another pass
                let delay = self.backoff.next_backoff(&key);
                self.backoff.hold(&key, delay, fingerprint);
                self.metrics.record_reconcile("error");
                Err(e)
            }
        }
    }

    /// Requeue delay after a failed reconcile
    pub fn on_error(&self, claim: &IPAddressClaim, error: &ControllerError) -> Action {
        let key = object_key(claim.namespace().as_deref().unwrap_or_default(), &claim.name_any());
        let delay = self
            .backoff
            .held(&key, ClaimFingerprint::from(claim))
            .unwrap_or_else(|| self.backoff.next_backoff(&key));
        warn!(
            "Reconcile of IPAddressClaim {} failed, retrying in {:?}: {}",
            key, delay, error
        );
        Action::requeue(delay)
    }

    /// Claims to reconcile after a pool event, with their holds lifted
    pub fn claims_to_wake(
        &self,
        pool: &NutanixIPPool,
        claims: &[Arc<IPAddressClaim>],
    ) -> Vec<ObjectRef<IPAddressClaim>> {
        let pool_key = object_key(pool.namespace().as_deref().unwrap_or_default(), &pool.name_any());
        if !self.pool_pauses.unpaused(&pool_key, pool) {
            return Vec::new();
        }
        let refs = claims_for_pool(pool, claims);
        for claim in &refs {
            self.backoff.release(&object_key(
                claim.namespace.as_deref().unwrap_or_default(),
                &claim.name,
            ));
        }
        if !refs.is_empty() {
            debug!("NutanixIPPool {} wakes {} claims", pool_key, refs.len());
        }
        refs
    }

    /// Drop the cached client of a deleted pool
    pub fn invalidate_pool(&self, namespace: &str, name: &str) {
        let key = object_key(namespace, name);
        self.cache.invalidate(&key);
        self.pool_pauses.forget(&key);
        self.metrics.cached_clients.set(self.cached_clients());
    }

    fn cached_clients(&self) -> i64 {
        i64::try_from(self.cache.len()).unwrap_or(i64::MAX)
    }

    async fn ensure(
        &self,
        claim: &IPAddressClaim,
        claims: &Api<IPAddressClaim>,
        namespace: &str,
    ) -> Result<Next, ControllerError> {
        let name = claim.name_any();
        if let Some(patch) = finalizer_to_add(claim) {
            claims
                .patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
                .await?;
            debug!("Added finalizer to IPAddressClaim {}/{}", namespace, name);
        }

        let pool = self
            .get_pool(namespace, &claim.spec.pool_ref.name)
            .await?
            .ok_or_else(|| {
                ControllerError::PoolNotFound(object_key(namespace, &claim.spec.pool_ref.name))
            })?;
        pool.spec.validate()?;
        let (orchestrator, target) = self.orchestrator_for(&pool, namespace).await?;

        let addresses: Api<IPAddress> = Api::namespaced(self.client.clone(), namespace);
        let binding = KubeClaim::new(claim, claims.clone(), addresses.clone())?;

        let outcome = orchestrator.ensure_address(&binding, &target).await?;
        let plan = plan_ensure(&name, outcome);
        if let Some(ip) = plan.create_address {
            self.create_address(&addresses, claim, ip).await?;
            info!("IPAddressClaim {}/{} allocated {}", namespace, name, ip);
            self.metrics.addresses_reserved.inc();
        }
        self.update_status(claims, claim, &plan.status).await;
        self.metrics.record_reconcile(match plan.next {
            Next::Done => "allocated",
            Next::PollAgain => "pending",
        });
        Ok(plan.next)
    }

    async fn release(
        &self,
        claim: &IPAddressClaim,
        claims: &Api<IPAddressClaim>,
        namespace: &str,
    ) -> Result<Next, ControllerError> {
        let name = claim.name_any();
        if !has_finalizer(claim) {
            return Ok(Next::Done);
        }

        let pool = self.get_pool(namespace, &claim.spec.pool_ref.name).await?;
        match release_target(pool) {
            ReleaseTarget::Remote(pool) => {
                let (orchestrator, target) = self.orchestrator_for(&pool, namespace).await?;
                let addresses: Api<IPAddress> = Api::namespaced(self.client.clone(), namespace);
                let binding = KubeClaim::new(claim, claims.clone(), addresses)?;
                let outcome = orchestrator.release_address(&binding, &target).await?;
                if plan_release(outcome) == ReleaseStep::PollAgain {
                    self.metrics.record_reconcile("pending");
                    return Ok(Next::PollAgain);
                }
                if outcome == ReleaseOutcome::Released {
                    info!("IPAddressClaim {}/{} released its address", namespace, name);
                    self.metrics.addresses_released.inc();
                } else {
                    debug!("IPAddressClaim {}/{} held no address", namespace, name);
                }
            }
            ReleaseTarget::Skip(reason) => {
                warn!(
                    "{} ({}); releasing IPAddressClaim {}/{} without contacting Prism Central",
                    reason,
                    object_key(namespace, &claim.spec.pool_ref.name),
                    namespace,
                    name
                );
            }
        }

        claims
            .patch(
                &name,
                &PatchParams::default(),
                &Patch::Merge(&finalizers_patch(&without_finalizer(claim))),
            )
            .await?;
        self.metrics.record_reconcile("released");
        Ok(Next::Done)
    }

    async fn get_pool(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<NutanixIPPool>, ControllerError> {
        let pools: Api<NutanixIPPool> = Api::namespaced(self.client.clone(), namespace);
        Ok(pools.get_opt(name).await?)
    }

    async fn orchestrator_for(
        &self,
        pool: &NutanixIPPool,
        namespace: &str,
    ) -> Result<(Orchestrator, PoolTarget), ControllerError> {
        let endpoint = load_endpoint(&self.client, namespace, &pool.spec.prism_central).await?;
        let client = self
            .cache
            .get_or_create(&object_key(namespace, &pool.name_any()), &endpoint)
            .await?;
        self.metrics.cached_clients.set(self.cached_clients());

        let target = PoolTarget {
            subnet: pool.spec.subnet.clone(),
            cluster: pool.spec.cluster.clone(),
        };
        Ok((Orchestrator::new(NetworkingClient::new(client)), target))
    }

    async fn create_address(
        &self,
        addresses: &Api<IPAddress>,
        claim: &IPAddressClaim,
        ip: IpAddr,
    ) -> Result<(), ControllerError> {
        let name = claim.name_any();
        let address = address_for(claim, ip);

        if let Err(e) = addresses.create(&PostParams::default(), &address).await {
            // Lost a race with an earlier pass; accept it only if it holds the same address
            return match addresses.get_opt(&name).await? {
                Some(existing) => {
                    check_existing_address(&existing, &name, ip)?;
                    debug!("IPAddress {} already exists", name);
                    Ok(())
                }
                None => Err(e.into()),
            };
        }
        debug!("Created IPAddress {} for {}", name, ip);
        Ok(())
    }

    /// Best-effort status update, skipped when nothing changed
    async fn update_status(
        &self,
        claims: &Api<IPAddressClaim>,
        claim: &IPAddressClaim,
        desired: &DesiredStatus,
    ) {
        let address = desired.address.as_deref();
        let error = desired.error.as_deref();
        if status_matches(claim, desired.state, address, error) {
            return;
        }
        let name = claim.name_any();
        if let Err(e) = claims
            .patch_status(
                &name,
                &PatchParams::default(),
                &Patch::Merge(&status_patch(desired.state, address, error)),
            )
            .await
        {
            warn!("Failed to update IPAddressClaim {} status: {}", name, e);
        }
    }
}
