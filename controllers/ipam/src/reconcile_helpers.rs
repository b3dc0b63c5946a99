//! Reconcile decisions, kept free of API calls
//!
//! The reconciler fetches, calls the engine and writes; what it writes and
//! whether it comes back is decided here.

use crate::claim::{finalizers_patch, with_finalizer};
use crate::error::ControllerError;
use crds::{ClaimState, IPAddress, IPAddressClaim, IPAddressSpec, LocalReference, NutanixIPPool};
use kube::{Resource, ResourceExt};
use kube_runtime::reflector::ObjectRef;
use serde_json::Value;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, PoisonError};
use subnet_ipam::{EnsureOutcome, ReleaseOutcome};

/// Cluster API annotation that pauses reconciliation of an object
pub const PAUSED_ANNOTATION: &str = "cluster.x-k8s.io/paused";

/// How a pass ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    /// Nothing left to do until the claim changes
    Done,
    /// A task is still running; come back after the poll interval
    PollAgain,
}

/// Status a claim should carry after a pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredStatus {
    pub state: ClaimState,
    pub address: Option<String>,
    pub error: Option<String>,
}

impl DesiredStatus {
    pub fn failed(error: &ControllerError) -> Self {
        Self {
            state: ClaimState::Failed,
            address: None,
            error: Some(error.to_string()),
        }
    }
}

/// Writes following an ensure outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnsurePlan {
    /// Address to commit as an IPAddress before the status
    pub create_address: Option<IpAddr>,
    pub status: DesiredStatus,
    pub next: Next,
}

/// Finalizer patch to apply before anything is reserved, if ours is missing
pub fn finalizer_to_add(claim: &IPAddressClaim) -> Option<Value> {
    with_finalizer(claim).map(|finalizers| finalizers_patch(&finalizers))
}

pub fn plan_ensure(claim_name: &str, outcome: EnsureOutcome) -> EnsurePlan {
    let allocated = DesiredStatus {
        state: ClaimState::Allocated,
        address: Some(claim_name.to_string()),
        error: None,
    };
    match outcome {
        EnsureOutcome::AlreadyPresent => EnsurePlan {
            create_address: None,
            status: allocated,
            next: Next::Done,
        },
        EnsureOutcome::Reserved(ip) => EnsurePlan {
            create_address: Some(ip),
            status: allocated,
            next: Next::Done,
        },
        EnsureOutcome::Pending => EnsurePlan {
            create_address: None,
            status: DesiredStatus {
                state: ClaimState::Pending,
                address: None,
                error: None,
            },
            next: Next::PollAgain,
        },
    }
}

/// IPAddress committing `ip` for `claim`, named after and owned by it
pub fn address_for(claim: &IPAddressClaim, ip: IpAddr) -> IPAddress {
    let name = claim.name_any();
    let mut address = IPAddress::new(
        &name,
        IPAddressSpec {
            claim_ref: LocalReference::new(&name),
            pool_ref: claim.spec.pool_ref.clone(),
            address: ip.to_string(),
            prefix: None,
            gateway: None,
        },
    );
    address.metadata.namespace = claim.namespace();
    address.metadata.owner_references = claim.controller_owner_ref(&()).map(|o| vec![o]);
    address
}

/// Accept an IPAddress found after a failed create only if it is the one we meant
pub fn check_existing_address(
    existing: &IPAddress,
    claim_name: &str,
    ip: IpAddr,
) -> Result<(), ControllerError> {
    let same_address = existing
        .spec
        .address
        .parse::<IpAddr>()
        .is_ok_and(|found| found == ip);
    if same_address && existing.spec.claim_ref.name == claim_name {
        return Ok(());
    }
    Err(ControllerError::AddressConflict(format!(
        "IPAddress {} holds {} for claim {}, expected {} for {}",
        existing.name_any(),
        existing.spec.address,
        existing.spec.claim_ref.name,
        ip,
        claim_name
    )))
}

/// Where the release of a deleting claim goes
#[derive(Debug)]
pub enum ReleaseTarget {
    /// Release through this pool's Prism Central
    Remote(Box<NutanixIPPool>),
    /// Drop the finalizer without a remote call, for the given reason
    Skip(String),
}

/// Release through the pool if it is still there and usable
pub fn release_target(pool: Option<NutanixIPPool>) -> ReleaseTarget {
    match pool {
        None => ReleaseTarget::Skip("NutanixIPPool is gone".to_string()),
        Some(pool) => match pool.spec.validate() {
            Ok(()) => ReleaseTarget::Remote(Box::new(pool)),
            Err(e) => ReleaseTarget::Skip(format!("NutanixIPPool is invalid: {e}")),
        },
    }
}

/// What follows a release outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseStep {
    RemoveFinalizer,
    PollAgain,
}

pub fn plan_release(outcome: ReleaseOutcome) -> ReleaseStep {
    match outcome {
        ReleaseOutcome::Pending => ReleaseStep::PollAgain,
        ReleaseOutcome::Released | ReleaseOutcome::NothingToRelease => ReleaseStep::RemoveFinalizer,
    }
}

pub fn is_paused<K: Resource>(obj: &K) -> bool {
    obj.annotations().contains_key(PAUSED_ANNOTATION)
}

/// Last seen paused state per pool key
///
/// A pool wakes its claims when first seen unpaused or when it leaves the
/// paused state; other pool updates do not.
#[derive(Debug, Default)]
pub struct PoolPauses {
    seen: Mutex<HashMap<String, bool>>,
}

impl PoolPauses {
    /// Record the pool's state; true if its claims should be reconciled
    pub fn unpaused(&self, key: &str, pool: &NutanixIPPool) -> bool {
        let paused = is_paused(pool);
        let previous = self
            .seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), paused);
        !paused && previous.is_none_or(|was_paused| was_paused)
    }

    pub fn forget(&self, key: &str) {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

/// Claims in the pool's namespace that reference it; none while the pool is paused
pub fn claims_for_pool(
    pool: &NutanixIPPool,
    claims: &[Arc<IPAddressClaim>],
) -> Vec<ObjectRef<IPAddressClaim>> {
    if is_paused(pool) {
        return Vec::new();
    }
    let namespace = pool.namespace();
    let name = pool.name_any();
    claims
        .iter()
        .filter(|claim| claim.namespace() == namespace)
        .filter(|claim| claim.spec.pool_ref.is_nutanix_ip_pool() && claim.spec.pool_ref.name == name)
        .map(|claim| ObjectRef::from_obj(claim.as_ref()))
        .collect()
}

#[cfg(test)]
#[path = "reconcile_helpers_test.rs"]
mod tests;
