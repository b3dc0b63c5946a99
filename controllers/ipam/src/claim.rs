//! Kubernetes-backed claim binding.
//!
//! Request tokens live in the claim's annotations and are written with a
//! merge patch before the engine submits anything. The committed address
//! is the `IPAddress` named after the claim.

use crds::{ClaimState, IPAddress, IPAddressClaim};
use kube::api::{Patch, PatchParams};
use kube::{Api, ResourceExt};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use subnet_ipam::{AnnotationStore, ClaimBinding, IpamError};
use tracing::debug;

/// Finalizer that holds a claim until its reservation is released
pub const RELEASE_FINALIZER: &str = "ipam.prism.io/release";

/// Merge patch setting (or, with `None`, removing) one annotation
pub fn annotation_patch(key: &str, value: Option<&str>) -> Value {
    json!({ "metadata": { "annotations": { key: value } } })
}

/// Merge patch replacing the finalizer list
pub fn finalizers_patch(finalizers: &[String]) -> Value {
    json!({ "metadata": { "finalizers": finalizers } })
}

pub fn has_finalizer(claim: &IPAddressClaim) -> bool {
    claim.finalizers().iter().any(|f| f == RELEASE_FINALIZER)
}

/// Finalizer list with ours added, or `None` if already present
pub fn with_finalizer(claim: &IPAddressClaim) -> Option<Vec<String>> {
    if has_finalizer(claim) {
        return None;
    }
    let mut finalizers = claim.finalizers().to_vec();
    finalizers.push(RELEASE_FINALIZER.to_string());
    Some(finalizers)
}

/// Finalizer list with ours removed
pub fn without_finalizer(claim: &IPAddressClaim) -> Vec<String> {
    claim
        .finalizers()
        .iter()
        .filter(|f| *f != RELEASE_FINALIZER)
        .cloned()
        .collect()
}

/// Status merge patch; an absent `address` leaves `addressRef` untouched
pub fn status_patch(state: ClaimState, address: Option<&str>, error: Option<&str>) -> Value {
    let state = match state {
        ClaimState::Pending => "Pending",
        ClaimState::Allocated => "Allocated",
        ClaimState::Failed => "Failed",
    };
    let mut status = json!({
        "state": state,
        "error": error,
        "lastReconciled": chrono::Utc::now(),
    });
    if let Some(name) = address {
        status["addressRef"] = json!({ "name": name });
    }
    json!({ "status": status })
}

/// Whether the claim status already says this
pub fn status_matches(
    claim: &IPAddressClaim,
    state: ClaimState,
    address: Option<&str>,
    error: Option<&str>,
) -> bool {
    let Some(status) = &claim.status else {
        return false;
    };
    let address_matches = match address {
        Some(name) => status.address_ref.as_ref().is_some_and(|r| r.name == name),
        None => true,
    };
    status.state == state && address_matches && status.error.as_deref() == error
}

/// Annotations on one claim, written through to the API server
pub struct ClaimAnnotations {
    api: Api<IPAddressClaim>,
    name: String,
    values: Mutex<BTreeMap<String, String>>,
}

impl std::fmt::Debug for ClaimAnnotations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaimAnnotations")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl ClaimAnnotations {
    pub fn new(api: Api<IPAddressClaim>, claim: &IPAddressClaim) -> Self {
        Self {
            api,
            name: claim.name_any(),
            values: Mutex::new(claim.annotations().clone()),
        }
    }

    async fn patch(&self, key: &str, value: Option<&str>) -> Result<(), IpamError> {
        self.api
            .patch(
                &self.name,
                &PatchParams::default(),
                &Patch::Merge(&annotation_patch(key, value)),
            )
            .await
            .map_err(|e| IpamError::persistence(format!("claim {}: {}", self.name, e)))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl AnnotationStore for ClaimAnnotations {
    async fn get(&self, key: &str) -> Result<Option<String>, IpamError> {
        Ok(self
            .values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), IpamError> {
        self.patch(key, Some(value)).await?;
        debug!("Set annotation {}={} on claim {}", key, value, self.name);
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), IpamError> {
        self.patch(key, None).await?;
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

/// One claim as seen by the engine
#[derive(Debug)]
pub struct KubeClaim {
    uid: String,
    name: String,
    recorded: bool,
    addresses: Api<IPAddress>,
    annotations: ClaimAnnotations,
}

impl KubeClaim {
    pub fn new(
        claim: &IPAddressClaim,
        claims: Api<IPAddressClaim>,
        addresses: Api<IPAddress>,
    ) -> Result<Self, IpamError> {
        let uid = claim
            .uid()
            .ok_or_else(|| IpamError::persistence(format!("claim {} has no uid", claim.name_any())))?;
        Ok(Self {
            uid,
            name: claim.name_any(),
            recorded: claim.address_recorded(),
            addresses,
            annotations: ClaimAnnotations::new(claims, claim),
        })
    }
}

#[async_trait::async_trait]
impl ClaimBinding for KubeClaim {
    fn identity(&self) -> &str {
        &self.uid
    }

    async fn address_exists(&self) -> Result<bool, IpamError> {
        let found = self
            .addresses
            .get_opt(&self.name)
            .await
            .map_err(|e| IpamError::persistence(format!("IPAddress {}: {}", self.name, e)))?;
        Ok(found.is_some())
    }

    fn address_recorded(&self) -> bool {
        self.recorded
    }

    fn annotations(&self) -> &dyn AnnotationStore {
        &self.annotations
    }
}
