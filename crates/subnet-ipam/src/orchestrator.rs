//! Per-claim ensure/release workflow.
//!
//! Callers must guarantee that at most one `ensure_address`/`release_address`
//! runs for a given claim at a time (a work queue that serialises by object
//! key does this). Nothing here locks per claim; different claims may be
//! driven concurrently through the same [`Orchestrator`].

use crate::error::IpamError;
use crate::idempotency::{AnnotationStore, IdempotencyCoordinator, OperationKind};
use crate::networking::{NetworkingClient, ReleaseOptions, ReserveOptions};
use crate::request::ReservationRequest;
use std::net::IpAddr;
use tracing::{debug, info, warn};

/// The claim side of the workflow
#[async_trait::async_trait]
pub trait ClaimBinding: Send + Sync {
    /// Stable identity, used as the reservation's client context
    fn identity(&self) -> &str;

    /// Whether the committed address object exists
    async fn address_exists(&self) -> Result<bool, IpamError>;

    /// Whether an address was ever recorded for the claim
    fn address_recorded(&self) -> bool;

    /// Durable annotations on the claim
    fn annotations(&self) -> &dyn AnnotationStore;
}

/// Where addresses come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolTarget {
    /// Subnet UUID or name
    pub subnet: String,
    /// Cluster UUID or name, scoping a subnet name
    pub cluster: Option<String>,
}

/// Result of [`Orchestrator::ensure_address`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// The address object already exists; no remote call was made
    AlreadyPresent,
    /// A new address was reserved
    Reserved(IpAddr),
    /// The reservation task is still running; try again later
    Pending,
}

/// Result of [`Orchestrator::release_address`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// Nothing was ever reserved for the claim
    NothingToRelease,
    Released,
    /// The release task is still running; try again later
    Pending,
}

/// Drives claims against one remote endpoint
#[derive(Debug, Clone)]
pub struct Orchestrator {
    networking: NetworkingClient,
}

impl Orchestrator {
    pub fn new(networking: NetworkingClient) -> Self {
        Self { networking }
    }

    pub fn networking(&self) -> &NetworkingClient {
        &self.networking
    }

    /// Make sure the claim has an address
    pub async fn ensure_address(
        &self,
        claim: &dyn ClaimBinding,
        target: &PoolTarget,
    ) -> Result<EnsureOutcome, IpamError> {
        if claim.address_exists().await? {
            debug!("Claim {} already has an address", claim.identity());
            return Ok(EnsureOutcome::AlreadyPresent);
        }

        let coordinator = IdempotencyCoordinator::new(claim.annotations());
        let token = coordinator.acquire(OperationKind::Reserve).await?;
        debug!(
            "Reserving for claim {} with request id {} (minted: {})",
            claim.identity(),
            token,
            token.minted
        );

        let opts = ReserveOptions {
            cluster: target.cluster.clone(),
            client_context: Some(claim.identity().to_string()),
            request_id: token.to_string(),
        };
        let result = match ReservationRequest::count(1) {
            Ok(request) => {
                self.networking
                    .reserve_ips(&request, &target.subnet, &opts)
                    .await
            }
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(ips) => {
                let Some(ip) = ips.first().copied() else {
                    return Err(IpamError::UnexpectedResponse {
                        task_id: token.to_string(),
                        reason: "no IP address reserved".to_string(),
                    });
                };
                if ips.len() > 1 {
                    warn!(
                        "Claim {} asked for one address but got {:?}; using {}",
                        claim.identity(),
                        ips,
                        ip
                    );
                }
                info!("Reserved {} for claim {}", ip, claim.identity());
                Ok(EnsureOutcome::Reserved(ip))
            }
            Err(e) if e.is_ongoing() => {
                debug!("Reservation for claim {} still in progress", claim.identity());
                Ok(EnsureOutcome::Pending)
            }
            Err(e) => Err(self.fail(&coordinator, OperationKind::Reserve, claim, e).await),
        }
    }

    /// Give back whatever the claim holds
    pub async fn release_address(
        &self,
        claim: &dyn ClaimBinding,
        target: &PoolTarget,
    ) -> Result<ReleaseOutcome, IpamError> {
        let coordinator = IdempotencyCoordinator::new(claim.annotations());
        let reserve_outstanding = coordinator.current(OperationKind::Reserve).await?.is_some();
        if !claim.address_recorded() && !reserve_outstanding {
            debug!("Claim {} never held an address", claim.identity());
            return Ok(ReleaseOutcome::NothingToRelease);
        }

        let token = coordinator.acquire(OperationKind::Release).await?;
        let opts = ReleaseOptions {
            cluster: target.cluster.clone(),
            request_id: token.to_string(),
        };
        let result = match ReservationRequest::release_by_context(claim.identity()) {
            Ok(request) => {
                self.networking
                    .release_ips(&request, &target.subnet, &opts)
                    .await
            }
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(()) => {
                info!("Released address of claim {}", claim.identity());
                Ok(ReleaseOutcome::Released)
            }
            Err(e) if e.is_ongoing() => {
                debug!("Release for claim {} still in progress", claim.identity());
                Ok(ReleaseOutcome::Pending)
            }
            Err(e) => Err(self.fail(&coordinator, OperationKind::Release, claim, e).await),
        }
    }

    /// Clear the token when the error calls for a fresh id, then hand the error back
    async fn fail(
        &self,
        coordinator: &IdempotencyCoordinator<'_>,
        kind: OperationKind,
        claim: &dyn ClaimBinding,
        err: IpamError,
    ) -> IpamError {
        if err.invalidates_token() {
            if let Err(clear_err) = coordinator.clear(kind).await {
                warn!(
                    "Failed to clear {} request id of claim {}: {}",
                    kind,
                    claim.identity(),
                    clear_err
                );
            }
        }
        warn!("{} failed for claim {}: {}", kind, claim.identity(), err);
        err
    }
}
