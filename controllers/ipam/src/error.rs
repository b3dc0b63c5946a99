//! Controller-specific error types.

use crds::CrdValidationError;
use kube::Error as KubeError;
use prism_client::PrismError;
use subnet_ipam::IpamError;
use thiserror::Error;

/// Errors that can occur in the IPAM controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Prism Central API error
    #[error("Prism Central error: {0}")]
    Prism(#[from] PrismError),

    /// Reservation engine error
    #[error(transparent)]
    Ipam(#[from] IpamError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Pool spec rejected
    #[error("Invalid NutanixIPPool: {0}")]
    InvalidPool(#[from] CrdValidationError),

    /// NutanixIPPool not found
    #[error("NutanixIPPool not found: {0}")]
    PoolNotFound(String),

    /// An IPAddress with the claim's name holds something else
    #[error("IPAddress conflict: {0}")]
    AddressConflict(String),

    /// Credentials Secret missing or malformed
    #[error("Invalid credentials: {0}")]
    Credentials(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),

    /// Health or metrics server failed
    #[error("Metrics server failed: {0}")]
    Server(String),
}
