//! IPAM CRD Definitions
//!
//! Kubernetes resources for the Prism subnet IPAM provider: the provider's
//! own `NutanixIPPool` plus the cluster-api `IPAddressClaim` and `IPAddress`.

pub mod ip_address;
pub mod ip_address_claim;
pub mod nutanix_ip_pool;
pub mod references;

pub use ip_address::*;
pub use ip_address_claim::*;
pub use nutanix_ip_pool::*;
pub use references::*;
