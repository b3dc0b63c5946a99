//! PrismClient trait for mocking
//!
//! This trait abstracts the PrismClient so the reservation engine can be
//! exercised against an in-memory implementation in unit tests.

use crate::error::PrismError;
use crate::models::*;

/// Trait for Prism Central API client operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
/// Implementations are shared across claims and must tolerate concurrent calls.
#[async_trait::async_trait]
pub trait PrismClientTrait: Send + Sync {
    /// Get the base URL
    fn base_url(&self) -> &str;

    /// Check connectivity and credentials with a cheap authenticated call
    async fn validate_credentials(&self) -> Result<(), PrismError>;

    // Networking
    async fn list_subnets(&self, filter: Option<&str>) -> Result<Vec<Subnet>, PrismError>;
    async fn get_subnet_by_id(&self, ext_id: &str) -> Result<Subnet, PrismError>;
    async fn reserve_ips_by_subnet_id(
        &self,
        ext_id: &str,
        spec: &IpReserveSpec,
        request_id: &str,
    ) -> Result<TaskReference, PrismError>;
    async fn unreserve_ips_by_subnet_id(
        &self,
        ext_id: &str,
        spec: &IpUnreserveSpec,
        request_id: &str,
    ) -> Result<TaskReference, PrismError>;

    // Prism
    async fn get_task_by_id(&self, ext_id: &str) -> Result<Task, PrismError>;

    // Cluster management
    async fn list_clusters(&self, filter: Option<&str>) -> Result<Vec<Cluster>, PrismError>;
    async fn get_cluster_by_id(&self, ext_id: &str) -> Result<Cluster, PrismError>;
}
