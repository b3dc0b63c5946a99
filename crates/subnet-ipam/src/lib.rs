//! Idempotent IP reservation engine over Prism Central subnets.
//!
//! The pieces, leaves first:
//!
//! - [`ipset`]: exact cardinality over IPv4/IPv6 ranges
//! - [`resolver`]: subnet references (UUID or name, optionally cluster scoped) to external IDs
//! - [`request`]: count, list, range and release-by-context payloads
//! - [`task`]: task submission and polling
//! - [`networking`]: resolve, build, submit and poll in one call
//! - [`idempotency`]: durable per-claim request tokens
//! - [`cache`]: client handles keyed by owning object
//! - [`orchestrator`]: the per-claim ensure/release workflow
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use prism_client::{ManagementEndpoint, PrismClient, DEFAULT_PORT};
//! use subnet_ipam::{NetworkingClient, ReservationRequest, ReserveOptions};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = PrismClient::new(&ManagementEndpoint {
//!     address: "prism.example.com".to_string(),
//!     port: DEFAULT_PORT,
//!     username: "admin".to_string(),
//!     password: "secret".to_string(),
//!     insecure: false,
//!     additional_trust_bundle: None,
//! })?;
//! let networking = NetworkingClient::new(Arc::new(client));
//!
//! let request = ReservationRequest::parse_range("10.0.0.10-10.0.0.12")?;
//! let opts = ReserveOptions {
//!     request_id: uuid::Uuid::now_v7().to_string(),
//!     ..ReserveOptions::default()
//! };
//! let ips = networking.reserve_ips(&request, "vlan-10", &opts).await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod error;
pub mod idempotency;
pub mod ipset;
pub mod networking;
pub mod orchestrator;
pub mod request;
pub mod resolver;
pub mod task;

pub use cache::{ClientCache, ClientFactory, PrismClientFactory};
pub use error::{IpamError, ResolveError, ValidationError};
pub use idempotency::{
    AnnotationStore, IdempotencyCoordinator, MemoryAnnotationStore, OperationKind,
    RELEASE_REQUEST_ID_ANNOTATION, RESERVE_REQUEST_ID_ANNOTATION, RequestToken,
};
pub use ipset::{IpRange, IpSet};
pub use networking::{NetworkingClient, ReleaseOptions, ReserveOptions};
pub use orchestrator::{ClaimBinding, EnsureOutcome, Orchestrator, PoolTarget, ReleaseOutcome};
pub use request::{RequestKind, ReservationRequest};
pub use resolver::{ResolvedCluster, ResolvedSubnet, SubnetResolver};
pub use task::{AsyncTaskTracker, CompletedTask, TaskState, WaitOptions};
