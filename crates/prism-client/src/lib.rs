//! Prism Central REST API Client
//!
//! A Rust client library for the Prism Central v4 API surface used by the
//! IPAM components: subnet lookup, IP reservation and release, task
//! tracking and cluster lookup.
//!
//! # Example
//!
//! ```no_run
//! use prism_client::{ManagementEndpoint, PrismClient, PrismClientTrait, DEFAULT_PORT};
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
//!
//! client.validate_credentials().await?;
//! let subnets = client.list_subnets(Some("name eq 'vlan-10'")).await?;
//! # Ok(())
//! # }
//! ```
//!
//! Mutating calls (`reserve_ips_by_subnet_id`, `unreserve_ips_by_subnet_id`)
//! return a [`TaskReference`]; poll it with `get_task_by_id`.

pub mod client;
pub mod common;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod prism_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::{DEFAULT_PORT, ManagementEndpoint, PrismClient};
pub use common::query::FilterBuilder;
pub use common::{HttpClient, REQUEST_ID_HEADER};
pub use error::PrismError;
pub use models::*;
pub use prism_trait::PrismClientTrait;
#[cfg(any(test, feature = "test-util"))]
pub use mock::{MockPrismClient, ScriptedOutcome, TaskScript};
