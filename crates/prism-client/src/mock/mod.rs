//! Mock PrismClient for unit testing
//!
//! In-memory implementation of [`PrismClientTrait`] for tests that must not
//! reach a real Prism Central.
//!
//! The mock is organized into domain-specific modules:
//! - `networking.rs` - subnets and reserve/unreserve submissions
//! - `tasks.rs` - scripted task progressions
//! - `clusters.rs` - cluster lookups
//! - `helpers.rs` - constructors for model fixtures

mod clusters;
pub mod helpers;
mod networking;
mod tasks;

use crate::error::PrismError;
use crate::models::*;
use crate::prism_trait::PrismClientTrait;
use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub use tasks::{ScriptedOutcome, TaskScript};

/// An address held in a mock subnet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub ip: IpAddr,
    pub client_context: Option<String>,
}

/// Mock PrismClient for testing
///
/// Subnets start with no free addresses; seed them with
/// [`MockPrismClient::set_available_ips`]. Each submission consumes the next
/// queued [`TaskScript`], falling back to immediate success. Submissions that
/// repeat a request id return the original task.
#[derive(Clone)]
pub struct MockPrismClient {
    pub(crate) base_url: String,
    pub(crate) subnets: Arc<Mutex<HashMap<String, Subnet>>>,
    pub(crate) clusters: Arc<Mutex<HashMap<String, Cluster>>>,
    pub(crate) free_ips: Arc<Mutex<HashMap<String, Vec<IpAddr>>>>,
    pub(crate) reserved: Arc<Mutex<HashMap<String, Vec<Reservation>>>>,
    pub(crate) tasks: Arc<Mutex<HashMap<String, tasks::MockTask>>>,
    pub(crate) request_ids: Arc<Mutex<HashMap<String, String>>>,
    pub(crate) scripts: Arc<Mutex<VecDeque<TaskScript>>>,
    pub(crate) calls: Arc<Mutex<HashMap<&'static str, usize>>>,
    pub(crate) unavailable: Arc<Mutex<bool>>,
    // Counter for generating IDs
    pub(crate) next_id: Arc<Mutex<u64>>,
}

impl std::fmt::Debug for MockPrismClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockPrismClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockPrismClient {
    /// Create a new mock client
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            subnets: Arc::new(Mutex::new(HashMap::new())),
            clusters: Arc::new(Mutex::new(HashMap::new())),
            free_ips: Arc::new(Mutex::new(HashMap::new())),
            reserved: Arc::new(Mutex::new(HashMap::new())),
            tasks: Arc::new(Mutex::new(HashMap::new())),
            request_ids: Arc::new(Mutex::new(HashMap::new())),
            scripts: Arc::new(Mutex::new(VecDeque::new())),
            calls: Arc::new(Mutex::new(HashMap::new())),
            unavailable: Arc::new(Mutex::new(false)),
            next_id: Arc::new(Mutex::new(1)),
        }
    }

    /// Add a subnet to the mock store (for test setup)
    pub fn add_subnet(&self, subnet: Subnet) {
        lock(&self.subnets).insert(subnet.ext_id.clone(), subnet);
    }

    /// Add a cluster to the mock store (for test setup)
    pub fn add_cluster(&self, cluster: Cluster) {
        lock(&self.clusters).insert(cluster.ext_id.clone(), cluster);
    }

    /// Replace the free addresses of a subnet (for test setup)
    pub fn set_available_ips(&self, subnet_ext_id: &str, mut ips: Vec<IpAddr>) {
        ips.sort();
        ips.dedup();
        lock(&self.free_ips).insert(subnet_ext_id.to_string(), ips);
    }

    /// Queue the behaviour of the next submitted task
    pub fn push_task_script(&self, script: TaskScript) {
        lock(&self.scripts).push_back(script);
    }

    /// Make every call fail with a 503 until switched back
    pub fn set_unavailable(&self, unavailable: bool) {
        *lock(&self.unavailable) = unavailable;
    }

    /// Number of calls made to a trait method, by method name
    pub fn call_count(&self, method: &str) -> usize {
        lock(&self.calls).get(method).copied().unwrap_or(0)
    }

    /// Number of calls made to any trait method
    pub fn total_calls(&self) -> usize {
        lock(&self.calls).values().sum()
    }

    /// Number of distinct tasks created
    pub fn tasks_created(&self) -> usize {
        lock(&self.tasks).len()
    }

    /// Request ids seen so far, in no particular order
    pub fn request_ids(&self) -> Vec<String> {
        lock(&self.request_ids).keys().cloned().collect()
    }

    /// Current reservations in a subnet
    pub fn reservations(&self, subnet_ext_id: &str) -> Vec<Reservation> {
        lock(&self.reserved)
            .get(subnet_ext_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Current free addresses in a subnet
    pub fn free_ips(&self, subnet_ext_id: &str) -> Vec<IpAddr> {
        lock(&self.free_ips)
            .get(subnet_ext_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Snapshot of a task without advancing it
    pub fn task(&self, ext_id: &str) -> Option<Task> {
        lock(&self.tasks).get(ext_id).map(|t| t.task.clone())
    }

    pub(crate) fn record_call(&self, method: &'static str) -> Result<(), PrismError> {
        *lock(&self.calls).entry(method).or_insert(0) += 1;
        if *lock(&self.unavailable) {
            return Err(PrismError::Api {
                context: method.to_string(),
                status: 503,
                body: "service unavailable".to_string(),
            });
        }
        Ok(())
    }

    /// Generate next ID
    pub(crate) fn next_id(&self) -> u64 {
        let mut id = lock(&self.next_id);
        let current = *id;
        *id += 1;
        current
    }
}

#[async_trait::async_trait]
impl PrismClientTrait for MockPrismClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn validate_credentials(&self) -> Result<(), PrismError> {
        self.record_call("validate_credentials")
    }

    async fn list_subnets(&self, filter: Option<&str>) -> Result<Vec<Subnet>, PrismError> {
        self.record_call("list_subnets")?;
        networking::list_subnets(self, filter)
    }

    async fn get_subnet_by_id(&self, ext_id: &str) -> Result<Subnet, PrismError> {
        self.record_call("get_subnet_by_id")?;
        networking::get_subnet_by_id(self, ext_id)
    }

    async fn reserve_ips_by_subnet_id(
        &self,
        ext_id: &str,
        spec: &IpReserveSpec,
        request_id: &str,
    ) -> Result<TaskReference, PrismError> {
        self.record_call("reserve_ips_by_subnet_id")?;
        networking::reserve_ips(self, ext_id, spec, request_id)
    }

    async fn unreserve_ips_by_subnet_id(
        &self,
        ext_id: &str,
        spec: &IpUnreserveSpec,
        request_id: &str,
    ) -> Result<TaskReference, PrismError> {
        self.record_call("unreserve_ips_by_subnet_id")?;
        networking::unreserve_ips(self, ext_id, spec, request_id)
    }

    async fn get_task_by_id(&self, ext_id: &str) -> Result<Task, PrismError> {
        self.record_call("get_task_by_id")?;
        tasks::poll_task(self, ext_id)
    }

    async fn list_clusters(&self, filter: Option<&str>) -> Result<Vec<Cluster>, PrismError> {
        self.record_call("list_clusters")?;
        clusters::list_clusters(self, filter)
    }

    async fn get_cluster_by_id(&self, ext_id: &str) -> Result<Cluster, PrismError> {
        self.record_call("get_cluster_by_id")?;
        clusters::get_cluster_by_id(self, ext_id)
    }
}
