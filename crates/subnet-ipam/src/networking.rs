//! Networking facade: resolve, build, submit, poll.
//!
//! Each call resolves the subnet, submits once with the caller's request id
//! and polls the resulting task once. A pending task surfaces as
//! [`IpamError::TaskOngoing`]; resubmitting with the same request id picks
//! the original task back up. The `*_and_wait` variants block on the task
//! instead, for interactive use.

use crate::error::IpamError;
use crate::request::ReservationRequest;
use crate::resolver::{ResolvedSubnet, SubnetResolver};
use crate::task::{AsyncTaskTracker, CompletedTask, WaitOptions};
use prism_client::PrismClientTrait;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::info;

/// Options for a reserve call
#[derive(Debug, Clone, Default)]
pub struct ReserveOptions {
    /// Cluster UUID or name scoping a subnet name
    pub cluster: Option<String>,
    /// Tag attached to the reservation so it can be released by context
    pub client_context: Option<String>,
    /// Value of the request-id header
    pub request_id: String,
}

/// Options for a release call
#[derive(Debug, Clone, Default)]
pub struct ReleaseOptions {
    pub cluster: Option<String>,
    pub request_id: String,
}

/// Reserve/release client bound to one Prism Central
#[derive(Clone)]
pub struct NetworkingClient {
    client: Arc<dyn PrismClientTrait>,
    resolver: SubnetResolver,
    tracker: AsyncTaskTracker,
}

impl std::fmt::Debug for NetworkingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkingClient")
            .field("base_url", &self.client.base_url())
            .finish()
    }
}

impl NetworkingClient {
    pub fn new(client: Arc<dyn PrismClientTrait>) -> Self {
        Self {
            resolver: SubnetResolver::new(Arc::clone(&client)),
            tracker: AsyncTaskTracker::new(Arc::clone(&client)),
            client,
        }
    }

    pub fn client(&self) -> &Arc<dyn PrismClientTrait> {
        &self.client
    }

    pub fn tracker(&self) -> &AsyncTaskTracker {
        &self.tracker
    }

    /// Resolve a subnet reference
    pub async fn get_subnet(
        &self,
        subnet: &str,
        cluster: Option<&str>,
    ) -> Result<ResolvedSubnet, IpamError> {
        Ok(self.resolver.resolve(subnet, cluster).await?)
    }

    async fn submit_reserve(
        &self,
        request: &ReservationRequest,
        subnet: &str,
        opts: &ReserveOptions,
    ) -> Result<String, IpamError> {
        let spec = request.to_reserve_spec(opts.client_context.as_deref())?;
        let resolved = self.get_subnet(subnet, opts.cluster.as_deref()).await?;
        self.tracker
            .submit_reserve(&resolved, &spec, &opts.request_id)
            .await
    }

    async fn submit_release(
        &self,
        request: &ReservationRequest,
        subnet: &str,
        opts: &ReleaseOptions,
    ) -> Result<String, IpamError> {
        let spec = request.to_unreserve_spec()?;
        let resolved = self.get_subnet(subnet, opts.cluster.as_deref()).await?;
        self.tracker
            .submit_release(&resolved, &spec, &opts.request_id)
            .await
    }

    fn reserved(subnet: &str, done: &CompletedTask) -> Result<Vec<IpAddr>, IpamError> {
        let ips = done.reserved_ips()?;
        info!(
            "Reserved {} address(es) in subnet {} (task {})",
            ips.len(),
            subnet,
            done.task_id
        );
        Ok(ips)
    }

    /// Reserve addresses, polling the task once
    pub async fn reserve_ips(
        &self,
        request: &ReservationRequest,
        subnet: &str,
        opts: &ReserveOptions,
    ) -> Result<Vec<IpAddr>, IpamError> {
        let task_id = self.submit_reserve(request, subnet, opts).await?;
        let done = self.tracker.poll(&task_id).await?;
        Self::reserved(subnet, &done)
    }

    /// Release addresses, polling the task once
    pub async fn release_ips(
        &self,
        request: &ReservationRequest,
        subnet: &str,
        opts: &ReleaseOptions,
    ) -> Result<(), IpamError> {
        let task_id = self.submit_release(request, subnet, opts).await?;
        self.tracker.poll(&task_id).await?;
        info!("Released addresses in subnet {} (task {})", subnet, task_id);
        Ok(())
    }

    /// Reserve addresses and block until the task is terminal
    pub async fn reserve_ips_and_wait(
        &self,
        request: &ReservationRequest,
        subnet: &str,
        opts: &ReserveOptions,
        wait: &WaitOptions,
    ) -> Result<Vec<IpAddr>, IpamError> {
        let task_id = self.submit_reserve(request, subnet, opts).await?;
        let done = self.tracker.wait(&task_id, wait).await?;
        Self::reserved(subnet, &done)
    }

    /// Release addresses and block until the task is terminal
    pub async fn release_ips_and_wait(
        &self,
        request: &ReservationRequest,
        subnet: &str,
        opts: &ReleaseOptions,
        wait: &WaitOptions,
    ) -> Result<(), IpamError> {
        let task_id = self.submit_release(request, subnet, opts).await?;
        self.tracker.wait(&task_id, wait).await?;
        info!("Released addresses in subnet {} (task {})", subnet, task_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipset::IpSet;
    use prism_client::mock::helpers::{cluster, subnet};
    use prism_client::{MockPrismClient, TaskScript};
    use std::time::Duration;

    const SUBNET: &str = "6b6b6b6b-0000-4000-8000-000000000001";
    const CLUSTER: &str = "6b6b6b6b-0000-4000-8000-0000000000c1";

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn setup() -> (MockPrismClient, NetworkingClient) {
        let mock = MockPrismClient::new("https://pc.test:9440");
        mock.add_cluster(cluster(CLUSTER, "pe-1"));
        mock.add_subnet(subnet(SUBNET, "S", Some(CLUSTER)));
        let free = IpSet::from_ranges([crate::ipset::IpRange::parse("10.0.0.5-10.0.0.20").unwrap()]);
        mock.set_available_ips(SUBNET, free.ranges()[0].addresses().collect());
        let networking = NetworkingClient::new(Arc::new(mock.clone()));
        (mock, networking)
    }

    fn reserve_opts(request_id: &str) -> ReserveOptions {
        ReserveOptions {
            cluster: Some("pe-1".to_string()),
            client_context: None,
            request_id: request_id.to_string(),
        }
    }

    #[tokio::test]
    async fn test_range_reservation_returns_every_address() {
        let (_mock, networking) = setup();
        let request = ReservationRequest::parse_range("10.0.0.10-10.0.0.12").unwrap();
        let ips = networking
            .reserve_ips(&request, "S", &reserve_opts("req-1"))
            .await
            .unwrap();
        assert_eq!(ips, vec![ip("10.0.0.10"), ip("10.0.0.11"), ip("10.0.0.12")]);

        let rendered: Vec<String> = IpSet::from_addrs(ips)
            .ranges()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(rendered, vec!["10.0.0.10-10.0.0.12"]);
    }

    #[tokio::test]
    async fn test_count_reservation_by_subnet_name() {
        let (_mock, networking) = setup();
        let request = ReservationRequest::count(1).unwrap();
        let ips = networking
            .reserve_ips(&request, "S", &reserve_opts("req-1"))
            .await
            .unwrap();
        assert_eq!(ips, vec![ip("10.0.0.5")]);
    }

    #[tokio::test]
    async fn test_resubmitting_pending_request_resumes_task() {
        let (mock, networking) = setup();
        mock.push_task_script(TaskScript::succeed_after(1));
        let request = ReservationRequest::count(1).unwrap();

        let first = networking.reserve_ips(&request, "S", &reserve_opts("req-1")).await;
        assert!(first.unwrap_err().is_ongoing());

        let second = networking
            .reserve_ips(&request, "S", &reserve_opts("req-1"))
            .await
            .unwrap();
        assert_eq!(second, vec![ip("10.0.0.5")]);
        assert_eq!(mock.tasks_created(), 1);
    }

    #[tokio::test]
    async fn test_release_list_returns_addresses() {
        let (mock, networking) = setup();
        let request = ReservationRequest::list(["10.0.0.7"]).unwrap();
        networking
            .reserve_ips(&request, SUBNET, &reserve_opts("req-1"))
            .await
            .unwrap();
        assert_eq!(mock.reservations(SUBNET).len(), 1);

        let opts = ReleaseOptions {
            cluster: None,
            request_id: "req-2".to_string(),
        };
        networking.release_ips(&request, SUBNET, &opts).await.unwrap();
        assert!(mock.reservations(SUBNET).is_empty());
    }

    #[tokio::test]
    async fn test_invalid_request_never_reaches_network() {
        let (mock, networking) = setup();
        let request = ReservationRequest::release_by_context("uid").unwrap();
        let err = networking
            .reserve_ips(&request, "S", &reserve_opts("req-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, IpamError::Validation(_)));
        assert_eq!(mock.total_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reserve_and_wait_blocks_until_done() {
        let (_mock, networking) = setup();
        let request = ReservationRequest::count(2).unwrap();
        let wait = WaitOptions {
            poll_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(60),
            poll_immediately: true,
        };
        let ips = networking
            .reserve_ips_and_wait(&request, "S", &reserve_opts("req-1"), &wait)
            .await
            .unwrap();
        assert_eq!(ips, vec![ip("10.0.0.5"), ip("10.0.0.6")]);
    }
}
