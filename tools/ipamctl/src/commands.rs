//! Reserve and unreserve, resubmitting until the task completes.
//!
//! Every attempt carries the same request id, so a resubmission attaches
//! to the task created by the first one instead of starting another.

use anyhow::{Result, anyhow};
use std::future::Future;
use std::net::IpAddr;
use std::time::Duration;
use subnet_ipam::{
    IpSet, IpamError, NetworkingClient, ReleaseOptions, ReservationRequest, ReserveOptions,
};
use tracing::debug;

/// How long to keep resubmitting and how often
#[derive(Debug, Clone, Copy)]
pub struct Polling {
    pub interval: Duration,
    pub timeout: Duration,
}

async fn until_done<T, F, Fut>(polling: Polling, mut attempt: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, IpamError>>,
{
    let run = async {
        loop {
            match attempt().await {
                Err(IpamError::TaskOngoing { task_id }) => {
                    debug!("Task {} still running, retrying in {:?}", task_id, polling.interval);
                    tokio::time::sleep(polling.interval).await;
                }
                other => return other,
            }
        }
    };
    match tokio::time::timeout(polling.timeout, run).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(anyhow!(
            "timed out after {}",
            humantime::format_duration(polling.timeout)
        )),
    }
}

pub async fn reserve(
    networking: &NetworkingClient,
    request: &ReservationRequest,
    subnet: &str,
    cluster: Option<&str>,
    polling: Polling,
) -> Result<Vec<IpAddr>> {
    let opts = ReserveOptions {
        cluster: cluster.map(str::to_string),
        client_context: None,
        request_id: uuid::Uuid::now_v7().to_string(),
    };
    debug!("Reserving in subnet {} with request id {}", subnet, opts.request_id);
    until_done(polling, || networking.reserve_ips(request, subnet, &opts))
        .await
        .map_err(|e| e.context("failed to reserve IPs"))
}

pub async fn unreserve(
    networking: &NetworkingClient,
    request: &ReservationRequest,
    subnet: &str,
    cluster: Option<&str>,
    polling: Polling,
) -> Result<()> {
    let opts = ReleaseOptions {
        cluster: cluster.map(str::to_string),
        request_id: uuid::Uuid::now_v7().to_string(),
    };
    debug!("Unreserving in subnet {} with request id {}", subnet, opts.request_id);
    until_done(polling, || networking.release_ips(request, subnet, &opts))
        .await
        .map_err(|e| e.context("failed to unreserve IPs"))
}

/// One line per contiguous range, single addresses bare
pub fn render(ips: &[IpAddr]) -> Vec<String> {
    IpSet::from_addrs(ips.iter().copied())
        .ranges()
        .iter()
        .map(ToString::to_string)
        .collect()
}
