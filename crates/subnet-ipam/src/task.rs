//! Asynchronous task submission and completion tracking.
//!
//! Reserve and release calls return a task handle immediately. [`AsyncTaskTracker::poll`]
//! reads the task once and maps it onto [`TaskState`]; a pending task is
//! reported as [`IpamError::TaskOngoing`] so the caller decides whether to
//! wait or yield. [`AsyncTaskTracker::wait`] is the blocking variant.
//!
//! Polling never resubmits. Cancelling a wait only stops local polling; the
//! remote task keeps running.

use crate::error::IpamError;
use crate::resolver::ResolvedSubnet;
use prism_client::{IpReserveSpec, IpUnreserveSpec, KvPair, PrismClientTrait, Task, TaskStatus};
use serde::Deserialize;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Engine view of a task's lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Succeeded,
    Failed,
    Cancelled,
}

impl From<Option<TaskStatus>> for TaskState {
    fn from(status: Option<TaskStatus>) -> Self {
        match status {
            None | Some(TaskStatus::Queued | TaskStatus::Running | TaskStatus::Canceling) => {
                TaskState::Pending
            }
            Some(TaskStatus::Succeeded) => TaskState::Succeeded,
            Some(TaskStatus::Failed) => TaskState::Failed,
            Some(TaskStatus::Canceled) => TaskState::Cancelled,
        }
    }
}

/// A task that reached SUCCEEDED
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedTask {
    pub task_id: String,
    pub completion_details: Vec<KvPair>,
}

#[derive(Debug, Deserialize)]
struct ReservedIps {
    #[serde(default)]
    reserved_ips: Vec<String>,
}

impl CompletedTask {
    /// Addresses reported by a successful reserve task.
    ///
    /// Exactly one completion detail is expected, holding either a JSON
    /// string or an object with a non-empty `reserved_ips` list.
    pub fn reserved_ips(&self) -> Result<Vec<IpAddr>, IpamError> {
        let unexpected = |reason: String| IpamError::UnexpectedResponse {
            task_id: self.task_id.clone(),
            reason,
        };

        let detail = match self.completion_details.as_slice() {
            [] => return Err(unexpected("no IP address reserved".to_string())),
            [one] => one,
            many => {
                return Err(unexpected(format!(
                    "unexpected multiple results returned: {}",
                    many.len()
                )));
            }
        };

        let parsed: ReservedIps = match &detail.value {
            serde_json::Value::String(raw) => serde_json::from_str(raw).map_err(|e| {
                unexpected(format!("failed to unmarshal reserved IP response {}: {}", raw, e))
            })?,
            value @ serde_json::Value::Object(_) => serde_json::from_value(value.clone())
                .map_err(|e| unexpected(format!("failed to decode reserved IP response: {}", e)))?,
            other => {
                return Err(unexpected(format!(
                    "unexpected completion detail value: {}",
                    other
                )));
            }
        };

        if parsed.reserved_ips.is_empty() {
            return Err(unexpected("no IP address reserved".to_string()));
        }

        parsed
            .reserved_ips
            .iter()
            .map(|ip| {
                ip.parse::<IpAddr>()
                    .map_err(|e| unexpected(format!("failed to parse reserved IP {:?}: {}", ip, e)))
            })
            .collect()
    }
}

/// Polling parameters for [`AsyncTaskTracker::wait`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    pub poll_interval: Duration,
    pub timeout: Duration,
    /// Poll before the first sleep
    pub poll_immediately: bool,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            timeout: Duration::from_secs(5 * 60),
            poll_immediately: false,
        }
    }
}

/// Submits reserve/release operations and tracks their tasks
#[derive(Clone)]
pub struct AsyncTaskTracker {
    client: Arc<dyn PrismClientTrait>,
}

impl std::fmt::Debug for AsyncTaskTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncTaskTracker")
            .field("base_url", &self.client.base_url())
            .finish()
    }
}

fn diagnostic(task: &Task) -> String {
    serde_json::to_string(task).unwrap_or_else(|_| format!("{:?}", task))
}

impl AsyncTaskTracker {
    pub fn new(client: Arc<dyn PrismClientTrait>) -> Self {
        Self { client }
    }

    /// Submit a reservation; returns the task id
    pub async fn submit_reserve(
        &self,
        subnet: &ResolvedSubnet,
        spec: &IpReserveSpec,
        request_id: &str,
    ) -> Result<String, IpamError> {
        let subnet_id = subnet.ext_id.to_string();
        let task = self
            .client
            .reserve_ips_by_subnet_id(&subnet_id, spec, request_id)
            .await
            .map_err(|e| {
                IpamError::remote(format!("failed to reserve IP in subnet {}", subnet_id), e)
            })?;
        info!(
            "Submitted reserve-ips on subnet {} (request {}), task {}",
            subnet_id, request_id, task.ext_id
        );
        Ok(task.ext_id)
    }

    /// Submit a release; returns the task id
    pub async fn submit_release(
        &self,
        subnet: &ResolvedSubnet,
        spec: &IpUnreserveSpec,
        request_id: &str,
    ) -> Result<String, IpamError> {
        let subnet_id = subnet.ext_id.to_string();
        let task = self
            .client
            .unreserve_ips_by_subnet_id(&subnet_id, spec, request_id)
            .await
            .map_err(|e| {
                IpamError::remote(format!("failed to unreserve IP in subnet {}", subnet_id), e)
            })?;
        info!(
            "Submitted unreserve-ips on subnet {} (request {}), task {}",
            subnet_id, request_id, task.ext_id
        );
        Ok(task.ext_id)
    }

    /// Read the task once
    pub async fn poll(&self, task_id: &str) -> Result<CompletedTask, IpamError> {
        let task = self
            .client
            .get_task_by_id(task_id)
            .await
            .map_err(|e| IpamError::remote("failed to check task status", e))?;

        debug!("Task {} status {:?}", task_id, task.status);
        match TaskState::from(task.status) {
            TaskState::Pending => Err(IpamError::TaskOngoing {
                task_id: task_id.to_string(),
            }),
            TaskState::Succeeded => Ok(CompletedTask {
                task_id: task_id.to_string(),
                completion_details: task.completion_details,
            }),
            TaskState::Failed => Err(IpamError::TaskFailed {
                task_id: task_id.to_string(),
                details: diagnostic(&task),
            }),
            TaskState::Cancelled => Err(IpamError::TaskCancelled {
                task_id: task_id.to_string(),
                details: diagnostic(&task),
            }),
        }
    }

    /// Poll until the task is terminal or `opts.timeout` elapses
    pub async fn wait(&self, task_id: &str, opts: &WaitOptions) -> Result<CompletedTask, IpamError> {
        let started = Instant::now();
        let mut first = true;
        loop {
            if !(first && opts.poll_immediately) {
                tokio::time::sleep(opts.poll_interval).await;
            }
            first = false;

            match self.poll(task_id).await {
                Err(e) if e.is_ongoing() => {
                    let elapsed = started.elapsed();
                    if elapsed >= opts.timeout {
                        return Err(IpamError::Timeout {
                            task_id: task_id.to_string(),
                            elapsed,
                        });
                    }
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_client::mock::helpers::subnet;
    use prism_client::{MockPrismClient, ReserveType, TaskScript};
    use serde_json::json;
    use uuid::Uuid;

    const SUBNET: &str = "5a5a5a5a-0000-4000-8000-000000000001";

    fn setup() -> (MockPrismClient, AsyncTaskTracker, ResolvedSubnet) {
        let mock = MockPrismClient::new("https://pc.test:9440");
        mock.add_subnet(subnet(SUBNET, "vlan-10", None));
        mock.set_available_ips(SUBNET, vec!["10.0.0.5".parse().unwrap()]);
        let tracker = AsyncTaskTracker::new(Arc::new(mock.clone()));
        let resolved = ResolvedSubnet {
            ext_id: Uuid::parse_str(SUBNET).unwrap(),
            name: "vlan-10".to_string(),
        };
        (mock, tracker, resolved)
    }

    fn count_one() -> IpReserveSpec {
        IpReserveSpec {
            reserve_type: ReserveType::IpAddressCount,
            count: Some(1),
            start_ip_address: None,
            ip_addresses: Vec::new(),
            client_context: None,
        }
    }

    fn completed(details: Vec<KvPair>) -> CompletedTask {
        CompletedTask {
            task_id: "t1".to_string(),
            completion_details: details,
        }
    }

    #[test]
    fn test_status_mapping_is_exhaustive() {
        assert_eq!(TaskState::from(None), TaskState::Pending);
        assert_eq!(TaskState::from(Some(TaskStatus::Queued)), TaskState::Pending);
        assert_eq!(TaskState::from(Some(TaskStatus::Canceling)), TaskState::Pending);
        assert_eq!(TaskState::from(Some(TaskStatus::Succeeded)), TaskState::Succeeded);
        assert_eq!(TaskState::from(Some(TaskStatus::Failed)), TaskState::Failed);
        assert_eq!(TaskState::from(Some(TaskStatus::Canceled)), TaskState::Cancelled);
    }

    #[test]
    fn test_reserved_ips_accepts_quoted_string_and_object() {
        let quoted = completed(vec![KvPair {
            name: "reservedIps".to_string(),
            value: json!("{\"reserved_ips\":[\"10.0.0.10\",\"10.0.0.11\"]}"),
        }]);
        assert_eq!(quoted.reserved_ips().unwrap().len(), 2);

        let object = completed(vec![KvPair {
            name: "reservedIps".to_string(),
            value: json!({"reserved_ips": ["fd00::5"]}),
        }]);
        assert_eq!(object.reserved_ips().unwrap(), vec!["fd00::5".parse::<IpAddr>().unwrap()]);
    }

    #[test]
    fn test_reserved_ips_rejects_malformed_details() {
        let pair = |v: serde_json::Value| KvPair {
            name: "x".to_string(),
            value: v,
        };
        let cases = vec![
            completed(vec![]),
            completed(vec![pair(json!("{}")), pair(json!("{}"))]),
            completed(vec![pair(json!("{\"reserved_ips\":[]}"))]),
            completed(vec![pair(json!("{\"reserved_ips\":[\"nope\"]}"))]),
            completed(vec![pair(json!(42))]),
        ];
        for case in cases {
            assert!(matches!(
                case.reserved_ips(),
                Err(IpamError::UnexpectedResponse { .. })
            ));
        }
    }

    #[tokio::test]
    async fn test_pending_task_reports_ongoing_then_succeeds() {
        let (mock, tracker, resolved) = setup();
        mock.push_task_script(TaskScript::succeed_after(1));
        let task_id = tracker.submit_reserve(&resolved, &count_one(), "req-1").await.unwrap();

        let first = tracker.poll(&task_id).await.unwrap_err();
        assert!(first.is_ongoing());

        let done = tracker.poll(&task_id).await.unwrap();
        assert_eq!(done.reserved_ips().unwrap(), vec!["10.0.0.5".parse::<IpAddr>().unwrap()]);
        // One submission, never retried by polling
        assert_eq!(mock.call_count("reserve_ips_by_subnet_id"), 1);
    }

    #[tokio::test]
    async fn test_failed_task_embeds_remote_diagnostic() {
        let (mock, tracker, resolved) = setup();
        mock.push_task_script(TaskScript::fail_after(0, "subnet exhausted"));
        let task_id = tracker.submit_reserve(&resolved, &count_one(), "req-1").await.unwrap();

        let err = tracker.poll(&task_id).await.unwrap_err();
        assert!(err.is_terminal_task_failure());
        assert!(err.to_string().contains("subnet exhausted"));
    }

    #[tokio::test]
    async fn test_cancelled_task_is_terminal() {
        let (mock, tracker, resolved) = setup();
        mock.push_task_script(TaskScript::cancel_after(0));
        let task_id = tracker.submit_reserve(&resolved, &count_one(), "req-1").await.unwrap();
        assert!(matches!(
            tracker.poll(&task_id).await,
            Err(IpamError::TaskCancelled { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_polls_until_terminal() {
        let (mock, tracker, resolved) = setup();
        mock.push_task_script(TaskScript::succeed_after(3));
        let task_id = tracker.submit_reserve(&resolved, &count_one(), "req-1").await.unwrap();

        let done = tracker.wait(&task_id, &WaitOptions::default()).await.unwrap();
        assert_eq!(done.task_id, task_id);
        assert_eq!(mock.call_count("get_task_by_id"), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out_without_cancelling_remote_task() {
        let (mock, tracker, resolved) = setup();
        mock.push_task_script(TaskScript::succeed_after(1_000));
        let task_id = tracker.submit_reserve(&resolved, &count_one(), "req-1").await.unwrap();

        let opts = WaitOptions {
            poll_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(5),
            poll_immediately: true,
        };
        let err = tracker.wait(&task_id, &opts).await.unwrap_err();
        assert!(matches!(err, IpamError::Timeout { .. }));
        assert_eq!(mock.task(&task_id).unwrap().status, Some(TaskStatus::Running));
    }
}
