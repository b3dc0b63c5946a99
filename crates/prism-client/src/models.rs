//! Prism Central v4 API models
//!
//! These models cover the subset of the networking, prism and clustermgmt
//! namespaces used for IP reservations. Fields the workflow does not read
//! are left out; unknown fields in responses are ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Standard v4 response envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Payload; absent on empty list responses
    #[serde(default = "Option::default")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl<T> ApiResponse<T> {
    /// Wrap a payload in an envelope
    pub fn new(data: T) -> Self {
        Self {
            data: Some(data),
            metadata: None,
        }
    }

    /// `metadata.totalAvailableResults` of a list response
    pub fn total_available_results(&self) -> Option<u64> {
        self.metadata
            .as_ref()?
            .get("totalAvailableResults")?
            .as_u64()
    }
}

/// Subnet model (networking/v4/config/Subnet)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subnet {
    pub ext_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Cluster model (clustermgmt/v4/config/Cluster)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    pub ext_id: String,
    pub name: String,
}

/// Reference to an asynchronous task returned by mutating calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskReference {
    pub ext_id: String,
}

/// Task status as reported by prism/v4/config/Task
///
/// No catch-all variant: an unrecognised status fails deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Queued,
    Running,
    Canceling,
    Succeeded,
    Failed,
    Canceled,
}

impl TaskStatus {
    /// Whether the task has reached a final state
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Canceled
        )
    }
}

/// Name/value pair from a task's completion details
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KvPair {
    pub name: String,
    pub value: serde_json::Value,
}

/// Error message attached to a failed task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
}

/// Task model (prism/v4/config/Task)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub ext_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_percentage: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub completion_details: Vec<KvPair>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub error_messages: Vec<AppMessage>,
}

/// Single address value (common/v1/config/IPv4Address, IPv6Address)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpAddressValue {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix_length: Option<u8>,
}

/// Family-tagged address (common/v1/config/IPAddress)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IpAddress {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv4: Option<IpAddressValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv6: Option<IpAddressValue>,
}

impl From<IpAddr> for IpAddress {
    fn from(addr: IpAddr) -> Self {
        let value = IpAddressValue {
            value: addr.to_string(),
            prefix_length: None,
        };
        match addr {
            IpAddr::V4(_) => IpAddress {
                ipv4: Some(value),
                ipv6: None,
            },
            IpAddr::V6(_) => IpAddress {
                ipv4: None,
                ipv6: Some(value),
            },
        }
    }
}

impl IpAddress {
    /// Parse the literal back into an address, if one is set and well formed
    pub fn to_ip_addr(&self) -> Option<IpAddr> {
        self.ipv4
            .as_ref()
            .or(self.ipv6.as_ref())
            .and_then(|v| v.value.parse().ok())
    }
}

/// Reserve strategy (networking/v4/config/ReserveType)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReserveType {
    IpAddressCount,
    IpAddressRange,
    IpAddressList,
}

/// Unreserve strategy (networking/v4/config/UnreserveType)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnreserveType {
    IpAddressList,
    IpAddressRange,
    Context,
}

/// Request body for `$actions/reserve-ips`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpReserveSpec {
    pub reserve_type: ReserveType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_ip_address: Option<IpAddress>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ip_addresses: Vec<IpAddress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_context: Option<String>,
}

/// Request body for `$actions/unreserve-ips`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpUnreserveSpec {
    pub unreserve_type: UnreserveType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_ip_address: Option<IpAddress>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ip_addresses: Vec<IpAddress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_context: Option<String>,
}
