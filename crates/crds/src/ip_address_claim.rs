//! IPAddressClaim CRD
//!
//! A request for one address from a pool. The claim UID tags the remote
//! reservation so it can be released without knowing the address.

use crate::references::{LocalReference, TypedLocalReference};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "ipam.cluster.x-k8s.io",
    version = "v1beta1",
    kind = "IPAddressClaim",
    namespaced,
    status = "IPAddressClaimStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct IPAddressClaimSpec {
    /// Pool to allocate from
    pub pool_ref: TypedLocalReference,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct IPAddressClaimStatus {
    /// The IPAddress created for this claim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_ref: Option<LocalReference>,

    #[serde(default)]
    pub state: ClaimState,

    /// Error message if the last attempt failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reconciled: Option<chrono::DateTime<chrono::Utc>>,
}

/// Claim allocation state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "PascalCase")]
pub enum ClaimState {
    #[default]
    Pending,
    Allocated,
    Failed,
}

impl IPAddressClaim {
    /// Whether an address was recorded on the claim
    pub fn address_recorded(&self) -> bool {
        self.status
            .as_ref()
            .and_then(|s| s.address_ref.as_ref())
            .is_some_and(|r| !r.name.is_empty())
    }
}
