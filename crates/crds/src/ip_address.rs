//! IPAddress CRD
//!
//! The committed allocation for a claim. Created with the claim's name and
//! owned by it.

use crate::references::{LocalReference, TypedLocalReference};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "ipam.cluster.x-k8s.io",
    version = "v1beta1",
    kind = "IPAddress",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct IPAddressSpec {
    /// Claim this address was allocated for
    pub claim_ref: LocalReference,

    /// Pool the address came from
    pub pool_ref: TypedLocalReference,

    pub address: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
}
