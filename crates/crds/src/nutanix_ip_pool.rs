//! NutanixIPPool CRD
//!
//! Points at a Prism Central subnet. Addresses are reserved there on behalf
//! of claims that reference the pool.

use crate::references::LocalReference;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use thiserror::Error;

/// Default Prism Central API port
pub const DEFAULT_PRISM_PORT: u16 = 9440;

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "ipam.cluster.x-k8s.io",
    version = "v1alpha1",
    kind = "NutanixIPPool",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct NutanixIPPoolSpec {
    /// Prism Central endpoint and credentials
    pub prism_central: PrismCentralSpec,

    /// Subnet UUID or name
    pub subnet: String,

    /// Cluster UUID or name. Required when `subnet` is a name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PrismCentralSpec {
    /// IP address or hostname, without scheme or port
    pub address: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Secret holding the `credentials` key
    pub credentials_secret_ref: LocalReference,

    /// Skip certificate verification
    #[serde(default)]
    pub insecure: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_trust_bundle: Option<TrustBundle>,
}

fn default_port() -> u16 {
    DEFAULT_PRISM_PORT
}

/// Extra CA certificates, inline or from a ConfigMap (key `ca.crt`)
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TrustBundle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trust_bundle_data: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trust_bundle_config_map_ref: Option<LocalReference>,
}

/// Rejected pool spec
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CrdValidationError {
    #[error("subnet must not be empty")]
    EmptySubnet,

    #[error("prismCentral.address {0:?} must be an IP address or hostname")]
    InvalidAddress(String),

    #[error("prismCentral.port must be between 1 and 65535")]
    InvalidPort,

    #[error("cluster is required if subnet {subnet:?} is not a valid uuid")]
    ClusterRequired { subnet: String },

    #[error("credentialsSecretRef.name must not be empty")]
    MissingCredentials,

    #[error("additionalTrustBundle must set exactly one of trustBundleData and trustBundleConfigMapRef")]
    InvalidTrustBundle,
}

impl NutanixIPPoolSpec {
    /// Reject an unusable pool before any remote call is made
    pub fn validate(&self) -> Result<(), CrdValidationError> {
        let subnet = self.subnet.trim();
        if subnet.is_empty() {
            return Err(CrdValidationError::EmptySubnet);
        }
        if uuid::Uuid::parse_str(subnet).is_err()
            && self.cluster.as_deref().is_none_or(|c| c.trim().is_empty())
        {
            return Err(CrdValidationError::ClusterRequired {
                subnet: self.subnet.clone(),
            });
        }
        self.prism_central.validate()
    }
}

impl PrismCentralSpec {
    pub fn validate(&self) -> Result<(), CrdValidationError> {
        if !is_valid_host(&self.address) {
            return Err(CrdValidationError::InvalidAddress(self.address.clone()));
        }
        if self.port == 0 {
            return Err(CrdValidationError::InvalidPort);
        }
        if self.credentials_secret_ref.name.is_empty() {
            return Err(CrdValidationError::MissingCredentials);
        }
        if let Some(bundle) = &self.additional_trust_bundle {
            let has_data = bundle
                .trust_bundle_data
                .as_deref()
                .is_some_and(|d| !d.trim().is_empty());
            let has_ref = bundle
                .trust_bundle_config_map_ref
                .as_ref()
                .is_some_and(|r| !r.name.is_empty());
            if has_data == has_ref {
                return Err(CrdValidationError::InvalidTrustBundle);
            }
        }
        Ok(())
    }
}

/// IP literal or RFC 1123 hostname
fn is_valid_host(host: &str) -> bool {
    if host.parse::<IpAddr>().is_ok() {
        return true;
    }
    if host.is_empty() || host.len() > 253 {
        return false;
    }
    host.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}
