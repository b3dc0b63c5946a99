//! Object references shared by the IPAM resources

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// API group of the cluster-api IPAM resources
pub const IPAM_API_GROUP: &str = "ipam.cluster.x-k8s.io";

/// Kind served by this provider
pub const NUTANIX_IP_POOL_KIND: &str = "NutanixIPPool";

/// Reference to an object in the same namespace, by kind
///
/// Mirrors `TypedLocalObjectReference`: `apiGroup` may be omitted for core kinds.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TypedLocalReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_group: Option<String>,

    pub kind: String,

    pub name: String,
}

impl TypedLocalReference {
    /// Reference to a `NutanixIPPool`
    pub fn nutanix_ip_pool(name: impl Into<String>) -> Self {
        Self {
            api_group: Some(IPAM_API_GROUP.to_string()),
            kind: NUTANIX_IP_POOL_KIND.to_string(),
            name: name.into(),
        }
    }

    /// Whether this points at a pool served by this provider
    pub fn is_nutanix_ip_pool(&self) -> bool {
        self.api_group.as_deref() == Some(IPAM_API_GROUP) && self.kind == NUTANIX_IP_POOL_KIND
    }
}

/// Reference to an object in the same namespace, by name
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LocalReference {
    pub name: String,
}

impl LocalReference {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_ref_matching() {
        assert!(TypedLocalReference::nutanix_ip_pool("pool").is_nutanix_ip_pool());

        let other = TypedLocalReference {
            api_group: Some(IPAM_API_GROUP.to_string()),
            kind: "InClusterIPPool".to_string(),
            name: "pool".to_string(),
        };
        assert!(!other.is_nutanix_ip_pool());

        let no_group = TypedLocalReference {
            api_group: None,
            kind: NUTANIX_IP_POOL_KIND.to_string(),
            name: "pool".to_string(),
        };
        assert!(!no_group.is_nutanix_ip_pool());
    }

    #[test]
    fn test_api_group_is_optional_on_the_wire() {
        let parsed: TypedLocalReference =
            serde_json::from_str(r#"{"kind":"ConfigMap","name":"bundle"}"#).unwrap();
        assert_eq!(parsed.api_group, None);
        let json = serde_json::to_value(&parsed).unwrap();
        assert!(json.get("apiGroup").is_none());
    }
}
