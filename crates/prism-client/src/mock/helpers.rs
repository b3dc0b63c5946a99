//! Helper functions for creating model fixtures

use crate::models::{Cluster, Subnet};

/// Build a subnet fixture
pub fn subnet(ext_id: &str, name: &str, cluster_reference: Option<&str>) -> Subnet {
    Subnet {
        ext_id: ext_id.to_string(),
        name: name.to_string(),
        cluster_reference: cluster_reference.map(str::to_string),
        subnet_type: Some("VLAN".to_string()),
        description: None,
    }
}

/// Build a cluster fixture
pub fn cluster(ext_id: &str, name: &str) -> Cluster {
    Cluster {
        ext_id: ext_id.to_string(),
        name: name.to_string(),
    }
}
