//! Test utilities for unit testing the reconciler
//!
//! Builders for the resources the reconcile helpers operate on.

#[cfg(test)]
use crds::*;
#[cfg(test)]
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// Helper to create a test IPAddressClaim referencing a NutanixIPPool
#[cfg(test)]
pub fn create_test_claim(name: &str, namespace: &str, pool: &str) -> IPAddressClaim {
    IPAddressClaim {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            uid: Some(format!("uid-{name}")),
            generation: Some(1),
            resource_version: Some("42".to_string()),
            ..Default::default()
        },
        spec: IPAddressClaimSpec {
            pool_ref: TypedLocalReference::nutanix_ip_pool(pool),
        },
        status: None,
    }
}

/// Helper to create a test NutanixIPPool on a subnet UUID
#[cfg(test)]
pub fn create_test_pool(name: &str, namespace: &str) -> NutanixIPPool {
    let mut pool = NutanixIPPool::new(
        name,
        NutanixIPPoolSpec {
            prism_central: PrismCentralSpec {
                address: "pc.example.com".to_string(),
                port: DEFAULT_PRISM_PORT,
                credentials_secret_ref: LocalReference::new("pc-creds"),
                insecure: false,
                additional_trust_bundle: None,
            },
            subnet: "3f1e2d4c-0000-4000-8000-0000000000aa".to_string(),
            cluster: None,
        },
    );
    pool.metadata.namespace = Some(namespace.to_string());
    pool
}

/// Helper to create a test IPAddress committed for `claim`
#[cfg(test)]
pub fn create_test_address(claim: &IPAddressClaim, address: &str) -> IPAddress {
    let name = claim.metadata.name.clone().unwrap_or_default();
    let mut ip = IPAddress::new(
        &name,
        IPAddressSpec {
            claim_ref: LocalReference::new(&name),
            pool_ref: claim.spec.pool_ref.clone(),
            address: address.to_string(),
            prefix: None,
            gateway: None,
        },
    );
    ip.metadata.namespace = claim.metadata.namespace.clone();
    ip
}
