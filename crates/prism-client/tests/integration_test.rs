//! Integration tests for the Prism client
//!
//! These tests require a reachable Prism Central.
//! Set PRISM_ENDPOINT, NUTANIX_USER, NUTANIX_PASSWORD and PRISM_SUBNET to run.

use prism_client::{
    DEFAULT_PORT, FilterBuilder, ManagementEndpoint, PrismClient, PrismClientTrait,
};

fn client_from_env() -> PrismClient {
    let address = std::env::var("PRISM_ENDPOINT")
        .expect("PRISM_ENDPOINT environment variable must be set");
    let username =
        std::env::var("NUTANIX_USER").expect("NUTANIX_USER environment variable must be set");
    let password = std::env::var("NUTANIX_PASSWORD")
        .expect("NUTANIX_PASSWORD environment variable must be set");

    PrismClient::new(&ManagementEndpoint {
        address,
        port: DEFAULT_PORT,
        username,
        password,
        insecure: true,
        additional_trust_bundle: None,
    })
    .expect("Failed to create client")
}

#[tokio::test]
#[ignore] // Requires running Prism Central
async fn test_validate_credentials() {
    let client = client_from_env();
    client
        .validate_credentials()
        .await
        .expect("credentials should be accepted");
}

#[tokio::test]
#[ignore]
async fn test_list_clusters() {
    let client = client_from_env();
    let clusters = client.list_clusters(None).await.expect("Failed to list clusters");
    println!("Found {} clusters", clusters.len());
}

#[tokio::test]
#[ignore]
async fn test_lookup_subnet_by_name() {
    let client = client_from_env();
    let name = std::env::var("PRISM_SUBNET").expect("PRISM_SUBNET must be set");

    let filter = FilterBuilder::new().eq("name", &name).build();
    let subnets = client
        .list_subnets(filter.as_deref())
        .await
        .expect("Failed to list subnets");
    println!("Found {} subnets named {}", subnets.len(), name);

    for subnet in subnets {
        let fetched = client
            .get_subnet_by_id(&subnet.ext_id)
            .await
            .expect("subnet listed by name should be fetchable by id");
        assert_eq!(fetched.ext_id, subnet.ext_id);
    }
}

#[tokio::test]
#[ignore]
async fn test_unknown_task_is_not_found() {
    let client = client_from_env();
    let err = client
        .get_task_by_id("ZXJnb24=:00000000-0000-0000-0000-000000000000")
        .await
        .expect_err("unknown task must not resolve");
    println!("Unknown task lookup failed as expected: {}", err);
}
