//! Prism Central API client
//!
//! Implements the v4 REST endpoints used for subnet IP reservations:
//! `/api/networking/v4.0/config/subnets`, `/api/prism/v4.0/config/tasks`
//! and `/api/clustermgmt/v4.0/config/clusters`.

use crate::common::HttpClient;
use crate::common::query::{MAX_PAGE_SIZE, has_more_pages, list_path};
use crate::error::PrismError;
use crate::models::*;
use crate::prism_trait::PrismClientTrait;
use reqwest::{Certificate, Client};
use std::net::Ipv6Addr;
use std::time::Duration;
use tracing::{debug, warn};

/// Default Prism Central port
pub const DEFAULT_PORT: u16 = 9440;

const SUBNETS_PATH: &str = "/api/networking/v4.0/config/subnets";
const TASKS_PATH: &str = "/api/prism/v4.0/config/tasks";
const CLUSTERS_PATH: &str = "/api/clustermgmt/v4.0/config/clusters";

/// Stop paging after this many pages even if the server keeps returning full ones
const MAX_PAGES: u32 = 1000;

/// Connection parameters for a Prism Central instance
#[derive(Clone, PartialEq, Eq)]
pub struct ManagementEndpoint {
    /// IP literal or hostname, without scheme or port
    pub address: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Skip certificate verification
    pub insecure: bool,
    /// PEM bundle appended to the root store
    pub additional_trust_bundle: Option<String>,
}

impl std::fmt::Debug for ManagementEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagementEndpoint")
            .field("address", &self.address)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("insecure", &self.insecure)
            .field(
                "additional_trust_bundle",
                &self.additional_trust_bundle.as_ref().map(|_| "<pem>"),
            )
            .finish_non_exhaustive()
    }
}

impl ManagementEndpoint {
    /// Base URL, bracketing IPv6 literals
    pub fn base_url(&self) -> String {
        if self.address.parse::<Ipv6Addr>().is_ok() {
            format!("https://[{}]:{}", self.address, self.port)
        } else {
            format!("https://{}:{}", self.address, self.port)
        }
    }
}

/// Prism Central API client
#[derive(Debug, Clone)]
pub struct PrismClient {
    http: HttpClient,
}

impl PrismClient {
    /// Create a new Prism Central client
    ///
    /// Fails with [`PrismError::Tls`] when the trust bundle holds no usable certificate.
    pub fn new(endpoint: &ManagementEndpoint) -> Result<Self, PrismError> {
        let mut builder = Client::builder().timeout(Duration::from_secs(30));

        if endpoint.insecure {
            builder = builder.danger_accept_invalid_certs(true);
        }

        if let Some(bundle) = endpoint
            .additional_trust_bundle
            .as_deref()
            .filter(|b| !b.trim().is_empty())
        {
            let certs = Certificate::from_pem_bundle(bundle.as_bytes())
                .map_err(|e| PrismError::Tls(format!("invalid trust bundle: {}", e)))?;
            if certs.is_empty() {
                return Err(PrismError::Tls(
                    "trust bundle contains no certificates".to_string(),
                ));
            }
            for cert in certs {
                builder = builder.add_root_certificate(cert);
            }
        }

        let client = builder.build().map_err(PrismError::Http)?;

        Ok(Self {
            http: HttpClient::new(
                client,
                endpoint.base_url(),
                endpoint.username.clone(),
                endpoint.password.clone(),
            ),
        })
    }

    /// Fetch every page of a list endpoint
    async fn fetch_all_pages<T: for<'de> serde::Deserialize<'de>>(
        &self,
        base: &str,
        filter: Option<&str>,
    ) -> Result<Vec<T>, PrismError> {
        let mut all_results = Vec::new();
        for page in 0..MAX_PAGES {
            let path = list_path(base, filter, Some(page), Some(MAX_PAGE_SIZE));
            let response: ApiResponse<Vec<T>> = self.http.get(&path).await?;
            let total = response.total_available_results();
            let items = response.data.unwrap_or_default();
            let page_len = items.len();
            all_results.extend(items);

            if !has_more_pages(all_results.len(), page_len, MAX_PAGE_SIZE, total) {
                return Ok(all_results);
            }
            debug!("Fetched page {} of {} ({} results so far)", page, base, all_results.len());
        }
        warn!(
            "Stopped listing {} after {} pages ({} results)",
            base,
            MAX_PAGES,
            all_results.len()
        );
        Ok(all_results)
    }

    fn require_id(kind: &str, ext_id: &str) -> Result<(), PrismError> {
        if ext_id.trim().is_empty() {
            return Err(PrismError::InvalidRequest(format!(
                "{} extId must not be empty",
                kind
            )));
        }
        Ok(())
    }
}

fn required<T>(response: ApiResponse<T>, what: &str) -> Result<T, PrismError> {
    response.data.ok_or_else(|| {
        PrismError::InvalidRequest(format!("response for {} carried no data", what))
    })
}

#[async_trait::async_trait]
impl PrismClientTrait for PrismClient {
    fn base_url(&self) -> &str {
        self.http.base_url()
    }

    async fn validate_credentials(&self) -> Result<(), PrismError> {
        debug!("Validating Prism Central credentials and connectivity");
        let path = list_path(CLUSTERS_PATH, None, None, Some(1));
        let _: ApiResponse<serde_json::Value> = self.http.get(&path).await?;
        debug!("Credentials validated successfully");
        Ok(())
    }

    async fn list_subnets(&self, filter: Option<&str>) -> Result<Vec<Subnet>, PrismError> {
        self.fetch_all_pages(SUBNETS_PATH, filter).await
    }

    async fn get_subnet_by_id(&self, ext_id: &str) -> Result<Subnet, PrismError> {
        Self::require_id("subnet", ext_id)?;
        let path = format!("{}/{}", SUBNETS_PATH, ext_id);
        let response: ApiResponse<Subnet> = self.http.get(&path).await?;
        required(response, &path)
    }

    async fn reserve_ips_by_subnet_id(
        &self,
        ext_id: &str,
        spec: &IpReserveSpec,
        request_id: &str,
    ) -> Result<TaskReference, PrismError> {
        Self::require_id("subnet", ext_id)?;
        let path = format!("{}/{}/$actions/reserve-ips", SUBNETS_PATH, ext_id);
        let body = serde_json::to_value(spec)?;
        let response: ApiResponse<TaskReference> =
            self.http.post(&path, &body, Some(request_id)).await?;
        required(response, &path)
    }

    async fn unreserve_ips_by_subnet_id(
        &self,
        ext_id: &str,
        spec: &IpUnreserveSpec,
        request_id: &str,
    ) -> Result<TaskReference, PrismError> {
        Self::require_id("subnet", ext_id)?;
        let path = format!("{}/{}/$actions/unreserve-ips", SUBNETS_PATH, ext_id);
        let body = serde_json::to_value(spec)?;
        let response: ApiResponse<TaskReference> =
            self.http.post(&path, &body, Some(request_id)).await?;
        required(response, &path)
    }

    async fn get_task_by_id(&self, ext_id: &str) -> Result<Task, PrismError> {
        Self::require_id("task", ext_id)?;
        let path = format!("{}/{}", TASKS_PATH, ext_id);
        let response: ApiResponse<Task> = self.http.get(&path).await?;
        required(response, &path)
    }

    async fn list_clusters(&self, filter: Option<&str>) -> Result<Vec<Cluster>, PrismError> {
        self.fetch_all_pages(CLUSTERS_PATH, filter).await
    }

    async fn get_cluster_by_id(&self, ext_id: &str) -> Result<Cluster, PrismError> {
        Self::require_id("cluster", ext_id)?;
        let path = format!("{}/{}", CLUSTERS_PATH, ext_id);
        let response: ApiResponse<Cluster> = self.http.get(&path).await?;
        required(response, &path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(address: &str) -> ManagementEndpoint {
        ManagementEndpoint {
            address: address.to_string(),
            port: DEFAULT_PORT,
            username: "admin".to_string(),
            password: "secret".to_string(),
            insecure: false,
            additional_trust_bundle: None,
        }
    }

    #[test]
    fn test_base_url_brackets_ipv6() {
        assert_eq!(endpoint("10.0.0.1").base_url(), "https://10.0.0.1:9440");
        assert_eq!(endpoint("pc.example.com").base_url(), "https://pc.example.com:9440");
        assert_eq!(endpoint("fd00::1").base_url(), "https://[fd00::1]:9440");
    }

    #[test]
    fn test_debug_redacts_password() {
        let rendered = format!("{:?}", endpoint("pc"));
        assert!(!rendered.contains("secret"));
    }

    #[test]
    fn test_malformed_trust_bundle_is_tls_error() {
        let mut ep = endpoint("pc");
        ep.additional_trust_bundle = Some("not a pem bundle".to_string());
        let err = PrismClient::new(&ep).unwrap_err();
        assert!(matches!(err, PrismError::Tls(_)), "got {err:?}");
    }

    #[test]
    fn test_list_metadata_total() {
        let response: ApiResponse<Vec<Subnet>> = serde_json::from_value(serde_json::json!({
            "data": [],
            "metadata": { "totalAvailableResults": 240 }
        }))
        .unwrap();
        assert_eq!(response.total_available_results(), Some(240));

        let bare: ApiResponse<Vec<Subnet>> = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(bare.total_available_results(), None);
    }

    #[test]
    fn test_client_creation_without_bundle() {
        let client = PrismClient::new(&endpoint("pc.example.com")).unwrap();
        assert_eq!(client.base_url(), "https://pc.example.com:9440");
    }
}
