//! Common utilities for the Prism Central API client
//!
//! Provides the authenticated HTTP wrapper shared by every API group.

pub mod query;

use crate::error::PrismError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use tracing::debug;

/// Header carrying the caller-chosen request identifier.
///
/// Prism Central collapses submissions that repeat the same identifier onto
/// the task created by the first one.
pub const REQUEST_ID_HEADER: &str = "NTNX-Request-Id";

/// HTTP client wrapper with basic authentication
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    base_url: String,
    username: String,
    password: String,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl HttpClient {
    /// Create a new HTTP client wrapper
    pub fn new(client: Client, base_url: String, username: String, password: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            username,
            password,
        }
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build a full URL from a path
    pub fn build_url(&self, path: &str) -> String {
        if path.starts_with("http") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        }
    }

    /// Get authorization header value
    pub fn auth_header(&self) -> String {
        let raw = format!("{}:{}", self.username, self.password);
        format!("Basic {}", STANDARD.encode(raw))
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("Authorization", self.auth_header())
            .header("Accept", "application/json")
    }

    /// Make a GET request
    pub async fn get<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T, PrismError> {
        let url = self.build_url(path);
        debug!("GET {}", url);

        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(PrismError::Http)?;

        let response = check_status(response, "GET", path).await?;
        decode(response, "GET", path).await
    }

    /// Make a POST request, optionally tagging it with a request identifier
    pub async fn post<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &serde_json::Value,
        request_id: Option<&str>,
    ) -> Result<T, PrismError> {
        let url = self.build_url(path);
        debug!(
            "POST {} (request id {:?}) with body: {}",
            url,
            request_id,
            serde_json::to_string_pretty(body).unwrap_or_default()
        );

        let mut builder = self
            .authorized(self.client.post(&url))
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(id) = request_id {
            builder = builder.header(REQUEST_ID_HEADER, id);
        }

        let response = builder.send().await.map_err(PrismError::Http)?;
        let response = check_status(response, "POST", path).await?;
        decode(response, "POST", path).await
    }
}

/// Map non-success responses onto the error taxonomy
async fn check_status(response: Response, method: &str, path: &str) -> Result<Response, PrismError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    match status.as_u16() {
        401 | 403 => Err(PrismError::Authentication(format!(
            "{} {}: {} - {}",
            method, path, status, body
        ))),
        404 => Err(PrismError::NotFound(format!(
            "Resource not found: {} - {}",
            path, body
        ))),
        code => Err(PrismError::Api {
            context: format!("{} {}", method, path),
            status: code,
            body,
        }),
    }
}

async fn decode<T: for<'de> Deserialize<'de>>(
    response: Response,
    method: &str,
    path: &str,
) -> Result<T, PrismError> {
    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| {
        debug!(
            "{} {} returned an undecodable body (first 500 chars): {}",
            method,
            path,
            text.chars().take(500).collect::<String>()
        );
        PrismError::Serialization(e)
    })
}
