//! Prism Central connection parameters from a pool and its Secret.
//!
//! The Secret carries a `credentials` key holding a JSON list:
//! `[{"type":"basic_auth","data":{"prismCentral":{"username":"…","password":"…"}}}]`.
//! A trust bundle may come inline or from a ConfigMap key `ca.crt`.

use crate::error::ControllerError;
use crds::PrismCentralSpec;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::{Api, Client};
use prism_client::ManagementEndpoint;
use serde::Deserialize;
use tracing::debug;

/// Secret key holding the credential list
pub const CREDENTIALS_KEY: &str = "credentials";
/// ConfigMap key holding PEM certificates
pub const TRUST_BUNDLE_KEY: &str = "ca.crt";

const BASIC_AUTH: &str = "basic_auth";

#[derive(Deserialize)]
struct CredentialEntry {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: CredentialData,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct CredentialData {
    prism_central: Option<BasicAuth>,
}

#[derive(Deserialize)]
struct BasicAuth {
    username: String,
    password: String,
}

/// Username and password for Prism Central
#[derive(Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// First `basic_auth` entry with Prism Central credentials
pub fn parse_credentials(raw: &[u8]) -> Result<BasicCredentials, ControllerError> {
    let entries: Vec<CredentialEntry> = serde_json::from_slice(raw)
        .map_err(|e| ControllerError::Credentials(format!("malformed {CREDENTIALS_KEY}: {e}")))?;
    let auth = entries
        .into_iter()
        .filter(|entry| entry.kind == BASIC_AUTH)
        .find_map(|entry| entry.data.prism_central)
        .ok_or_else(|| {
            ControllerError::Credentials(format!(
                "no {BASIC_AUTH} entry with prismCentral credentials"
            ))
        })?;
    if auth.username.is_empty() || auth.password.is_empty() {
        return Err(ControllerError::Credentials(
            "username and password must not be empty".to_string(),
        ));
    }
    Ok(BasicCredentials {
        username: auth.username,
        password: auth.password,
    })
}

pub fn credentials_from_secret(secret: &Secret) -> Result<BasicCredentials, ControllerError> {
    let name = secret.metadata.name.as_deref().unwrap_or("<unknown>");
    if let Some(raw) = secret.data.as_ref().and_then(|d| d.get(CREDENTIALS_KEY)) {
        return parse_credentials(&raw.0);
    }
    if let Some(raw) = secret.string_data.as_ref().and_then(|d| d.get(CREDENTIALS_KEY)) {
        return parse_credentials(raw.as_bytes());
    }
    Err(ControllerError::Credentials(format!(
        "Secret {name} has no {CREDENTIALS_KEY} key"
    )))
}

pub fn trust_bundle_from_config_map(config_map: &ConfigMap) -> Result<String, ControllerError> {
    let name = config_map.metadata.name.as_deref().unwrap_or("<unknown>");
    config_map
        .data
        .as_ref()
        .and_then(|d| d.get(TRUST_BUNDLE_KEY))
        .filter(|pem| !pem.trim().is_empty())
        .cloned()
        .ok_or_else(|| {
            ControllerError::InvalidConfig(format!("ConfigMap {name} has no {TRUST_BUNDLE_KEY} key"))
        })
}

/// Connection parameters from the pool spec and already-loaded material
pub fn management_endpoint(
    spec: &PrismCentralSpec,
    credentials: BasicCredentials,
    trust_bundle: Option<String>,
) -> ManagementEndpoint {
    ManagementEndpoint {
        address: spec.address.clone(),
        port: spec.port,
        username: credentials.username,
        password: credentials.password,
        insecure: spec.insecure,
        additional_trust_bundle: trust_bundle,
    }
}

/// Read the Secret (and ConfigMap, if referenced) a pool points at
pub async fn load_endpoint(
    client: &Client,
    namespace: &str,
    spec: &PrismCentralSpec,
) -> Result<ManagementEndpoint, ControllerError> {
    let secret_name = &spec.credentials_secret_ref.name;
    let secrets: Api<Secret> = Api::namespaced(client.clone(), namespace);
    let secret = secrets.get_opt(secret_name).await?.ok_or_else(|| {
        ControllerError::Credentials(format!("Secret {namespace}/{secret_name} not found"))
    })?;
    let credentials = credentials_from_secret(&secret)?;

    let trust_bundle = match &spec.additional_trust_bundle {
        Some(bundle) => match (&bundle.trust_bundle_data, &bundle.trust_bundle_config_map_ref) {
            (Some(data), _) => Some(data.clone()),
            (None, Some(reference)) => {
                debug!("Loading trust bundle from ConfigMap {}/{}", namespace, reference.name);
                let config_maps: Api<ConfigMap> = Api::namespaced(client.clone(), namespace);
                let config_map = config_maps.get_opt(&reference.name).await?.ok_or_else(|| {
                    ControllerError::InvalidConfig(format!(
                        "ConfigMap {namespace}/{} not found",
                        reference.name
                    ))
                })?;
                Some(trust_bundle_from_config_map(&config_map)?)
            }
            (None, None) => None,
        },
        None => None,
    };

    Ok(management_endpoint(spec, credentials, trust_bundle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crds::LocalReference;
    use k8s_openapi::ByteString;
    use std::collections::BTreeMap;

    const CREDS: &str = r#"[{"type":"basic_auth","data":{"prismCentral":{"username":"admin","password":"s3cret"}}}]"#;

    #[test]
    fn test_parse_basic_auth() {
        let creds = parse_credentials(CREDS.as_bytes()).unwrap();
        assert_eq!(creds.username, "admin");
        assert_eq!(creds.password, "s3cret");
        assert!(!format!("{creds:?}").contains("s3cret"));
    }

    #[test]
    fn test_other_entry_types_are_skipped() {
        let raw = r#"[
            {"type":"token","data":{}},
            {"type":"basic_auth","data":{"prismCentral":{"username":"u","password":"p"}}}
        ]"#;
        assert_eq!(parse_credentials(raw.as_bytes()).unwrap().username, "u");
    }

    #[test]
    fn test_missing_or_malformed_credentials() {
        assert!(matches!(
            parse_credentials(b"[]"),
            Err(ControllerError::Credentials(_))
        ));
        assert!(matches!(
            parse_credentials(b"{not json"),
            Err(ControllerError::Credentials(_))
        ));
        let empty = r#"[{"type":"basic_auth","data":{"prismCentral":{"username":"","password":"p"}}}]"#;
        assert!(parse_credentials(empty.as_bytes()).is_err());
    }

    #[test]
    fn test_secret_data_and_string_data() {
        let mut secret = Secret::default();
        assert!(credentials_from_secret(&secret).is_err());

        secret.string_data = Some(BTreeMap::from([(CREDENTIALS_KEY.to_string(), CREDS.to_string())]));
        assert_eq!(credentials_from_secret(&secret).unwrap().username, "admin");

        secret.string_data = None;
        secret.data = Some(BTreeMap::from([(
            CREDENTIALS_KEY.to_string(),
            ByteString(CREDS.as_bytes().to_vec()),
        )]));
        assert_eq!(credentials_from_secret(&secret).unwrap().password, "s3cret");
    }

    #[test]
    fn test_trust_bundle_key() {
        let mut config_map = ConfigMap::default();
        assert!(trust_bundle_from_config_map(&config_map).is_err());
        config_map.data = Some(BTreeMap::from([(
            TRUST_BUNDLE_KEY.to_string(),
            "-----BEGIN CERTIFICATE-----\n".to_string(),
        )]));
        assert!(trust_bundle_from_config_map(&config_map).is_ok());
    }

    #[test]
    fn test_endpoint_from_spec() {
        let spec = PrismCentralSpec {
            address: "pc.lab".to_string(),
            port: 9440,
            credentials_secret_ref: LocalReference::new("creds"),
            insecure: true,
            additional_trust_bundle: None,
        };
        let creds = parse_credentials(CREDS.as_bytes()).unwrap();
        let endpoint = management_endpoint(&spec, creds, None);
        assert_eq!(endpoint.address, "pc.lab");
        assert!(endpoint.insecure);
        assert_eq!(endpoint.username, "admin");
    }
}
