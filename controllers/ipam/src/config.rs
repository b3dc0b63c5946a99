//! Environment configuration.

use crate::error::ControllerError;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_POLL_REQUEUE_SECONDS: u64 = 5;
const DEFAULT_CONCURRENCY: u16 = 3;
const DEFAULT_METRICS_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Controller settings read at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Namespace to watch; all namespaces when unset
    pub namespace: Option<String>,
    /// Requeue delay while a remote task is still running
    pub poll_requeue: Duration,
    /// Concurrent reconciles across claims
    pub concurrency: u16,
    /// Listen address for health and metrics endpoints
    pub metrics_bind_address: SocketAddr,
}

impl Config {
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ControllerError> {
        let namespace = lookup("WATCH_NAMESPACE").filter(|ns| !ns.trim().is_empty());
        let poll_seconds: u64 = parse_var(
            &lookup,
            "TASK_POLL_REQUEUE_SECONDS",
            DEFAULT_POLL_REQUEUE_SECONDS,
        )?;
        if poll_seconds == 0 {
            return Err(ControllerError::InvalidConfig(
                "TASK_POLL_REQUEUE_SECONDS must be at least 1".to_string(),
            ));
        }
        let concurrency: u16 = parse_var(&lookup, "CONTROLLER_CONCURRENCY", DEFAULT_CONCURRENCY)?;
        let metrics_bind_address: SocketAddr = parse_var(
            &lookup,
            "METRICS_BIND_ADDRESS",
            DEFAULT_METRICS_BIND_ADDRESS,
        )?;

        Ok(Self {
            namespace,
            poll_requeue: Duration::from_secs(poll_seconds),
            concurrency,
            metrics_bind_address,
        })
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: impl ToString,
) -> Result<T, ControllerError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = lookup(key).unwrap_or_else(|| default.to_string());
    raw.trim()
        .parse()
        .map_err(|e| ControllerError::InvalidConfig(format!("{key} {raw:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ControllerError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.namespace, None);
        assert_eq!(cfg.poll_requeue, Duration::from_secs(5));
        assert_eq!(cfg.concurrency, 3);
        assert_eq!(
            cfg.metrics_bind_address,
            DEFAULT_METRICS_BIND_ADDRESS.parse().unwrap()
        );
    }

    #[test]
    fn test_overrides() {
        let cfg = config(&[
            ("WATCH_NAMESPACE", "capi-system"),
            ("TASK_POLL_REQUEUE_SECONDS", "10"),
            ("CONTROLLER_CONCURRENCY", "8"),
            ("METRICS_BIND_ADDRESS", "127.0.0.1:9090"),
        ])
        .unwrap();
        assert_eq!(cfg.namespace.as_deref(), Some("capi-system"));
        assert_eq!(cfg.poll_requeue, Duration::from_secs(10));
        assert_eq!(cfg.concurrency, 8);
        assert_eq!(cfg.metrics_bind_address.port(), 9090);
    }

    #[test]
    fn test_invalid_numbers_rejected() {
        assert!(matches!(
            config(&[("TASK_POLL_REQUEUE_SECONDS", "soon")]),
            Err(ControllerError::InvalidConfig(_))
        ));
        assert!(matches!(
            config(&[("TASK_POLL_REQUEUE_SECONDS", "0")]),
            Err(ControllerError::InvalidConfig(_))
        ));
        assert!(matches!(
            config(&[("CONTROLLER_CONCURRENCY", "-1")]),
            Err(ControllerError::InvalidConfig(_))
        ));
        assert!(matches!(
            config(&[("METRICS_BIND_ADDRESS", "localhost")]),
            Err(ControllerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_blank_namespace_means_all() {
        assert_eq!(config(&[("WATCH_NAMESPACE", " ")]).unwrap().namespace, None);
    }
}
