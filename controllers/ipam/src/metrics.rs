//! Prometheus metrics for the controller.

use crate::error::ControllerError;
use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Counters exposed on `/metrics`
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    /// Reconciles by outcome: allocated, pending, released, ignored, error
    pub reconciles: IntCounterVec,
    pub addresses_reserved: IntCounter,
    pub addresses_released: IntCounter,
    /// Prism Central clients currently cached
    pub cached_clients: IntGauge,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

impl Metrics {
    pub fn new() -> Result<Self, ControllerError> {
        let registry = Registry::new_custom(Some("prism_ipam".to_string()), None)
            .map_err(|e| ControllerError::Server(e.to_string()))?;
        let reconciles = IntCounterVec::new(
            Opts::new("claim_reconciles_total", "IPAddressClaim reconciles by outcome"),
            &["outcome"],
        )
        .map_err(|e| ControllerError::Server(e.to_string()))?;
        let addresses_reserved = IntCounter::new(
            "addresses_reserved_total",
            "Addresses reserved in Prism Central",
        )
        .map_err(|e| ControllerError::Server(e.to_string()))?;
        let addresses_released = IntCounter::new(
            "addresses_released_total",
            "Claim reservations released in Prism Central",
        )
        .map_err(|e| ControllerError::Server(e.to_string()))?;
        let cached_clients = IntGauge::new("cached_clients", "Cached Prism Central clients")
            .map_err(|e| ControllerError::Server(e.to_string()))?;

        for collector in [
            Box::new(reconciles.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(addresses_reserved.clone()),
            Box::new(addresses_released.clone()),
            Box::new(cached_clients.clone()),
        ] {
            registry
                .register(collector)
                .map_err(|e| ControllerError::Server(e.to_string()))?;
        }

        Ok(Self {
            registry,
            reconciles,
            addresses_reserved,
            addresses_released,
            cached_clients,
        })
    }

    pub fn record_reconcile(&self, outcome: &str) {
        self.reconciles.with_label_values(&[outcome]).inc();
    }

    /// Text exposition format
    pub fn render(&self) -> Result<String, ControllerError> {
        TextEncoder::new()
            .encode_to_string(&self.registry.gather())
            .map_err(|e| ControllerError::Server(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_prefixed_counters() {
        let metrics = Metrics::new().unwrap();
        metrics.record_reconcile("allocated");
        metrics.record_reconcile("allocated");
        metrics.addresses_reserved.inc();
        metrics.cached_clients.set(2);

        let text = metrics.render().unwrap();
        assert!(text.contains("prism_ipam_claim_reconciles_total{outcome=\"allocated\"} 2"));
        assert!(text.contains("prism_ipam_addresses_reserved_total 1"));
        assert!(text.contains("prism_ipam_cached_clients 2"));
    }
}
