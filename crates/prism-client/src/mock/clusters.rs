//! Cluster lookups for MockPrismClient

use super::{MockPrismClient, lock};
use crate::common::query::parse_eq_filter;
use crate::error::PrismError;
use crate::models::Cluster;

pub(crate) fn list_clusters(
    mock: &MockPrismClient,
    filter: Option<&str>,
) -> Result<Vec<Cluster>, PrismError> {
    let clauses = match filter {
        Some(f) => parse_eq_filter(f)
            .ok_or_else(|| PrismError::InvalidRequest(format!("unsupported filter: {}", f)))?,
        None => Vec::new(),
    };

    let mut clusters: Vec<Cluster> = lock(&mock.clusters)
        .values()
        .filter(|c| {
            clauses.iter().all(|(field, value)| match field.as_str() {
                "name" => &c.name == value,
                "extId" => &c.ext_id == value,
                _ => false,
            })
        })
        .cloned()
        .collect();
    clusters.sort_by(|a, b| a.ext_id.cmp(&b.ext_id));
    Ok(clusters)
}

pub(crate) fn get_cluster_by_id(
    mock: &MockPrismClient,
    ext_id: &str,
) -> Result<Cluster, PrismError> {
    lock(&mock.clusters)
        .get(ext_id)
        .cloned()
        .ok_or_else(|| PrismError::NotFound(format!("Cluster {} not found", ext_id)))
}
