//! Subnet and cluster reference resolution.
//!
//! A reference is first tried as a UUID against the by-id endpoint. If it does
//! not parse, or the lookup fails, it is treated as a name and must match
//! exactly one object. Subnet name lookups can be scoped to a cluster, whose
//! own reference is resolved the same way. When every path fails the error
//! carries all causes.

use crate::error::ResolveError;
use prism_client::{FilterBuilder, PrismClientTrait};
use std::future::Future;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

const SUBNET: &str = "subnet";
const CLUSTER: &str = "cluster";

/// A subnet identified by its external ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSubnet {
    pub ext_id: Uuid,
    pub name: String,
}

/// A cluster identified by its external ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCluster {
    pub ext_id: Uuid,
    pub name: String,
}

/// Maps user-supplied subnet references onto external IDs
#[derive(Clone)]
pub struct SubnetResolver {
    client: Arc<dyn PrismClientTrait>,
}

impl std::fmt::Debug for SubnetResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubnetResolver")
            .field("base_url", &self.client.base_url())
            .finish()
    }
}

fn parse_ext_id(kind: &'static str, value: &str) -> Result<Uuid, ResolveError> {
    Uuid::parse_str(value).map_err(|e| ResolveError::InvalidId {
        kind,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// Run the UUID path, then the name path, aggregating failures
async fn uuid_then_name<T, ById, IdFut, ByName, NameFut>(
    kind: &'static str,
    reference: &str,
    by_id: ById,
    by_name: ByName,
) -> Result<T, ResolveError>
where
    ById: FnOnce(Uuid) -> IdFut,
    IdFut: Future<Output = Result<T, ResolveError>>,
    ByName: FnOnce() -> NameFut,
    NameFut: Future<Output = Result<T, ResolveError>>,
{
    if reference.trim().is_empty() {
        return Err(ResolveError::Empty { kind });
    }

    let mut causes = Vec::new();
    match parse_ext_id(kind, reference) {
        Ok(id) => match by_id(id).await {
            Ok(found) => return Ok(found),
            Err(e) => {
                debug!("{} lookup by id {} failed, trying by name: {}", kind, id, e);
                causes.push(e);
            }
        },
        Err(e) => causes.push(e),
    }

    match by_name().await {
        Ok(found) => Ok(found),
        Err(e) => {
            causes.push(e);
            Err(ResolveError::Aggregate {
                kind,
                reference: reference.to_string(),
                causes,
            })
        }
    }
}

fn exactly_one<T>(kind: &'static str, name: &str, mut found: Vec<T>) -> Result<T, ResolveError> {
    match found.len() {
        0 => Err(ResolveError::NotFound {
            kind,
            name: name.to_string(),
        }),
        1 => Ok(found.remove(0)),
        count => Err(ResolveError::Ambiguous {
            kind,
            name: name.to_string(),
            count,
        }),
    }
}

impl SubnetResolver {
    pub fn new(client: Arc<dyn PrismClientTrait>) -> Self {
        Self { client }
    }

    /// Resolve a subnet UUID or name, optionally scoped to a cluster
    pub async fn resolve(
        &self,
        reference: &str,
        cluster_hint: Option<&str>,
    ) -> Result<ResolvedSubnet, ResolveError> {
        let cluster_hint = cluster_hint.map(str::trim).filter(|c| !c.is_empty());
        uuid_then_name(
            SUBNET,
            reference,
            |id| self.subnet_by_id(id),
            || self.subnet_by_name(reference, cluster_hint),
        )
        .await
    }

    /// Resolve a cluster UUID or name
    pub async fn resolve_cluster(&self, reference: &str) -> Result<ResolvedCluster, ResolveError> {
        uuid_then_name(
            CLUSTER,
            reference,
            |id| self.cluster_by_id(id),
            || self.cluster_by_name(reference),
        )
        .await
    }

    async fn subnet_by_id(&self, id: Uuid) -> Result<ResolvedSubnet, ResolveError> {
        let subnet = self
            .client
            .get_subnet_by_id(&id.to_string())
            .await
            .map_err(|source| ResolveError::Lookup {
                kind: SUBNET,
                reference: id.to_string(),
                source,
            })?;
        Ok(ResolvedSubnet {
            ext_id: parse_ext_id(SUBNET, &subnet.ext_id)?,
            name: subnet.name,
        })
    }

    async fn subnet_by_name(
        &self,
        name: &str,
        cluster_hint: Option<&str>,
    ) -> Result<ResolvedSubnet, ResolveError> {
        let mut filter = FilterBuilder::new().eq("name", name);
        if let Some(hint) = cluster_hint {
            let cluster = self.resolve_cluster(hint).await?;
            filter = filter.eq("clusterReference", &cluster.ext_id.to_string());
        }
        let filter = filter.build();

        let found = self
            .client
            .list_subnets(filter.as_deref())
            .await
            .map_err(|source| ResolveError::Lookup {
                kind: SUBNET,
                reference: name.to_string(),
                source,
            })?;

        let subnet = exactly_one(SUBNET, name, found)?;
        Ok(ResolvedSubnet {
            ext_id: parse_ext_id(SUBNET, &subnet.ext_id)?,
            name: subnet.name,
        })
    }

    async fn cluster_by_id(&self, id: Uuid) -> Result<ResolvedCluster, ResolveError> {
        let cluster = self
            .client
            .get_cluster_by_id(&id.to_string())
            .await
            .map_err(|source| ResolveError::Lookup {
                kind: CLUSTER,
                reference: id.to_string(),
                source,
            })?;
        Ok(ResolvedCluster {
            ext_id: parse_ext_id(CLUSTER, &cluster.ext_id)?,
            name: cluster.name,
        })
    }

    async fn cluster_by_name(&self, name: &str) -> Result<ResolvedCluster, ResolveError> {
        let filter = FilterBuilder::new().eq("name", name).build();
        let found = self
            .client
            .list_clusters(filter.as_deref())
            .await
            .map_err(|source| ResolveError::Lookup {
                kind: CLUSTER,
                reference: name.to_string(),
                source,
            })?;

        let cluster = exactly_one(CLUSTER, name, found)?;
        Ok(ResolvedCluster {
            ext_id: parse_ext_id(CLUSTER, &cluster.ext_id)?,
            name: cluster.name,
        })
    }
}
