//! Client-handle cache keyed by owning object.
//!
//! One entry per pool key (`namespace/name`). An entry is rebuilt when the
//! connection parameters presented for its key change, and dropped on
//! explicit invalidation. Construction goes through an injected
//! [`ClientFactory`] so tests can hand out fakes.

use crate::error::IpamError;
use prism_client::{ManagementEndpoint, PrismClient, PrismClientTrait};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

/// Builds a client for a set of connection parameters
#[async_trait::async_trait]
pub trait ClientFactory<P>: Send + Sync {
    async fn create(&self, params: &P) -> Result<Arc<dyn PrismClientTrait>, IpamError>;
}

/// Factory for real Prism Central clients
#[derive(Debug, Clone, Copy)]
pub struct PrismClientFactory {
    /// Check credentials before handing the client out
    pub validate_credentials: bool,
}

impl Default for PrismClientFactory {
    fn default() -> Self {
        Self {
            validate_credentials: true,
        }
    }
}

#[async_trait::async_trait]
impl ClientFactory<ManagementEndpoint> for PrismClientFactory {
    async fn create(
        &self,
        params: &ManagementEndpoint,
    ) -> Result<Arc<dyn PrismClientTrait>, IpamError> {
        let client = PrismClient::new(params)
            .map_err(|e| IpamError::remote(format!("failed to create client for {}", params.address), e))?;
        if self.validate_credentials {
            client.validate_credentials().await.map_err(|e| {
                IpamError::remote(format!("failed to validate credentials for {}", params.address), e)
            })?;
        }
        Ok(Arc::new(client))
    }
}

struct CacheEntry<P> {
    params: P,
    client: Arc<dyn PrismClientTrait>,
}

/// Concurrent map from owning-object key to client handle
pub struct ClientCache<P> {
    factory: Arc<dyn ClientFactory<P>>,
    entries: Arc<Mutex<HashMap<String, CacheEntry<P>>>>,
}

impl<P> Clone for ClientCache<P> {
    fn clone(&self) -> Self {
        Self {
            factory: Arc::clone(&self.factory),
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<P> std::fmt::Debug for ClientCache<P>
where
    P: Clone + PartialEq + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCache")
            .field("entries", &self.len())
            .finish_non_exhaustive()
    }
}

impl<P> ClientCache<P>
where
    P: Clone + PartialEq + Send + Sync,
{
    pub fn new(factory: Arc<dyn ClientFactory<P>>) -> Self {
        Self {
            factory,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Cached client for `key`, built (or rebuilt) when missing or stale.
    ///
    /// The lock is not held while the factory runs; if two callers race on
    /// the same key the last insert wins and both clients stay usable.
    pub async fn get_or_create(
        &self,
        key: &str,
        params: &P,
    ) -> Result<Arc<dyn PrismClientTrait>, IpamError> {
        {
            let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(entry) = entries.get(key) {
                if entry.params == *params {
                    return Ok(Arc::clone(&entry.client));
                }
                debug!("Connection parameters for {} changed, rebuilding client", key);
            }
        }

        let client = self.factory.create(params).await?;
        info!("Created client for {}", key);
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                key.to_string(),
                CacheEntry {
                    params: params.clone(),
                    client: Arc::clone(&client),
                },
            );
        Ok(client)
    }

    /// Drop the entry for `key`; returns whether one existed
    pub fn invalidate(&self, key: &str) -> bool {
        let removed = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some();
        if removed {
            info!("Invalidated cached client for {}", key);
        }
        removed
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_client::{MockPrismClient, PrismError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingFactory {
        created: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ClientFactory<String> for CountingFactory {
        async fn create(&self, params: &String) -> Result<Arc<dyn PrismClientTrait>, IpamError> {
            if params == "bad" {
                return Err(IpamError::remote(
                    "failed to validate credentials",
                    PrismError::Authentication("401".to_string()),
                ));
            }
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(MockPrismClient::new(format!("https://{}", params))))
        }
    }

    fn cache() -> (Arc<CountingFactory>, ClientCache<String>) {
        let factory = Arc::new(CountingFactory::default());
        let cache = ClientCache::new(Arc::clone(&factory) as Arc<dyn ClientFactory<String>>);
        (factory, cache)
    }

    #[tokio::test]
    async fn test_same_params_reuse_client() {
        let (factory, cache) = cache();
        let a = cache.get_or_create("ns/pool", &"pc-1".to_string()).await.unwrap();
        let b = cache.get_or_create("ns/pool", &"pc-1".to_string()).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(factory.created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_changed_params_rebuild_client() {
        let (factory, cache) = cache();
        cache.get_or_create("ns/pool", &"pc-1".to_string()).await.unwrap();
        let rebuilt = cache.get_or_create("ns/pool", &"pc-2".to_string()).await.unwrap();
        assert_eq!(rebuilt.base_url(), "https://pc-2");
        assert_eq!(factory.created.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_keys_are_independent_and_invalidation_is_explicit() {
        let (factory, cache) = cache();
        cache.get_or_create("ns/a", &"pc-1".to_string()).await.unwrap();
        cache.get_or_create("ns/b", &"pc-1".to_string()).await.unwrap();
        assert_eq!(cache.len(), 2);

        assert!(cache.invalidate("ns/a"));
        assert!(!cache.invalidate("ns/a"));
        assert!(!cache.contains("ns/a"));
        assert!(cache.contains("ns/b"));

        cache.get_or_create("ns/a", &"pc-1".to_string()).await.unwrap();
        assert_eq!(factory.created.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_factory_failure_is_not_cached() {
        let (_factory, cache) = cache();
        assert!(cache.get_or_create("ns/pool", &"bad".to_string()).await.is_err());
        assert!(cache.is_empty());
    }
}
