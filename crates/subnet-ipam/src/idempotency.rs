//! Durable per-claim request tokens.
//!
//! Before the first submission of an operation the coordinator mints a
//! time-ordered UUID and writes it to the owning object; only then is the
//! remote call made. Every retry reads the same token back and sends it as
//! the request-id header, so repeated submissions land on the original task.
//! Deduplication by that header is a property of the remote service that
//! this crate relies on but cannot check.
//!
//! Tokens are kept while a task is pending, removed after a terminal
//! failure, and left in place after success.

use crate::error::IpamError;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};
use uuid::Uuid;

/// Annotation holding the outstanding reserve request id
pub const RESERVE_REQUEST_ID_ANNOTATION: &str = "ipam.prism.io/reserve-request-id";
/// Annotation holding the outstanding release request id
pub const RELEASE_REQUEST_ID_ANNOTATION: &str = "ipam.prism.io/release-request-id";

/// Kind of remote operation a token guards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Reserve,
    Release,
}

impl OperationKind {
    pub fn annotation_key(self) -> &'static str {
        match self {
            OperationKind::Reserve => RESERVE_REQUEST_ID_ANNOTATION,
            OperationKind::Release => RELEASE_REQUEST_ID_ANNOTATION,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Reserve => f.write_str("reserve"),
            OperationKind::Release => f.write_str("release"),
        }
    }
}

/// Request id for one operation on one claim
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestToken {
    pub kind: OperationKind,
    pub request_id: Uuid,
    /// Freshly minted by this call rather than read back
    pub minted: bool,
}

impl fmt::Display for RequestToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.request_id)
    }
}

/// Key-value view of the annotations on the owning object.
///
/// Writes must be durable when they return.
#[async_trait::async_trait]
pub trait AnnotationStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, IpamError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), IpamError>;
    async fn remove(&self, key: &str) -> Result<(), IpamError>;
}

/// In-memory [`AnnotationStore`]
#[derive(Debug, Clone, Default)]
pub struct MemoryAnnotationStore {
    values: Arc<Mutex<HashMap<String, String>>>,
    writes: Arc<Mutex<usize>>,
    fail_writes: Arc<Mutex<bool>>,
}

impl MemoryAnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a key
    pub fn value(&self, key: &str) -> Option<String> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Number of successful `set`/`remove` calls
    pub fn writes(&self) -> usize {
        *self.writes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make subsequent writes fail
    pub fn set_fail_writes(&self, fail: bool) {
        *self.fail_writes.lock().unwrap_or_else(PoisonError::into_inner) = fail;
    }

    fn check_writable(&self) -> Result<(), IpamError> {
        if *self.fail_writes.lock().unwrap_or_else(PoisonError::into_inner) {
            return Err(IpamError::persistence("annotation store is read-only"));
        }
        *self.writes.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        Ok(())
    }
}

#[async_trait::async_trait]
impl AnnotationStore for MemoryAnnotationStore {
    async fn get(&self, key: &str) -> Result<Option<String>, IpamError> {
        Ok(self.value(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), IpamError> {
        self.check_writable()?;
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), IpamError> {
        self.check_writable()?;
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

/// Mints, persists and clears request tokens on one owning object
pub struct IdempotencyCoordinator<'a> {
    store: &'a dyn AnnotationStore,
}

impl fmt::Debug for IdempotencyCoordinator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdempotencyCoordinator").finish_non_exhaustive()
    }
}

impl<'a> IdempotencyCoordinator<'a> {
    pub fn new(store: &'a dyn AnnotationStore) -> Self {
        Self { store }
    }

    /// Outstanding token for `kind`, if a well-formed one is stored
    pub async fn current(&self, kind: OperationKind) -> Result<Option<RequestToken>, IpamError> {
        let Some(raw) = self.store.get(kind.annotation_key()).await? else {
            return Ok(None);
        };
        match Uuid::parse_str(raw.trim()) {
            Ok(request_id) => Ok(Some(RequestToken {
                kind,
                request_id,
                minted: false,
            })),
            Err(e) => {
                warn!(
                    "Ignoring malformed {} request id {:?}: {}",
                    kind, raw, e
                );
                Ok(None)
            }
        }
    }

    /// Return the outstanding token, minting and persisting one if absent.
    ///
    /// The new token is written before this returns; if the write fails no
    /// token is handed out and nothing may be submitted.
    pub async fn acquire(&self, kind: OperationKind) -> Result<RequestToken, IpamError> {
        if let Some(existing) = self.current(kind).await? {
            return Ok(existing);
        }

        let request_id = Uuid::now_v7();
        self.store
            .set(kind.annotation_key(), &request_id.to_string())
            .await?;
        info!("Minted {} request id {}", kind, request_id);
        Ok(RequestToken {
            kind,
            request_id,
            minted: true,
        })
    }

    /// Drop the token so the next attempt gets a fresh id
    pub async fn clear(&self, kind: OperationKind) -> Result<(), IpamError> {
        self.store.remove(kind.annotation_key()).await
    }
}
