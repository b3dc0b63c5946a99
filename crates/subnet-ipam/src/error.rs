//! Error taxonomy for the reservation engine

use prism_client::PrismError;
use std::net::IpAddr;
use std::time::Duration;
use thiserror::Error;

/// Malformed input caught before anything reaches the network
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("invalid IP address {input:?}: {reason}")]
    InvalidAddress { input: String, reason: String },

    #[error("invalid IP range {input:?}: {reason}")]
    InvalidRange { input: String, reason: String },

    #[error("IP range {from}-{to} mixes address families")]
    MixedFamily { from: IpAddr, to: IpAddr },

    #[error("IP range start {from} is after its end {to}")]
    InvertedRange { from: IpAddr, to: IpAddr },

    #[error("address count exceeds {max}")]
    CountOverflow { max: i64 },

    #[error("count must be at least 1, got {0}")]
    InvalidCount(u64),

    #[error("address list must not be empty")]
    EmptyList,

    #[error("client context must not be empty")]
    EmptyContext,

    #[error("{0}")]
    Unsupported(String),
}

/// Subnet or cluster resolution failure
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("{kind} reference must not be empty")]
    Empty { kind: &'static str },

    #[error("no {kind} found with name {name:?}")]
    NotFound { kind: &'static str, name: String },

    #[error("multiple {kind}s ({count}) found with name {name:?}")]
    Ambiguous {
        kind: &'static str,
        name: String,
        count: usize,
    },

    #[error("{value:?} is not a valid {kind} UUID: {reason}")]
    InvalidId {
        kind: &'static str,
        value: String,
        reason: String,
    },

    #[error("failed to look up {kind} {reference:?}: {source}")]
    Lookup {
        kind: &'static str,
        reference: String,
        #[source]
        source: PrismError,
    },

    #[error(
        "failed to get {kind} {reference:?}: [{}]",
        .causes.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
    )]
    Aggregate {
        kind: &'static str,
        reference: String,
        causes: Vec<ResolveError>,
    },
}

impl ResolveError {
    /// Flattened list of leaf causes
    pub fn causes(&self) -> Vec<&ResolveError> {
        match self {
            ResolveError::Aggregate { causes, .. } => {
                causes.iter().flat_map(ResolveError::causes).collect()
            }
            other => vec![other],
        }
    }

    /// Some lookup failed for a reason other than the object being absent
    pub fn is_transient(&self) -> bool {
        self.causes().iter().any(|cause| {
            matches!(cause, ResolveError::Lookup { source, .. } if !source.is_not_found())
        })
    }
}

/// Errors surfaced by the reservation engine
#[derive(Debug, Error)]
pub enum IpamError {
    /// Task has not reached a terminal state yet
    #[error("task {task_id} is still in progress")]
    TaskOngoing { task_id: String },

    #[error("task {task_id} failed: {details}")]
    TaskFailed { task_id: String, details: String },

    #[error("task {task_id} was cancelled: {details}")]
    TaskCancelled { task_id: String, details: String },

    #[error(transparent)]
    Resolution(#[from] ResolveError),

    #[error("invalid reservation request: {0}")]
    Validation(#[from] ValidationError),

    /// The request token could not be read or written
    #[error("failed to persist request token: {0}")]
    Persistence(String),

    #[error("{context}: {source}")]
    Remote {
        context: String,
        #[source]
        source: PrismError,
    },

    #[error("unexpected response for task {task_id}: {reason}")]
    UnexpectedResponse { task_id: String, reason: String },

    #[error("timed out after {elapsed:?} waiting for task {task_id}")]
    Timeout { task_id: String, elapsed: Duration },
}

impl IpamError {
    /// Wrap a store failure
    pub fn persistence(err: impl std::fmt::Display) -> Self {
        IpamError::Persistence(err.to_string())
    }

    /// Wrap a wire error with the operation that produced it
    pub fn remote(context: impl Into<String>, source: PrismError) -> Self {
        IpamError::Remote {
            context: context.into(),
            source,
        }
    }

    /// The task is still pending; retry later
    pub fn is_ongoing(&self) -> bool {
        matches!(self, IpamError::TaskOngoing { .. })
    }

    /// The remote task ended in FAILED or CANCELED
    pub fn is_terminal_task_failure(&self) -> bool {
        matches!(
            self,
            IpamError::TaskFailed { .. } | IpamError::TaskCancelled { .. }
        )
    }

    /// Whether the outstanding request token must be discarded.
    ///
    /// Transport failures, persistence failures and timeouts keep the token:
    /// the submission may have landed and the next attempt resumes it.
    pub fn invalidates_token(&self) -> bool {
        match self {
            IpamError::Resolution(e) => !e.is_transient(),
            IpamError::TaskFailed { .. }
            | IpamError::TaskCancelled { .. }
            | IpamError::Validation(_)
            | IpamError::UnexpectedResponse { .. } => true,
            IpamError::TaskOngoing { .. }
            | IpamError::Persistence(_)
            | IpamError::Remote { .. }
            | IpamError::Timeout { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_lookup_keeps_token() {
        let transient = IpamError::Resolution(ResolveError::Aggregate {
            kind: "subnet",
            reference: "vlan-10".to_string(),
            causes: vec![ResolveError::Lookup {
                kind: "subnet",
                reference: "vlan-10".to_string(),
                source: PrismError::Api {
                    context: "list subnets".to_string(),
                    status: 503,
                    body: String::new(),
                },
            }],
        });
        assert!(!transient.invalidates_token());

        let absent = IpamError::Resolution(ResolveError::NotFound {
            kind: "subnet",
            name: "vlan-10".to_string(),
        });
        assert!(absent.invalidates_token());
    }

    #[test]
    fn test_aggregate_message_lists_every_cause() {
        let err = ResolveError::Aggregate {
            kind: "subnet",
            reference: "not-a-uuid".to_string(),
            causes: vec![
                ResolveError::InvalidId {
                    kind: "subnet",
                    value: "not-a-uuid".to_string(),
                    reason: "bad length".to_string(),
                },
                ResolveError::NotFound {
                    kind: "cluster",
                    name: "missing-cluster".to_string(),
                },
            ],
        };
        let message = err.to_string();
        assert!(message.starts_with("failed to get subnet \"not-a-uuid\""));
        assert!(message.contains("not a valid subnet UUID"));
        assert!(message.contains("no cluster found with name \"missing-cluster\""));
        assert_eq!(err.causes().len(), 2);
    }

    #[test]
    fn test_classification() {
        let ongoing = IpamError::TaskOngoing {
            task_id: "t".to_string(),
        };
        assert!(ongoing.is_ongoing());
        assert!(!ongoing.invalidates_token());

        let failed = IpamError::TaskFailed {
            task_id: "t".to_string(),
            details: "{}".to_string(),
        };
        assert!(failed.is_terminal_task_failure());
        assert!(failed.invalidates_token());

        let persistence = IpamError::persistence("conflict");
        assert!(!persistence.invalidates_token());
        assert!(!persistence.is_terminal_task_failure());
    }
}
