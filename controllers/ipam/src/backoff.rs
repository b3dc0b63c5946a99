//! # Fibonacci Backoff
//!
//! Per-claim requeue delays after failed reconciles: 1m, 1m, 2m, 3m, 5m,
//! 8m, then 10m until the claim reconciles cleanly again.
//!
//! A claim that failed or is waiting on a task is also *held* until its
//! requeue is due. The controller's own writes to the claim (request-id
//! annotations, status) produce watch events; while the hold lasts those
//! events are answered with the remaining delay instead of another pass.
//! A spec change or deletion lifts the hold.

use crds::IPAddressClaim;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Fibonacci sequence of delays, counted in minutes and capped
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    min_minutes: u64,
    prev_minutes: u64,
    current_minutes: u64,
    max_minutes: u64,
}

impl FibonacciBackoff {
    #[must_use]
    pub fn new(min_minutes: u64, max_minutes: u64) -> Self {
        Self {
            min_minutes,
            prev_minutes: 0,
            current_minutes: min_minutes,
            max_minutes,
        }
    }

    /// Current delay; advances the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let delay = Duration::from_secs(self.current_minutes * 60);
        let next = self.prev_minutes + self.current_minutes;
        self.prev_minutes = self.current_minutes;
        self.current_minutes = next.min(self.max_minutes);
        delay
    }

    pub fn reset(&mut self) {
        self.prev_minutes = 0;
        self.current_minutes = self.min_minutes;
    }
}

/// The parts of a claim only a user changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimFingerprint {
    generation: Option<i64>,
    deleting: bool,
}

impl From<&IPAddressClaim> for ClaimFingerprint {
    fn from(claim: &IPAddressClaim) -> Self {
        Self {
            generation: claim.metadata.generation,
            deleting: claim.metadata.deletion_timestamp.is_some(),
        }
    }
}

#[derive(Debug)]
struct Hold {
    until: Instant,
    fingerprint: ClaimFingerprint,
}

/// Backoff state per object key (`namespace/name`)
#[derive(Debug)]
pub struct BackoffRegistry {
    min_minutes: u64,
    max_minutes: u64,
    states: Mutex<HashMap<String, FibonacciBackoff>>,
    holds: Mutex<HashMap<String, Hold>>,
}

impl BackoffRegistry {
    pub fn new(min_minutes: u64, max_minutes: u64) -> Self {
        Self {
            min_minutes,
            max_minutes,
            states: Mutex::new(HashMap::new()),
            holds: Mutex::new(HashMap::new()),
        }
    }

    /// Defer passes over `key` for `delay` unless the claim changes
    pub fn hold(&self, key: &str, delay: Duration, fingerprint: ClaimFingerprint) {
        self.hold_at(key, delay, fingerprint, Instant::now());
    }

    fn hold_at(&self, key: &str, delay: Duration, fingerprint: ClaimFingerprint, now: Instant) {
        self.holds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                key.to_string(),
                Hold {
                    until: now + delay,
                    fingerprint,
                },
            );
    }

    /// Time left on the hold of `key`; `None` once it expired or the claim changed
    pub fn held(&self, key: &str, fingerprint: ClaimFingerprint) -> Option<Duration> {
        self.held_at(key, fingerprint, Instant::now())
    }

    fn held_at(&self, key: &str, fingerprint: ClaimFingerprint, now: Instant) -> Option<Duration> {
        let mut holds = self.holds.lock().unwrap_or_else(PoisonError::into_inner);
        let hold = holds.get(key)?;
        if hold.fingerprint == fingerprint && hold.until > now {
            return Some(hold.until - now);
        }
        holds.remove(key);
        None
    }

    /// Lift the hold of `key`, keeping its failure history
    pub fn release(&self, key: &str) {
        self.holds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    /// Delay before the next attempt for `key`
    pub fn next_backoff(&self, key: &str) -> Duration {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.to_string())
            .or_insert_with(|| FibonacciBackoff::new(self.min_minutes, self.max_minutes))
            .next_backoff()
    }

    /// Forget the failure history and hold of `key`
    pub fn reset(&self, key: &str) {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        self.release(key);
    }
}

impl Default for BackoffRegistry {
    fn default() -> Self {
        Self::new(1, 10)
    }
}
