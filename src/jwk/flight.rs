//! Coalescing of concurrent key generation.
//!
//! Generating an RSA-4096 key pair takes long enough that a burst of token
//! requests against an empty key set would otherwise generate (and persist)
//! one key per request. [`FlightGroup`] makes the first caller for a request
//! key the leader; every caller arriving while the leader runs subscribes to
//! its result instead of starting new work.
//!
//! ```text
//! caller A ──▶ leader ── work.await ──▶ remove entry ──▶ broadcast ──▶ A
//! caller B ──▶ follower ── recv ─────────────────────────────────────▶ B
//! caller C ──▶ follower ── recv ─────────────────────────────────────▶ C
//! ```
//!
//! ## Cancellation
//!
//! - Dropping a follower only drops its receiver. The leader and the other
//!   followers never notice.
//! - Dropping the leader drops the work future, removes the entry and closes
//!   the channel. Followers that had joined get
//!   [`JwkError::GenerationAborted`]; the next caller starts fresh.
//! - Followers have no say over the leader's deadline. A follower that gives
//!   up (timeout, client disconnect) simply stops waiting.

use std::fmt::Display;
use std::future::Future;
use std::hash::Hash;
use std::time::Instant;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::types::{JwkError, Result};

use super::key::KeySet;

/// Request key for key generation: a key set and an algorithm.
///
/// Both fields must match exactly for two requests to coalesce.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GenerationRequest {
    pub set: String,
    pub alg: String,
}

impl GenerationRequest {
    pub fn new(set: impl Into<String>, alg: impl Into<String>) -> Self {
        Self {
            set: set.into(),
            alg: alg.into(),
        }
    }
}

impl Display for GenerationRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.set, self.alg)
    }
}

/// Produces the error followers see when the leader goes away.
pub trait AbortError {
    fn aborted(&self) -> JwkError;
}

impl AbortError for GenerationRequest {
    fn aborted(&self) -> JwkError {
        JwkError::GenerationAborted {
            set: self.set.clone(),
            alg: self.alg.clone(),
        }
    }
}

/// Coalescing group used for key set generation.
pub type KeyGenFlight = FlightGroup<GenerationRequest, KeySet>;

/// Internal state for an in-flight call
struct InFlightCall<T> {
    /// Broadcast channel to notify waiters
    sender: broadcast::Sender<Result<T>>,
}

enum Role<T> {
    Leader(broadcast::Sender<Result<T>>, Instant),
    Follower(broadcast::Receiver<Result<T>>),
}

/// Single-flight group: at most one in-flight call per key.
///
/// Owned by whichever service assembles the resolver; share it with `Arc`.
pub struct FlightGroup<K, T> {
    in_flight: DashMap<K, InFlightCall<T>>,
}

impl<K, T> FlightGroup<K, T>
where
    K: Eq + Hash + Clone + Display + AbortError,
    T: Clone,
{
    pub fn new() -> Self {
        Self {
            in_flight: DashMap::new(),
        }
    }

    /// Run `work` for `key`, or wait for the call already running for it.
    ///
    /// The returned result is the leader's, value or error, for every caller.
    pub async fn run<F>(&self, key: K, work: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        // The shard lock is released at the end of this statement, before any await.
        let role = match self.in_flight.entry(key.clone()) {
            Entry::Occupied(call) => Role::Follower(call.get().sender.subscribe()),
            Entry::Vacant(slot) => {
                let (sender, _) = broadcast::channel(1);
                slot.insert(InFlightCall {
                    sender: sender.clone(),
                });
                Role::Leader(sender, Instant::now())
            }
        };

        match role {
            Role::Follower(mut receiver) => {
                debug!(request = %key, "Joining in-flight call");
                match receiver.recv().await {
                    Ok(result) => result,
                    Err(_) => Err(key.aborted()),
                }
            }
            Role::Leader(sender, started_at) => {
                let guard = LeaderGuard {
                    group: self,
                    key,
                    sender,
                    started_at,
                    completed: false,
                };
                let result = work.await;
                guard.complete(&result);
                result
            }
        }
    }

    /// Number of calls currently running.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Whether a call for `key` is currently running.
    pub fn is_in_flight(&self, key: &K) -> bool {
        self.in_flight.contains_key(key)
    }

    /// Only the leader that inserted an entry removes it, and no new entry
    /// can be inserted for the key while it exists.
    fn forget(&self, key: &K) {
        self.in_flight.remove(key);
    }
}

impl<K, T> Default for FlightGroup<K, T>
where
    K: Eq + Hash + Clone + Display + AbortError,
    T: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Clears the leader's entry however the leader exits.
struct LeaderGuard<'a, K, T>
where
    K: Eq + Hash + Clone + Display + AbortError,
    T: Clone,
{
    group: &'a FlightGroup<K, T>,
    key: K,
    sender: broadcast::Sender<Result<T>>,
    started_at: Instant,
    completed: bool,
}

impl<K, T> LeaderGuard<'_, K, T>
where
    K: Eq + Hash + Clone + Display + AbortError,
    T: Clone,
{
    fn complete(mut self, result: &Result<T>) {
        // Remove first: callers arriving after this point start a new call.
        self.group.forget(&self.key);

        let waiting = self.sender.receiver_count();
        debug!(
            request = %self.key,
            waiting = waiting,
            duration_ms = self.started_at.elapsed().as_millis() as u64,
            success = result.is_ok(),
            "Completing coalesced call"
        );

        // Ignore send errors - every follower may have given up
        let _ = self.sender.send(result.clone());
        self.completed = true;
    }
}

impl<K, T> Drop for LeaderGuard<'_, K, T>
where
    K: Eq + Hash + Clone + Display + AbortError,
    T: Clone,
{
    fn drop(&mut self) {
        if !self.completed {
            warn!(
                request = %self.key,
                waiting = self.sender.receiver_count(),
                "Leader dropped before completing; aborting coalesced call"
            );
            self.group.forget(&self.key);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn request(set: &str, alg: &str) -> GenerationRequest {
        GenerationRequest::new(set, alg)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_calls_share_one_execution() {
        let flight = Arc::new(KeyGenFlight::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let flight = flight.clone();
                let runs = runs.clone();
                tokio::spawn(async move {
                    flight
                        .run(request("sig-set", "RS256"), async move {
                            runs.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(200)).await;
                            Ok(KeySet::default())
                        })
                        .await
                })
            })
            .collect();

        for result in futures::future::join_all(tasks).await {
            assert!(result.unwrap().is_ok());
        }

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(flight.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_followers_receive_leader_error() {
        let flight = KeyGenFlight::new();
        let key = request("sig-set", "ES256");

        let leader = flight.run(key.clone(), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Err(JwkError::generation("sig-set", "ES256", "backend down"))
        });
        let follower = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            flight
                .run(key.clone(), async {
                    Err(JwkError::Storage("follower ran its own work".into()))
                })
                .await
        };

        let (a, b) = tokio::join!(leader, follower);
        assert_eq!(a.unwrap_err(), b.unwrap_err());
    }

    #[tokio::test]
    async fn test_distinct_requests_do_not_coalesce() {
        let flight = KeyGenFlight::new();
        let runs = AtomicUsize::new(0);

        let work = || async {
            runs.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(KeySet::default())
        };

        let (a, b, c) = tokio::join!(
            flight.run(request("sig-set", "RS256"), work()),
            flight.run(request("sig-set", "ES256"), work()),
            flight.run(request("sig-setR", "S256"), work()),
        );
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_entry_cleared_after_completion() {
        let flight = KeyGenFlight::new();
        let key = request("sig-set", "EdDSA");

        flight.run(key.clone(), async { Ok(KeySet::default()) }).await.unwrap();
        assert!(!flight.is_in_flight(&key));

        // A later call runs fresh work
        let ran = AtomicUsize::new(0);
        flight
            .run(key.clone(), async {
                ran.fetch_add(1, Ordering::SeqCst);
                Ok(KeySet::default())
            })
            .await
            .unwrap();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_follower_does_not_affect_leader() {
        let flight = Arc::new(KeyGenFlight::new());
        let key = request("sig-set", "RS256");

        let leader = {
            let flight = flight.clone();
            let key = key.clone();
            tokio::spawn(async move {
                flight
                    .run(key, async {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Ok(KeySet::default())
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let follower = tokio::time::timeout(
            Duration::from_millis(10),
            flight.run(key.clone(), async { Ok(KeySet::default()) }),
        )
        .await;
        assert!(follower.is_err(), "follower should have timed out");

        assert!(leader.await.unwrap().is_ok());
        assert_eq!(flight.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_leader_aborts_followers() {
        let flight = Arc::new(KeyGenFlight::new());
        let key = request("sig-set", "RS256");

        let leader = {
            let flight = flight.clone();
            let key = key.clone();
            tokio::spawn(async move {
                flight
                    .run(key, async {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        Ok(KeySet::default())
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(flight.is_in_flight(&key));

        let follower = {
            let flight = flight.clone();
            let key = key.clone();
            tokio::spawn(async move { flight.run(key, async { Ok(KeySet::default()) }).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        leader.abort();
        let err = follower.await.unwrap().unwrap_err();
        assert_eq!(
            err,
            JwkError::GenerationAborted {
                set: "sig-set".into(),
                alg: "RS256".into()
            }
        );
        assert!(!flight.is_in_flight(&key));
    }
}
