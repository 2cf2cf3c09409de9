//! Deduplication of concurrent identical operations.
//!
//! N simultaneous callers for the same key await one shared future and all
//! observe the same outcome. The entry is removed once the operation
//! settles, so results are never cached: the next caller after completion
//! starts a fresh run.

use std::future::Future;
use std::sync::{Arc, Weak};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};

use crate::error::{Result, SourceError};

type SharedResult<T> = std::result::Result<T, Arc<SourceError>>;
type InFlight<T> = Shared<BoxFuture<'static, SharedResult<T>>>;

pub struct SingleFlight<T: Clone> {
    in_flight: Arc<DashMap<String, InFlight<T>>>,
}

impl<T: Clone> std::fmt::Debug for SingleFlight<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleFlight")
            .field("in_flight", &self.in_flight.len())
            .finish()
    }
}

impl<T: Clone> Default for SingleFlight<T> {
    fn default() -> Self {
        Self {
            in_flight: Arc::new(DashMap::new()),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> SingleFlight<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `operation` unless one is already in flight for `key`, in which
    /// case the caller joins it. Shared failures surface as
    /// [`SourceError::Joined`] so every waiter sees the same underlying
    /// error.
    ///
    /// The key is evicted from inside the shared future the moment the
    /// operation settles, so a cancelled caller (even the one that installed
    /// the entry) cannot pin a settled result in the map.
    pub async fn run<F, Fut>(&self, key: &str, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let shared = match self.in_flight.entry(key.to_owned()) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                let fut = operation();
                // Weak, not Arc: an abandoned in-flight entry must not keep
                // the map alive through its own stored future.
                let map: Weak<DashMap<String, InFlight<T>>> = Arc::downgrade(&self.in_flight);
                let owned_key = key.to_owned();
                let shared: InFlight<T> = async move {
                    let outcome = fut.await.map_err(Arc::new);
                    if let Some(map) = map.upgrade() {
                        map.remove(&owned_key);
                    }
                    outcome
                }
                .boxed()
                .shared();
                entry.insert(shared.clone());
                shared
            }
        };

        shared.await.map_err(SourceError::Joined)
    }

    /// Number of keys currently in flight.
    pub fn len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::{sleep, Duration};

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_one_invocation() {
        let flight = Arc::new(SingleFlight::<u32>::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let flight = Arc::clone(&flight);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                flight
                    .run("tt0133093", move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        sleep(Duration::from_millis(50)).await;
                        Ok(42)
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(flight.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_shared_not_cached() {
        let flight = Arc::new(SingleFlight::<u32>::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let flight = Arc::clone(&flight);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                flight
                    .run("tt0133093", move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        sleep(Duration::from_millis(10)).await;
                        Err::<u32, _>(SourceError::Parse("bad payload".into()))
                    })
                    .await
            }));
        }

        for handle in handles {
            let err = handle.await.unwrap().unwrap_err();
            assert!(matches!(err, SourceError::Joined(_)));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // The failed entry is gone, so the next call runs afresh.
        let result = flight
            .run("tt0133093", {
                let calls = Arc::clone(&calls);
                move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(7)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_installer_does_not_pin_a_settled_result() {
        let flight = Arc::new(SingleFlight::<u32>::new());

        // The installing caller is aborted after its operation settles; the
        // entry must still be gone and the next run must start fresh.
        let handle = tokio::spawn({
            let flight = Arc::clone(&flight);
            async move { flight.run("tt0000001", || async { Ok(1) }).await }
        });
        tokio::task::yield_now().await;
        handle.abort();
        let _ = handle.await;

        assert!(flight.is_empty());
        let value = flight
            .run("tt0000001", || async { Ok(2) })
            .await
            .unwrap();
        assert_eq!(value, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn distinct_keys_run_independently() {
        let flight = Arc::new(SingleFlight::<u32>::new());
        let calls = Arc::new(AtomicUsize::new(0));

        for key in ["tt0000001", "tt0000002"] {
            let calls = Arc::clone(&calls);
            let value = flight
                .run(key, move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(1)
                })
                .await
                .unwrap();
            assert_eq!(value, 1);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
