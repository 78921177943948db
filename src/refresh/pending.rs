//! Single-flight pool
//!
//! Concurrent callers asking for the same key share one in-flight future.
//! The key is cleared as soon as that future settles, so the next call
//! starts a fresh operation. Nothing is cached past the in-flight window.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::trace;

type PendingFuture<T> = Shared<BoxFuture<'static, T>>;

/// Deduplicates concurrent operations by caller-supplied key.
///
/// Keys must be unique per logical operation; two unrelated operations
/// registered under the same key will share a result.
pub struct PendingPool<T: Clone> {
    pending: Arc<Mutex<HashMap<String, PendingFuture<T>>>>,
}

impl<T> PendingPool<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Join the in-flight operation for `key`, or start one with `factory`.
    ///
    /// `factory` is only invoked when nothing is in flight for `key`.
    /// Registration happens before the first await, so callers racing on
    /// the same key always observe each other.
    ///
    /// The operation stays registered until it settles. If every caller
    /// drops out first, it sits in the pool until the next caller for
    /// `key` drives it, and is freed with the pool otherwise. The future
    /// from `factory` must not capture this pool (or anything owning it),
    /// or pool and operation keep each other alive.
    pub async fn resolve<F, Fut>(&self, key: &str, factory: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let shared = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);

            match pending.get(key) {
                Some(in_flight) => {
                    trace!(key, "joining in-flight operation");
                    in_flight.clone()
                }
                None => {
                    let operation = factory();
                    let registry = Arc::clone(&self.pending);
                    let owned_key = key.to_string();

                    let shared = async move {
                        let output = operation.await;
                        registry
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .remove(&owned_key);
                        output
                    }
                    .boxed()
                    .shared();

                    pending.insert(key.to_string(), shared.clone());
                    shared
                }
            }
        };

        shared.await
    }

    /// Whether an operation is currently in flight for `key`.
    pub fn is_pending(&self, key: &str) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Number of in-flight operations.
    pub fn in_flight(&self) -> usize {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl<T: Clone> Clone for PendingPool<T> {
    fn clone(&self) -> Self {
        Self {
            pending: Arc::clone(&self.pending),
        }
    }
}

impl<T> Default for PendingPool<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
