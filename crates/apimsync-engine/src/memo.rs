//! Memoised once-futures
//!
//! A concurrent map whose entries are computed at most once: every caller
//! for a key awaits the same in-flight computation, which is how the
//! orchestrators deduplicate work reached through diamond-shaped
//! dependency patterns.

use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::OnceCell;

/// Per-key once-computed futures.
pub struct MemoMap<K, V> {
    cells: DashMap<K, Arc<OnceCell<V>>>,
}

impl<K, V> MemoMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            cells: DashMap::new(),
        }
    }

    /// Get the memoised value for `key`, running `init` if this is the
    /// first caller. Concurrent callers share one computation; a failed
    /// initialisation leaves the cell empty so a later caller may retry.
    pub async fn get_or_try_init<E, F, Fut>(&self, key: &K, init: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        // Clone the cell out of the map so no shard lock is held while
        // awaiting the initialiser.
        let cell = self
            .cells
            .entry(key.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();
        cell.get_or_try_init(init).await.cloned()
    }

    /// Number of keys with a started or finished computation.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl<K, V> Default for MemoMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn initialiser_runs_once() {
        let memo: MemoMap<&'static str, usize> = MemoMap::new();
        let runs = AtomicUsize::new(0);

        for _ in 0..5 {
            let value: Result<usize, std::convert::Infallible> = memo
                .get_or_try_init(&"key", || async {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok(42)
                })
                .await;
            assert_eq!(value.unwrap(), 42);
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(memo.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_computation() {
        let memo = Arc::new(MemoMap::<u32, u32>::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let memo = Arc::clone(&memo);
                let runs = Arc::clone(&runs);
                tokio::spawn(async move {
                    memo.get_or_try_init(&7, || async {
                        runs.fetch_add(1, Ordering::SeqCst);
                        tokio::task::yield_now().await;
                        Ok::<_, std::convert::Infallible>(7)
                    })
                    .await
                    .unwrap()
                })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap(), 7);
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_initialisation_can_retry() {
        let memo: MemoMap<&'static str, u32> = MemoMap::new();

        let first: Result<u32, &'static str> =
            memo.get_or_try_init(&"key", || async { Err("boom") }).await;
        assert!(first.is_err());

        let second: Result<u32, &'static str> =
            memo.get_or_try_init(&"key", || async { Ok(1) }).await;
        assert_eq!(second.unwrap(), 1);
    }
}
