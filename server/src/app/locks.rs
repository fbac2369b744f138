//! Per-scope ownership locks
//!
//! One async mutex per service or project id. Overlapping triggers for
//! the same scope serialize; distinct scopes run in parallel. The map
//! only grows, which is acceptable for the fleet sizes this serves.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Process-wide lock registry keyed by scope id
#[derive(Default)]
pub struct ScopeLocks {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ScopeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock for `scope`, waiting behind any holder
    pub async fn acquire(&self, scope: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(scope.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_same_scope_serializes() {
        let locks = Arc::new(ScopeLocks::new());
        let peak = Arc::new(AtomicUsize::new(0));
        let active = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let peak = peak.clone();
            let active = active.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire("svc-1").await;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_distinct_scopes_run_in_parallel() {
        let locks = Arc::new(ScopeLocks::new());
        let guard_a = locks.acquire("a").await;
        // Must not deadlock while "a" is held.
        let guard_b = locks.acquire("b").await;
        drop(guard_a);
        drop(guard_b);
    }
}
