//! Per-pod request serialization
//!
//! Two sidecar calls for the same pod would otherwise interleave their
//! restore/save pairs inside one namespace. `PodLocks` hands out one async
//! mutex per pod identity; pods never wait on each other.
//!
//! Entries are held weakly. Once the last guard for a pod drops, its entry
//! is pruned on the next `lock` call.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::api::PodIdentity;

/// Held for the duration of one request against a pod
pub type PodGuard = OwnedMutexGuard<()>;

#[derive(Debug, Default)]
pub struct PodLocks {
    entries: Mutex<HashMap<PodIdentity, Weak<AsyncMutex<()>>>>,
}

impl PodLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other request holds `pod`, then hold it
    pub async fn lock(&self, pod: &PodIdentity) -> PodGuard {
        let mutex = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            entries.retain(|_, weak| weak.strong_count() > 0);

            match entries.get(pod).and_then(Weak::upgrade) {
                Some(existing) => existing,
                None => {
                    let fresh = Arc::new(AsyncMutex::new(()));
                    entries.insert(pod.clone(), Arc::downgrade(&fresh));
                    fresh
                }
            }
        };

        mutex.lock_owned().await
    }

    /// Pods with a request in flight or waiting
    pub fn active(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_pod_waits() {
        let locks = Arc::new(PodLocks::new());
        let pod = PodIdentity::new("default", "pod-a");

        let guard = locks.lock(&pod).await;

        let waiter = {
            let locks = locks.clone();
            let pod = pod.clone();
            tokio::spawn(async move {
                let _guard = locks.lock(&pod).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_different_pods_do_not_wait() {
        let locks = PodLocks::new();
        let _a = locks.lock(&PodIdentity::new("default", "pod-a")).await;

        let b = tokio::time::timeout(
            Duration::from_millis(100),
            locks.lock(&PodIdentity::new("default", "pod-b")),
        )
        .await;
        assert!(b.is_ok());
        assert_eq!(locks.active(), 2);
    }

    #[tokio::test]
    async fn test_released_entries_are_pruned() {
        let locks = PodLocks::new();
        let pod = PodIdentity::new("default", "pod-a");

        drop(locks.lock(&pod).await);
        assert_eq!(locks.active(), 0);

        let _again = locks.lock(&PodIdentity::new("default", "pod-b")).await;
        assert_eq!(locks.entries.lock().unwrap().len(), 1);
    }
}
