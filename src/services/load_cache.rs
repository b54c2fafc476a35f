use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::watch;

enum Entry {
    /// Someone is loading; waiters subscribe to the sender
    InFlight(watch::Sender<bool>),
    Done,
}

/// Result of trying to claim a key
pub enum Claim {
    /// The caller must perform the load and then call `mark_done` or `abandon`
    Owner,
    /// Another caller is loading this key
    Pending(Pending),
    /// The key has already been loaded
    Done,
}

/// Handle for waiting on another caller's load
pub struct Pending(watch::Receiver<bool>);

impl Pending {
    /// Wait until the owner finishes. Returns `false` if the owner abandoned
    /// the load instead of completing it.
    pub async fn wait(mut self) -> bool {
        self.0.wait_for(|done| *done).await.is_ok()
    }
}

/// Keyed record of loads that are done or in flight.
///
/// Shared between concurrent callers so that an expensive one-time load
/// (the font set, a thumbnail upload) runs once and everyone else waits
/// for it. Created by the owner of the resource and passed in; there is
/// no process-global instance.
pub struct LoadCache {
    name: &'static str,
    entries: Mutex<HashMap<String, Entry>>,
}

impl LoadCache {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// True once `key` has been marked done
    pub fn has(&self, key: &str) -> bool {
        matches!(self.entries().get(key), Some(Entry::Done))
    }

    /// Claim `key` for loading, or learn that it is loading or loaded
    pub fn mark_in_flight(&self, key: &str) -> Claim {
        let mut entries = self.entries();
        match entries.get(key) {
            Some(Entry::Done) => Claim::Done,
            Some(Entry::InFlight(tx)) => Claim::Pending(Pending(tx.subscribe())),
            None => {
                let (tx, _rx) = watch::channel(false);
                entries.insert(key.to_string(), Entry::InFlight(tx));
                tracing::debug!(cache = self.name, key, "Load started");
                Claim::Owner
            }
        }
    }

    /// Record a finished load and wake every waiter
    pub fn mark_done(&self, key: &str) {
        let previous = self.entries().insert(key.to_string(), Entry::Done);
        if let Some(Entry::InFlight(tx)) = previous {
            tx.send_replace(true);
        }
        tracing::debug!(cache = self.name, key, "Load done");
    }

    /// Drop an in-flight claim so a later caller may retry.
    /// Waiters are woken and see the load as not done.
    pub fn abandon(&self, key: &str) {
        let mut entries = self.entries();
        if matches!(entries.get(key), Some(Entry::InFlight(_))) {
            entries.remove(key);
            tracing::debug!(cache = self.name, key, "Load abandoned");
        }
    }

    /// Run `load` unless `key` is already loaded, waiting for a concurrent
    /// load of the same key instead of starting a second one.
    ///
    /// Returns `Ok(true)` when this call performed the load. A failed load
    /// is abandoned and its error returned; waiters then compete to retry.
    pub async fn get_or_load<F, Fut, E>(&self, key: &str, load: F) -> Result<bool, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), E>>,
    {
        loop {
            match self.mark_in_flight(key) {
                Claim::Done => return Ok(false),
                Claim::Pending(pending) => {
                    pending.wait().await;
                }
                Claim::Owner => break,
            }
        }

        match load().await {
            Ok(()) => {
                self.mark_done(key);
                Ok(true)
            }
            Err(e) => {
                self.abandon(key);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_claim_lifecycle() {
        let cache = LoadCache::new("test");
        assert!(!cache.has("fonts"));

        assert!(matches!(cache.mark_in_flight("fonts"), Claim::Owner));
        assert!(matches!(cache.mark_in_flight("fonts"), Claim::Pending(_)));
        assert!(!cache.has("fonts"));

        cache.mark_done("fonts");
        assert!(cache.has("fonts"));
        assert!(matches!(cache.mark_in_flight("fonts"), Claim::Done));
    }

    #[test]
    fn test_abandon_allows_retry() {
        let cache = LoadCache::new("test");
        assert!(matches!(cache.mark_in_flight("a"), Claim::Owner));
        cache.abandon("a");
        assert!(matches!(cache.mark_in_flight("a"), Claim::Owner));
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_load() {
        let cache = Arc::new(LoadCache::new("test"));
        let loads = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..5)
            .map(|_| {
                let cache = cache.clone();
                let loads = loads.clone();
                tokio::spawn(async move {
                    cache
                        .get_or_load("fonts", || async {
                            loads.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            Ok::<(), String>(())
                        })
                        .await
                })
            })
            .collect();

        let mut performed = 0;
        for task in tasks {
            if task.await.unwrap().unwrap() {
                performed += 1;
            }
        }

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(performed, 1);
        assert!(cache.has("fonts"));
    }

    #[tokio::test]
    async fn test_waiter_retries_after_failed_load() {
        let cache = Arc::new(LoadCache::new("test"));
        assert!(matches!(cache.mark_in_flight("k"), Claim::Owner));

        let waiter = {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .get_or_load("k", || async { Ok::<(), String>(()) })
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        cache.abandon("k");

        assert_eq!(waiter.await.unwrap(), Ok(true));
        assert!(cache.has("k"));
    }

    #[tokio::test]
    async fn test_failed_load_is_not_cached() {
        let cache = LoadCache::new("test");
        let result = cache
            .get_or_load("k", || async { Err::<(), _>("boom") })
            .await;
        assert_eq!(result, Err("boom"));
        assert!(!cache.has("k"));
        assert!(matches!(cache.mark_in_flight("k"), Claim::Owner));
    }
}
