//! Background revalidation dispatch for `stale-while-revalidate`.
//!
//! Revalidations run on a bounded pool of tokio tasks. Each cache key has
//! at most one revalidation in flight, and a full pool drops the work
//! silently — the entry simply stays stale until the next synchronous
//! request.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashSet;
use tokio::sync::Semaphore;

/// Dispatches deduplicated background revalidation tasks
#[derive(Debug, Clone)]
pub struct BackgroundRevalidator {
    permits: Arc<Semaphore>,
    inflight: Arc<DashSet<String>>,
    enabled: bool,
}

impl BackgroundRevalidator {
    /// A pool of `workers` concurrent revalidations. Zero workers disables
    /// background revalidation entirely.
    pub fn new(workers: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(workers)),
            inflight: Arc::new(DashSet::new()),
            enabled: workers > 0,
        }
    }

    /// Whether background revalidation is available at all.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Attempts to schedule `task` for `key`. Returns `false` (without
    /// running the task) when the pool is disabled, the key already has a
    /// revalidation in flight, or no worker slot is free.
    pub fn try_spawn<F>(&self, key: &str, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if !self.enabled {
            return false;
        }
        if !self.inflight.insert(key.to_string()) {
            return false;
        }
        let permit = match Arc::clone(&self.permits).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                self.inflight.remove(key);
                log::debug!(
                    "background revalidation pool full, dropping {key:?}"
                );
                return false;
            }
        };
        let inflight = Arc::clone(&self.inflight);
        let key = key.to_string();
        tokio::spawn(async move {
            task.await;
            inflight.remove(&key);
            drop(permit);
        });
        true
    }
}
