//! Request collapsing.
//!
//! When several requests miss the cache for the same key at once, only the
//! first (the *leader*) goes to the origin; the rest (*followers*) wait
//! for the leader to finish and then consult the cache again. The per-key
//! state is a leader slot plus the list of waiting followers; completion
//! snapshots the list, clears the slot, then drains the snapshot, so a
//! late arrival either joins the in-flight group or finds the slot empty
//! and becomes a fresh leader.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

/// Deduplicates concurrent identical cache misses
#[derive(Debug, Clone, Default)]
pub struct RequestCollapser {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    inflight: Mutex<HashMap<String, Vec<Waiter>>>,
}

#[derive(Debug)]
struct Waiter {
    cancelled: Arc<AtomicBool>,
    tx: oneshot::Sender<()>,
}

/// The caller's role for a collapsed key
#[derive(Debug)]
pub enum Flight {
    /// First caller: perform the origin fetch, then [`FlightToken::complete`]
    Leader(FlightToken),
    /// A leader is already in flight: [`FlightWaiter::wait`], then look the
    /// key up again
    Follower(FlightWaiter),
}

/// Held by the leader of an in-flight fetch.
///
/// Completion is idempotent, and dropping the token without calling
/// [`FlightToken::complete`] (a cancelled or panicked leader) drains the
/// followers just the same so they can re-enter as fresh leaders.
#[derive(Debug)]
pub struct FlightToken {
    inner: Arc<Inner>,
    key: String,
    done: bool,
}

/// A follower's registration.
///
/// Dropping the waiter cancels the registration; a cancelled follower is
/// never woken.
#[derive(Debug)]
pub struct FlightWaiter {
    cancelled: Arc<AtomicBool>,
    rx: Option<oneshot::Receiver<()>>,
}

impl RequestCollapser {
    /// Creates an empty collapser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Joins the flight for `key`: the first caller becomes the leader,
    /// everyone else while the leader is in flight becomes a follower.
    pub fn enter(&self, key: &str) -> Flight {
        let mut inflight = self.inner.inflight.lock().unwrap();
        match inflight.get_mut(key) {
            Some(waiters) => {
                let (tx, rx) = oneshot::channel();
                let cancelled = Arc::new(AtomicBool::new(false));
                waiters.push(Waiter { cancelled: Arc::clone(&cancelled), tx });
                Flight::Follower(FlightWaiter { cancelled, rx: Some(rx) })
            }
            None => {
                inflight.insert(key.to_string(), Vec::new());
                Flight::Leader(FlightToken {
                    inner: Arc::clone(&self.inner),
                    key: key.to_string(),
                    done: false,
                })
            }
        }
    }
}

impl FlightToken {
    /// Signals completion and drains every non-cancelled follower exactly
    /// once. Repeated calls (or a subsequent drop) are no-ops.
    pub fn complete(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        if self.done {
            return;
        }
        self.done = true;
        // snapshot under the lock, drain outside it
        let waiters =
            self.inner.inflight.lock().unwrap().remove(&self.key);
        for waiter in waiters.into_iter().flatten() {
            if !waiter.cancelled.load(Ordering::Acquire) {
                let _ = waiter.tx.send(());
            }
        }
    }
}

impl Drop for FlightToken {
    fn drop(&mut self) {
        self.finish();
    }
}

impl FlightWaiter {
    /// Waits for the leader to complete (or vanish). Afterwards the cache
    /// reflects whatever the leader stored.
    pub async fn wait(mut self) {
        if let Some(rx) = self.rx.take() {
            let _ = rx.await;
        }
    }
}

impl Drop for FlightWaiter {
    fn drop(&mut self) {
        self.cancelled.store(true, Ordering::Release);
    }
}
