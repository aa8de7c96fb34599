//! Advisory in-flight tracking
//!
//! There is no locking around backend calls. Instead each action records the
//! id it is working on so the UI can disable duplicate submissions. This is
//! advisory only: a fast double click can still get two requests out, and
//! the backend decides what a duplicate means.
//! Uses DashMap for lock-free concurrent access.

use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Set of entity ids with an outstanding action, keyed by id
#[derive(Debug, Default)]
pub struct InFlight {
    /// Map of entity id -> when the action started (lock-free)
    active: DashMap<String, Instant>,
}

impl InFlight {
    pub fn new() -> Self {
        Self {
            active: DashMap::new(),
        }
    }

    /// Mark `id` busy. Returns `None` if it already is.
    ///
    /// The returned guard clears the mark when dropped, so the flag is
    /// released on every exit path including errors.
    pub fn begin(&self, id: &str) -> Option<InFlightGuard<'_>> {
        match self.active.entry(id.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                debug!(id = id, "Action already in flight");
                None
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Instant::now());
                Some(InFlightGuard {
                    owner: self,
                    id: id.to_string(),
                })
            }
        }
    }

    pub fn is_busy(&self, id: &str) -> bool {
        self.active.contains_key(id)
    }

    /// True while anything is outstanding (the "processing id" check)
    pub fn any(&self) -> bool {
        !self.active.is_empty()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

#[derive(Debug)]
pub struct InFlightGuard<'a> {
    owner: &'a InFlight,
    id: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if let Some((_, started)) = self.owner.active.remove(&self.id) {
            debug!(id = %self.id, elapsed_ms = started.elapsed().as_millis() as u64, "Action settled");
        }
    }
}

/// Liveness flag for an owner whose async continuations may outlive it.
///
/// Every state-setting continuation checks `is_alive()` first; once the
/// owner calls `end()` late resolutions are ignored.
#[derive(Debug, Clone)]
pub struct Liveness {
    alive: Arc<AtomicBool>,
}

impl Liveness {
    pub fn new() -> Self {
        Self {
            alive: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn end(&self) {
        self.alive.store(false, Ordering::Release);
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_begin_refused() {
        let inflight = InFlight::new();
        let guard = inflight.begin("order-1");
        assert!(guard.is_some());
        assert!(inflight.begin("order-1").is_none());
        assert!(inflight.is_busy("order-1"));
        assert!(inflight.begin("order-2").is_some());
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let inflight = InFlight::new();
        {
            let _guard = inflight.begin("req-9").unwrap();
            assert!(inflight.any());
        }
        assert!(!inflight.any());
        assert!(inflight.begin("req-9").is_some());
    }

    #[test]
    fn test_liveness_shared_between_clones() {
        let owner = Liveness::new();
        let continuation = owner.clone();
        assert!(continuation.is_alive());
        owner.end();
        assert!(!continuation.is_alive());
    }
}
