//! Session state container
//!
//! Owns the current principal and token. Every outbound request reads the
//! token from here, and any 401 anywhere comes back here through `expire()`.
//! Readers get snapshots or subscribe to changes; nobody holds the lock.

use std::sync::{Arc, RwLock};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use super::routes::Route;
use super::storage::{PersistedSession, SessionStorage};
use crate::error::StoreResult;
use crate::locks::{acquire_read_lock, acquire_write_lock};
use crate::models::Principal;

/// Capacity of the navigation signal channel
const NAVIGATION_CAPACITY: usize = 16;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub principal: Option<Principal>,
    pub token: Option<String>,
    pub authenticated: bool,
    /// Identity sync outstanding; role is unknown until it finishes
    pub syncing: bool,
}

impl SessionSnapshot {
    pub fn is_admin(&self) -> bool {
        self.principal.as_ref().is_some_and(Principal::is_admin)
    }

    /// Protected content must not render while role is unknown
    pub fn can_render_protected(&self) -> bool {
        !self.syncing && self.authenticated
    }
}

/// Where a recovered token came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenOrigin {
    Live,
    Durable,
}

pub struct SessionStore {
    state: RwLock<SessionSnapshot>,
    storage: Arc<dyn SessionStorage>,
    changes: watch::Sender<SessionSnapshot>,
    navigation: broadcast::Sender<Route>,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn SessionStorage>) -> Self {
        let (changes, _) = watch::channel(SessionSnapshot::default());
        let (navigation, _) = broadcast::channel(NAVIGATION_CAPACITY);
        Self {
            state: RwLock::new(SessionSnapshot::default()),
            storage,
            changes,
            navigation,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        acquire_read_lock(&self.state).clone()
    }

    pub fn principal(&self) -> Option<Principal> {
        acquire_read_lock(&self.state).principal.clone()
    }

    pub fn token(&self) -> Option<String> {
        acquire_read_lock(&self.state).token.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        acquire_read_lock(&self.state).authenticated
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.changes.subscribe()
    }

    /// Navigation signals (redirect after sign-in, login after expiry)
    pub fn navigation(&self) -> broadcast::Receiver<Route> {
        self.navigation.subscribe()
    }

    pub(crate) fn signal(&self, route: Route) {
        debug!(route = route.path(), "Navigation signal");
        // No subscribers just means no UI is listening
        let _ = self.navigation.send(route);
    }

    fn mutate<F>(&self, f: F) -> SessionSnapshot
    where
        F: FnOnce(&mut SessionSnapshot),
    {
        let snapshot = {
            let mut state = acquire_write_lock(&self.state);
            f(&mut state);
            state.clone()
        };
        self.changes.send_replace(snapshot.clone());
        snapshot
    }

    fn persist(&self, snapshot: &SessionSnapshot) {
        let record = PersistedSession {
            principal: snapshot.principal.clone(),
            token: snapshot.token.clone(),
        };
        if let Err(e) = self.storage.save(&record) {
            warn!(storage = self.storage.kind(), error = %e, "Failed to persist session");
        }
    }

    /// Rehydrate from storage (reload within the same tab)
    pub fn restore(&self) -> StoreResult<bool> {
        let Some(saved) = self.storage.load()? else {
            return Ok(false);
        };
        let (Some(principal), Some(token)) = (saved.principal, saved.token) else {
            return Ok(false);
        };
        debug!(user_id = %principal.id, storage = self.storage.kind(), "Restored session");
        self.mutate(|s| {
            s.principal = Some(principal);
            s.token = Some(token);
            s.authenticated = true;
        });
        Ok(true)
    }

    pub(crate) fn set_syncing(&self, syncing: bool) {
        self.mutate(|s| s.syncing = syncing);
    }

    /// Atomically set principal, token and the authenticated flag
    pub fn login(&self, principal: Principal, token: String) {
        info!(user_id = %principal.id, role = %principal.role, "Signed in");
        let snapshot = self.mutate(|s| {
            s.principal = Some(principal);
            s.token = Some(token);
            s.authenticated = true;
        });
        self.persist(&snapshot);
    }

    /// Replace the principal wholesale, keeping the token
    pub fn replace_principal(&self, principal: Principal) {
        let snapshot = self.mutate(|s| {
            if s.authenticated {
                s.principal = Some(principal);
            }
        });
        if snapshot.authenticated {
            self.persist(&snapshot);
        }
    }

    /// Install a patched session (wallet debit). `token` of `None` leaves
    /// whatever token is live untouched.
    pub(crate) fn apply_patch(&self, principal: Principal, token: Option<String>) {
        let snapshot = self.mutate(|s| {
            s.principal = Some(principal);
            if token.is_some() {
                s.token = token;
            }
        });
        self.persist(&snapshot);
    }

    /// Candidate tokens in recovery order: live session first, then storage
    pub fn token_candidates(&self) -> Vec<(TokenOrigin, Option<String>)> {
        let durable = match self.storage.load() {
            Ok(saved) => saved.and_then(|s| s.token),
            Err(e) => {
                warn!(error = %e, "Could not read durable session copy");
                None
            }
        };
        vec![(TokenOrigin::Live, self.token()), (TokenOrigin::Durable, durable)]
    }

    /// Lose the in-memory token only, as a half-torn-down session would
    #[cfg(test)]
    pub(crate) fn forget_live_token(&self) {
        self.mutate(|s| s.token = None);
    }

    /// Drop the session. Idempotent and never fails.
    pub fn clear(&self) {
        let was_authenticated = self.is_authenticated();
        self.mutate(|s| {
            s.principal = None;
            s.token = None;
            s.authenticated = false;
        });
        if let Err(e) = self.storage.clear() {
            warn!(storage = self.storage.kind(), error = %e, "Failed to clear stored session");
        }
        if was_authenticated {
            info!("Session cleared");
        }
    }

    /// A 401 came back: the whole session is invalid, not just that call
    pub fn expire(&self) {
        warn!("Session expired or invalid token");
        self.clear();
        self.signal(Route::Login);
    }
}
