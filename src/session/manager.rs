//! Session lifecycle: bootstrap, identity sync, provider events, logout

use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::provider::{IdentityProvider, ProviderEvent};
use super::routes::{should_redirect_after_sync, Route};
use super::store::{SessionSnapshot, SessionStore};
use crate::error::{StoreError, StoreResult};
use crate::inflight::Liveness;
use crate::locks::{acquire_read_lock, acquire_write_lock};
use crate::models::Principal;
use crate::transport::ApiClient;
use crate::wire::{principal_from_wire, WirePrincipal};

/// "Who am I"; also provisions the backend user row on first call
const WHO_AM_I: &str = "/users/me";

#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    SignedIn { principal: Principal, redirected: bool },
    SignedOut,
    /// No provider session on cold start
    NoSession,
    /// The manager was shut down before the call resolved
    Abandoned,
}

pub struct SessionManager {
    api: ApiClient,
    store: Arc<SessionStore>,
    provider: Arc<dyn IdentityProvider>,
    location: RwLock<String>,
    alive: Liveness,
}

impl SessionManager {
    pub fn new(api: ApiClient, provider: Arc<dyn IdentityProvider>) -> Self {
        let store = api.session().clone();
        let alive = api.liveness().clone();
        Self {
            api,
            store,
            provider,
            location: RwLock::new(Route::Home.path().to_string()),
            alive,
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.store.snapshot()
    }

    /// Current path, consulted by the post-sync redirect policy
    pub fn set_location(&self, path: &str) {
        *acquire_write_lock(&self.location) = path.to_string();
    }

    pub fn location(&self) -> String {
        acquire_read_lock(&self.location).clone()
    }

    /// Stop applying results of calls still in flight. The flag is shared
    /// with the API client, so every cache built on it stops too.
    pub fn shutdown(&self) {
        self.alive.end();
    }

    /// Cold start: restore this tab's session, then ask the provider
    pub async fn bootstrap(&self) -> StoreResult<SyncOutcome> {
        match self.store.restore() {
            Ok(true) => debug!("Session restored from storage"),
            Ok(false) => {}
            Err(e) => warn!(error = %e, "Ignoring unreadable stored session"),
        }

        self.store.set_syncing(true);
        let provider_session = match self.provider.current_session().await {
            Ok(session) => session,
            Err(e) => {
                if self.alive.is_alive() {
                    self.store.set_syncing(false);
                }
                return Err(e);
            }
        };

        match provider_session {
            Some(session) => self.sync_identity(&session.access_token).await,
            None => {
                if self.alive.is_alive() {
                    self.store.set_syncing(false);
                }
                Ok(SyncOutcome::NoSession)
            }
        }
    }

    /// Exchange a provider token for the backend principal.
    ///
    /// A 401 means the provider token is unrecoverable: the provider session
    /// is invalidated and the local one cleared. Any other failure leaves the
    /// previous session as it was.
    pub async fn sync_identity(&self, provider_token: &str) -> StoreResult<SyncOutcome> {
        self.store.set_syncing(true);
        let result = self
            .api
            .get_with_token::<WirePrincipal>(WHO_AM_I, provider_token)
            .await;

        if !self.alive.is_alive() {
            debug!("Identity sync resolved after shutdown, ignoring");
            return Ok(SyncOutcome::Abandoned);
        }

        let outcome = match result {
            Ok(wire) => {
                let principal = principal_from_wire(wire);
                self.store.login(principal.clone(), provider_token.to_string());
                let redirected = should_redirect_after_sync(&self.location());
                if redirected {
                    self.store.signal(Route::LANDING);
                }
                Ok(SyncOutcome::SignedIn {
                    principal,
                    redirected,
                })
            }
            Err(StoreError::AuthExpired) => {
                // Transport has already cleared the local session
                if let Err(e) = self.provider.sign_out().await {
                    warn!(error = %e, "Provider sign-out after rejected token failed");
                }
                Err(StoreError::AuthExpired)
            }
            Err(e) => {
                error!(error = %e, "Identity sync failed");
                Err(e)
            }
        };

        self.store.set_syncing(false);
        outcome
    }

    pub async fn on_provider_event(&self, event: ProviderEvent) -> StoreResult<SyncOutcome> {
        match event {
            ProviderEvent::SignedIn(session) => {
                // Kept so a later logout can invalidate it
                if let Err(e) = self.provider.remember(&session) {
                    warn!(error = %e, "Could not record provider session");
                }
                self.sync_identity(&session.access_token).await
            }
            ProviderEvent::SignedOut => {
                self.store.clear();
                self.store.set_syncing(false);
                Ok(SyncOutcome::SignedOut)
            }
        }
    }

    /// Feed provider notifications until the channel closes or shutdown
    pub async fn pump_events(&self, mut events: mpsc::Receiver<ProviderEvent>) {
        while let Some(event) = events.recv().await {
            if !self.alive.is_alive() {
                break;
            }
            if let Err(e) = self.on_provider_event(event).await {
                warn!(error = %e, "Provider event handling failed");
            }
        }
        debug!("Provider event pump stopped");
    }

    /// Local logout is never blocked by the provider
    pub async fn logout(&self) {
        if let Err(e) = self.provider.sign_out().await {
            error!(error = %e, "Provider sign-out failed");
        }
        self.store.clear();
        info!("Logged out");
    }

    /// Re-fetch the principal and replace it wholesale
    pub async fn refresh_principal(&self) -> StoreResult<Principal> {
        if !self.store.is_authenticated() {
            return Err(StoreError::NotAuthenticated);
        }
        let wire: WirePrincipal = self.api.get(WHO_AM_I).await?;
        let principal = principal_from_wire(wire);
        if self.alive.is_alive() {
            debug!(user_id = %principal.id, balance = %principal.balance, "Principal refreshed");
            self.store.replace_principal(principal.clone());
        }
        Ok(principal)
    }
}
