//! Session and identity
//!
//! This module handles:
//! - The session container (principal + token) shared with the transport
//! - Identity sync against the backend after provider sign-in
//! - Storage adapters deciding how long a session survives
//! - Post-sign-in redirect policy and route access

mod manager;
mod provider;
mod routes;
pub mod storage;
mod store;

pub use manager::{SessionManager, SyncOutcome};
pub use provider::{
    HostedIdentityProvider, IdentityProvider, NoIdentityProvider, ProviderEvent, ProviderSession,
};
pub use routes::{guard_route, should_redirect_after_sync, Access, Route, RouteDecision};
pub use storage::{PersistedSession, SessionStorage, StorageSlot};
pub use store::{SessionSnapshot, SessionStore, TokenOrigin};
