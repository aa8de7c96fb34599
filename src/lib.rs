pub mod cache;
pub mod cart;
pub mod checkout;
pub mod config;
pub mod error;
mod inflight;
mod locks;
pub mod models;
pub mod moderation;
pub mod money;
pub mod session;
pub mod state;
pub mod transport;
pub mod wire;

#[cfg(test)]
mod testing;

pub use cache::{BalanceRequestCache, LicenseCache, OrderCache, ProductCache, Scope};
pub use cart::{Cart, CartSelection};
pub use checkout::{
    reconcile_after_wallet_debit, recover_token, select_path, CheckoutEngine, CheckoutOutcome,
    CheckoutPath, ManualPaymentForm, Quote,
};
pub use config::{ClientConfig, Environment, StorageMode};
pub use error::{StoreError, StoreResult};
pub use inflight::{InFlight, InFlightGuard, Liveness};
pub use models::{
    BalanceRequest, BalanceRequestStatus, License, LicenseStatus, Order, OrderStatus,
    PaymentMethod, Plan, Principal, Product, Role,
};
pub use moderation::Moderator;
pub use session::{
    should_redirect_after_sync, Route, RouteDecision, SessionManager, SessionSnapshot,
    SessionStore,
};
pub use state::StoreState;

use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber.
///
/// Filter comes from `RUST_LOG`. Default: warn for dependencies, info for
/// this crate (sign-ins, purchases, moderation). `RUST_LOG=licensehub=debug`
/// adds per-request and cache replacement logs. Safe to call more than once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,licensehub=info")),
        )
        .try_init();
}
