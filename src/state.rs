//! Client state aggregate
//!
//! Built once per client from a `ClientConfig` and handed by reference to
//! whatever needs it. Every container shares the one `SessionStore`, which
//! is also what the transport reads the bearer token from.

use reqwest::Client;
use std::sync::Arc;
use tracing::{info, warn};

use crate::cache::{BalanceRequestCache, LicenseCache, OrderCache, ProductCache, Scope};
use crate::cart::Cart;
use crate::checkout::CheckoutEngine;
use crate::config::ClientConfig;
use crate::error::{StoreError, StoreResult};
use crate::moderation::Moderator;
use crate::session::storage::from_mode;
use crate::session::{
    guard_route, HostedIdentityProvider, IdentityProvider, NoIdentityProvider, Route,
    RouteDecision, SessionManager, SessionStorage, SessionStore, StorageSlot,
};
use crate::transport::{backend_client, ApiClient};

pub struct StoreState {
    config: Arc<ClientConfig>,
    session: Arc<SessionStore>,
    auth: SessionManager,
    cart: Arc<Cart>,
    products: Arc<ProductCache>,
    licenses: Arc<LicenseCache>,
    orders: Arc<OrderCache>,
    balance_requests: Arc<BalanceRequestCache>,
    checkout: CheckoutEngine,
    moderation: Moderator,
}

impl StoreState {
    pub fn new(config: ClientConfig) -> StoreResult<Self> {
        let storage = from_mode(config.storage, StorageSlot::Session)?;
        let provider = identity_provider(&config)?;
        Self::with_parts(config, storage, provider)
    }

    /// `.env` plus `LICENSEHUB_*` variables
    pub fn from_env() -> StoreResult<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    /// Explicit storage and provider (embedding apps, tests)
    pub fn with_parts(
        config: ClientConfig,
        storage: Arc<dyn SessionStorage>,
        provider: Arc<dyn IdentityProvider>,
    ) -> StoreResult<Self> {
        Self::with_client(config, storage, provider, backend_client()?.clone())
    }

    /// Same, with a caller-supplied HTTP client
    pub fn with_client(
        config: ClientConfig,
        storage: Arc<dyn SessionStorage>,
        provider: Arc<dyn IdentityProvider>,
        http: Client,
    ) -> StoreResult<Self> {
        let config = Arc::new(config);
        let session = Arc::new(SessionStore::new(storage));
        let api = ApiClient::with_client(config.clone(), session.clone(), http)?;

        let cart = Arc::new(Cart::new());
        let products = Arc::new(ProductCache::new(api.clone()));
        let licenses = Arc::new(LicenseCache::new(api.clone()));
        let orders = Arc::new(OrderCache::new(api.clone()));
        let balance_requests = Arc::new(BalanceRequestCache::new(api.clone()));

        let checkout = CheckoutEngine::new(session.clone(), cart.clone(), orders.clone());
        let moderation = Moderator::new(
            session.clone(),
            orders.clone(),
            balance_requests.clone(),
            licenses.clone(),
        );
        let auth = SessionManager::new(api, provider);

        info!(
            environment = ?config.environment,
            api = %config.api_base_url,
            storage = ?config.storage,
            "Client state ready"
        );

        Ok(Self {
            config,
            session,
            auth,
            cart,
            products,
            licenses,
            orders,
            balance_requests,
            checkout,
            moderation,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn auth(&self) -> &SessionManager {
        &self.auth
    }

    pub fn cart(&self) -> &Arc<Cart> {
        &self.cart
    }

    pub fn products(&self) -> &ProductCache {
        &self.products
    }

    pub fn licenses(&self) -> &LicenseCache {
        &self.licenses
    }

    pub fn orders(&self) -> &OrderCache {
        &self.orders
    }

    pub fn balance_requests(&self) -> &BalanceRequestCache {
        &self.balance_requests
    }

    pub fn checkout(&self) -> &CheckoutEngine {
        &self.checkout
    }

    pub fn moderation(&self) -> &Moderator {
        &self.moderation
    }

    /// Render/redirect decision for `route` under the current session
    pub fn guard(&self, route: Route) -> RouteDecision {
        guard_route(route, &self.session.snapshot())
    }

    /// Own orders and the catalog, fetched concurrently
    pub async fn refresh_dashboard(&self) -> StoreResult<()> {
        if !self.session.is_authenticated() {
            return Err(StoreError::NotAuthenticated);
        }
        futures::try_join!(self.orders.fetch_all(Scope::Mine), self.products.fetch_all())?;
        Ok(())
    }

    /// Everything the admin console lists
    pub async fn refresh_admin(&self) -> StoreResult<()> {
        if !self.session.snapshot().is_admin() {
            return Err(StoreError::Forbidden);
        }
        futures::try_join!(
            self.orders.fetch_all(Scope::All),
            self.balance_requests.fetch_all(Scope::All),
            self.licenses.fetch_all(),
            self.products.fetch_all(),
        )?;
        Ok(())
    }

    /// Ignore anything still in flight from here on. Every container shares
    /// the one client, so late fetches, moderation patches and checkout
    /// continuations all resolve to `ShutDown` without touching state.
    pub fn shutdown(&self) {
        self.auth.shutdown();
    }
}

fn identity_provider(config: &ClientConfig) -> StoreResult<Arc<dyn IdentityProvider>> {
    match (&config.identity_url, &config.identity_anon_key) {
        (Some(url), Some(key)) => {
            let tokens = from_mode(config.storage, StorageSlot::Provider)?;
            Ok(Arc::new(HostedIdentityProvider::new(
                url.clone(),
                key.clone(),
                tokens,
                config.request_timeout(),
            )?))
        }
        (Some(_), None) => {
            warn!("Identity provider URL set without a key, sign-in disabled");
            Ok(Arc::new(NoIdentityProvider))
        }
        _ => Ok(Arc::new(NoIdentityProvider)),
    }
}
