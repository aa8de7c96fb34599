//! Shared HTTP Client Module
//!
//! One lazily-built client for the backend and the identity provider.
//! Connection pooling and TLS session reuse are shared across every cache,
//! so creating an `ApiClient` is cheap. Timeouts are applied per request
//! from the caller's config rather than baked into the client.

use once_cell::sync::OnceCell;
use reqwest::Client;
use std::time::Duration;

use crate::error::{StoreError, StoreResult};

static BACKEND_CLIENT: OnceCell<Client> = OnceCell::new();

/// Get the global backend HTTP client, building it on first use
///
/// Configuration:
/// - 10 idle connections per host (one backend, a handful of caches)
/// - 90s idle timeout to balance resource usage and performance
/// - 10s connect timeout so an unreachable backend fails fast
pub fn backend_client() -> StoreResult<&'static Client> {
    BACKEND_CLIENT.get_or_try_init(|| {
        Client::builder()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .connect_timeout(Duration::from_secs(10))
            .tcp_keepalive(Duration::from_secs(60))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| StoreError::Config(format!("Failed to create HTTP client: {}", e)))
    })
}
