//! Third-party identity provider seam
//!
//! The provider owns sign-in (including redirect-based OAuth) and hands us an
//! access token. It also pushes SIGNED_IN / SIGNED_OUT events on its own
//! schedule, which may be a different tick than the initial page load.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::storage::{PersistedSession, SessionStorage};
use crate::error::{StoreError, StoreResult};
use crate::transport::backend_client;

/// An authenticated provider session
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSession {
    pub access_token: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    SignedIn(ProviderSession),
    SignedOut,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Existing provider session, if any (cold start)
    async fn current_session(&self) -> StoreResult<Option<ProviderSession>>;

    /// Invalidate the provider session
    async fn sign_out(&self) -> StoreResult<()>;

    /// Record a session the provider pushed (redirect sign-in) so that
    /// `sign_out` can reach it later
    fn remember(&self, _session: &ProviderSession) -> StoreResult<()> {
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ProviderUser {
    id: String,
}

/// REST identity provider (`/auth/v1/user`, `/auth/v1/logout`).
///
/// The provider's own access token is kept in a dedicated storage adapter so
/// its lifetime follows the same policy as our session.
pub struct HostedIdentityProvider {
    http: Client,
    base_url: String,
    anon_key: String,
    tokens: Arc<dyn SessionStorage>,
    timeout: Duration,
}

impl HostedIdentityProvider {
    pub fn new(
        base_url: impl Into<String>,
        anon_key: impl Into<String>,
        tokens: Arc<dyn SessionStorage>,
        timeout: Duration,
    ) -> StoreResult<Self> {
        let http = backend_client()?.clone();
        Ok(Self::with_client(base_url, anon_key, tokens, timeout, http))
    }

    pub fn with_client(
        base_url: impl Into<String>,
        anon_key: impl Into<String>,
        tokens: Arc<dyn SessionStorage>,
        timeout: Duration,
        http: Client,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            tokens,
            timeout,
        }
    }

    fn stored_token(&self) -> StoreResult<Option<String>> {
        Ok(self.tokens.load()?.and_then(|s| s.token))
    }
}

#[async_trait]
impl IdentityProvider for HostedIdentityProvider {
    async fn current_session(&self) -> StoreResult<Option<ProviderSession>> {
        let Some(token) = self.stored_token()? else {
            return Ok(None);
        };

        let response = self
            .http
            .get(format!("{}/auth/v1/user", self.base_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(&token)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| StoreError::Provider(e.to_string()))?;

        match response.status() {
            s if s.is_success() => {
                let user: ProviderUser = response
                    .json()
                    .await
                    .map_err(|e| StoreError::Provider(e.to_string()))?;
                debug!(provider_user = %user.id, "Provider session still valid");
                Ok(Some(ProviderSession { access_token: token }))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                debug!("Stored provider token rejected, discarding");
                self.tokens.clear()?;
                Ok(None)
            }
            other => Err(StoreError::Provider(format!(
                "Provider returned {}",
                other.as_u16()
            ))),
        }
    }

    fn remember(&self, session: &ProviderSession) -> StoreResult<()> {
        self.tokens.save(&PersistedSession {
            principal: None,
            token: Some(session.access_token.clone()),
        })
    }

    async fn sign_out(&self) -> StoreResult<()> {
        let token = self.stored_token()?;
        // Local copy goes first; the remote call is best effort
        self.tokens.clear()?;
        let Some(token) = token else {
            return Ok(());
        };

        let response = self
            .http
            .post(format!("{}/auth/v1/logout", self.base_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(&token)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| StoreError::Provider(e.to_string()))?;

        if response.status().is_success() || response.status() == StatusCode::UNAUTHORIZED {
            Ok(())
        } else {
            warn!(status = response.status().as_u16(), "Provider sign-out failed");
            Err(StoreError::Provider(format!(
                "Sign-out returned {}",
                response.status().as_u16()
            )))
        }
    }
}

/// Provider for clients that only ever restore a stored backend session
pub struct NoIdentityProvider;

#[async_trait]
impl IdentityProvider for NoIdentityProvider {
    async fn current_session(&self) -> StoreResult<Option<ProviderSession>> {
        Ok(None)
    }

    async fn sign_out(&self) -> StoreResult<()> {
        Ok(())
    }
}
