//! Backend API client
//!
//! The bearer token is attached here, once, for every request. Status
//! handling is uniform too: a 401 from any endpoint expires the whole
//! session, anything else non-2xx is surfaced with the backend's message.
//!
//! Every clone shares one liveness flag. Once `shutdown()` is called, any
//! response still on its way resolves to `StoreError::ShutDown` and no
//! caller continuation gets to apply it.

use reqwest::multipart::Form;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use super::http_client::backend_client;
use crate::config::ClientConfig;
use crate::error::{StoreError, StoreResult};
use crate::inflight::Liveness;
use crate::session::SessionStore;
use crate::wire::{Envelope, ErrorBody};

/// Body of a mutation response we do not otherwise interpret
#[derive(Debug, Clone, Default)]
pub struct Ack {
    pub message: Option<String>,
    pub data: Value,
}

/// Request body
pub enum Body {
    Empty,
    Json(Value),
    Multipart(Form),
}

#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    config: Arc<ClientConfig>,
    session: Arc<SessionStore>,
    alive: Liveness,
}

impl ApiClient {
    /// Uses the shared pooled client
    pub fn new(config: Arc<ClientConfig>, session: Arc<SessionStore>) -> StoreResult<Self> {
        Self::with_client(config, session, backend_client()?.clone())
    }

    pub fn with_client(
        config: Arc<ClientConfig>,
        session: Arc<SessionStore>,
        http: Client,
    ) -> StoreResult<Self> {
        config.validate()?;
        Ok(Self {
            http,
            config,
            session,
            alive: Liveness::new(),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub(crate) fn liveness(&self) -> &Liveness {
        &self.alive
    }

    /// Drop every result still in flight, on this client and all its clones
    pub fn shutdown(&self) {
        self.alive.end();
    }

    fn ensure_alive(&self) -> StoreResult<()> {
        if self.alive.is_alive() {
            Ok(())
        } else {
            debug!("Response arrived after shutdown, dropping it");
            Err(StoreError::ShutDown)
        }
    }

    fn request(&self, method: Method, path: &str, token: Option<String>) -> RequestBuilder {
        let builder = self
            .http
            .request(method, self.config.endpoint(path))
            .timeout(self.config.request_timeout());
        match token.or_else(|| self.session.token()) {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Body,
        token: Option<String>,
    ) -> StoreResult<Response> {
        self.ensure_alive()?;
        debug!(method = %method, path = path, "Backend request");
        let mut builder = self.request(method, path, token);
        if !query.is_empty() {
            builder = builder.query(query);
        }
        let builder = match body {
            Body::Empty => builder,
            Body::Json(value) => builder.json(&value),
            Body::Multipart(form) => builder.multipart(form),
        };
        let response = builder.send().await?;
        // A late 401 must not expire a session nobody is watching any more
        self.ensure_alive()?;
        self.check(response).await
    }

    async fn check(&self, response: Response) -> StoreResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            self.session.expire();
            return Err(StoreError::AuthExpired);
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .ok()
            .and_then(ErrorBody::into_message);
        warn!(status = status.as_u16(), message = ?message, "Backend rejected request");

        Err(match message {
            Some(message) => StoreError::Rejected {
                status: status.as_u16(),
                message,
            },
            None if status.is_server_error() => StoreError::Server {
                status: status.as_u16(),
            },
            None => StoreError::Rejected {
                status: status.as_u16(),
                message: format!("Request failed ({})", status),
            },
        })
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> StoreResult<T> {
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(StoreError::from)
    }

    /// GET returning the envelope's `data`
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> StoreResult<T> {
        let response = self.execute(Method::GET, path, &[], Body::Empty, None).await?;
        let envelope = Self::decode::<Envelope<T>>(response).await?;
        self.ensure_alive()?;
        Ok(envelope.data)
    }

    /// GET with an explicit credential instead of the session's
    pub async fn get_with_token<T: DeserializeOwned>(&self, path: &str, token: &str) -> StoreResult<T> {
        let response = self
            .execute(Method::GET, path, &[], Body::Empty, Some(token.to_string()))
            .await?;
        let envelope = Self::decode::<Envelope<T>>(response).await?;
        self.ensure_alive()?;
        Ok(envelope.data)
    }

    /// Any mutation; the response body is kept but not interpreted
    pub async fn send(&self, method: Method, path: &str, body: Body) -> StoreResult<Ack> {
        self.send_with_query(method, path, &[], body).await
    }

    /// Same, with query parameters encoded onto the URL
    pub async fn send_with_query(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Body,
    ) -> StoreResult<Ack> {
        let response = self.execute(method, path, query, body, None).await?;
        let bytes = response.bytes().await?;
        self.ensure_alive()?;
        if bytes.is_empty() {
            return Ok(Ack::default());
        }
        let value: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        Ok(Ack {
            message: value
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string),
            data: value.get("data").cloned().unwrap_or(Value::Null),
        })
    }

    pub async fn post_json<B: Serialize>(&self, path: &str, body: &B) -> StoreResult<Ack> {
        self.send(Method::POST, path, Body::Json(serde_json::to_value(body)?))
            .await
    }

    pub async fn post_multipart(&self, path: &str, form: Form) -> StoreResult<Ack> {
        self.send(Method::POST, path, Body::Multipart(form)).await
    }

    pub async fn delete(&self, path: &str) -> StoreResult<Ack> {
        self.send(Method::DELETE, path, Body::Empty).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::storage::MemoryStorage;
    use crate::testing::{principal, MockBackend};
    use httpmock::Method::{DELETE, GET, POST};
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn test_bearer_attached_from_session() {
        let backend = MockBackend::start().await;
        backend.session.login(principal("u1", "10.00"), "tok-1".into());
        let mock = backend
            .server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/products")
                    .header("authorization", "Bearer tok-1");
                then.status(200).json_body(json!({ "data": [] }));
            })
            .await;

        let items: Vec<Value> = backend.api.get("/products").await.unwrap();
        assert!(items.is_empty());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_no_token_means_no_header() {
        let backend = MockBackend::start().await;
        let with_header = backend
            .server
            .mock_async(|when, then| {
                when.method(GET).path("/api/products").header_exists("authorization");
                then.status(500);
            })
            .await;
        let without = backend
            .server
            .mock_async(|when, then| {
                when.method(GET).path("/api/products");
                then.status(200).json_body(json!({ "data": [] }));
            })
            .await;

        let _: Vec<Value> = backend.api.get("/products").await.unwrap();
        with_header.assert_hits_async(0).await;
        without.assert_async().await;
    }

    #[tokio::test]
    async fn test_401_anywhere_expires_session() {
        let backend = MockBackend::start().await;
        backend.session.login(principal("u1", "10.00"), "stale".into());
        let mut nav = backend.session.navigation();
        backend
            .server
            .mock_async(|when, then| {
                when.method(DELETE).path("/api/licenses/l1");
                then.status(401).json_body(json!({ "message": "jwt expired" }));
            })
            .await;

        let err = backend.api.delete("/licenses/l1").await.unwrap_err();
        assert_eq!(err, StoreError::AuthExpired);
        assert!(!backend.session.is_authenticated());
        assert_eq!(nav.try_recv().unwrap(), crate::session::Route::Login);
    }

    #[tokio::test]
    async fn test_backend_message_surfaced_verbatim() {
        let backend = MockBackend::start().await;
        backend
            .server
            .mock_async(|when, then| {
                when.method(POST).path("/api/orders/wallet");
                then.status(400)
                    .json_body(json!({ "message": "No licenses available for this plan" }));
            })
            .await;

        let err = backend
            .api
            .post_json("/orders/wallet", &json!({}))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::Rejected {
                status: 400,
                message: "No licenses available for this plan".into()
            }
        );
    }

    #[tokio::test]
    async fn test_server_error_without_message() {
        let backend = MockBackend::start().await;
        backend
            .server
            .mock_async(|when, then| {
                when.method(GET).path("/api/orders/my-orders");
                then.status(503).body("upstream down");
            })
            .await;

        let err = backend
            .api
            .get::<Vec<Value>>("/orders/my-orders")
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::Server { status: 503 });
    }

    #[tokio::test]
    async fn test_query_params_are_encoded() {
        let backend = MockBackend::start().await;
        let mock = backend
            .server
            .mock_async(|when, then| {
                when.method(DELETE)
                    .path("/api/licenses/unused")
                    .query_param("productId", "a&b c");
                then.status(200);
            })
            .await;

        backend
            .api
            .send_with_query(
                Method::DELETE,
                "/licenses/unused",
                &[("productId", "a&b c")],
                Body::Empty,
            )
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_shutdown_drops_late_responses() {
        let backend = MockBackend::start().await;
        backend.session.login(principal("u1", "10.00"), "tok".into());
        backend
            .server
            .mock_async(|when, then| {
                when.method(GET).path("/api/users/me");
                then.status(401).delay(Duration::from_millis(200));
            })
            .await;
        let clone = backend.api.clone();

        let (result, _) = tokio::join!(backend.api.get::<Value>("/users/me"), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            clone.shutdown();
        });
        assert_eq!(result.unwrap_err(), StoreError::ShutDown);
        // The late 401 was not applied
        assert!(backend.session.is_authenticated());
        assert_eq!(
            backend.api.get::<Value>("/users/me").await.unwrap_err(),
            StoreError::ShutDown
        );
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_network_error() {
        let session = Arc::new(SessionStore::new(Arc::new(MemoryStorage::new())));
        let config = Arc::new(ClientConfig::with_base_url("http://127.0.0.1:9/api"));
        let api = ApiClient::new(config, session).unwrap();
        let err = api.get::<Vec<Value>>("/products").await.unwrap_err();
        assert!(matches!(err, StoreError::Network(_)));
    }
}
