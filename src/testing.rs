//! Shared fixtures for unit tests: a mock backend plus wire-shaped rows

use async_trait::async_trait;
use httpmock::MockServer;
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::subscriber::DefaultGuard;

use crate::config::ClientConfig;
use crate::error::{StoreError, StoreResult};
use crate::models::{Plan, PriceTable, Principal, Product, Role, PLACEHOLDER_IMAGE};
use crate::session::storage::MemoryStorage;
use crate::session::{IdentityProvider, ProviderSession, SessionStore};
use crate::transport::ApiClient;

/// Unpooled client. Mock server ports are recycled between tests, and a
/// pooled connection must not outlive the test runtime that opened it.
pub fn test_http() -> Client {
    Client::builder().pool_max_idle_per_host(0).build().unwrap()
}

pub fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

pub fn principal(id: &str, balance: &str) -> Principal {
    Principal {
        id: id.to_string(),
        email: format!("{}@example.com", id),
        name: id.to_uppercase(),
        role: Role::User,
        balance: dec(balance),
        created_at: None,
    }
}

pub fn admin(id: &str) -> Principal {
    Principal {
        role: Role::Admin,
        ..principal(id, "0")
    }
}

pub fn product(id: &str, plan: Plan, price: &str) -> Product {
    let mut prices = PriceTable::default();
    prices.set(plan, dec(price));
    Product {
        id: id.to_string(),
        name: format!("Product {}", id),
        description: String::new(),
        image: PLACEHOLDER_IMAGE.to_string(),
        images: vec![PLACEHOLDER_IMAGE.to_string()],
        prices,
        software_download_link: None,
        tutorial_video_link: None,
        apply_process: None,
    }
}

pub fn principal_json(id: &str, role: &str, balance: &str) -> Value {
    json!({
        "id": id,
        "email": format!("{}@example.com", id),
        "name": id,
        "role": role,
        "balance": balance,
    })
}

pub fn product_json(id: &str, price_30_days: f64) -> Value {
    json!({
        "id": id,
        "name": format!("Product {}", id),
        "description": "",
        "image_url": null,
        "price_1_day": 0,
        "price_7_days": 0,
        "price_30_days": price_30_days,
        "price_lifetime": 0,
    })
}

pub fn license_json(id: &str, product_id: &str, status: &str) -> Value {
    json!({
        "id": id,
        "key": format!("KEY-{}", id.to_uppercase()),
        "product_id": product_id,
        "status": status,
    })
}

pub fn order_json(id: &str, status: &str) -> Value {
    json!({
        "id": id,
        "user_id": "u1",
        "product_id": "p1",
        "plan": "30_days",
        "price": 19.99,
        "status": status,
        "payment_method": "upi",
        "transaction_id": "TX1",
    })
}

pub fn balance_json(id: &str, status: &str, amount: f64) -> Value {
    json!({
        "id": id,
        "user_id": "u1",
        "user_name": "U1",
        "user_email": "u1@example.com",
        "amount": amount,
        "payment_method": "crypto",
        "transaction_id": "TX9",
        "status": status,
    })
}

/// Backend on a random local port with a fresh in-memory session
pub struct MockBackend {
    pub server: MockServer,
    pub session: Arc<SessionStore>,
    /// The session's durable copy
    pub storage: Arc<MemoryStorage>,
    pub api: ApiClient,
}

impl MockBackend {
    pub async fn start() -> Self {
        let server = MockServer::start_async().await;
        let storage = Arc::new(MemoryStorage::new());
        let session = Arc::new(SessionStore::new(storage.clone()));
        let config = Arc::new(ClientConfig::with_base_url(server.url("/api")));
        let api = ApiClient::with_client(config, session.clone(), test_http()).unwrap();
        Self {
            server,
            session,
            storage,
            api,
        }
    }

    /// Same, already signed in
    pub async fn signed_in(user: Principal) -> Self {
        let backend = Self::start().await;
        backend.session.login(user, "tok".into());
        backend
    }
}

/// Client for code paths that never reach the network
pub fn offline_api() -> ApiClient {
    let session = Arc::new(SessionStore::new(Arc::new(MemoryStorage::new())));
    let config = Arc::new(ClientConfig::with_base_url("http://127.0.0.1:9/api"));
    ApiClient::with_client(config, session, test_http()).unwrap()
}

/// Log lines written while the returned guard is alive (current thread)
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub fn capture_logs() -> (LogBuffer, DefaultGuard) {
    let logs = LogBuffer::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    (logs, tracing::subscriber::set_default(subscriber))
}

/// Identity provider double that counts sign-outs
pub struct StubProvider {
    token: Option<String>,
    fail_sign_out: bool,
    sign_outs: AtomicUsize,
}

impl StubProvider {
    pub fn signed_out() -> Self {
        Self {
            token: None,
            fail_sign_out: false,
            sign_outs: AtomicUsize::new(0),
        }
    }

    pub fn signed_in(token: &str) -> Self {
        Self {
            token: Some(token.to_string()),
            ..Self::signed_out()
        }
    }

    pub fn failing_sign_out() -> Self {
        Self {
            fail_sign_out: true,
            ..Self::signed_out()
        }
    }

    pub fn sign_outs(&self) -> usize {
        self.sign_outs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for StubProvider {
    async fn current_session(&self) -> StoreResult<Option<ProviderSession>> {
        Ok(self.token.clone().map(|access_token| ProviderSession { access_token }))
    }

    async fn sign_out(&self) -> StoreResult<()> {
        self.sign_outs.fetch_add(1, Ordering::SeqCst);
        if self.fail_sign_out {
            Err(StoreError::Provider("offline".into()))
        } else {
            Ok(())
        }
    }
}
