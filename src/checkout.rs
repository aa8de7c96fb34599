//! Checkout decision engine
//!
//! Balance `B` against the cart's price `P`: `B >= P` pays from the wallet
//! instantly, anything less goes through manual proof of payment and admin
//! review. The comparison is redone on every call, never cached.

use rust_decimal::Decimal;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

use crate::cache::{ManualOrder, OrderCache, WalletOrder};
use crate::cart::Cart;
use crate::error::{StoreError, StoreResult};
use crate::inflight::InFlight;
use crate::locks::{acquire_read_lock, acquire_write_lock};
use crate::models::{PaymentMethod, Plan, Principal, Product};
use crate::money::round2;
use crate::session::{Route, SessionStore, TokenOrigin};
use crate::transport::Upload;

/// Shown after a manual order goes through
pub const MANUAL_ORDER_PENDING: &str = "Your order is pending approval. Check your dashboard.";

const SUBMISSION: &str = "checkout";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutPath {
    Wallet,
    Manual,
}

/// Boundary inclusive: `balance == price` pays from the wallet
pub fn select_path(balance: Decimal, price: Decimal) -> CheckoutPath {
    if balance >= price {
        CheckoutPath::Wallet
    } else {
        CheckoutPath::Manual
    }
}

/// First non-empty token in the order given
pub fn recover_token(candidates: &[(TokenOrigin, Option<String>)]) -> Option<(TokenOrigin, String)> {
    candidates.iter().find_map(|(origin, token)| {
        token
            .as_deref()
            .filter(|t| !t.is_empty())
            .map(|t| (*origin, t.to_string()))
    })
}

/// Principal after a wallet purchase of `price`.
///
/// `current` must carry the balance the wallet path was chosen on. Every
/// field but `balance` is kept, and the balance never drops below zero. The
/// token travels separately; a missing one is logged, never silently
/// accepted.
pub fn reconcile_after_wallet_debit(
    current: &Principal,
    price: Decimal,
    recovered_token: Option<&str>,
) -> Principal {
    if recovered_token.map_or(true, str::is_empty) {
        warn!(
            user_id = %current.id,
            "No session token recoverable while applying wallet debit"
        );
    }
    Principal {
        balance: debited_balance(current.balance, price),
        ..current.clone()
    }
}

fn debited_balance(balance: Decimal, price: Decimal) -> Decimal {
    round2(balance - price).max(Decimal::ZERO)
}

/// What checkout would do right now
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    /// Whose balance the decision was made on
    pub user_id: String,
    pub product: Product,
    pub plan: Plan,
    pub price: Decimal,
    pub balance: Decimal,
    pub path: CheckoutPath,
}

impl Quote {
    /// How much a top-up would need to cover
    pub fn shortfall(&self) -> Decimal {
        (self.price - self.balance).max(Decimal::ZERO)
    }
}

/// Manual payment form. Kept across failed submissions.
#[derive(Debug, Clone, PartialEq)]
pub struct ManualPaymentForm {
    pub method: PaymentMethod,
    pub transaction_id: String,
    pub screenshot: Option<Upload>,
}

impl Default for ManualPaymentForm {
    fn default() -> Self {
        Self {
            method: PaymentMethod::Upi,
            transaction_id: String::new(),
            screenshot: None,
        }
    }
}

impl ManualPaymentForm {
    pub fn validate(&self) -> StoreResult<&Upload> {
        if !self.method.requires_proof() {
            return Err(StoreError::validation("Select payment method."));
        }
        if self.transaction_id.trim().is_empty() {
            return Err(StoreError::validation("Please enter your Transaction ID."));
        }
        self.screenshot
            .as_ref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| StoreError::validation("Please upload a payment screenshot."))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CheckoutOutcome {
    /// Paid from the wallet; `balance` is the optimistic new balance
    WalletPurchased { balance: Decimal, message: Option<String> },
    /// Awaiting admin approval, no balance change and no license yet
    ManualSubmitted { message: String },
}

pub struct CheckoutEngine {
    session: Arc<SessionStore>,
    cart: Arc<Cart>,
    orders: Arc<OrderCache>,
    form: RwLock<ManualPaymentForm>,
    submitting: InFlight,
}

impl CheckoutEngine {
    pub fn new(session: Arc<SessionStore>, cart: Arc<Cart>, orders: Arc<OrderCache>) -> Self {
        Self {
            session,
            cart,
            orders,
            form: RwLock::new(ManualPaymentForm::default()),
            submitting: InFlight::new(),
        }
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting.is_busy(SUBMISSION)
    }

    pub fn form(&self) -> ManualPaymentForm {
        acquire_read_lock(&self.form).clone()
    }

    pub fn edit_form<F>(&self, f: F)
    where
        F: FnOnce(&mut ManualPaymentForm),
    {
        f(&mut acquire_write_lock(&self.form));
    }

    pub fn reset_form(&self) {
        *acquire_write_lock(&self.form) = ManualPaymentForm::default();
    }

    /// Current cart and balance, evaluated fresh
    pub fn quote(&self) -> StoreResult<Quote> {
        let principal = self
            .session
            .principal()
            .filter(|_| self.session.is_authenticated())
            .ok_or(StoreError::NotAuthenticated)?;
        let selection = self.cart.selection();
        let (product, plan) = selection.require()?;
        let price = product.price(plan);
        Ok(Quote {
            user_id: principal.id.clone(),
            product: product.clone(),
            plan,
            price,
            balance: principal.balance,
            path: select_path(principal.balance, price),
        })
    }

    pub async fn pay_with_wallet(&self) -> StoreResult<CheckoutOutcome> {
        let quote = self.quote()?;
        if quote.path != CheckoutPath::Wallet {
            return Err(StoreError::validation("Insufficient wallet balance."));
        }
        let _submitting = self
            .submitting
            .begin(SUBMISSION)
            .ok_or_else(|| StoreError::validation("Your order is already being submitted."))?;

        // 401 has already cleared the session and signalled login in the
        // transport; any other failure leaves cart and balance untouched
        let ack = self
            .orders
            .create_wallet(&WalletOrder {
                product_id: quote.product.id.clone(),
                plan: quote.plan,
                price: quote.price,
            })
            .await?;

        let balance = self.apply_wallet_debit(&quote);
        self.cart.clear_cart();
        self.session.signal(Route::Dashboard);
        info!(
            product_id = %quote.product.id,
            plan = quote.plan.as_str(),
            price = %quote.price,
            "Wallet purchase completed"
        );
        Ok(CheckoutOutcome::WalletPurchased {
            balance,
            message: ack.message,
        })
    }

    /// Debit the balance the quote was made on, not whatever the session
    /// holds now: a refresh that landed mid-purchase may already include
    /// the server's debit.
    fn apply_wallet_debit(&self, quote: &Quote) -> Decimal {
        let Some(current) = self
            .session
            .principal()
            .filter(|p| p.id == quote.user_id)
        else {
            warn!(user_id = %quote.user_id, "Session changed before wallet debit could be applied");
            return debited_balance(quote.balance, quote.price);
        };
        let basis = Principal {
            balance: quote.balance,
            ..current
        };
        let recovered = recover_token(&self.session.token_candidates());
        let patched = reconcile_after_wallet_debit(
            &basis,
            quote.price,
            recovered.as_ref().map(|(_, token)| token.as_str()),
        );
        let balance = patched.balance;
        let token = match recovered {
            Some((TokenOrigin::Durable, token)) => {
                warn!("Live session token missing, restored durable copy");
                Some(token)
            }
            Some((TokenOrigin::Live, _)) | None => None,
        };
        self.session.apply_patch(patched, token);
        balance
    }

    /// Validates the form before any network call. On failure the form is
    /// left as entered.
    pub async fn submit_manual(&self) -> StoreResult<CheckoutOutcome> {
        let quote = self.quote()?;
        let form = self.form();
        let screenshot = form.validate()?.clone();
        let _submitting = self
            .submitting
            .begin(SUBMISSION)
            .ok_or_else(|| StoreError::validation("Your order is already being submitted."))?;

        self.orders
            .create_manual(&ManualOrder {
                product_id: quote.product.id.clone(),
                plan: quote.plan,
                price: quote.price,
                payment_method: form.method,
                transaction_id: form.transaction_id.trim().to_string(),
                screenshot,
            })
            .await?;

        self.cart.clear_cart();
        self.reset_form();
        self.session.signal(Route::Dashboard);
        Ok(CheckoutOutcome::ManualSubmitted {
            message: MANUAL_ORDER_PENDING.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionStorage;
    use crate::testing::{capture_logs, dec, principal, product, MockBackend};
    use httpmock::Method::POST;
    use serde_json::json;
    use std::time::Duration;

    struct Fixture {
        backend: MockBackend,
        cart: Arc<Cart>,
        engine: CheckoutEngine,
    }

    async fn fixture(balance: &str, price: &str) -> Fixture {
        let backend = MockBackend::signed_in(principal("u1", balance)).await;
        let cart = Arc::new(Cart::new());
        cart.set_cart(product("p1", Plan::ThirtyDays, price), Plan::ThirtyDays);
        let orders = Arc::new(OrderCache::new(backend.api.clone()));
        let engine = CheckoutEngine::new(backend.session.clone(), cart.clone(), orders);
        Fixture {
            backend,
            cart,
            engine,
        }
    }

    fn proof() -> Upload {
        Upload::new("proof.png", vec![1, 2, 3])
    }

    #[test]
    fn test_select_path_boundary() {
        assert_eq!(select_path(dec("19.99"), dec("19.99")), CheckoutPath::Wallet);
        assert_eq!(select_path(dec("19.98"), dec("19.99")), CheckoutPath::Manual);
        assert_eq!(select_path(dec("50"), dec("19.99")), CheckoutPath::Wallet);
        assert_eq!(select_path(dec("0"), dec("0")), CheckoutPath::Wallet);
    }

    #[test]
    fn test_reconcile_keeps_everything_but_balance() {
        let before = principal("u1", "50.00");
        let after = reconcile_after_wallet_debit(&before, dec("19.99"), Some("tok"));
        assert_eq!(after.balance, dec("30.01"));
        assert_eq!(after.id, before.id);
        assert_eq!(after.email, before.email);
        assert_eq!(after.role, before.role);

        // Missing token is logged, the debit still applies
        let after = reconcile_after_wallet_debit(&before, dec("0.333"), None);
        assert_eq!(after.balance, dec("49.67"));
    }

    #[test]
    fn test_reconcile_never_goes_negative() {
        let before = principal("u1", "5.00");
        let after = reconcile_after_wallet_debit(&before, dec("19.99"), Some("tok"));
        assert_eq!(after.balance, Decimal::ZERO);
    }

    #[test]
    fn test_recover_token_order() {
        let live_first = vec![
            (TokenOrigin::Live, Some("live".to_string())),
            (TokenOrigin::Durable, Some("durable".to_string())),
        ];
        assert_eq!(
            recover_token(&live_first),
            Some((TokenOrigin::Live, "live".to_string()))
        );
        let fallback = vec![
            (TokenOrigin::Live, Some(String::new())),
            (TokenOrigin::Durable, Some("durable".to_string())),
        ];
        assert_eq!(
            recover_token(&fallback),
            Some((TokenOrigin::Durable, "durable".to_string()))
        );
        assert_eq!(recover_token(&[(TokenOrigin::Live, None), (TokenOrigin::Durable, None)]), None);
    }

    #[tokio::test]
    async fn test_instant_buy() {
        let f = fixture("50.00", "19.99").await;
        let mut nav = f.backend.session.navigation();
        f.backend
            .server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/orders/wallet")
                    .header("authorization", "Bearer tok");
                then.status(201).json_body(json!({ "message": "Purchase successful" }));
            })
            .await;

        assert_eq!(f.engine.quote().unwrap().path, CheckoutPath::Wallet);
        let outcome = f.engine.pay_with_wallet().await.unwrap();
        assert_eq!(
            outcome,
            CheckoutOutcome::WalletPurchased {
                balance: dec("30.01"),
                message: Some("Purchase successful".into())
            }
        );
        let snap = f.backend.session.snapshot();
        assert_eq!(snap.principal.unwrap().balance, dec("30.01"));
        assert_eq!(snap.token.as_deref(), Some("tok"));
        assert!(snap.authenticated);
        assert!(f.cart.selection().is_empty());
        assert_eq!(nav.try_recv().unwrap(), Route::Dashboard);
        assert!(!f.engine.is_submitting());
    }

    #[tokio::test]
    async fn test_exact_balance_pays_from_wallet() {
        let f = fixture("19.99", "19.99").await;
        f.backend
            .server
            .mock_async(|when, then| {
                when.method(POST).path("/api/orders/wallet");
                then.status(201).json_body(json!({}));
            })
            .await;

        f.engine.pay_with_wallet().await.unwrap();
        assert_eq!(f.backend.session.principal().unwrap().balance, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_refresh_during_purchase_is_not_debited_twice() {
        let f = fixture("19.99", "19.99").await;
        f.backend
            .server
            .mock_async(|when, then| {
                when.method(POST).path("/api/orders/wallet");
                then.status(201).delay(Duration::from_millis(300));
            })
            .await;

        let (outcome, _) = tokio::join!(f.engine.pay_with_wallet(), async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            // Server already applied the debit and a refresh brought it in
            f.backend.session.replace_principal(principal("u1", "0"));
        });
        match outcome.unwrap() {
            CheckoutOutcome::WalletPurchased { balance, .. } => assert_eq!(balance, Decimal::ZERO),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(f.backend.session.principal().unwrap().balance, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_debit_skipped_when_user_changed() {
        let f = fixture("50.00", "19.99").await;
        f.backend
            .server
            .mock_async(|when, then| {
                when.method(POST).path("/api/orders/wallet");
                then.status(201).delay(Duration::from_millis(200));
            })
            .await;

        let (outcome, _) = tokio::join!(f.engine.pay_with_wallet(), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            f.backend.session.login(principal("u2", "7.00"), "tok-2".into());
        });
        assert!(outcome.is_ok());
        let snap = f.backend.session.snapshot();
        assert_eq!(snap.principal.unwrap().balance, dec("7.00"));
        assert_eq!(snap.token.as_deref(), Some("tok-2"));
    }

    #[tokio::test]
    async fn test_durable_token_restored_after_wallet_debit() {
        let f = fixture("50.00", "19.99").await;
        f.backend
            .server
            .mock_async(|when, then| {
                when.method(POST).path("/api/orders/wallet");
                then.status(201);
            })
            .await;
        f.backend.session.forget_live_token();
        assert_eq!(f.backend.session.token(), None);

        f.engine.pay_with_wallet().await.unwrap();
        let snap = f.backend.session.snapshot();
        assert_eq!(snap.token.as_deref(), Some("tok"));
        assert_eq!(snap.principal.unwrap().balance, dec("30.01"));
        assert!(snap.authenticated);
    }

    #[tokio::test]
    async fn test_unrecoverable_token_is_logged() {
        let f = fixture("50.00", "19.99").await;
        f.backend
            .server
            .mock_async(|when, then| {
                when.method(POST).path("/api/orders/wallet");
                then.status(201);
            })
            .await;
        f.backend.session.forget_live_token();
        f.backend.storage.clear().unwrap();
        let (logs, _guard) = capture_logs();

        f.engine.pay_with_wallet().await.unwrap();
        let snap = f.backend.session.snapshot();
        assert_eq!(snap.token, None);
        assert_eq!(snap.principal.unwrap().balance, dec("30.01"));
        assert!(logs.contents().contains("No session token recoverable"));
    }

    #[tokio::test]
    async fn test_stock_exhausted_leaves_cart_and_balance() {
        let f = fixture("50.00", "19.99").await;
        f.backend
            .server
            .mock_async(|when, then| {
                when.method(POST).path("/api/orders/wallet");
                then.status(400)
                    .json_body(json!({ "message": "Out of stock for this plan" }));
            })
            .await;

        let err = f.engine.pay_with_wallet().await.unwrap_err();
        assert_eq!(err.user_message(), "Out of stock for this plan");
        assert_eq!(f.backend.session.principal().unwrap().balance, dec("50.00"));
        assert!(f.cart.selection().product.is_some());
        assert!(!f.engine.is_submitting());
    }

    #[tokio::test]
    async fn test_wallet_401_ends_session() {
        let f = fixture("50.00", "19.99").await;
        let mut nav = f.backend.session.navigation();
        f.backend
            .server
            .mock_async(|when, then| {
                when.method(POST).path("/api/orders/wallet");
                then.status(401);
            })
            .await;

        let err = f.engine.pay_with_wallet().await.unwrap_err();
        assert!(err.is_session_fatal());
        assert!(!f.backend.session.is_authenticated());
        assert_eq!(nav.try_recv().unwrap(), Route::Login);
    }

    #[tokio::test]
    async fn test_insufficient_funds_manual_validation_before_network() {
        let f = fixture("5.00", "19.99").await;
        let any = f
            .backend
            .server
            .mock_async(|when, then| {
                when.any_request();
                then.status(201);
            })
            .await;

        assert_eq!(f.engine.quote().unwrap().path, CheckoutPath::Manual);
        assert_eq!(f.engine.quote().unwrap().shortfall(), dec("14.99"));
        assert!(matches!(
            f.engine.pay_with_wallet().await.unwrap_err(),
            StoreError::Validation(_)
        ));

        f.engine.edit_form(|form| form.screenshot = Some(proof()));
        let err = f.engine.submit_manual().await.unwrap_err();
        assert_eq!(err, StoreError::validation("Please enter your Transaction ID."));

        f.engine.edit_form(|form| {
            form.transaction_id = "TX1".into();
            form.screenshot = None;
        });
        let err = f.engine.submit_manual().await.unwrap_err();
        assert_eq!(err, StoreError::validation("Please upload a payment screenshot."));
        any.assert_hits_async(0).await;
    }

    #[tokio::test]
    async fn test_manual_success_clears_cart_and_form() {
        let f = fixture("5.00", "19.99").await;
        f.backend
            .server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/orders")
                    .body_contains("crypto")
                    .body_contains("TX-42");
                then.status(201).json_body(json!({ "message": "Order created" }));
            })
            .await;
        f.engine.edit_form(|form| {
            form.method = PaymentMethod::Crypto;
            form.transaction_id = " TX-42 ".into();
            form.screenshot = Some(proof());
        });

        let outcome = f.engine.submit_manual().await.unwrap();
        assert_eq!(
            outcome,
            CheckoutOutcome::ManualSubmitted {
                message: MANUAL_ORDER_PENDING.into()
            }
        );
        assert!(f.cart.selection().is_empty());
        assert_eq!(f.engine.form(), ManualPaymentForm::default());
        assert_eq!(f.backend.session.principal().unwrap().balance, dec("5.00"));
    }

    #[tokio::test]
    async fn test_manual_failure_preserves_form() {
        let f = fixture("5.00", "19.99").await;
        f.backend
            .server
            .mock_async(|when, then| {
                when.method(POST).path("/api/orders");
                then.status(500);
            })
            .await;
        f.engine.edit_form(|form| {
            form.transaction_id = "TX-1".into();
            form.screenshot = Some(proof());
        });

        assert!(f.engine.submit_manual().await.is_err());
        assert_eq!(f.engine.form().transaction_id, "TX-1");
        assert!(f.cart.selection().product.is_some());
    }

    #[tokio::test]
    async fn test_quote_follows_plan_change() {
        let f = fixture("10.00", "5.00").await;
        assert_eq!(f.engine.quote().unwrap().path, CheckoutPath::Wallet);
        // Only the lifetime price is set; 30_days is 0
        f.cart.set_cart(product("p1", Plan::Lifetime, "99.00"), Plan::ThirtyDays);
        assert_eq!(f.engine.quote().unwrap().price, Decimal::ZERO);
        f.cart.set_plan(Plan::Lifetime);
        assert_eq!(f.engine.quote().unwrap().path, CheckoutPath::Manual);
    }

    #[tokio::test]
    async fn test_quote_requires_session_and_cart() {
        let f = fixture("10.00", "5.00").await;
        f.cart.clear_cart();
        assert_eq!(
            f.engine.quote().unwrap_err(),
            StoreError::validation("Select a product first.")
        );
        f.backend.session.clear();
        assert_eq!(f.engine.quote().unwrap_err(), StoreError::NotAuthenticated);
    }
}
