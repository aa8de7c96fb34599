//! Orders: both checkout paths create them, admins move them out of `pending`

use reqwest::multipart::Form;
use reqwest::Method;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use super::{Collection, Scope, NEW_ITEM};
use crate::error::{StoreError, StoreResult};
use crate::models::{Order, OrderStatus, PaymentMethod, Plan};
use crate::transport::{Ack, ApiClient, Body, Upload};
use crate::wire::{order_from_wire, WireOrder};

/// Wallet purchase body
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletOrder {
    pub product_id: String,
    pub plan: Plan,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
}

/// Manual purchase with proof of payment
#[derive(Debug, Clone)]
pub struct ManualOrder {
    pub product_id: String,
    pub plan: Plan,
    pub price: Decimal,
    pub payment_method: PaymentMethod,
    pub transaction_id: String,
    pub screenshot: Upload,
}

impl ManualOrder {
    fn to_form(&self) -> StoreResult<Form> {
        Ok(Form::new()
            .text("productId", self.product_id.clone())
            .text("plan", self.plan.as_str())
            .text("price", self.price.to_string())
            .text("paymentMethod", self.payment_method.as_str())
            .text("transactionId", self.transaction_id.clone())
            .part("paymentScreenshot", self.screenshot.to_part()?))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrderCounts {
    pub pending: usize,
    pub completed: usize,
    pub rejected: usize,
}

impl OrderCounts {
    pub fn total(&self) -> usize {
        self.pending + self.completed + self.rejected
    }
}

pub struct OrderCache {
    api: ApiClient,
    items: Collection<Order>,
}

impl OrderCache {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            items: Collection::new("order"),
        }
    }

    pub fn items(&self) -> &Collection<Order> {
        &self.items
    }

    pub async fn fetch_all(&self, scope: Scope) -> StoreResult<Vec<Order>> {
        let _loading = self.items.begin_load();
        let path = match scope {
            Scope::Mine => "/orders/my-orders",
            Scope::All => "/orders/admin/all",
        };
        let rows: Vec<WireOrder> = self.api.get(path).await?;
        let orders: Vec<Order> = rows.into_iter().filter_map(order_from_wire).collect();
        self.items.replace_all(orders.clone());
        Ok(orders)
    }

    pub async fn create_manual(&self, order: &ManualOrder) -> StoreResult<Ack> {
        let _saving = self.items.begin_save(NEW_ITEM)?;
        let ack = self.api.post_multipart("/orders", order.to_form()?).await?;
        info!(
            product_id = %order.product_id,
            plan = order.plan.as_str(),
            method = order.payment_method.as_str(),
            "Manual order submitted"
        );
        Ok(ack)
    }

    pub async fn create_wallet(&self, order: &WalletOrder) -> StoreResult<Ack> {
        let _saving = self.items.begin_save(NEW_ITEM)?;
        self.api.post_json("/orders/wallet", order).await
    }

    /// Move a pending order to `completed` or `rejected`.
    ///
    /// Refused without a network call if the cached row is already
    /// terminal. On success only `status` is patched locally; the license
    /// key stays whatever was cached until the next fetch.
    pub async fn update_status(&self, id: &str, target: OrderStatus) -> StoreResult<Order> {
        let cached = self.items.require(id)?;
        if !cached.status.can_transition_to(target) {
            return Err(StoreError::IllegalTransition {
                from: cached.status.to_string(),
                to: target.to_string(),
            });
        }

        let _saving = self.items.begin_save(id)?;
        self.api
            .send(
                Method::PATCH,
                &format!("/orders/{}/status", id),
                Body::Json(json!({ "status": target.as_str() })),
            )
            .await?;

        let patched = self.items.patch(id, |o| o.status = target).unwrap_or_else(|| {
            warn!(order_id = id, "Order left the cache before its status patch");
            Order {
                status: target,
                ..cached
            }
        });
        info!(order_id = id, status = target.as_str(), "Order status updated");
        Ok(patched)
    }

    pub fn counts(&self) -> OrderCounts {
        let mut counts = OrderCounts::default();
        for order in self.items.all() {
            match order.status {
                OrderStatus::Pending => counts.pending += 1,
                OrderStatus::Completed => counts.completed += 1,
                OrderStatus::Rejected => counts.rejected += 1,
            }
        }
        counts
    }

    pub fn with_status(&self, status: OrderStatus) -> Vec<Order> {
        self.items.filter(|o| o.status == status)
    }
}
