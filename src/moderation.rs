//! Admin moderation
//!
//! Approve/reject for orders and top-up requests, plus license cleanup.
//! Each action marks its id as processing for the UI; the mark is advisory
//! and the backend settles real duplicates.

use std::sync::Arc;
use tracing::info;

use crate::cache::{BalanceRequestCache, LicenseCache, OrderCache};
use crate::error::{StoreError, StoreResult};
use crate::inflight::{InFlight, InFlightGuard};
use crate::models::{BalanceRequest, LicenseStatus, Order, OrderStatus};
use crate::session::SessionStore;
use crate::transport::Ack;

const PURGE: &str = "licenses:unused";

pub struct Moderator {
    session: Arc<SessionStore>,
    orders: Arc<OrderCache>,
    balance_requests: Arc<BalanceRequestCache>,
    licenses: Arc<LicenseCache>,
    processing: InFlight,
}

impl Moderator {
    pub fn new(
        session: Arc<SessionStore>,
        orders: Arc<OrderCache>,
        balance_requests: Arc<BalanceRequestCache>,
        licenses: Arc<LicenseCache>,
    ) -> Self {
        Self {
            session,
            orders,
            balance_requests,
            licenses,
            processing: InFlight::new(),
        }
    }

    pub fn is_processing(&self, id: &str) -> bool {
        self.processing.is_busy(id)
    }

    /// Any moderation action outstanding; the UI disables every button
    pub fn is_processing_any(&self) -> bool {
        self.processing.any()
    }

    fn begin(&self, id: &str) -> StoreResult<InFlightGuard<'_>> {
        if !self.session.snapshot().is_admin() {
            return Err(StoreError::Forbidden);
        }
        self.processing
            .begin(id)
            .ok_or_else(|| StoreError::validation("This item is already being processed."))
    }

    pub async fn approve_order(&self, id: &str) -> StoreResult<Order> {
        self.set_order_status(id, OrderStatus::Completed).await
    }

    pub async fn reject_order(&self, id: &str) -> StoreResult<Order> {
        self.set_order_status(id, OrderStatus::Rejected).await
    }

    async fn set_order_status(&self, id: &str, target: OrderStatus) -> StoreResult<Order> {
        let _processing = self.begin(id)?;
        self.orders.update_status(id, target).await
    }

    pub async fn approve_balance_request(&self, id: &str) -> StoreResult<BalanceRequest> {
        let _processing = self.begin(id)?;
        self.balance_requests.approve(id).await
    }

    pub async fn reject_balance_request(&self, id: &str) -> StoreResult<BalanceRequest> {
        let _processing = self.begin(id)?;
        self.balance_requests.reject(id).await
    }

    pub async fn delete_license(&self, id: &str) -> StoreResult<Ack> {
        let _processing = self.begin(id)?;
        self.licenses.delete(id).await
    }

    /// Single backend call, then a full license re-fetch
    pub async fn purge_unused_licenses(&self, product_id: Option<&str>) -> StoreResult<Ack> {
        let _processing = self.begin(PURGE)?;
        let unused_before = match product_id {
            Some(pid) => self.licenses.stock_summary(pid).unused,
            None => self.licenses.with_status(LicenseStatus::Unused).len(),
        };
        let ack = self.licenses.delete_all_unused(product_id).await?;
        info!(
            product_id = ?product_id,
            unused_before = unused_before,
            remaining = self.licenses.items().len(),
            "License cleanup complete"
        );
        Ok(ack)
    }
}
