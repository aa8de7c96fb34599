//! Wallet top-up requests
//!
//! Approval happens on the backend. Locally an approved request only changes
//! status: the user's balance moves when that user next refreshes their
//! principal, never here.

use chrono::Utc;
use reqwest::multipart::Form;
use reqwest::Method;
use rust_decimal::Decimal;
use tracing::info;

use super::{Collection, Scope, NEW_ITEM};
use crate::error::{StoreError, StoreResult};
use crate::models::{BalanceRequest, BalanceRequestStatus, PaymentMethod};
use crate::money::parse_amount;
use crate::transport::{Ack, ApiClient, Body, Upload};
use crate::wire::{balance_request_from_wire, WireBalanceRequest};

/// Add-balance form as entered
#[derive(Debug, Clone, Default)]
pub struct TopUpForm {
    pub amount: String,
    pub payment_method: Option<PaymentMethod>,
    pub transaction_id: String,
    /// Optional for top-ups
    pub screenshot: Option<Upload>,
}

impl TopUpForm {
    /// Checked in order; the first missing field wins
    pub fn validate(&self) -> StoreResult<(Decimal, PaymentMethod)> {
        let amount = parse_amount(&self.amount)
            .filter(|a| *a > Decimal::ZERO)
            .ok_or_else(|| StoreError::validation("Enter valid amount."))?;
        let method = self
            .payment_method
            .filter(|m| m.requires_proof())
            .ok_or_else(|| StoreError::validation("Select payment method."))?;
        if self.transaction_id.trim().is_empty() {
            return Err(StoreError::validation("Enter transaction ID."));
        }
        Ok((amount, method))
    }

    fn to_form(&self, amount: Decimal, method: PaymentMethod) -> StoreResult<Form> {
        let mut form = Form::new()
            .text("amount", amount.to_string())
            .text("paymentMethod", method.as_str())
            .text("transactionId", self.transaction_id.trim().to_string());
        if let Some(screenshot) = self.screenshot.as_ref().filter(|s| !s.is_empty()) {
            form = form.part("paymentScreenshot", screenshot.to_part()?);
        }
        Ok(form)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BalanceSummary {
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
    pub total_approved: Decimal,
}

pub struct BalanceRequestCache {
    api: ApiClient,
    items: Collection<BalanceRequest>,
}

impl BalanceRequestCache {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            items: Collection::new("balance request"),
        }
    }

    pub fn items(&self) -> &Collection<BalanceRequest> {
        &self.items
    }

    pub async fn fetch_all(&self, scope: Scope) -> StoreResult<Vec<BalanceRequest>> {
        let _loading = self.items.begin_load();
        let path = match scope {
            Scope::Mine => "/balance/my-requests",
            Scope::All => "/balance/admin/all",
        };
        let rows: Vec<WireBalanceRequest> = self.api.get(path).await?;
        let requests: Vec<BalanceRequest> =
            rows.into_iter().map(balance_request_from_wire).collect();
        self.items.replace_all(requests.clone());
        Ok(requests)
    }

    pub async fn create(&self, form: &TopUpForm) -> StoreResult<Ack> {
        let (amount, method) = form.validate()?;
        let _saving = self.items.begin_save(NEW_ITEM)?;
        let ack = self
            .api
            .post_multipart("/balance", form.to_form(amount, method)?)
            .await?;
        info!(amount = %amount, method = method.as_str(), "Top-up request submitted");
        Ok(ack)
    }

    pub async fn approve(&self, id: &str) -> StoreResult<BalanceRequest> {
        self.resolve(id, BalanceRequestStatus::Approved).await
    }

    pub async fn reject(&self, id: &str) -> StoreResult<BalanceRequest> {
        self.resolve(id, BalanceRequestStatus::Rejected).await
    }

    async fn resolve(&self, id: &str, target: BalanceRequestStatus) -> StoreResult<BalanceRequest> {
        let cached = self.items.require(id)?;
        if cached.status.is_terminal() {
            return Err(StoreError::IllegalTransition {
                from: cached.status.to_string(),
                to: target.to_string(),
            });
        }
        let action = match target {
            BalanceRequestStatus::Approved => "approve",
            _ => "reject",
        };

        let _saving = self.items.begin_save(id)?;
        self.api
            .send(Method::PATCH, &format!("/balance/{}/{}", id, action), Body::Empty)
            .await?;

        let processed_at = Some(Utc::now());
        let patched = self
            .items
            .patch(id, |r| {
                r.status = target;
                r.processed_at = processed_at;
            })
            .unwrap_or(BalanceRequest {
                status: target,
                processed_at,
                ..cached
            });
        info!(request_id = id, status = target.as_str(), amount = %patched.amount, "Top-up request resolved");
        Ok(patched)
    }

    pub fn summary(&self) -> BalanceSummary {
        let mut summary = BalanceSummary::default();
        for request in self.items.all() {
            match request.status {
                BalanceRequestStatus::Pending => summary.pending += 1,
                BalanceRequestStatus::Approved => {
                    summary.approved += 1;
                    summary.total_approved += request.amount;
                }
                BalanceRequestStatus::Rejected => summary.rejected += 1,
            }
        }
        summary
    }

    /// Drives the "top-up pending" badge
    pub fn has_pending(&self) -> bool {
        !self
            .items
            .filter(|r| r.status == BalanceRequestStatus::Pending)
            .is_empty()
    }
}
