//! License key inventory
//!
//! Status belongs to the backend. The client only refuses deletes it can
//! already tell will fail (anything not `unused`).

use reqwest::Method;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{info, warn};
use uuid::Uuid;

use super::{Collection, NEW_ITEM};
use crate::error::{StoreError, StoreResult};
use crate::models::{License, LicenseStatus, Plan};
use crate::transport::{Ack, ApiClient, Body};
use crate::wire::{license_from_wire, WireLicense};

/// In-flight key for the bulk purge
const PURGE: &str = "unused";

/// Random characters after the `KEY-` prefix
const GENERATED_KEY_LEN: usize = 9;

/// `KEY-` followed by 9 uppercase alphanumerics
pub fn generate_license_key() -> String {
    let raw = Uuid::new_v4().simple().to_string();
    format!("KEY-{}", raw[..GENERATED_KEY_LEN].to_uppercase())
}

/// One key per line; whitespace trimmed, blank lines dropped
pub fn parse_bulk_keys(input: &str) -> Vec<String> {
    input
        .lines()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

/// Admin key entry form
#[derive(Debug, Clone, Default)]
pub struct KeyBatch {
    pub product_id: Option<String>,
    pub plan: Option<Plan>,
    /// Newline separated keys (bulk add only)
    pub bulk_keys: String,
}

impl KeyBatch {
    fn target(&self) -> StoreResult<(&str, Plan)> {
        let product_id = self
            .product_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| StoreError::validation("Select a product first."))?;
        let plan = self
            .plan
            .ok_or_else(|| StoreError::validation("Select a duration (plan) first."))?;
        Ok((product_id, plan))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateLicenses<'a> {
    product_id: &'a str,
    keys: &'a [String],
    plan: Plan,
}

/// Inventory counts for one product
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StockSummary {
    pub unused: usize,
    pub assigned: usize,
    pub expired: usize,
    pub revoked: usize,
}

impl StockSummary {
    pub fn total(&self) -> usize {
        self.unused + self.assigned + self.expired + self.revoked
    }

    fn count(&mut self, status: LicenseStatus) {
        match status {
            LicenseStatus::Unused => self.unused += 1,
            LicenseStatus::Assigned => self.assigned += 1,
            LicenseStatus::Expired => self.expired += 1,
            LicenseStatus::Revoked => self.revoked += 1,
        }
    }
}

pub struct LicenseCache {
    api: ApiClient,
    items: Collection<License>,
}

impl LicenseCache {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            items: Collection::new("license"),
        }
    }

    pub fn items(&self) -> &Collection<License> {
        &self.items
    }

    pub fn with_status(&self, status: LicenseStatus) -> Vec<License> {
        self.items.filter(|l| l.status == status)
    }

    pub async fn fetch_all(&self) -> StoreResult<Vec<License>> {
        let _loading = self.items.begin_load();
        let rows: Vec<WireLicense> = self.api.get("/licenses").await?;
        let licenses: Vec<License> = rows.into_iter().map(license_from_wire).collect();
        self.items.replace_all(licenses.clone());
        Ok(licenses)
    }

    async fn create(&self, product_id: &str, plan: Plan, keys: &[String]) -> StoreResult<Ack> {
        let _saving = self.items.begin_save(NEW_ITEM)?;
        let ack = self
            .api
            .post_json(
                "/licenses",
                &CreateLicenses {
                    product_id,
                    keys,
                    plan,
                },
            )
            .await?;
        info!(product_id = product_id, plan = plan.as_str(), count = keys.len(), "License keys added");
        Ok(ack)
    }

    /// Add every key in `batch.bulk_keys`. Returns how many were sent.
    pub async fn bulk_create(&self, batch: &KeyBatch) -> StoreResult<usize> {
        let (product_id, plan) = batch.target()?;
        let keys = parse_bulk_keys(&batch.bulk_keys);
        if keys.is_empty() {
            return Err(StoreError::validation("Enter at least one key."));
        }
        self.create(product_id, plan, &keys).await?;
        Ok(keys.len())
    }

    /// Generate and add one random key. Returns the key.
    pub async fn generate_one(&self, batch: &KeyBatch) -> StoreResult<String> {
        let (product_id, plan) = batch.target()?;
        let key = generate_license_key();
        self.create(product_id, plan, std::slice::from_ref(&key)).await?;
        Ok(key)
    }

    /// Delete one key. Refused locally unless the cached row is `unused`.
    pub async fn delete(&self, id: &str) -> StoreResult<Ack> {
        let license = self.items.require(id)?;
        if !license.is_deletable() {
            return Err(StoreError::NotDeletable {
                id: id.to_string(),
                status: license.status.to_string(),
            });
        }
        let _saving = self.items.begin_save(id)?;
        let ack = self.api.delete(&format!("/licenses/{}", id)).await?;
        info!(license_id = id, "License deleted");
        Ok(ack)
    }

    /// Purge unused keys (optionally for one product), then re-fetch.
    ///
    /// Once the purge itself succeeds this returns `Ok`; a failed re-fetch
    /// only leaves the cache stale until the next `fetch_all`.
    pub async fn delete_all_unused(&self, product_id: Option<&str>) -> StoreResult<Ack> {
        let query: Vec<(&str, &str)> = product_id.map(|id| ("productId", id)).into_iter().collect();
        let ack = {
            let _saving = self.items.begin_save(PURGE)?;
            self.api
                .send_with_query(Method::DELETE, "/licenses/unused", &query, Body::Empty)
                .await?
        };
        info!(product_id = ?product_id, "Unused licenses purged");
        if let Err(e) = self.fetch_all().await {
            warn!(error = %e, "License list not refreshed after purge");
        }
        Ok(ack)
    }

    pub fn stock_summary(&self, product_id: &str) -> StockSummary {
        let mut summary = StockSummary::default();
        for license in self.items.filter(|l| l.product_id == product_id) {
            summary.count(license.status);
        }
        summary
    }

    /// Per-product counts for the admin dashboard
    pub fn stock_by_product(&self) -> HashMap<String, StockSummary> {
        let mut by_product: HashMap<String, StockSummary> = HashMap::new();
        for license in self.items.all() {
            by_product
                .entry(license.product_id.clone())
                .or_default()
                .count(license.status);
        }
        by_product
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{admin, license_json, MockBackend};
    use httpmock::Method::{DELETE, GET, POST};
    use serde_json::json;

    async fn seeded(backend: &MockBackend) -> LicenseCache {
        backend
            .server
            .mock_async(|when, then| {
                when.method(GET).path("/api/licenses");
                then.status(200).json_body(json!({
                    "data": [
                        license_json("l1", "p1", "unused"),
                        license_json("l2", "p1", "assigned"),
                        license_json("l3", "p2", "unused"),
                    ]
                }));
            })
            .await;
        let cache = LicenseCache::new(backend.api.clone());
        cache.fetch_all().await.unwrap();
        cache
    }

    #[test]
    fn test_generated_key_shape() {
        let key = generate_license_key();
        assert!(key.starts_with("KEY-"));
        let suffix = &key[4..];
        assert_eq!(suffix.len(), 9);
        assert!(suffix
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn test_parse_bulk_keys() {
        assert_eq!(
            parse_bulk_keys("  KEY-1\n\nKEY-2  \r\n   \nKEY-3"),
            vec!["KEY-1", "KEY-2", "KEY-3"]
        );
        assert!(parse_bulk_keys("\n  \n").is_empty());
    }

    #[tokio::test]
    async fn test_delete_refused_unless_unused() {
        let backend = MockBackend::signed_in(admin("a1")).await;
        let cache = seeded(&backend).await;
        let delete = backend
            .server
            .mock_async(|when, then| {
                when.method(DELETE).path_contains("/api/licenses/");
                then.status(200).json_body(json!({ "message": "ok" }));
            })
            .await;

        let err = cache.delete("l2").await.unwrap_err();
        assert_eq!(
            err,
            StoreError::NotDeletable {
                id: "l2".into(),
                status: "assigned".into()
            }
        );
        assert!(matches!(
            cache.delete("nope").await.unwrap_err(),
            StoreError::StaleReference { .. }
        ));
        delete.assert_hits_async(0).await;

        cache.delete("l1").await.unwrap();
        delete.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_bulk_create_validates_then_posts() {
        let backend = MockBackend::signed_in(admin("a1")).await;
        let post = backend
            .server
            .mock_async(|when, then| {
                when.method(POST).path("/api/licenses").json_body(json!({
                    "productId": "p1",
                    "keys": ["A", "B"],
                    "plan": "7_days"
                }));
                then.status(201).json_body(json!({ "message": "2 keys added" }));
            })
            .await;
        let cache = LicenseCache::new(backend.api.clone());

        let mut batch = KeyBatch::default();
        assert_eq!(
            cache.bulk_create(&batch).await.unwrap_err(),
            StoreError::validation("Select a product first.")
        );
        batch.product_id = Some("p1".into());
        assert_eq!(
            cache.bulk_create(&batch).await.unwrap_err(),
            StoreError::validation("Select a duration (plan) first.")
        );
        batch.plan = Some(Plan::SevenDays);
        batch.bulk_keys = " \n ".into();
        assert_eq!(
            cache.bulk_create(&batch).await.unwrap_err(),
            StoreError::validation("Enter at least one key.")
        );
        post.assert_hits_async(0).await;

        batch.bulk_keys = "A\n\n B ".into();
        assert_eq!(cache.bulk_create(&batch).await.unwrap(), 2);
        post.assert_async().await;
    }

    #[tokio::test]
    async fn test_purge_reconciles_by_refetch() {
        let backend = MockBackend::signed_in(admin("a1")).await;
        let mut first = backend
            .server
            .mock_async(|when, then| {
                when.method(GET).path("/api/licenses");
                then.status(200).json_body(json!({
                    "data": [license_json("l1", "p1", "unused"), license_json("l2", "p1", "assigned")]
                }));
            })
            .await;
        let cache = LicenseCache::new(backend.api.clone());
        cache.fetch_all().await.unwrap();
        first.delete_async().await;

        let purge = backend
            .server
            .mock_async(|when, then| {
                when.method(DELETE)
                    .path("/api/licenses/unused")
                    .query_param("productId", "p1");
                then.status(200).json_body(json!({ "message": "Deleted 1 unused keys" }));
            })
            .await;
        // Server still reports the unused row; the cache must show that
        backend
            .server
            .mock_async(|when, then| {
                when.method(GET).path("/api/licenses");
                then.status(200).json_body(json!({
                    "data": [license_json("l2", "p1", "assigned"), license_json("l9", "p1", "unused")]
                }));
            })
            .await;

        let ack = cache.delete_all_unused(Some("p1")).await.unwrap();
        assert_eq!(ack.message.as_deref(), Some("Deleted 1 unused keys"));
        purge.assert_async().await;
        let ids: Vec<String> = cache.items().all().into_iter().map(|l| l.id).collect();
        assert_eq!(ids, vec!["l2", "l9"]);
    }

    #[tokio::test]
    async fn test_purge_succeeds_even_if_refetch_fails() {
        let backend = MockBackend::signed_in(admin("a1")).await;
        let purge = backend
            .server
            .mock_async(|when, then| {
                when.method(DELETE)
                    .path("/api/licenses/unused")
                    .query_param("productId", "p 1&x");
                then.status(200).json_body(json!({ "message": "Deleted 4 unused keys" }));
            })
            .await;
        backend
            .server
            .mock_async(|when, then| {
                when.method(GET).path("/api/licenses");
                then.status(503);
            })
            .await;
        let cache = LicenseCache::new(backend.api.clone());

        let ack = cache.delete_all_unused(Some("p 1&x")).await.unwrap();
        assert_eq!(ack.message.as_deref(), Some("Deleted 4 unused keys"));
        purge.assert_async().await;
        assert!(!cache.items().is_saving());
        assert!(!cache.items().is_loading());
    }

    #[tokio::test]
    async fn test_stock_summary() {
        let backend = MockBackend::signed_in(admin("a1")).await;
        let cache = seeded(&backend).await;

        let p1 = cache.stock_summary("p1");
        assert_eq!(p1.unused, 1);
        assert_eq!(p1.assigned, 1);
        assert_eq!(p1.total(), 2);
        assert_eq!(cache.stock_by_product()["p2"].unused, 1);
        assert_eq!(cache.stock_summary("none"), StockSummary::default());
    }
}
