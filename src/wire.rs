//! Wire schema and its normalization into the internal model
//!
//! One mapping function per entity. The backend is not consistent about
//! casing (admin lists are camelCase, own lists snake_case) or about how it
//! nests relations, so every known variant is accepted here and anything
//! missing becomes "not available yet" rather than an error.

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::warn;

use crate::models::{
    BalanceRequest, BalanceRequestStatus, License, LicenseStatus, Order, OrderStatus,
    PaymentMethod, Plan, PriceTable, Principal, Product, Role, PLACEHOLDER_IMAGE,
};

/// `{ "data": ..., "message": ... }` success envelope
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
    #[serde(default)]
    pub message: Option<String>,
}

/// `{ "message": ... }` body that may accompany an error status
#[derive(Debug, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ErrorBody {
    pub fn into_message(self) -> Option<String> {
        self.message
            .or(self.error)
            .filter(|m| !m.trim().is_empty())
    }
}

/// Amounts arrive as numbers, numeric strings or null
fn lenient_decimal<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(decimal_from_value).unwrap_or(Decimal::ZERO))
}

fn decimal_from_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => n.to_string().parse().ok(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn lenient_time<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(Value::as_str).and_then(parse_time))
}

fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    // Postgres `timestamp without time zone`, assumed UTC
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .map(|t| t.and_utc())
        .ok()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

// ---------------------------------------------------------------------------
// Principal
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct WirePrincipal {
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, alias = "full_name", alias = "userName")]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub balance: Decimal,
    #[serde(default, alias = "created_at", deserialize_with = "lenient_time")]
    pub created_at: Option<DateTime<Utc>>,
}

pub fn principal_from_wire(w: WirePrincipal) -> Principal {
    let role = match w.role.as_deref() {
        Some("admin") => Role::Admin,
        _ => Role::User,
    };
    let name = non_empty(w.name).unwrap_or_else(|| {
        w.email
            .split('@')
            .next()
            .unwrap_or_default()
            .to_string()
    });
    Principal {
        id: w.id,
        email: w.email,
        name,
        role,
        balance: w.balance.max(Decimal::ZERO),
        created_at: w.created_at,
    }
}

// ---------------------------------------------------------------------------
// Product
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct WireProduct {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub images: Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub price_1_day: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub price_7_days: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub price_30_days: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub price_lifetime: Decimal,
    #[serde(default)]
    pub download_link: Option<String>,
    #[serde(default)]
    pub tutorial_video_link: Option<String>,
    #[serde(default)]
    pub activation_process: Option<String>,
}

pub fn product_from_wire(w: WireProduct) -> Product {
    let image = non_empty(w.image_url).unwrap_or_else(|| PLACEHOLDER_IMAGE.to_string());
    let images = match w.images {
        Some(images) if !images.is_empty() => images,
        _ => vec![image.clone()],
    };
    Product {
        id: w.id,
        name: w.name,
        description: w.description.unwrap_or_default(),
        image,
        images,
        prices: PriceTable {
            one_day: w.price_1_day,
            seven_days: w.price_7_days,
            thirty_days: w.price_30_days,
            lifetime: w.price_lifetime,
        },
        software_download_link: non_empty(w.download_link),
        tutorial_video_link: non_empty(w.tutorial_video_link),
        apply_process: non_empty(w.activation_process),
    }
}

// ---------------------------------------------------------------------------
// License
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct WireLicense {
    pub id: String,
    #[serde(alias = "license_key")]
    pub key: String,
    #[serde(alias = "productId")]
    pub product_id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default, alias = "orderId")]
    pub order_id: Option<String>,
    #[serde(default, alias = "userId")]
    pub user_id: Option<String>,
    #[serde(default, alias = "createdAt", deserialize_with = "lenient_time")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "assignedAt", deserialize_with = "lenient_time")]
    pub assigned_at: Option<DateTime<Utc>>,
}

pub fn license_from_wire(w: WireLicense) -> License {
    let status = match w.status.as_deref() {
        Some("assigned") => LicenseStatus::Assigned,
        Some("expired") => LicenseStatus::Expired,
        Some("revoked") => LicenseStatus::Revoked,
        Some("unused") | None => LicenseStatus::Unused,
        Some(other) => {
            // Unknown states are never offered for deletion
            warn!(license_id = %w.id, status = other, "Unknown license status");
            LicenseStatus::Revoked
        }
    };
    License {
        id: w.id,
        key: w.key,
        product_id: w.product_id,
        status,
        plan: w.plan.as_deref().and_then(Plan::parse),
        order_id: w.order_id,
        user_id: w.user_id,
        created_at: w.created_at,
        assigned_at: w.assigned_at,
    }
}

// ---------------------------------------------------------------------------
// Order
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct WireOrder {
    pub id: String,
    #[serde(default, alias = "userId")]
    pub user_id: String,
    #[serde(default, alias = "productId")]
    pub product_id: String,
    #[serde(default)]
    pub plan: String,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub price: Decimal,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, alias = "paymentMethod")]
    pub payment_method: Option<String>,
    #[serde(default, alias = "transactionId")]
    pub transaction_id: Option<String>,
    #[serde(default, alias = "paymentScreenshot", alias = "payment_screenshot")]
    pub payment_screenshot_url: Option<String>,
    /// `{ key }` or `[{ key }]` depending on the join
    #[serde(default)]
    pub licenses: Option<Value>,
    #[serde(default, alias = "license_key")]
    #[serde(rename = "licenseKey")]
    pub license_key: Option<String>,
    #[serde(default)]
    pub products: Option<Value>,
    #[serde(default, alias = "createdAt", deserialize_with = "lenient_time")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "completedAt", deserialize_with = "lenient_time")]
    pub updated_at: Option<DateTime<Utc>>,
}

fn nested_str(value: &Value, field: &str) -> Option<String> {
    let object = match value {
        Value::Array(items) => items.first()?,
        other => other,
    };
    object
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .filter(|s| !s.is_empty())
}

/// Returns `None` when the plan is unrecognised; such rows are dropped
pub fn order_from_wire(w: WireOrder) -> Option<Order> {
    let Some(plan) = Plan::parse(&w.plan) else {
        warn!(order_id = %w.id, plan = %w.plan, "Dropping order with unknown plan");
        return None;
    };
    let status = match w.status.as_deref() {
        Some("completed") => OrderStatus::Completed,
        Some("rejected") => OrderStatus::Rejected,
        _ => OrderStatus::Pending,
    };
    let payment_method = w
        .payment_method
        .as_deref()
        .and_then(PaymentMethod::parse)
        .unwrap_or_default();
    let license_key = w
        .licenses
        .as_ref()
        .and_then(|l| nested_str(l, "key"))
        .or_else(|| non_empty(w.license_key));
    let software_download_link = w
        .products
        .as_ref()
        .and_then(|p| nested_str(p, "download_link"));

    Some(Order {
        id: w.id,
        user_id: w.user_id,
        product_id: w.product_id,
        plan,
        price: w.price,
        status,
        payment_method,
        transaction_id: non_empty(w.transaction_id),
        payment_screenshot: non_empty(w.payment_screenshot_url),
        license_key,
        software_download_link,
        created_at: w.created_at,
        completed_at: w.updated_at,
    })
}

// ---------------------------------------------------------------------------
// Balance request
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct WireBalanceRequest {
    pub id: String,
    #[serde(default, alias = "user_id")]
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
    #[serde(default, alias = "user_name")]
    #[serde(rename = "userName")]
    pub user_name: Option<String>,
    #[serde(default, alias = "user_email")]
    #[serde(rename = "userEmail")]
    pub user_email: Option<String>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub amount: Decimal,
    #[serde(default, alias = "payment_method")]
    #[serde(rename = "paymentMethod")]
    pub payment_method: Option<String>,
    #[serde(default, alias = "transaction_id")]
    #[serde(rename = "transactionId")]
    pub transaction_id: Option<String>,
    #[serde(default, alias = "payment_screenshot", alias = "payment_screenshot_url")]
    #[serde(rename = "paymentScreenshot")]
    pub payment_screenshot: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, alias = "created_at", deserialize_with = "lenient_time")]
    #[serde(rename = "createdAt")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "processed_at", deserialize_with = "lenient_time")]
    #[serde(rename = "processedAt")]
    pub processed_at: Option<DateTime<Utc>>,
}

pub fn balance_request_from_wire(w: WireBalanceRequest) -> BalanceRequest {
    let status = match w.status.as_deref() {
        Some("approved") => BalanceRequestStatus::Approved,
        Some("rejected") => BalanceRequestStatus::Rejected,
        _ => BalanceRequestStatus::Pending,
    };
    BalanceRequest {
        id: w.id,
        user_id: w.user_id.unwrap_or_default(),
        user_name: non_empty(w.user_name).unwrap_or_else(|| "Unknown".to_string()),
        user_email: non_empty(w.user_email).unwrap_or_else(|| "Unknown".to_string()),
        amount: w.amount,
        payment_method: w
            .payment_method
            .as_deref()
            .and_then(PaymentMethod::parse)
            .unwrap_or_default(),
        transaction_id: w.transaction_id.unwrap_or_default(),
        payment_screenshot: non_empty(w.payment_screenshot),
        status,
        created_at: w.created_at,
        processed_at: w.processed_at,
    }
}
