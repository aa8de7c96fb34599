//! Storefront data types
//!
//! Internal (camelCase) shapes. Wire (snake_case and mixed) shapes live in
//! `crate::wire` and are normalized into these.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Image shown when a product has none
pub const PLACEHOLDER_IMAGE: &str = "/placeholder.svg";

/// Account role
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

/// The signed-in user as the backend knows them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub balance: Decimal,
    pub created_at: Option<DateTime<Utc>>,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// License duration tier, indexes a product's price table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Plan {
    #[serde(rename = "1_day")]
    OneDay,
    #[serde(rename = "7_days")]
    SevenDays,
    #[serde(rename = "30_days")]
    ThirtyDays,
    #[serde(rename = "lifetime")]
    Lifetime,
}

impl Plan {
    pub const ALL: [Plan; 4] = [Plan::OneDay, Plan::SevenDays, Plan::ThirtyDays, Plan::Lifetime];

    /// Wire value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneDay => "1_day",
            Self::SevenDays => "7_days",
            Self::ThirtyDays => "30_days",
            Self::Lifetime => "lifetime",
        }
    }

    /// Human label
    pub fn label(&self) -> &'static str {
        match self {
            Self::OneDay => "1 Day",
            Self::SevenDays => "7 Days",
            Self::ThirtyDays => "30 Days",
            Self::Lifetime => "Lifetime",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == value)
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Price per plan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceTable {
    #[serde(rename = "1_day")]
    pub one_day: Decimal,
    #[serde(rename = "7_days")]
    pub seven_days: Decimal,
    #[serde(rename = "30_days")]
    pub thirty_days: Decimal,
    #[serde(rename = "lifetime")]
    pub lifetime: Decimal,
}

impl PriceTable {
    pub fn price(&self, plan: Plan) -> Decimal {
        match plan {
            Plan::OneDay => self.one_day,
            Plan::SevenDays => self.seven_days,
            Plan::ThirtyDays => self.thirty_days,
            Plan::Lifetime => self.lifetime,
        }
    }

    pub fn set(&mut self, plan: Plan, price: Decimal) {
        match plan {
            Plan::OneDay => self.one_day = price,
            Plan::SevenDays => self.seven_days = price,
            Plan::ThirtyDays => self.thirty_days = price,
            Plan::Lifetime => self.lifetime = price,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub name: String,
    pub description: String,
    pub image: String,
    /// Gallery, never empty (falls back to `[image]`)
    pub images: Vec<String>,
    pub prices: PriceTable,
    pub software_download_link: Option<String>,
    pub tutorial_video_link: Option<String>,
    pub apply_process: Option<String>,
}

impl Product {
    pub fn price(&self, plan: Plan) -> Decimal {
        self.prices.price(plan)
    }

    pub fn has_image(&self) -> bool {
        !self.image.is_empty() && self.image != PLACEHOLDER_IMAGE
    }

    /// Stand-in shown when an order or license references a deleted product
    pub fn placeholder(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: "Unknown product".to_string(),
            description: String::new(),
            image: PLACEHOLDER_IMAGE.to_string(),
            images: vec![PLACEHOLDER_IMAGE.to_string()],
            prices: PriceTable::default(),
            software_download_link: None,
            tutorial_video_link: None,
            apply_process: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseStatus {
    #[default]
    Unused,
    Assigned,
    Expired,
    Revoked,
}

impl std::fmt::Display for LicenseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unused => write!(f, "unused"),
            Self::Assigned => write!(f, "assigned"),
            Self::Expired => write!(f, "expired"),
            Self::Revoked => write!(f, "revoked"),
        }
    }
}

/// A license key. Status is owned by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct License {
    pub id: String,
    pub key: String,
    pub product_id: String,
    pub status: LicenseStatus,
    pub plan: Option<Plan>,
    pub order_id: Option<String>,
    pub user_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub assigned_at: Option<DateTime<Utc>>,
}

impl License {
    pub fn is_deletable(&self) -> bool {
        self.status == LicenseStatus::Unused
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Completed,
    Rejected,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// pending -> completed | rejected; nothing leaves a terminal state
    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        *self == Self::Pending && target.is_terminal()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    Upi,
    Crypto,
    BankTransfer,
    Paypal,
    Wallet,
}

impl PaymentMethod {
    /// Methods a user can pick for a manual payment
    pub const MANUAL: [PaymentMethod; 4] = [
        PaymentMethod::Upi,
        PaymentMethod::Crypto,
        PaymentMethod::BankTransfer,
        PaymentMethod::Paypal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upi => "upi",
            Self::Crypto => "crypto",
            Self::BankTransfer => "bank_transfer",
            Self::Paypal => "paypal",
            Self::Wallet => "wallet",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "upi" => Some(Self::Upi),
            "crypto" => Some(Self::Crypto),
            "bank_transfer" => Some(Self::BankTransfer),
            "paypal" => Some(Self::Paypal),
            "wallet" => Some(Self::Wallet),
            _ => None,
        }
    }

    /// Wallet payments carry no transaction id or screenshot
    pub fn requires_proof(&self) -> bool {
        !matches!(self, Self::Wallet)
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub user_id: String,
    pub product_id: String,
    pub plan: Plan,
    /// Snapshot at purchase time
    pub price: Decimal,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub transaction_id: Option<String>,
    pub payment_screenshot: Option<String>,
    /// Empty until the backend has assigned a license
    pub license_key: Option<String>,
    pub software_download_link: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Key for display; empty right after an optimistic approval
    pub fn license_key_or_empty(&self) -> &str {
        self.license_key.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BalanceRequestStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl BalanceRequestStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for BalanceRequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wallet top-up request awaiting admin review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceRequest {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub user_email: String,
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    pub transaction_id: String,
    pub payment_screenshot: Option<String>,
    pub status: BalanceRequestStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
}
