//! Single purchase intent
//!
//! At most one `(product, plan)` pair, in memory only. A reload starts the
//! checkout over from product selection so a stale price never comes back.

use std::sync::RwLock;
use tokio::sync::watch;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::locks::{acquire_read_lock, acquire_write_lock};
use crate::models::{Plan, Product};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CartSelection {
    pub product: Option<Product>,
    pub plan: Option<Plan>,
}

impl CartSelection {
    /// Both halves present, or a reason to go back to the shop
    pub fn require(&self) -> StoreResult<(&Product, Plan)> {
        let product = self
            .product
            .as_ref()
            .ok_or_else(|| StoreError::validation("Select a product first."))?;
        let plan = self
            .plan
            .ok_or_else(|| StoreError::validation("Select a duration (plan) first."))?;
        Ok((product, plan))
    }

    pub fn is_empty(&self) -> bool {
        self.product.is_none() && self.plan.is_none()
    }
}

pub struct Cart {
    selection: RwLock<CartSelection>,
    changes: watch::Sender<CartSelection>,
}

impl Cart {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(CartSelection::default());
        Self {
            selection: RwLock::new(CartSelection::default()),
            changes,
        }
    }

    pub fn selection(&self) -> CartSelection {
        acquire_read_lock(&self.selection).clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CartSelection> {
        self.changes.subscribe()
    }

    /// Overwrites whatever was selected
    pub fn set_cart(&self, product: Product, plan: Plan) {
        debug!(product_id = %product.id, plan = plan.as_str(), "Cart set");
        self.replace(CartSelection {
            product: Some(product),
            plan: Some(plan),
        });
    }

    /// Switch plan within the same checkout
    pub fn set_plan(&self, plan: Plan) {
        let mut selection = self.selection();
        selection.plan = Some(plan);
        self.replace(selection);
    }

    pub fn clear_cart(&self) {
        self.replace(CartSelection::default());
    }

    fn replace(&self, selection: CartSelection) {
        *acquire_write_lock(&self.selection) = selection.clone();
        self.changes.send_replace(selection);
    }
}

impl Default for Cart {
    fn default() -> Self {
        Self::new()
    }
}
