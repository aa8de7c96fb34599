//! Entity caches
//!
//! Each cache is a `Collection<T>` that is replaced wholesale by `fetch_all`.
//! Mutations call the backend and leave reconciliation to the caller's next
//! fetch, except for the optimistic status patches used by moderation.

pub mod balance;
pub mod licenses;
pub mod orders;
pub mod products;

pub use balance::{BalanceRequestCache, BalanceSummary, TopUpForm};
pub use licenses::{generate_license_key, parse_bulk_keys, KeyBatch, LicenseCache, StockSummary};
pub use orders::{ManualOrder, OrderCache, OrderCounts, WalletOrder};
pub use products::{ProductCache, ProductDraft};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;
use tokio::sync::watch;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::inflight::{InFlight, InFlightGuard};
use crate::locks::{acquire_read_lock, acquire_write_lock};
use crate::models::{BalanceRequest, License, Order, Product};

/// Whose rows a list call returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Mine,
    /// Admin listing across all users
    All,
}

/// Anything cached by id
pub trait Keyed {
    fn key(&self) -> &str;
}

impl Keyed for Product {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for License {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for Order {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for BalanceRequest {
    fn key(&self) -> &str {
        &self.id
    }
}

/// Key a create is tracked under; it has no id yet
pub(crate) const NEW_ITEM: &str = "new";

/// Ordered collection with a loading flag and change notifications
pub struct Collection<T> {
    kind: &'static str,
    items: RwLock<Vec<T>>,
    /// Outstanding bulk fetches; overlapping calls are allowed
    loading: AtomicUsize,
    /// Outstanding mutations by row id. Never raises `loading`.
    saving: InFlight,
    version: watch::Sender<u64>,
}

impl<T: Keyed + Clone> Collection<T> {
    pub fn new(kind: &'static str) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            kind,
            items: RwLock::new(Vec::new()),
            loading: AtomicUsize::new(0),
            saving: InFlight::new(),
            version,
        }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn all(&self) -> Vec<T> {
        acquire_read_lock(&self.items).clone()
    }

    pub fn len(&self) -> usize {
        acquire_read_lock(&self.items).len()
    }

    pub fn is_empty(&self) -> bool {
        acquire_read_lock(&self.items).is_empty()
    }

    pub fn get(&self, id: &str) -> Option<T> {
        acquire_read_lock(&self.items)
            .iter()
            .find(|item| item.key() == id)
            .cloned()
    }

    /// Like `get`, but a missing id is a `StaleReference`
    pub fn require(&self, id: &str) -> StoreResult<T> {
        self.get(id).ok_or_else(|| StoreError::StaleReference {
            kind: self.kind,
            id: id.to_string(),
        })
    }

    pub fn filter<F>(&self, predicate: F) -> Vec<T>
    where
        F: Fn(&T) -> bool,
    {
        acquire_read_lock(&self.items)
            .iter()
            .filter(|item| predicate(item))
            .cloned()
            .collect()
    }

    /// Bumped on every change
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire) > 0
    }

    /// Raise the loading flag until the guard drops
    pub(crate) fn begin_load(&self) -> LoadGuard<'_> {
        self.loading.fetch_add(1, Ordering::AcqRel);
        LoadGuard {
            loading: &self.loading,
        }
    }

    /// Any create/update/delete outstanding
    pub fn is_saving(&self) -> bool {
        self.saving.any()
    }

    pub fn is_saving_id(&self, id: &str) -> bool {
        self.saving.is_busy(id)
    }

    /// Mark one row (or `NEW_ITEM`) as being saved. A second save of the
    /// same key while the first is outstanding is refused.
    pub(crate) fn begin_save(&self, id: &str) -> StoreResult<InFlightGuard<'_>> {
        self.saving.begin(id).ok_or_else(|| {
            StoreError::validation(format!("This {} is already being saved.", self.kind))
        })
    }

    fn bump(&self) {
        self.version.send_modify(|v| *v += 1);
    }

    /// Replace everything; no merge with what was there
    pub fn replace_all(&self, items: Vec<T>) {
        debug!(kind = self.kind, count = items.len(), "Cache replaced");
        *acquire_write_lock(&self.items) = items;
        self.bump();
    }

    /// Edit one cached row in place. Returns the row after the edit.
    pub fn patch<F>(&self, id: &str, f: F) -> Option<T>
    where
        F: FnOnce(&mut T),
    {
        let updated = {
            let mut items = acquire_write_lock(&self.items);
            let item = items.iter_mut().find(|item| item.key() == id)?;
            f(item);
            item.clone()
        };
        self.bump();
        Some(updated)
    }
}

/// Lowers the loading flag on every exit path
pub(crate) struct LoadGuard<'a> {
    loading: &'a AtomicUsize,
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        self.loading.fetch_sub(1, Ordering::AcqRel);
    }
}
