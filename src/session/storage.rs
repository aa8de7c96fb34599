//! Session storage adapters
//!
//! The session manager never decides how long a session survives; it is
//! handed one of these. `MemoryStorage` is the per-tab default: the session
//! survives a reload of the same client instance and dies with it.

use keyring::Entry;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tracing::debug;

use crate::config::StorageMode;
use crate::error::{StoreError, StoreResult};
use crate::locks::{acquire_read_lock, acquire_write_lock};
use crate::models::Principal;

const SERVICE_NAME: &str = "com.licensehub.client";
const KEYRING_ACCOUNT: &str = "auth-storage";
const PROVIDER_KEYRING_ACCOUNT: &str = "provider-session";

/// Which record an adapter holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageSlot {
    /// Backend principal and session token
    Session,
    /// Identity provider access token
    Provider,
}

impl StorageSlot {
    fn file_name(&self) -> &'static str {
        match self {
            Self::Session => "session.json",
            Self::Provider => "provider.json",
        }
    }

    fn keyring_account(&self) -> &'static str {
        match self {
            Self::Session => KEYRING_ACCOUNT,
            Self::Provider => PROVIDER_KEYRING_ACCOUNT,
        }
    }
}

/// What gets written to storage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSession {
    pub principal: Option<Principal>,
    pub token: Option<String>,
}

pub trait SessionStorage: Send + Sync {
    fn load(&self) -> StoreResult<Option<PersistedSession>>;
    fn save(&self, session: &PersistedSession) -> StoreResult<()>;
    fn clear(&self) -> StoreResult<()>;

    /// Short name for logs
    fn kind(&self) -> &'static str;
}

/// Build the adapter named by the config for one slot
pub fn from_mode(mode: StorageMode, slot: StorageSlot) -> StoreResult<Arc<dyn SessionStorage>> {
    Ok(match mode {
        StorageMode::Memory => Arc::new(MemoryStorage::new()),
        StorageMode::File => Arc::new(FileStorage::default_location(slot)?),
        StorageMode::Keyring => Arc::new(KeyringStorage::with_account(slot.keyring_account())),
        StorageMode::None => Arc::new(NullStorage),
    })
}

/// Per-tab, non-durable storage
#[derive(Default)]
pub struct MemoryStorage {
    slot: RwLock<Option<String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStorage for MemoryStorage {
    fn load(&self) -> StoreResult<Option<PersistedSession>> {
        let slot = acquire_read_lock(&self.slot);
        slot.as_deref()
            .map(|raw| serde_json::from_str(raw).map_err(|e| StoreError::Storage(e.to_string())))
            .transpose()
    }

    fn save(&self, session: &PersistedSession) -> StoreResult<()> {
        let raw = serde_json::to_string(session).map_err(|e| StoreError::Storage(e.to_string()))?;
        *acquire_write_lock(&self.slot) = Some(raw);
        Ok(())
    }

    fn clear(&self) -> StoreResult<()> {
        *acquire_write_lock(&self.slot) = None;
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}

/// Durable JSON file
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/.config/licensehub/<slot>.json`
    pub fn default_location(slot: StorageSlot) -> StoreResult<Self> {
        dirs::config_dir()
            .map(|d| Self::new(d.join("licensehub").join(slot.file_name())))
            .ok_or_else(|| StoreError::Storage("Could not determine config directory".to_string()))
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl SessionStorage for FileStorage {
    fn load(&self) -> StoreResult<Option<PersistedSession>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)
            .map_err(|e| StoreError::Storage(format!("Failed to read session: {}", e)))?;
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| StoreError::Storage(format!("Corrupt session file: {}", e)))
    }

    fn save(&self, session: &PersistedSession) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| StoreError::Storage(format!("Failed to create config directory: {}", e)))?;
        }
        let raw = serde_json::to_string_pretty(session)
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        fs::write(&self.path, raw)
            .map_err(|e| StoreError::Storage(format!("Failed to write session: {}", e)))?;
        debug!(path = ?self.path, "Saved session file");
        Ok(())
    }

    fn clear(&self) -> StoreResult<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)
                .map_err(|e| StoreError::Storage(format!("Failed to delete session file: {}", e)))?;
        }
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "file"
    }
}

/// OS keychain (macOS Keychain, Windows Credential Manager, Secret Service)
pub struct KeyringStorage {
    account: String,
}

impl KeyringStorage {
    pub fn new() -> Self {
        Self::with_account(KEYRING_ACCOUNT)
    }

    pub fn with_account(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
        }
    }

    fn entry(&self) -> StoreResult<Entry> {
        Entry::new(SERVICE_NAME, &self.account)
            .map_err(|e| StoreError::Storage(format!("Keychain unavailable: {}", e)))
    }
}

impl Default for KeyringStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStorage for KeyringStorage {
    fn load(&self) -> StoreResult<Option<PersistedSession>> {
        match self.entry()?.get_password() {
            Ok(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| StoreError::Storage(format!("Corrupt keychain entry: {}", e))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(StoreError::Storage(e.to_string())),
        }
    }

    fn save(&self, session: &PersistedSession) -> StoreResult<()> {
        let raw = serde_json::to_string(session).map_err(|e| StoreError::Storage(e.to_string()))?;
        self.entry()?
            .set_password(&raw)
            .map_err(|e| StoreError::Storage(e.to_string()))
    }

    fn clear(&self) -> StoreResult<()> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(StoreError::Storage(e.to_string())),
        }
    }

    fn kind(&self) -> &'static str {
        "keyring"
    }
}

/// Keeps nothing
pub struct NullStorage;

impl SessionStorage for NullStorage {
    fn load(&self) -> StoreResult<Option<PersistedSession>> {
        Ok(None)
    }

    fn save(&self, _session: &PersistedSession) -> StoreResult<()> {
        Ok(())
    }

    fn clear(&self) -> StoreResult<()> {
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "none"
    }
}
