//! On-device cart persistence for guest visitors.
//!
//! The whole cart is stored as one JSON blob under a fixed key. Every change
//! overwrites the blob; clearing the cart deletes it so "empty cart" and
//! "no cart yet" stay distinguishable.
//!
//! Storage failures never reach callers of [`LocalCart`]: unreadable or
//! corrupt blobs load as an empty cart and failed writes are logged.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use grocer_core::{CartLineItem, ProductId};

/// Default storage key for the cart blob.
pub const CART_STORAGE_KEY: &str = "cart";

/// Errors raised by a [`LocalStore`] backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Underlying I/O failed.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Blob could not be encoded or decoded.
    #[error("storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Key contains characters the backend cannot store.
    #[error("invalid storage key: {0}")]
    InvalidKey(String),

    /// Backend is not available (e.g., disabled storage).
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Synchronous key/value blob storage on the device.
pub trait LocalStore: Send + Sync {
    /// Read the blob stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Replace the blob stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn set(&self, key: &str, blob: &str) -> Result<(), StorageError>;

    /// Delete the blob stored under `key`. Missing keys are not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Cart view over a [`LocalStore`].
#[derive(Clone)]
pub struct LocalCart {
    store: Arc<dyn LocalStore>,
    key: String,
}

impl LocalCart {
    /// Create a local cart adapter storing under `key`.
    #[must_use]
    pub fn new(store: Arc<dyn LocalStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    /// The storage key in use.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Load the stored cart.
    ///
    /// Missing, unreadable, or corrupt blobs load as an empty cart.
    #[must_use]
    pub fn load(&self) -> Vec<CartLineItem> {
        let blob = match self.store.get(&self.key) {
            Ok(Some(blob)) => blob,
            Ok(None) => {
                debug!(key = %self.key, "No stored cart");
                return Vec::new();
            }
            Err(e) => {
                warn!(key = %self.key, error = %e, "Failed to read stored cart, starting empty");
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<CartLineItem>>(&blob) {
            Ok(items) => normalize(items),
            Err(e) => {
                warn!(key = %self.key, error = %e, "Stored cart is corrupt, starting empty");
                Vec::new()
            }
        }
    }

    /// Overwrite the stored cart with `items`.
    pub fn save(&self, items: &[CartLineItem]) {
        let result = serde_json::to_string(items)
            .map_err(StorageError::from)
            .and_then(|blob| self.store.set(&self.key, &blob));

        if let Err(e) = result {
            warn!(key = %self.key, error = %e, "Failed to persist cart");
        }
    }

    /// Delete the stored cart.
    pub fn clear(&self) {
        if let Err(e) = self.store.remove(&self.key) {
            warn!(key = %self.key, error = %e, "Failed to delete stored cart");
        }
    }
}

/// Restore cart invariants on data read from storage: one line per product
/// (quantities of duplicates are summed) and no zero-quantity lines.
fn normalize(items: Vec<CartLineItem>) -> Vec<CartLineItem> {
    let mut positions: HashMap<ProductId, usize> = HashMap::with_capacity(items.len());
    let mut out: Vec<CartLineItem> = Vec::with_capacity(items.len());

    for item in items {
        if item.quantity == 0 {
            continue;
        }
        if let Some(existing) = positions
            .get(&item.product_id)
            .and_then(|&index| out.get_mut(index))
        {
            existing.quantity = existing.quantity.saturating_add(item.quantity);
            continue;
        }
        positions.insert(item.product_id.clone(), out.len());
        out.push(item);
    }

    out
}
