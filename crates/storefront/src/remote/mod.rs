//! Remote cart record store.
//!
//! Authenticated carts live in a hosted record store as one `cart` row per
//! owner plus `cart_item` rows keyed by `(cart_id, product_id)`. This module
//! defines the operations the cart needs from that store; [`PgCartStore`]
//! talks to Postgres and [`MemoryCartStore`] keeps records in memory.
//!
//! [`PgCartStore`]: crate::db::PgCartStore

mod memory;

pub use memory::{MemoryCartStore, RemoteCall};

use async_trait::async_trait;
use thiserror::Error;

use grocer_core::{CartId, CartLineItem, IdentityId, ProductId};

use crate::db::RepositoryError;

/// Errors raised by a [`RemoteCartStore`].
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Database operation failed.
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Referenced cart does not exist.
    #[error("cart not found: {0}")]
    CartNotFound(CartId),

    /// Store could not be reached or refused the request.
    #[error("remote store unavailable: {0}")]
    Unavailable(String),
}

/// Record operations on the remote cart store.
///
/// Writes are idempotent: `upsert_item` always sets the absolute quantity and
/// deleting a missing row succeeds.
#[async_trait]
pub trait RemoteCartStore: Send + Sync {
    /// Find the cart owned by `owner`.
    async fn find_cart_by_owner(&self, owner: IdentityId) -> Result<Option<CartId>, RemoteError>;

    /// Create a cart for `owner`. Returns the existing cart if one appeared concurrently.
    async fn create_cart(&self, owner: IdentityId) -> Result<CartId, RemoteError>;

    /// List cart lines joined with product display fields.
    async fn list_items(&self, cart_id: CartId) -> Result<Vec<CartLineItem>, RemoteError>;

    /// Insert or update the `(cart_id, product_id)` row. `quantity` is at least 1.
    async fn upsert_item(
        &self,
        cart_id: CartId,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<(), RemoteError>;

    /// Delete the `(cart_id, product_id)` row.
    async fn delete_item(&self, cart_id: CartId, product_id: &ProductId)
    -> Result<(), RemoteError>;

    /// Delete every row of the cart.
    async fn delete_all_items(&self, cart_id: CartId) -> Result<(), RemoteError>;
}

/// Find the owner's cart, creating it if absent.
///
/// # Errors
///
/// Returns the first store error encountered.
pub async fn resolve_cart(
    store: &dyn RemoteCartStore,
    owner: IdentityId,
) -> Result<CartId, RemoteError> {
    if let Some(cart_id) = store.find_cart_by_owner(owner).await? {
        return Ok(cart_id);
    }
    let cart_id = store.create_cart(owner).await?;
    tracing::info!(%owner, %cart_id, "Created remote cart");
    Ok(cart_id)
}
