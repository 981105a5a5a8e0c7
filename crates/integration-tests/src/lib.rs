//! Integration test support for Grocer cart synchronization.
//!
//! Wires a [`CartManager`] to in-memory device storage, an in-memory remote
//! store, and a local identity provider, so whole-cart behavior can be tested
//! without a database.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p grocer-integration-tests
//! ```
//!
//! Tests run on a paused Tokio clock (`start_paused = true`); sleeping past
//! the quiet period is instant.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;

use grocer_core::{
    CartId, CartIdentity, CartLineItem, CartProduct, IdentityId, Price, ProductId,
};
use grocer_storefront::CartManager;
use grocer_storefront::identity::{AuthError, AuthProvider, IdentityResolver, LocalAuthProvider};
use grocer_storefront::remote::{MemoryCartStore, RemoteCartStore, RemoteError};
use grocer_storefront::storage::{CART_STORAGE_KEY, LocalCart, LocalStore, MemoryStore};

/// Quiet period used by test carts.
pub const QUIET_PERIOD: Duration = Duration::from_millis(500);

/// Parse a product id.
#[must_use]
pub fn pid(id: &str) -> ProductId {
    ProductId::parse(id).unwrap()
}

/// Catalog product priced in cents.
#[must_use]
pub fn product(id: &str, cents: i64) -> CartProduct {
    CartProduct {
        product_id: pid(id),
        name: format!("Product {id}"),
        unit_label: Some("each".to_owned()),
        image_ref: None,
        unit_price: Price::from_amount(Decimal::new(cents, 2)).unwrap(),
    }
}

/// `(product id, quantity)` pairs for compact assertions.
#[must_use]
pub fn quantities(items: &[CartLineItem]) -> Vec<(String, u32)> {
    items
        .iter()
        .map(|line| (line.product_id.to_string(), line.quantity))
        .collect()
}

/// Auth provider whose mints always fail.
#[derive(Debug, Clone, Copy, Default)]
pub struct RejectingAuthProvider;

#[async_trait]
impl AuthProvider for RejectingAuthProvider {
    async fn mint_anonymous(&self) -> Result<IdentityId, AuthError> {
        Err(AuthError::Rejected {
            status: 503,
            body: "signups disabled".to_owned(),
        })
    }
}

/// Remote store whose item upserts take `delay` to complete.
pub struct SlowUpsertStore {
    inner: Arc<MemoryCartStore>,
    delay: Duration,
}

#[async_trait]
impl RemoteCartStore for SlowUpsertStore {
    async fn find_cart_by_owner(&self, owner: IdentityId) -> Result<Option<CartId>, RemoteError> {
        self.inner.find_cart_by_owner(owner).await
    }

    async fn create_cart(&self, owner: IdentityId) -> Result<CartId, RemoteError> {
        self.inner.create_cart(owner).await
    }

    async fn list_items(&self, cart_id: CartId) -> Result<Vec<CartLineItem>, RemoteError> {
        self.inner.list_items(cart_id).await
    }

    async fn upsert_item(
        &self,
        cart_id: CartId,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<(), RemoteError> {
        tokio::time::sleep(self.delay).await;
        self.inner.upsert_item(cart_id, product_id, quantity).await
    }

    async fn delete_item(
        &self,
        cart_id: CartId,
        product_id: &ProductId,
    ) -> Result<(), RemoteError> {
        self.inner.delete_item(cart_id, product_id).await
    }

    async fn delete_all_items(&self, cart_id: CartId) -> Result<(), RemoteError> {
        self.inner.delete_all_items(cart_id).await
    }
}

/// A cart with inspectable storage.
pub struct TestCart {
    pub device: Arc<MemoryStore>,
    pub remote: Arc<MemoryCartStore>,
    pub identity: IdentityResolver,
    pub cart: CartManager,
}

impl TestCart {
    /// Uninitialized cart for `identity`.
    #[must_use]
    pub fn new(identity: CartIdentity) -> Self {
        Self::with_auth(identity, Arc::new(LocalAuthProvider))
    }

    /// Uninitialized cart for `identity` minting through `auth`.
    #[must_use]
    pub fn with_auth(identity: CartIdentity, auth: Arc<dyn AuthProvider>) -> Self {
        let remote = Arc::new(MemoryCartStore::new());
        Self::build(identity, auth, remote.clone(), remote)
    }

    /// Uninitialized cart for `identity` whose remote upserts each take `delay`.
    #[must_use]
    pub fn with_slow_upserts(identity: CartIdentity, delay: Duration) -> Self {
        let remote = Arc::new(MemoryCartStore::new());
        let store = Arc::new(SlowUpsertStore {
            inner: remote.clone(),
            delay,
        });
        Self::build(identity, Arc::new(LocalAuthProvider), remote, store)
    }

    fn build(
        identity: CartIdentity,
        auth: Arc<dyn AuthProvider>,
        remote: Arc<MemoryCartStore>,
        store: Arc<dyn RemoteCartStore>,
    ) -> Self {
        let device = Arc::new(MemoryStore::new());
        let identity = IdentityResolver::new(auth, identity);
        let cart = CartManager::new(
            LocalCart::new(device.clone(), CART_STORAGE_KEY),
            store,
            identity.clone(),
            QUIET_PERIOD,
        );
        Self {
            device,
            remote,
            identity,
            cart,
        }
    }

    /// Initialized guest cart.
    pub async fn guest() -> Self {
        let test = Self::new(CartIdentity::None);
        test.cart.initialize().await;
        test
    }

    /// Initialized cart for a signed-in user.
    pub async fn signed_in(user: IdentityId) -> Self {
        let test = Self::new(CartIdentity::Authenticated(user));
        test.cart.initialize().await;
        test
    }

    /// Let background work run until the cart has caught up with the
    /// current identity.
    pub async fn wait_for_identity(&self) {
        for _ in 0..1_000 {
            let current = self.identity.current();
            if self.cart.identity() == current && !self.cart.is_loading() {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("cart never caught up with identity {:?}", self.identity.current());
    }

    /// Let the quiet period elapse and wait for the resulting writes.
    pub async fn sync(&self) {
        tokio::time::sleep(QUIET_PERIOD + Duration::from_millis(1)).await;
        self.cart.settle().await;
    }

    /// Cart lines stored on the device, if any.
    #[must_use]
    pub fn device_items(&self) -> Option<Vec<CartLineItem>> {
        self.device
            .get(CART_STORAGE_KEY)
            .unwrap()
            .map(|blob| serde_json::from_str(&blob).unwrap())
    }
}
