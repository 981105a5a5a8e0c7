//! Cart inspection and editing.
//!
//! Runs the storefront cart against real storage so it can be exercised
//! without a browser. Without `--user` the command acts as a guest and uses
//! the device-local cart file; with `--user` it acts as that signed-in
//! shopper and uses the database cart.
//!
//! # Usage
//!
//! ```bash
//! grocer-cli cart show
//! grocer-cli cart add banana --quantity 2
//! grocer-cli cart --user 6f1c... update banana -- -1
//! grocer-cli cart --user 6f1c... clear
//! ```

use std::sync::Arc;

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use grocer_core::{CartIdentity, CartProduct, IdentityId, Price, ProductId, ProductIdError};
use grocer_storefront::CartManager;
use grocer_storefront::config::StorefrontConfig;
use grocer_storefront::db::{self, PgCartStore, ProductRepository, RepositoryError};
use grocer_storefront::identity::{
    AuthError, AuthProvider, HttpAuthProvider, IdentityResolver, LocalAuthProvider,
};
use grocer_storefront::remote::{MemoryCartStore, RemoteCartStore};
use grocer_storefront::storage::{FileStore, LocalCart};

use super::{CommandError, require_database_url};

/// Errors that can occur while running a cart command.
#[derive(Debug, Error)]
pub enum CartCommandError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("Invalid product id: {0}")]
    ProductId(#[from] ProductIdError),

    #[error("Product {0} is not in the catalog; pass --name and --price to add it anyway")]
    UnknownProduct(ProductId),

    #[error(
        "Product {0} is not in the catalog; signed-in carts only hold catalog products, \
         add it with `grocer-cli seed products` first"
    )]
    NotInCatalog(ProductId),

    #[error("Invalid price: {0}")]
    Price(#[from] grocer_core::PriceError),

    #[error("Auth provider error: {0}")]
    Auth(#[from] AuthError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// A cart change requested on the command line.
#[derive(Debug, Clone)]
pub enum CartAction {
    Show,
    Add {
        product_id: String,
        quantity: u32,
        name: Option<String>,
        price: Option<Decimal>,
    },
    Update {
        product_id: String,
        delta: i64,
    },
    Remove {
        product_id: String,
    },
    Clear,
}

/// Run a cart command as a guest (`user` is `None`) or as a signed-in user.
///
/// # Errors
///
/// Returns an error if storage cannot be wired up or the input is invalid.
/// Storage failures during the cart operation itself are logged, not returned.
pub async fn run(
    config: &StorefrontConfig,
    user: Option<Uuid>,
    action: CartAction,
) -> Result<(), CartCommandError> {
    // Signed-in carts live in the database; guests only need it for catalog lookups.
    let database_url = if user.is_some() {
        Some(require_database_url(config)?)
    } else {
        config.database_url.as_ref()
    };
    let pool = match database_url {
        Some(url) => Some(db::create_pool(url).await?),
        None => None,
    };

    let initial = user.map_or(CartIdentity::None, |id| {
        CartIdentity::Authenticated(IdentityId::new(id))
    });

    let remote: Arc<dyn RemoteCartStore> = match &pool {
        Some(pool) => Arc::new(PgCartStore::new(pool.clone())),
        None => Arc::new(MemoryCartStore::new()),
    };

    let auth: Arc<dyn AuthProvider> = match &config.auth {
        Some(auth) => Arc::new(HttpAuthProvider::new(auth)?),
        None => Arc::new(LocalAuthProvider),
    };

    let local = LocalCart::new(
        Arc::new(FileStore::new(&config.cart.storage_dir)),
        config.cart.storage_key.clone(),
    );
    let identity = IdentityResolver::new(auth, initial);
    let cart = CartManager::new(local, remote, identity, config.cart.quiet_period);
    cart.initialize().await;

    match action {
        CartAction::Show => {}
        CartAction::Add {
            product_id,
            quantity,
            name,
            price,
        } => {
            let product_id = ProductId::parse(&product_id)?;
            let product =
                resolve_product(pool.as_ref(), product_id, name, price, user.is_some()).await?;
            add_to_cart(&cart, product, quantity, config.auth.is_some());
        }
        CartAction::Update { product_id, delta } => {
            cart.update_quantity(&ProductId::parse(&product_id)?, delta);
        }
        CartAction::Remove { product_id } => {
            cart.remove_item(&ProductId::parse(&product_id)?);
        }
        CartAction::Clear => cart.clear(),
    }

    cart.close().await;
    print_cart(&cart);
    Ok(())
}

async fn resolve_product(
    pool: Option<&sqlx::PgPool>,
    product_id: ProductId,
    name: Option<String>,
    price: Option<Decimal>,
    signed_in: bool,
) -> Result<CartProduct, CartCommandError> {
    if let Some(pool) = pool {
        if let Some(product) = ProductRepository::new(pool).find(&product_id).await? {
            return Ok(product);
        }
    }

    ad_hoc_product(product_id, name, price, signed_in)
}

/// Build a product missing from the catalog from `--name` and `--price`.
///
/// Only guest carts accept these: a database cart line must reference a
/// catalog row.
fn ad_hoc_product(
    product_id: ProductId,
    name: Option<String>,
    price: Option<Decimal>,
    signed_in: bool,
) -> Result<CartProduct, CartCommandError> {
    if signed_in {
        return Err(CartCommandError::NotInCatalog(product_id));
    }

    match (name, price) {
        (Some(name), Some(price)) => Ok(CartProduct {
            product_id,
            name,
            unit_label: None,
            image_ref: None,
            unit_price: Price::from_amount(price)?,
        }),
        _ => Err(CartCommandError::UnknownProduct(product_id)),
    }
}

/// Add to the cart, minting an anonymous identity first when an auth
/// provider is configured. A locally minted identity would not outlive the
/// command, so without one the guest stays identity-less.
fn add_to_cart(cart: &CartManager, product: CartProduct, quantity: u32, mint_identity: bool) {
    if mint_identity {
        cart.add_item_with_identity(product, quantity);
    } else {
        cart.add_item(product, quantity);
    }
}

fn print_cart(cart: &CartManager) {
    let items = cart.items();
    match cart.identity() {
        CartIdentity::None => info!("Guest cart"),
        CartIdentity::Anonymous(id) => info!("Guest cart (anonymous identity {id})"),
        CartIdentity::Authenticated(id) => info!("Cart for {id}"),
    }

    if items.is_empty() {
        info!("  (empty)");
        return;
    }
    for line in &items {
        info!(
            "  {:>3} x {} [{}] @ {} = {}",
            line.quantity,
            line.name,
            line.product_id,
            line.unit_price,
            line.line_total()
        );
    }
    info!("  {} items, subtotal {}", cart.item_count(), cart.subtotal());

    if cart.has_pending_changes() {
        warn!("Some changes were not saved remotely");
    }
}
