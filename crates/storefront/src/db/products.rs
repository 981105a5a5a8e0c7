//! Product catalog repository.
//!
//! The cart only reads products through the `cart_item` join; this
//! repository exists so catalogs can be loaded (see `grocer-cli seed`).

use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::instrument;

use grocer_core::{CartProduct, Price, ProductId};

use super::RepositoryError;

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: String,
    name: String,
    unit_label: Option<String>,
    image_ref: Option<String>,
    price: Decimal,
}

impl TryFrom<ProductRow> for CartProduct {
    type Error = RepositoryError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        let product_id = ProductId::parse(&row.id).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid product id in database: {e}"))
        })?;
        let unit_price = Price::from_amount(row.price).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid price for product {product_id}: {e}"))
        })?;
        Ok(Self {
            product_id,
            name: row.name,
            unit_label: row.unit_label,
            image_ref: row.image_ref,
            unit_price,
        })
    }
}

/// Repository for catalog products.
pub struct ProductRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProductRepository<'a> {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert a product, or update its display fields and price if it exists.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self, product), fields(product_id = %product.product_id))]
    pub async fn upsert(&self, product: &CartProduct) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO storefront.product (id, name, unit_label, image_ref, price)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name,
                unit_label = EXCLUDED.unit_label,
                image_ref = EXCLUDED.image_ref,
                price = EXCLUDED.price,
                updated_at = now()
            ",
        )
        .bind(product.product_id.as_str())
        .bind(&product.name)
        .bind(product.unit_label.as_deref())
        .bind(product.image_ref.as_deref())
        .bind(product.unit_price.amount())
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Look up a catalog product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails, or
    /// `RepositoryError::DataCorruption` if the stored row is invalid.
    #[instrument(skip(self, product_id), fields(product_id = %product_id))]
    pub async fn find(&self, product_id: &ProductId) -> Result<Option<CartProduct>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(
            r"
            SELECT id, name, unit_label, image_ref, price
            FROM storefront.product
            WHERE id = $1
            ",
        )
        .bind(product_id.as_str())
        .fetch_optional(self.pool)
        .await?;

        row.map(CartProduct::try_from).transpose()
    }

    /// Number of products in the catalog.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count(&self) -> Result<i64, RepositoryError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM storefront.product")
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }
}
