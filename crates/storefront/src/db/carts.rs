//! `PostgreSQL` implementation of the remote cart store.
//!
//! Queries are checked at runtime (`sqlx::query*` functions) so the crate
//! builds without a live database.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::instrument;

use grocer_core::{CartId, CartLineItem, IdentityId, Price, ProductId};

use super::RepositoryError;
use crate::remote::{RemoteCartStore, RemoteError};

/// Remote cart store backed by the `storefront` schema.
#[derive(Clone)]
pub struct PgCartStore {
    pool: PgPool,
}

impl PgCartStore {
    /// Create a new cart store.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Cart line joined with product display fields.
#[derive(sqlx::FromRow)]
struct CartItemRow {
    product_id: String,
    quantity: i32,
    name: String,
    unit_label: Option<String>,
    image_ref: Option<String>,
    price: Decimal,
}

impl TryFrom<CartItemRow> for CartLineItem {
    type Error = RepositoryError;

    fn try_from(row: CartItemRow) -> Result<Self, Self::Error> {
        let product_id = ProductId::parse(&row.product_id).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid product id in database: {e}"))
        })?;
        let quantity = u32::try_from(row.quantity)
            .ok()
            .filter(|q| *q > 0)
            .ok_or_else(|| {
                RepositoryError::DataCorruption(format!(
                    "invalid quantity {} for product {product_id}",
                    row.quantity
                ))
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
            quantity,
        })
    }
}

fn db_quantity(quantity: u32) -> Result<i32, RepositoryError> {
    i32::try_from(quantity)
        .map_err(|_| RepositoryError::InvalidInput(format!("quantity {quantity} out of range")))
}

#[async_trait]
impl RemoteCartStore for PgCartStore {
    #[instrument(skip(self))]
    async fn find_cart_by_owner(&self, owner: IdentityId) -> Result<Option<CartId>, RemoteError> {
        let cart_id = sqlx::query_scalar::<_, CartId>(
            "SELECT id FROM storefront.cart WHERE owner_id = $1",
        )
        .bind(owner)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(cart_id)
    }

    #[instrument(skip(self))]
    async fn create_cart(&self, owner: IdentityId) -> Result<CartId, RemoteError> {
        // A concurrent create for the same owner resolves to the existing row.
        let cart_id = sqlx::query_scalar::<_, CartId>(
            r"
            INSERT INTO storefront.cart (owner_id)
            VALUES ($1)
            ON CONFLICT (owner_id) DO UPDATE SET owner_id = EXCLUDED.owner_id
            RETURNING id
            ",
        )
        .bind(owner)
        .fetch_one(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(cart_id)
    }

    #[instrument(skip(self))]
    async fn list_items(&self, cart_id: CartId) -> Result<Vec<CartLineItem>, RemoteError> {
        let rows = sqlx::query_as::<_, CartItemRow>(
            r"
            SELECT ci.product_id, ci.quantity, p.name, p.unit_label, p.image_ref, p.price
            FROM storefront.cart_item ci
            JOIN storefront.product p ON p.id = ci.product_id
            WHERE ci.cart_id = $1
            ORDER BY ci.created_at, ci.product_id
            ",
        )
        .bind(cart_id)
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        let items = rows
            .into_iter()
            .map(CartLineItem::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    #[instrument(skip(self, product_id), fields(product_id = %product_id))]
    async fn upsert_item(
        &self,
        cart_id: CartId,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<(), RemoteError> {
        sqlx::query(
            r"
            INSERT INTO storefront.cart_item (cart_id, product_id, quantity)
            VALUES ($1, $2, $3)
            ON CONFLICT (cart_id, product_id)
            DO UPDATE SET quantity = EXCLUDED.quantity, updated_at = now()
            ",
        )
        .bind(cart_id)
        .bind(product_id.as_str())
        .bind(db_quantity(quantity)?)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(())
    }

    #[instrument(skip(self, product_id), fields(product_id = %product_id))]
    async fn delete_item(
        &self,
        cart_id: CartId,
        product_id: &ProductId,
    ) -> Result<(), RemoteError> {
        sqlx::query("DELETE FROM storefront.cart_item WHERE cart_id = $1 AND product_id = $2")
            .bind(cart_id)
            .bind(product_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_all_items(&self, cart_id: CartId) -> Result<(), RemoteError> {
        sqlx::query("DELETE FROM storefront.cart_item WHERE cart_id = $1")
            .bind(cart_id)
            .execute(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn row(quantity: i32, price: Decimal) -> CartItemRow {
        CartItemRow {
            product_id: "P1".to_owned(),
            quantity,
            name: "Oat milk".to_owned(),
            unit_label: Some("1 l".to_owned()),
            image_ref: None,
            price,
        }
    }

    #[test]
    fn test_row_conversion() {
        let item = CartLineItem::try_from(row(2, Decimal::new(199, 2))).unwrap();
        assert_eq!(item.product_id.as_str(), "P1");
        assert_eq!(item.quantity, 2);
        assert_eq!(item.unit_price.amount(), Decimal::new(199, 2));
    }

    #[test]
    fn test_row_with_bad_quantity_is_corrupt() {
        assert!(matches!(
            CartLineItem::try_from(row(0, Decimal::ONE)),
            Err(RepositoryError::DataCorruption(_))
        ));
        assert!(matches!(
            CartLineItem::try_from(row(-3, Decimal::ONE)),
            Err(RepositoryError::DataCorruption(_))
        ));
    }

    #[test]
    fn test_row_with_negative_price_is_corrupt() {
        assert!(matches!(
            CartLineItem::try_from(row(1, Decimal::new(-1, 0))),
            Err(RepositoryError::DataCorruption(_))
        ));
    }

    #[test]
    fn test_db_quantity_range() {
        assert_eq!(db_quantity(5).unwrap(), 5);
        assert!(db_quantity(u32::MAX).is_err());
    }
}
