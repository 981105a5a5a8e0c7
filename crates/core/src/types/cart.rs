//! Cart line items and visitor identity.

use serde::{Deserialize, Serialize};

use super::id::{IdentityId, ProductId};
use super::price::{CurrencyCode, Price};

/// Product data captured when it is put into a cart.
///
/// Display fields are informational only; identity is the `product_id` and
/// pricing is the `unit_price` snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartProduct {
    pub product_id: ProductId,
    pub name: String,
    /// Package size shown next to the name (e.g., "500 g").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
    pub unit_price: Price,
}

/// A single cart line.
///
/// `quantity` is at least 1 while the line exists; a line whose quantity
/// drops to zero is removed rather than stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineItem {
    pub product_id: ProductId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
    pub unit_price: Price,
    pub quantity: u32,
}

impl CartLineItem {
    /// Build a line for `quantity` units of `product`.
    #[must_use]
    pub fn new(product: CartProduct, quantity: u32) -> Self {
        Self {
            product_id: product.product_id,
            name: product.name,
            unit_label: product.unit_label,
            image_ref: product.image_ref,
            unit_price: product.unit_price,
            quantity,
        }
    }

    /// Unit price times quantity.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.unit_price.times(self.quantity)
    }
}

/// Sum of line totals.
///
/// Lines in a currency other than the first line's are skipped; carts are
/// single-currency in practice.
#[must_use]
pub fn subtotal(items: &[CartLineItem]) -> Price {
    let currency = items
        .first()
        .map_or_else(CurrencyCode::default, |item| item.unit_price.currency_code());

    items
        .iter()
        .map(CartLineItem::line_total)
        .fold(Price::zero(currency), |acc, line| {
            acc.checked_add(&line).unwrap_or(acc)
        })
}

/// Who the current visitor is, as far as the cart is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum CartIdentity {
    /// No identity established yet.
    #[default]
    None,
    /// Device-bound identity without credentials.
    Anonymous(IdentityId),
    /// Signed-in identity.
    Authenticated(IdentityId),
}

impl CartIdentity {
    /// The identity ID, if any.
    #[must_use]
    pub const fn owner(&self) -> Option<IdentityId> {
        match self {
            Self::None => None,
            Self::Anonymous(id) | Self::Authenticated(id) => Some(*id),
        }
    }

    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    /// Where a cart for this identity lives.
    #[must_use]
    pub const fn backend(&self) -> CartBackend {
        match self {
            Self::None | Self::Anonymous(_) => CartBackend::Local,
            Self::Authenticated(id) => CartBackend::Remote(*id),
        }
    }
}

/// Persistence backend selected by a [`CartIdentity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CartBackend {
    /// On-device storage (guest carts).
    Local,
    /// Remote record store, keyed by owner.
    Remote(IdentityId),
}

/// Lifecycle of the cart state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CartStatus {
    #[default]
    Uninitialized,
    Loading,
    Ready,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    fn product(id: &str, cents: i64) -> CartProduct {
        CartProduct {
            product_id: ProductId::parse(id).unwrap(),
            name: format!("Product {id}"),
            unit_label: Some("1 kg".to_owned()),
            image_ref: None,
            unit_price: Price::from_amount(Decimal::new(cents, 2)).unwrap(),
        }
    }

    #[test]
    fn test_line_item_serializes_camel_case() {
        let item = CartLineItem::new(product("P1", 100), 2);
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["productId"], "P1");
        assert_eq!(json["unitLabel"], "1 kg");
        assert_eq!(json["quantity"], 2);
        assert!(json.get("imageRef").is_none());
    }

    #[test]
    fn test_subtotal_sums_line_totals() {
        let items = vec![
            CartLineItem::new(product("P1", 150), 2),
            CartLineItem::new(product("P2", 99), 1),
        ];
        assert_eq!(subtotal(&items).amount(), Decimal::new(399, 2));
        assert_eq!(subtotal(&[]).amount(), Decimal::ZERO);
    }

    #[test]
    fn test_identity_backend() {
        let id = IdentityId::new_random();
        assert_eq!(CartIdentity::None.backend(), CartBackend::Local);
        assert_eq!(CartIdentity::Anonymous(id).backend(), CartBackend::Local);
        assert_eq!(
            CartIdentity::Authenticated(id).backend(),
            CartBackend::Remote(id)
        );
        assert_eq!(CartIdentity::None.owner(), None);
        assert_eq!(CartIdentity::Anonymous(id).owner(), Some(id));
    }
}
