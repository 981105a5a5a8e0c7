//! In-memory [`RemoteCartStore`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use grocer_core::{CartId, CartLineItem, CartProduct, IdentityId, ProductId};

use super::{RemoteCartStore, RemoteError};

/// A call made against a [`MemoryCartStore`], in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    FindCart(IdentityId),
    CreateCart(IdentityId),
    ListItems(CartId),
    Upsert {
        cart_id: CartId,
        product_id: ProductId,
        quantity: u32,
    },
    Delete {
        cart_id: CartId,
        product_id: ProductId,
    },
    DeleteAll(CartId),
}

/// A `cart_item` row. `seq` stands in for `created_at` and survives updates.
#[derive(Debug, Clone, Copy)]
struct ItemRow {
    seq: u64,
    quantity: u32,
}

#[derive(Debug, Default)]
struct Records {
    carts: HashMap<IdentityId, CartId>,
    items: BTreeMap<(CartId, ProductId), ItemRow>,
    next_seq: u64,
    products: HashMap<ProductId, CartProduct>,
    journal: Vec<RemoteCall>,
    failing_products: HashSet<ProductId>,
    reads_fail: bool,
}

impl Records {
    /// Insert or update a row, keeping the position of an existing one.
    fn put(&mut self, cart_id: CartId, product_id: ProductId, quantity: u32) {
        let seq = self.next_seq;
        let row = self
            .items
            .entry((cart_id, product_id))
            .or_insert(ItemRow { seq, quantity });
        if row.seq == seq {
            self.next_seq += 1;
        }
        row.quantity = quantity;
    }

    /// Rows of one cart in insertion order.
    fn cart_rows(&self, cart_id: CartId) -> Vec<(&ProductId, u32)> {
        let mut rows: Vec<(u64, &ProductId, u32)> = self
            .items
            .iter()
            .filter(|((id, _), _)| *id == cart_id)
            .map(|((_, product_id), row)| (row.seq, product_id, row.quantity))
            .collect();
        rows.sort_by_key(|(seq, _, _)| *seq);
        rows.into_iter()
            .map(|(_, product_id, quantity)| (product_id, quantity))
            .collect()
    }
}

/// Record store kept in memory.
///
/// Mirrors the relational layout: carts keyed by owner, items keyed by
/// `(cart_id, product_id)`, and a product catalog joined into `list_items`
/// (lines whose product is missing from the catalog are skipped, as an inner
/// join would). Lines come back in the order they were first inserted. Every call is journaled, and writes for chosen products or
/// all reads can be made to fail.
#[derive(Debug, Default)]
pub struct MemoryCartStore {
    records: Mutex<Records>,
}

impl MemoryCartStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> MutexGuard<'_, Records> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add or replace a catalog product.
    pub fn insert_product(&self, product: CartProduct) {
        self.records()
            .products
            .insert(product.product_id.clone(), product);
    }

    /// Create a cart for `owner` holding the given `(product, quantity)` rows.
    pub fn seed_cart(&self, owner: IdentityId, lines: &[(ProductId, u32)]) -> CartId {
        let mut records = self.records();
        let cart_id = *records
            .carts
            .entry(owner)
            .or_insert_with(CartId::new_random);
        for (product_id, quantity) in lines {
            records.put(cart_id, product_id.clone(), *quantity);
        }
        cart_id
    }

    /// Make writes touching `product_id` fail.
    pub fn fail_writes_for(&self, product_id: ProductId) {
        self.records().failing_products.insert(product_id);
    }

    /// Let writes touching `product_id` succeed again.
    pub fn restore_writes_for(&self, product_id: &ProductId) {
        self.records().failing_products.remove(product_id);
    }

    /// Make every read (`find_cart_by_owner`, `list_items`) fail.
    pub fn set_reads_fail(&self, fail: bool) {
        self.records().reads_fail = fail;
    }

    /// The cart owned by `owner`, if any.
    #[must_use]
    pub fn cart_for(&self, owner: IdentityId) -> Option<CartId> {
        self.records().carts.get(&owner).copied()
    }

    /// Stored quantity for `(cart_id, product_id)`.
    #[must_use]
    pub fn quantity(&self, cart_id: CartId, product_id: &ProductId) -> Option<u32> {
        self.records()
            .items
            .get(&(cart_id, product_id.clone()))
            .map(|row| row.quantity)
    }

    /// All stored rows of a cart, in insertion order.
    #[must_use]
    pub fn rows(&self, cart_id: CartId) -> Vec<(ProductId, u32)> {
        self.records()
            .cart_rows(cart_id)
            .into_iter()
            .map(|(product_id, quantity)| (product_id.clone(), quantity))
            .collect()
    }

    /// Calls made so far.
    #[must_use]
    pub fn journal(&self) -> Vec<RemoteCall> {
        self.records().journal.clone()
    }

    /// Number of calls made so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.records().journal.len()
    }

    /// Upsert calls made so far.
    #[must_use]
    pub fn upserts(&self) -> Vec<RemoteCall> {
        self.records()
            .journal
            .iter()
            .filter(|call| matches!(call, RemoteCall::Upsert { .. }))
            .cloned()
            .collect()
    }
}

fn check_write(records: &Records, product_id: &ProductId) -> Result<(), RemoteError> {
    if records.failing_products.contains(product_id) {
        return Err(RemoteError::Unavailable(format!(
            "write rejected for product {product_id}"
        )));
    }
    Ok(())
}

fn check_read(records: &Records) -> Result<(), RemoteError> {
    if records.reads_fail {
        return Err(RemoteError::Unavailable("reads disabled".to_owned()));
    }
    Ok(())
}

fn check_cart(records: &Records, cart_id: CartId) -> Result<(), RemoteError> {
    if records.carts.values().any(|id| *id == cart_id) {
        Ok(())
    } else {
        Err(RemoteError::CartNotFound(cart_id))
    }
}

#[async_trait]
impl RemoteCartStore for MemoryCartStore {
    async fn find_cart_by_owner(&self, owner: IdentityId) -> Result<Option<CartId>, RemoteError> {
        let mut records = self.records();
        records.journal.push(RemoteCall::FindCart(owner));
        check_read(&records)?;
        Ok(records.carts.get(&owner).copied())
    }

    async fn create_cart(&self, owner: IdentityId) -> Result<CartId, RemoteError> {
        let mut records = self.records();
        records.journal.push(RemoteCall::CreateCart(owner));
        Ok(*records
            .carts
            .entry(owner)
            .or_insert_with(CartId::new_random))
    }

    async fn list_items(&self, cart_id: CartId) -> Result<Vec<CartLineItem>, RemoteError> {
        let mut records = self.records();
        records.journal.push(RemoteCall::ListItems(cart_id));
        check_read(&records)?;
        check_cart(&records, cart_id)?;

        Ok(records
            .cart_rows(cart_id)
            .into_iter()
            .filter_map(|(product_id, quantity)| {
                records
                    .products
                    .get(product_id)
                    .map(|product| CartLineItem::new(product.clone(), quantity))
            })
            .collect())
    }

    async fn upsert_item(
        &self,
        cart_id: CartId,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<(), RemoteError> {
        let mut records = self.records();
        records.journal.push(RemoteCall::Upsert {
            cart_id,
            product_id: product_id.clone(),
            quantity,
        });
        check_write(&records, product_id)?;
        check_cart(&records, cart_id)?;
        records.put(cart_id, product_id.clone(), quantity);
        Ok(())
    }

    async fn delete_item(
        &self,
        cart_id: CartId,
        product_id: &ProductId,
    ) -> Result<(), RemoteError> {
        let mut records = self.records();
        records.journal.push(RemoteCall::Delete {
            cart_id,
            product_id: product_id.clone(),
        });
        check_write(&records, product_id)?;
        records.items.remove(&(cart_id, product_id.clone()));
        Ok(())
    }

    async fn delete_all_items(&self, cart_id: CartId) -> Result<(), RemoteError> {
        let mut records = self.records();
        records.journal.push(RemoteCall::DeleteAll(cart_id));
        records.items.retain(|(id, _), _| *id != cart_id);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use grocer_core::Price;

    use super::*;
    use crate::remote::resolve_cart;

    fn product(id: &str) -> CartProduct {
        CartProduct {
            product_id: ProductId::parse(id).unwrap(),
            name: format!("Product {id}"),
            unit_label: None,
            image_ref: None,
            unit_price: Price::from_amount(Decimal::TEN).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_resolve_cart_creates_once() {
        let store = MemoryCartStore::new();
        let owner = IdentityId::new_random();

        let first = resolve_cart(&store, owner).await.unwrap();
        let second = resolve_cart(&store, owner).await.unwrap();

        assert_eq!(first, second);
        let creates = store
            .journal()
            .into_iter()
            .filter(|c| matches!(c, RemoteCall::CreateCart(_)))
            .count();
        assert_eq!(creates, 1);
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let store = MemoryCartStore::new();
        let p1 = product("P1");
        store.insert_product(p1.clone());
        let cart_id = store.seed_cart(IdentityId::new_random(), &[]);

        store.upsert_item(cart_id, &p1.product_id, 4).await.unwrap();
        let once = store.rows(cart_id);
        store.upsert_item(cart_id, &p1.product_id, 4).await.unwrap();

        assert_eq!(store.rows(cart_id), once);
        assert_eq!(once, vec![(p1.product_id, 4)]);
    }

    #[tokio::test]
    async fn test_list_items_joins_catalog() {
        let store = MemoryCartStore::new();
        let p1 = product("P1");
        store.insert_product(p1.clone());
        let unknown = ProductId::parse("GONE").unwrap();
        let cart_id = store.seed_cart(
            IdentityId::new_random(),
            &[(p1.product_id.clone(), 2), (unknown, 1)],
        );

        let items = store.list_items(cart_id).await.unwrap();
        assert_eq!(items, vec![CartLineItem::new(p1, 2)]);
    }

    #[tokio::test]
    async fn test_list_items_keeps_insertion_order() {
        let store = MemoryCartStore::new();
        let z = product("Z");
        let a = product("A");
        store.insert_product(z.clone());
        store.insert_product(a.clone());
        let cart_id = store.seed_cart(IdentityId::new_random(), &[]);

        store.upsert_item(cart_id, &z.product_id, 1).await.unwrap();
        store.upsert_item(cart_id, &a.product_id, 1).await.unwrap();
        // Updating a row does not move it.
        store.upsert_item(cart_id, &z.product_id, 3).await.unwrap();

        let items = store.list_items(cart_id).await.unwrap();
        let order: Vec<(&str, u32)> = items
            .iter()
            .map(|line| (line.product_id.as_str(), line.quantity))
            .collect();
        assert_eq!(order, vec![("Z", 3), ("A", 1)]);
        assert_eq!(
            store.rows(cart_id),
            vec![(z.product_id, 3), (a.product_id, 1)]
        );
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = MemoryCartStore::new();
        let p1 = product("P1");
        let cart_id = store.seed_cart(IdentityId::new_random(), &[]);

        store.fail_writes_for(p1.product_id.clone());
        assert!(store.upsert_item(cart_id, &p1.product_id, 1).await.is_err());
        store.restore_writes_for(&p1.product_id);
        assert!(store.upsert_item(cart_id, &p1.product_id, 1).await.is_ok());

        store.set_reads_fail(true);
        assert!(store.list_items(cart_id).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_all_only_touches_one_cart() {
        let store = MemoryCartStore::new();
        let p1 = ProductId::parse("P1").unwrap();
        let a = store.seed_cart(IdentityId::new_random(), &[(p1.clone(), 1)]);
        let b = store.seed_cart(IdentityId::new_random(), &[(p1.clone(), 2)]);

        store.delete_all_items(a).await.unwrap();

        assert!(store.rows(a).is_empty());
        assert_eq!(store.quantity(b, &p1), Some(2));
    }
}
