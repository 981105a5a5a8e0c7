//! Cart state machine.
//!
//! [`CartManager`] is the single source of truth for the visible cart. It
//! applies every change to memory first and returns immediately; durability
//! follows afterwards and depends on who the visitor is:
//!
//! - guests (no identity or an anonymous one) rewrite the whole cart blob in
//!   device storage on every change,
//! - signed-in visitors mark the changed product dirty and let the debounced
//!   reconciler write it to the remote store.
//!
//! The manager goes `Uninitialized -> Loading -> Ready`. Changes made before
//! `Ready` are shown right away and replayed onto the loaded cart once loading
//! completes, so nothing is persisted against a cart whose owner is unknown.
//! A change of storage backend (sign-in, sign-out, switching accounts)
//! reloads the cart from scratch; the guest cart is not merged into the
//! signed-in one.
//!
//! Every method that may write remotely spawns onto the current Tokio
//! runtime, so the manager must be used from within one.

pub mod reconciler;

pub use reconciler::{DebounceTimer, DirtySet, FlushOp, FlushReport};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio_util::task::{AbortOnDropHandle, TaskTracker};
use tracing::{debug, error, info, instrument, warn};

use grocer_core::{
    CartBackend, CartId, CartIdentity, CartLineItem, CartProduct, CartStatus, IdentityId, Price,
    ProductId,
};

use crate::identity::IdentityResolver;
use crate::remote::{self, RemoteCartStore};
use crate::storage::LocalCart;

/// Shopping cart kept consistent across device storage and the remote store.
///
/// Cheap to clone; clones share the same cart.
#[derive(Clone)]
pub struct CartManager {
    inner: Arc<CartInner>,
}

struct CartInner {
    state: Mutex<CartState>,
    local: LocalCart,
    remote: Arc<dyn RemoteCartStore>,
    identity: IdentityResolver,
    debounce: DebounceTimer,
    tasks: TaskTracker,
    /// Held for the duration of every remote write batch, so a clear never
    /// interleaves with a flush that is still running.
    writes: tokio::sync::Mutex<()>,
    subscription: Mutex<Option<AbortOnDropHandle<()>>>,
}

#[derive(Debug, Default)]
struct CartState {
    status: CartStatus,
    /// Identity the loaded cart belongs to.
    identity: CartIdentity,
    /// Remote cart, once resolved for an authenticated identity.
    cart_id: Option<CartId>,
    items: Vec<CartLineItem>,
    dirty: DirtySet,
    /// Changes made before loading finished, replayed onto the loaded cart.
    queued: Vec<Mutation>,
    generation: u64,
}

#[derive(Debug, Clone)]
enum Mutation {
    Add { product: CartProduct, quantity: u32 },
    Adjust { product_id: ProductId, delta: i64 },
    Remove { product_id: ProductId },
    Clear,
}

/// What a mutation did to the line list.
#[derive(Debug, PartialEq, Eq)]
enum Effect {
    Unchanged,
    Changed(ProductId),
    Cleared,
}

impl Mutation {
    fn apply(&self, items: &mut Vec<CartLineItem>) -> Effect {
        match self {
            Self::Add { product, quantity } => add_line(items, product, *quantity),
            Self::Adjust { product_id, delta } => adjust_line(items, product_id, *delta),
            Self::Remove { product_id } => remove_line(items, product_id),
            Self::Clear => {
                items.clear();
                Effect::Cleared
            }
        }
    }
}

fn add_line(items: &mut Vec<CartLineItem>, product: &CartProduct, quantity: u32) -> Effect {
    if quantity == 0 {
        return Effect::Unchanged;
    }
    if let Some(line) = items
        .iter_mut()
        .find(|line| line.product_id == product.product_id)
    {
        line.quantity = line.quantity.saturating_add(quantity);
    } else {
        items.push(CartLineItem::new(product.clone(), quantity));
    }
    Effect::Changed(product.product_id.clone())
}

fn adjust_line(items: &mut Vec<CartLineItem>, product_id: &ProductId, delta: i64) -> Effect {
    let Some(index) = items.iter().position(|line| &line.product_id == product_id) else {
        return Effect::Unchanged;
    };
    if delta == 0 {
        return Effect::Unchanged;
    }

    let current = items.get(index).map_or(0, |line| i64::from(line.quantity));
    let next = current.saturating_add(delta).max(0);
    if next == 0 {
        items.remove(index);
    } else if let Some(line) = items.get_mut(index) {
        line.quantity = u32::try_from(next).unwrap_or(u32::MAX);
    }
    Effect::Changed(product_id.clone())
}

fn remove_line(items: &mut Vec<CartLineItem>, product_id: &ProductId) -> Effect {
    items.retain(|line| &line.product_id != product_id);
    // Marked even when absent locally, so a stale remote row is deleted too.
    Effect::Changed(product_id.clone())
}

impl CartManager {
    /// Create an uninitialized cart. Call [`initialize`](Self::initialize) next.
    #[must_use]
    pub fn new(
        local: LocalCart,
        remote: Arc<dyn RemoteCartStore>,
        identity: IdentityResolver,
        quiet_period: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(CartInner {
                state: Mutex::new(CartState::default()),
                local,
                remote,
                identity,
                debounce: DebounceTimer::new(quiet_period),
                tasks: TaskTracker::new(),
                writes: tokio::sync::Mutex::new(()),
                subscription: Mutex::new(None),
            }),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, CartState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Load the cart for the current identity and start following identity
    /// changes.
    ///
    /// Authenticated visitors load from the remote store (creating their cart
    /// if needed); everyone else loads from device storage. Failures load an
    /// empty cart.
    pub async fn initialize(&self) {
        self.subscribe_identity();
        self.load().await;
    }

    fn subscribe_identity(&self) {
        let mut subscription = self
            .inner
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if subscription.is_some() {
            return;
        }

        let mut changes = self.inner.identity.subscribe();
        let weak = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                let next = *changes.borrow_and_update();
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                Self { inner }.on_identity_changed(next).await;
            }
        });
        *subscription = Some(AbortOnDropHandle::new(handle));
    }

    async fn on_identity_changed(&self, next: CartIdentity) {
        let reload = {
            let mut state = self.lock_state();
            if state.identity.backend() == next.backend() {
                state.identity = next;
                false
            } else {
                true
            }
        };

        if reload {
            info!(identity = ?next, "Cart storage changed, reloading cart");
            self.load().await;
        }
    }

    #[instrument(skip(self))]
    async fn load(&self) {
        let identity = self.inner.identity.current();
        let (generation, leftover) = {
            let mut state = self.lock_state();
            state.generation = state.generation.wrapping_add(1);
            state.status = CartStatus::Loading;

            // Unflushed changes still belong to the previous remote cart.
            let leftover = match state.cart_id {
                Some(cart_id) if !state.dirty.is_empty() => {
                    let dirty = state.dirty.take();
                    Some((cart_id, reconciler::plan_flush(dirty, &state.items)))
                }
                _ => None,
            };
            state.dirty.clear();
            state.identity = identity;
            state.cart_id = None;
            (state.generation, leftover)
        };
        self.inner.debounce.cancel();

        if let Some((cart_id, ops)) = leftover {
            let cart = self.clone();
            self.inner.tasks.spawn(async move {
                let _writes = cart.inner.writes.lock().await;
                reconciler::flush(Arc::clone(&cart.inner.remote), cart_id, ops).await;
            });
        }

        let (cart_id, items) = match identity.backend() {
            CartBackend::Local => (None, self.inner.local.load()),
            CartBackend::Remote(owner) => self.load_remote(owner).await,
        };

        let mut state = self.lock_state();
        if state.generation != generation {
            debug!("Cart load superseded by a newer one");
            return;
        }
        state.cart_id = cart_id;
        state.items = items;
        state.status = CartStatus::Ready;

        let queued = std::mem::take(&mut state.queued);
        for mutation in &queued {
            self.commit(&mut state, mutation);
        }

        info!(
            lines = state.items.len(),
            replayed = queued.len(),
            remote = state.cart_id.is_some(),
            "Cart ready"
        );
    }

    async fn load_remote(&self, owner: IdentityId) -> (Option<CartId>, Vec<CartLineItem>) {
        let cart_id = match remote::resolve_cart(self.inner.remote.as_ref(), owner).await {
            Ok(cart_id) => cart_id,
            Err(e) => {
                warn!(%owner, error = %e, "Failed to resolve remote cart, starting empty");
                return (None, Vec::new());
            }
        };

        match self.inner.remote.list_items(cart_id).await {
            Ok(items) => (Some(cart_id), items),
            Err(e) => {
                warn!(%cart_id, error = %e, "Failed to load remote cart lines, starting empty");
                (Some(cart_id), Vec::new())
            }
        }
    }

    /// Write pending changes now instead of waiting for the quiet period.
    pub async fn flush_now(&self) -> FlushReport {
        self.inner.debounce.cancel();
        self.flush_dirty().await
    }

    /// Wait for background writes that have already started (remote clears,
    /// fired flushes, identity mints). Changes still inside the quiet period
    /// are not forced out; see [`flush_now`](Self::flush_now).
    pub async fn settle(&self) {
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        self.inner.tasks.reopen();
    }

    /// Stop following identity changes, write pending changes, and wait for
    /// background writes.
    pub async fn close(&self) {
        let subscription = self
            .inner
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(subscription);

        self.flush_now().await;
        self.settle().await;
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Add `quantity` units of `product`, merging with an existing line.
    pub fn add_item(&self, product: CartProduct, quantity: u32) {
        self.mutate(Mutation::Add { product, quantity });
    }

    /// Like [`add_item`](Self::add_item), and also make sure the visitor has
    /// at least an anonymous identity. The identity is minted in the
    /// background; if that fails the cart simply stays on the device.
    pub fn add_item_with_identity(&self, product: CartProduct, quantity: u32) {
        self.add_item(product, quantity);
        if let Some(mint) = self.inner.identity.ensure_at_least_anonymous() {
            self.inner.tasks.spawn(async move {
                if let Err(e) = mint.await {
                    error!(error = %e, "Identity mint task failed");
                }
            });
        }
    }

    /// Change a line's quantity by `delta`. Dropping to zero or below removes
    /// the line; unknown products are ignored.
    pub fn update_quantity(&self, product_id: &ProductId, delta: i64) {
        self.mutate(Mutation::Adjust {
            product_id: product_id.clone(),
            delta,
        });
    }

    /// Remove a line.
    pub fn remove_item(&self, product_id: &ProductId) {
        self.mutate(Mutation::Remove {
            product_id: product_id.clone(),
        });
    }

    /// Empty the cart and its storage right away (not debounced). Used after
    /// an order is placed.
    pub fn clear(&self) {
        self.mutate(Mutation::Clear);
    }

    fn mutate(&self, mutation: Mutation) {
        let mut state = self.lock_state();
        if state.status != CartStatus::Ready {
            mutation.apply(&mut state.items);
            state.queued.push(mutation);
            return;
        }
        self.commit(&mut state, &mutation);
    }

    /// Apply a mutation to a ready cart and persist it.
    fn commit(&self, state: &mut CartState, mutation: &Mutation) {
        let effect = mutation.apply(&mut state.items);

        match (state.identity.backend(), effect) {
            (_, Effect::Unchanged) => {}
            (CartBackend::Local, Effect::Changed(_)) => self.inner.local.save(&state.items),
            (CartBackend::Local, Effect::Cleared) => self.inner.local.clear(),
            (CartBackend::Remote(_), Effect::Changed(product_id)) => {
                state.dirty.mark(product_id);
                self.schedule_flush();
            }
            (CartBackend::Remote(_), Effect::Cleared) => {
                state.dirty.clear();
                self.inner.debounce.cancel();
                self.spawn_remote_clear(state.cart_id, state.generation);
            }
        }
    }

    fn schedule_flush(&self) {
        let weak = Arc::downgrade(&self.inner);
        self.inner.debounce.reset(move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let tasks = inner.tasks.clone();
            let cart = Self { inner };
            tasks.spawn(async move {
                cart.flush_dirty().await;
            });
        });
    }

    /// Delete every remote line once in-flight writes have finished.
    ///
    /// `known` is the cart at the time of the clear; when it was not resolved
    /// yet, resolution is retried for the same load `generation`.
    fn spawn_remote_clear(&self, known: Option<CartId>, generation: u64) {
        let cart = self.clone();
        self.inner.tasks.spawn(async move {
            let _writes = cart.inner.writes.lock().await;
            let cart_id = match known {
                Some(cart_id) => cart_id,
                None => match cart.resolve_remote_cart(generation).await {
                    Some(cart_id) => cart_id,
                    None => {
                        warn!("Remote cart unresolved, nothing cleared remotely");
                        return;
                    }
                },
            };
            match cart.inner.remote.delete_all_items(cart_id).await {
                Ok(()) => info!(%cart_id, "Remote cart cleared"),
                Err(e) => error!(%cart_id, error = %e, "Failed to clear remote cart"),
            }
        });
    }

    /// The remote cart of the load identified by `generation`, resolving it
    /// if loading could not.
    ///
    /// Only the cart id is recorded; the lines in memory are kept as they are.
    async fn resolve_remote_cart(&self, generation: u64) -> Option<CartId> {
        let owner = {
            let state = self.lock_state();
            if state.generation != generation || state.status != CartStatus::Ready {
                return None;
            }
            if let Some(cart_id) = state.cart_id {
                return Some(cart_id);
            }
            match state.identity.backend() {
                CartBackend::Remote(owner) => owner,
                CartBackend::Local => return None,
            }
        };

        match remote::resolve_cart(self.inner.remote.as_ref(), owner).await {
            Ok(cart_id) => {
                let mut state = self.lock_state();
                if state.generation != generation {
                    debug!(%cart_id, "Cart reloaded while resolving, ignoring result");
                    return None;
                }
                state.cart_id = Some(cart_id);
                info!(%owner, %cart_id, "Remote cart resolved");
                Some(cart_id)
            }
            Err(e) => {
                warn!(%owner, error = %e, "Failed to resolve remote cart, keeping changes pending");
                None
            }
        }
    }

    async fn flush_dirty(&self) -> FlushReport {
        let _writes = self.inner.writes.lock().await;

        let generation = {
            let state = self.lock_state();
            if state.dirty.is_empty() {
                return FlushReport::default();
            }
            state.generation
        };
        let Some(cart_id) = self.resolve_remote_cart(generation).await else {
            return FlushReport::default();
        };

        let ops = {
            let mut state = self.lock_state();
            if state.generation != generation || state.dirty.is_empty() {
                return FlushReport::default();
            }
            let dirty = state.dirty.take();
            reconciler::plan_flush(dirty, &state.items)
        };

        reconciler::flush(Arc::clone(&self.inner.remote), cart_id, ops).await
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Cart lines in display (insertion) order.
    #[must_use]
    pub fn items(&self) -> Vec<CartLineItem> {
        self.lock_state().items.clone()
    }

    #[must_use]
    pub fn status(&self) -> CartStatus {
        self.lock_state().status
    }

    /// True until the first load has completed, and during reloads.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.status() != CartStatus::Ready
    }

    /// Identity the displayed cart belongs to.
    #[must_use]
    pub fn identity(&self) -> CartIdentity {
        self.lock_state().identity
    }

    /// Remote cart in use, if resolved.
    #[must_use]
    pub fn cart_id(&self) -> Option<CartId> {
        self.lock_state().cart_id
    }

    /// Whether changes are waiting to be written remotely.
    #[must_use]
    pub fn has_pending_changes(&self) -> bool {
        !self.lock_state().dirty.is_empty()
    }

    /// Total number of units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.lock_state()
            .items
            .iter()
            .fold(0u32, |acc, line| acc.saturating_add(line.quantity))
    }

    /// Sum of line totals.
    #[must_use]
    pub fn subtotal(&self) -> Price {
        grocer_core::subtotal(&self.lock_state().items)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::identity::LocalAuthProvider;
    use crate::remote::MemoryCartStore;
    use crate::storage::{CART_STORAGE_KEY, LocalStore, MemoryStore};

    fn pid(id: &str) -> ProductId {
        ProductId::parse(id).unwrap()
    }

    fn product(id: &str, cents: i64) -> CartProduct {
        CartProduct {
            product_id: pid(id),
            name: format!("Product {id}"),
            unit_label: None,
            image_ref: None,
            unit_price: Price::from_amount(Decimal::new(cents, 2)).unwrap(),
        }
    }

    fn quantities(items: &[CartLineItem]) -> Vec<(String, u32)> {
        items
            .iter()
            .map(|line| (line.product_id.to_string(), line.quantity))
            .collect()
    }

    struct Harness {
        device: Arc<MemoryStore>,
        remote: Arc<MemoryCartStore>,
        identity: IdentityResolver,
        cart: CartManager,
    }

    fn harness(initial: CartIdentity) -> Harness {
        let device = Arc::new(MemoryStore::new());
        let remote = Arc::new(MemoryCartStore::new());
        let identity = IdentityResolver::new(Arc::new(LocalAuthProvider), initial);
        let cart = CartManager::new(
            LocalCart::new(device.clone(), CART_STORAGE_KEY),
            remote.clone(),
            identity.clone(),
            Duration::from_millis(500),
        );
        Harness {
            device,
            remote,
            identity,
            cart,
        }
    }

    #[test]
    fn test_add_line_merges() {
        let mut items = Vec::new();
        add_line(&mut items, &product("P1", 100), 1);
        add_line(&mut items, &product("P2", 100), 1);
        add_line(&mut items, &product("P1", 100), 2);
        assert_eq!(
            quantities(&items),
            vec![("P1".to_owned(), 3), ("P2".to_owned(), 1)]
        );
    }

    #[test]
    fn test_add_zero_is_noop() {
        let mut items = Vec::new();
        assert_eq!(add_line(&mut items, &product("P1", 100), 0), Effect::Unchanged);
        assert!(items.is_empty());
    }

    #[test]
    fn test_adjust_line_clamps_and_removes() {
        let mut items = Vec::new();
        add_line(&mut items, &product("P1", 100), 2);

        adjust_line(&mut items, &pid("P1"), 3);
        assert_eq!(quantities(&items), vec![("P1".to_owned(), 5)]);

        assert_eq!(
            adjust_line(&mut items, &pid("P1"), -10),
            Effect::Changed(pid("P1"))
        );
        assert!(items.is_empty());
    }

    #[test]
    fn test_adjust_unknown_product_is_noop() {
        let mut items = Vec::new();
        assert_eq!(adjust_line(&mut items, &pid("P1"), 1), Effect::Unchanged);
        assert!(items.is_empty());
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_guest_changes_rewrite_device_blob() {
        let h = harness(CartIdentity::None);
        h.cart.initialize().await;
        assert_eq!(h.cart.status(), CartStatus::Ready);

        h.cart.add_item(product("P1", 250), 2);
        h.cart.update_quantity(&pid("P1"), 1);

        let blob = h.device.get(CART_STORAGE_KEY).unwrap().unwrap();
        let stored: Vec<CartLineItem> = serde_json::from_str(&blob).unwrap();
        assert_eq!(stored, h.cart.items());
        assert_eq!(h.cart.item_count(), 3);
        assert_eq!(h.cart.subtotal().amount(), Decimal::new(750, 2));
        assert_eq!(h.remote.call_count(), 0);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_changes_before_initialize_are_replayed() {
        let h = harness(CartIdentity::None);
        h.device
            .set(
                CART_STORAGE_KEY,
                &serde_json::to_string(&vec![CartLineItem::new(product("P1", 100), 1)]).unwrap(),
            )
            .unwrap();

        h.cart.add_item(product("P2", 100), 1);
        assert!(h.cart.is_loading());
        assert_eq!(quantities(&h.cart.items()), vec![("P2".to_owned(), 1)]);
        // Nothing is written before the owner of the cart is known.
        assert_eq!(h.device.writes(), 1);

        h.cart.initialize().await;

        assert_eq!(
            quantities(&h.cart.items()),
            vec![("P1".to_owned(), 1), ("P2".to_owned(), 1)]
        );
        let stored: Vec<CartLineItem> =
            serde_json::from_str(&h.device.get(CART_STORAGE_KEY).unwrap().unwrap()).unwrap();
        assert_eq!(stored, h.cart.items());
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_authenticated_changes_are_debounced() {
        let user = IdentityId::new_random();
        let h = harness(CartIdentity::Authenticated(user));
        h.remote.insert_product(product("P1", 100));
        h.cart.initialize().await;
        let cart_id = h.cart.cart_id().unwrap();

        h.cart.add_item(product("P1", 100), 1);
        assert!(h.cart.has_pending_changes());
        assert!(h.remote.upserts().is_empty());

        tokio::time::sleep(Duration::from_millis(600)).await;
        h.cart.settle().await;

        assert!(!h.cart.has_pending_changes());
        assert_eq!(h.remote.quantity(cart_id, &pid("P1")), Some(1));
        assert_eq!(h.device.reads(), 0);
        assert_eq!(h.device.writes(), 0);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_flush_now_skips_quiet_period() {
        let user = IdentityId::new_random();
        let h = harness(CartIdentity::Authenticated(user));
        h.cart.initialize().await;
        let cart_id = h.cart.cart_id().unwrap();

        h.cart.add_item(product("P1", 100), 4);
        let report = h.cart.flush_now().await;

        assert_eq!(report.upserted, vec![pid("P1")]);
        assert_eq!(h.remote.quantity(cart_id, &pid("P1")), Some(4));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_sign_in_reloads_from_remote() {
        let h = harness(CartIdentity::None);
        let user = IdentityId::new_random();
        h.remote.insert_product(product("P2", 100));
        h.remote.seed_cart(user, &[(pid("P2"), 2)]);

        h.cart.initialize().await;
        h.cart.add_item(product("P1", 100), 1);

        h.identity.sign_in(user);
        // Let the identity watcher run the reload.
        while h.cart.identity() != CartIdentity::Authenticated(user) || h.cart.is_loading() {
            tokio::task::yield_now().await;
        }

        assert_eq!(quantities(&h.cart.items()), vec![("P2".to_owned(), 2)]);
        // The guest blob is left on the device untouched.
        assert!(h.device.get(CART_STORAGE_KEY).unwrap().is_some());
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_anonymous_identity_keeps_local_cart() {
        let h = harness(CartIdentity::None);
        h.cart.initialize().await;

        h.cart.add_item_with_identity(product("P1", 100), 1);
        h.cart.settle().await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert!(matches!(h.identity.current(), CartIdentity::Anonymous(_)));
        assert!(matches!(h.cart.identity(), CartIdentity::Anonymous(_)));
        assert_eq!(quantities(&h.cart.items()), vec![("P1".to_owned(), 1)]);
        assert_eq!(h.remote.call_count(), 0);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_close_flushes_pending_changes() {
        let user = IdentityId::new_random();
        let h = harness(CartIdentity::Authenticated(user));
        h.cart.initialize().await;
        let cart_id = h.cart.cart_id().unwrap();

        h.cart.add_item(product("P1", 100), 2);
        h.cart.close().await;

        assert_eq!(h.remote.quantity(cart_id, &pid("P1")), Some(2));
    }
}
