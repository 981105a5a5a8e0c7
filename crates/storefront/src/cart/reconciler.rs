//! Debounced reconciliation of cart changes with the remote store.
//!
//! Changed products are collected in a [`DirtySet`]. Each change restarts a
//! [`DebounceTimer`]; once changes stop for the quiet period, the set is
//! snapshotted, cleared, and turned into one [`FlushOp`] per product which
//! always carries the current quantity, never a delta. Ops run concurrently
//! and independently: a failed product is logged and dropped from the batch
//! without affecting the others, and is only written again if it changes again.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::{JoinHandle, JoinSet};
use tracing::{error, info, instrument};

use grocer_core::{CartId, CartLineItem, ProductId};

use crate::remote::RemoteCartStore;

/// Products whose in-memory quantity differs from the last persisted state.
#[derive(Debug, Default, Clone)]
pub struct DirtySet {
    keys: HashSet<ProductId>,
}

impl DirtySet {
    /// Mark a product as changed.
    pub fn mark(&mut self, product_id: ProductId) {
        self.keys.insert(product_id);
    }

    #[must_use]
    pub fn contains(&self, product_id: &ProductId) -> bool {
        self.keys.contains(product_id)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Take every key, leaving the set empty.
    pub fn take(&mut self) -> HashSet<ProductId> {
        std::mem::take(&mut self.keys)
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }
}

/// Remote write for one product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOp {
    /// Product is in the cart: store its current quantity.
    Upsert {
        product_id: ProductId,
        quantity: u32,
    },
    /// Product left the cart: delete its row.
    Delete { product_id: ProductId },
}

impl FlushOp {
    #[must_use]
    pub const fn product_id(&self) -> &ProductId {
        match self {
            Self::Upsert { product_id, .. } | Self::Delete { product_id } => product_id,
        }
    }
}

/// Turn a dirty snapshot into writes reflecting the current cart lines.
#[must_use]
pub fn plan_flush(dirty: HashSet<ProductId>, items: &[CartLineItem]) -> Vec<FlushOp> {
    let mut ops: Vec<FlushOp> = dirty
        .into_iter()
        .map(|product_id| {
            match items
                .iter()
                .find(|item| item.product_id == product_id && item.quantity > 0)
            {
                Some(item) => FlushOp::Upsert {
                    product_id,
                    quantity: item.quantity,
                },
                None => FlushOp::Delete { product_id },
            }
        })
        .collect();
    ops.sort_by(|a, b| a.product_id().cmp(b.product_id()));
    ops
}

/// Outcome of one flush batch.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FlushReport {
    pub upserted: Vec<ProductId>,
    pub deleted: Vec<ProductId>,
    pub failed: Vec<ProductId>,
}

impl FlushReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.upserted.is_empty() && self.deleted.is_empty() && self.failed.is_empty()
    }

    fn sort(&mut self) {
        self.upserted.sort();
        self.deleted.sort();
        self.failed.sort();
    }
}

/// Run a batch of writes against the remote store concurrently.
#[instrument(skip(store, ops), fields(ops = ops.len()))]
pub async fn flush(
    store: Arc<dyn RemoteCartStore>,
    cart_id: CartId,
    ops: Vec<FlushOp>,
) -> FlushReport {
    let mut report = FlushReport::default();
    if ops.is_empty() {
        return report;
    }

    let mut tasks = JoinSet::new();
    for op in ops {
        let store = Arc::clone(&store);
        tasks.spawn(async move {
            let result = match &op {
                FlushOp::Upsert {
                    product_id,
                    quantity,
                } => store.upsert_item(cart_id, product_id, *quantity).await,
                FlushOp::Delete { product_id } => store.delete_item(cart_id, product_id).await,
            };
            (op, result)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((FlushOp::Upsert { product_id, .. }, Ok(()))) => report.upserted.push(product_id),
            Ok((FlushOp::Delete { product_id }, Ok(()))) => report.deleted.push(product_id),
            Ok((op, Err(e))) => {
                error!(
                    %cart_id,
                    product_id = %op.product_id(),
                    error = %e,
                    "Failed to sync cart line, change dropped until it is modified again"
                );
                report.failed.push(op.product_id().clone());
            }
            Err(e) => error!(%cart_id, error = %e, "Cart sync task panicked"),
        }
    }

    report.sort();
    info!(
        %cart_id,
        upserted = report.upserted.len(),
        deleted = report.deleted.len(),
        failed = report.failed.len(),
        "Cart flush complete"
    );
    report
}

/// Single restartable timer.
///
/// [`reset`](Self::reset) cancels any pending countdown and starts a new one;
/// the callback runs only if the full quiet period elapses without another
/// reset. The callback runs synchronously on the timer task, so it should
/// only hand work off (e.g., spawn) rather than await it, which keeps a later
/// reset from aborting work that already started.
#[derive(Debug)]
pub struct DebounceTimer {
    quiet_period: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl DebounceTimer {
    #[must_use]
    pub const fn new(quiet_period: Duration) -> Self {
        Self {
            quiet_period,
            pending: Mutex::new(None),
        }
    }

    #[must_use]
    pub const fn quiet_period(&self) -> Duration {
        self.quiet_period
    }

    /// Restart the countdown, replacing any pending callback.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn reset<F>(&self, on_fire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let quiet_period = self.quiet_period;
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = pending.take() {
            previous.abort();
        }
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(quiet_period).await;
            on_fire();
        }));
    }

    /// Cancel the pending countdown. Returns whether one was pending.
    pub fn cancel(&self) -> bool {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.take().is_some_and(|handle| {
            let was_pending = !handle.is_finished();
            handle.abort();
            was_pending
        })
    }

    /// Whether a countdown is running.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for DebounceTimer {
    fn drop(&mut self) {
        if let Some(handle) = self
            .pending
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use rust_decimal::Decimal;

    use grocer_core::{CartProduct, IdentityId, Price};

    use super::*;
    use crate::remote::MemoryCartStore;

    fn pid(id: &str) -> ProductId {
        ProductId::parse(id).unwrap()
    }

    fn line(id: &str, quantity: u32) -> CartLineItem {
        CartLineItem::new(
            CartProduct {
                product_id: pid(id),
                name: id.to_owned(),
                unit_label: None,
                image_ref: None,
                unit_price: Price::from_amount(Decimal::ONE).unwrap(),
            },
            quantity,
        )
    }

    #[test]
    fn test_dirty_set_take_clears() {
        let mut dirty = DirtySet::default();
        dirty.mark(pid("P1"));
        dirty.mark(pid("P1"));
        dirty.mark(pid("P2"));
        assert_eq!(dirty.len(), 2);

        let snapshot = dirty.take();
        assert_eq!(snapshot.len(), 2);
        assert!(dirty.is_empty());
    }

    #[test]
    fn test_plan_flush_uses_current_quantities() {
        let dirty: HashSet<ProductId> = [pid("P1"), pid("P2")].into_iter().collect();
        let ops = plan_flush(dirty, &[line("P1", 5), line("P3", 1)]);
        assert_eq!(
            ops,
            vec![
                FlushOp::Upsert {
                    product_id: pid("P1"),
                    quantity: 5
                },
                FlushOp::Delete {
                    product_id: pid("P2")
                },
            ]
        );
    }

    #[test]
    fn test_plan_flush_zero_quantity_deletes() {
        let dirty: HashSet<ProductId> = [pid("P1")].into_iter().collect();
        let ops = plan_flush(dirty, &[line("P1", 0)]);
        assert_eq!(
            ops,
            vec![FlushOp::Delete {
                product_id: pid("P1")
            }]
        );
    }

    #[tokio::test]
    async fn test_flush_failure_is_isolated() {
        let store = Arc::new(MemoryCartStore::new());
        let cart_id = store.seed_cart(IdentityId::new_random(), &[(pid("P9"), 1)]);
        store.fail_writes_for(pid("P3"));

        let ops = vec![
            FlushOp::Upsert {
                product_id: pid("P3"),
                quantity: 2,
            },
            FlushOp::Upsert {
                product_id: pid("P4"),
                quantity: 1,
            },
            FlushOp::Delete {
                product_id: pid("P9"),
            },
        ];
        let report = flush(store.clone(), cart_id, ops).await;

        assert_eq!(report.failed, vec![pid("P3")]);
        assert_eq!(report.upserted, vec![pid("P4")]);
        assert_eq!(report.deleted, vec![pid("P9")]);
        assert_eq!(store.rows(cart_id), vec![(pid("P4"), 1)]);
    }

    #[tokio::test]
    async fn test_flush_empty_batch_makes_no_calls() {
        let store = Arc::new(MemoryCartStore::new());
        let report = flush(store.clone(), CartId::new_random(), Vec::new()).await;
        assert!(report.is_empty());
        assert!(store.journal().is_empty());
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_debounce_fires_once_after_quiet_period() {
        let timer = DebounceTimer::new(Duration::from_millis(500));
        let fired = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let fired = Arc::clone(&fired);
            timer.reset(move || {
                fired.fetch_add(1, Ordering::SeqCst);
            });
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(timer.is_pending());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!timer.is_pending());
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_debounce_cancel() {
        let timer = DebounceTimer::new(Duration::from_millis(500));
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&fired);
        timer.reset(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(timer.cancel());
        assert!(!timer.cancel());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
