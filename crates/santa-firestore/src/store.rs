//! Order persistence seam and the optimistic update loop.

use std::time::Duration;

use async_trait::async_trait;
use santa_models::{ModelError, ModelResult, Order, OrderId, OrderStatus};
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::{FirestoreError, FirestoreResult};
use crate::metrics::record_write_conflict;

/// Opaque write version of a stored order (Firestore `updateTime`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Revision(pub String);

impl Revision {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A stored value together with the revision it was read at.
#[derive(Debug, Clone)]
pub struct Versioned<T> {
    pub value: T,
    pub revision: Revision,
}

/// Durable order storage keyed by order id.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert a new order. Fails with `AlreadyExists` if the id is taken.
    async fn create(&self, order: &Order) -> FirestoreResult<Revision>;

    async fn get(&self, id: &OrderId) -> FirestoreResult<Option<Versioned<Order>>>;

    /// Overwrite the order only if its stored revision is still `expected`.
    ///
    /// Fails with `PreconditionFailed` when another writer got there first.
    async fn replace(&self, order: &Order, expected: &Revision) -> FirestoreResult<Revision>;

    async fn list_by_status(&self, status: OrderStatus, limit: u32)
        -> FirestoreResult<Vec<Order>>;

    async fn check_connectivity(&self) -> FirestoreResult<()> {
        Ok(())
    }
}

/// Why [`update_order`] did not write.
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("order not found: {0}")]
    NotFound(OrderId),

    #[error(transparent)]
    Rejected(#[from] ModelError),

    #[error(transparent)]
    Store(#[from] FirestoreError),

    #[error("order {order_id} still contended after {attempts} attempts")]
    Contended { order_id: OrderId, attempts: u32 },
}

/// Maximum read-modify-write rounds before giving up on a contended order.
pub const MAX_UPDATE_ATTEMPTS: u32 = 5;

/// Load an order, apply `mutate`, and write it back conditioned on the revision read.
///
/// `mutate` returns `Ok(false)` when nothing needs writing; the loaded order is
/// returned as is. A rejected mutation writes nothing. When another writer
/// wins the race the mutation is re-applied to the fresh copy, so concurrent
/// triggers never overwrite each other's changes.
pub async fn update_order<F>(
    store: &dyn OrderStore,
    id: &OrderId,
    mut mutate: F,
) -> Result<Order, UpdateError>
where
    F: FnMut(&mut Order) -> ModelResult<bool> + Send,
{
    for attempt in 0..MAX_UPDATE_ATTEMPTS {
        let Some(Versioned {
            value: mut order,
            revision,
        }) = store.get(id).await?
        else {
            return Err(UpdateError::NotFound(id.clone()));
        };

        if !mutate(&mut order)? {
            return Ok(order);
        }
        order.check_invariants()?;

        match store.replace(&order, &revision).await {
            Ok(_) => return Ok(order),
            Err(e) if e.is_precondition_failed() => {
                debug!(
                    order_id = %id,
                    attempt = attempt + 1,
                    "Order write lost a race, re-applying"
                );
                record_write_conflict();
                tokio::time::sleep(Duration::from_millis(50 * (attempt as u64 + 1))).await;
            }
            Err(e) => return Err(e.into()),
        }
    }

    warn!(order_id = %id, "Order update still contended after {} attempts", MAX_UPDATE_ATTEMPTS);
    Err(UpdateError::Contended {
        order_id: id.clone(),
        attempts: MAX_UPDATE_ATTEMPTS,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryOrderStore;
    use santa_models::ChildProfile;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn order() -> Order {
        Order::new("user-1", vec![ChildProfile::new("Ava", 6)]).unwrap()
    }

    /// Lets another writer sneak in before the first replace.
    struct RacingStore {
        inner: InMemoryOrderStore,
        raced: AtomicBool,
    }

    #[async_trait]
    impl OrderStore for RacingStore {
        async fn create(&self, order: &Order) -> FirestoreResult<Revision> {
            self.inner.create(order).await
        }

        async fn get(&self, id: &OrderId) -> FirestoreResult<Option<Versioned<Order>>> {
            self.inner.get(id).await
        }

        async fn replace(&self, order: &Order, expected: &Revision) -> FirestoreResult<Revision> {
            if !self.raced.swap(true, Ordering::SeqCst) {
                let current = self.inner.get(&order.id).await?.unwrap();
                let mut theirs = current.value.clone();
                theirs.generation_progress = None;
                theirs.retry_count = 41;
                self.inner.replace(&theirs, &current.revision).await?;
            }
            self.inner.replace(order, expected).await
        }

        async fn list_by_status(
            &self,
            status: OrderStatus,
            limit: u32,
        ) -> FirestoreResult<Vec<Order>> {
            self.inner.list_by_status(status, limit).await
        }
    }

    #[tokio::test]
    async fn test_update_applies_mutation() {
        let store = InMemoryOrderStore::new();
        let o = order();
        store.create(&o).await.unwrap();

        let updated = update_order(&store, &o.id, |order| order.confirm_payment("pi_1"))
            .await
            .unwrap();
        assert_eq!(updated.status, OrderStatus::Paid);

        let stored = store.get(&o.id).await.unwrap().unwrap().value;
        assert_eq!(stored.status, OrderStatus::Paid);
    }

    #[tokio::test]
    async fn test_rejected_mutation_writes_nothing() {
        let store = InMemoryOrderStore::new();
        let o = order();
        let rev = store.create(&o).await.unwrap();

        let err = update_order(&store, &o.id, |order| order.reset_for_retry().map(|_| true))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            UpdateError::Rejected(ModelError::InvalidTransition { .. })
        ));
        assert_eq!(store.get(&o.id).await.unwrap().unwrap().revision, rev);
    }

    #[tokio::test]
    async fn test_noop_mutation_skips_write() {
        let store = InMemoryOrderStore::new();
        let o = order();
        let rev = store.create(&o).await.unwrap();

        update_order(&store, &o.id, |_| Ok(false)).await.unwrap();
        assert_eq!(store.get(&o.id).await.unwrap().unwrap().revision, rev);
    }

    #[tokio::test]
    async fn test_missing_order() {
        let store = InMemoryOrderStore::new();
        let err = update_order(&store, &OrderId::from_string("nope-0000"), |_| Ok(true))
            .await
            .unwrap_err();
        assert!(matches!(err, UpdateError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_lost_race_reapplies_on_fresh_copy() {
        let store = RacingStore {
            inner: InMemoryOrderStore::new(),
            raced: AtomicBool::new(false),
        };
        let o = order();
        store.create(&o).await.unwrap();

        let mut calls = 0;
        let updated = update_order(&store, &o.id, |order| {
            calls += 1;
            order.confirm_payment("pi_1")
        })
        .await
        .unwrap();

        assert_eq!(calls, 2);
        // Both writers' changes survive.
        assert_eq!(updated.status, OrderStatus::Paid);
        assert_eq!(updated.retry_count, 41);
    }
}
