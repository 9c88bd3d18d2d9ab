//! In-memory `OrderStore` for development and testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use santa_models::{Order, OrderId, OrderStatus};

use crate::error::{FirestoreError, FirestoreResult};
use crate::store::{OrderStore, Revision, Versioned};

/// Orders held in a map, with a monotonically increasing revision per write.
pub struct InMemoryOrderStore {
    orders: RwLock<HashMap<String, (Order, u64)>>,
    next_revision: AtomicU64,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self {
            orders: RwLock::new(HashMap::new()),
            next_revision: AtomicU64::new(1),
        }
    }

    fn bump(&self) -> u64 {
        self.next_revision.fetch_add(1, Ordering::SeqCst)
    }
}

impl Default for InMemoryOrderStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned(e: impl std::fmt::Display) -> FirestoreError {
    FirestoreError::request_failed(format!("order store lock poisoned: {}", e))
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create(&self, order: &Order) -> FirestoreResult<Revision> {
        let mut orders = self.orders.write().map_err(poisoned)?;
        if orders.contains_key(order.id.as_str()) {
            return Err(FirestoreError::AlreadyExists(format!("orders/{}", order.id)));
        }
        let rev = self.bump();
        orders.insert(order.id.to_string(), (order.clone(), rev));
        Ok(Revision(rev.to_string()))
    }

    async fn get(&self, id: &OrderId) -> FirestoreResult<Option<Versioned<Order>>> {
        let orders = self.orders.read().map_err(poisoned)?;
        Ok(orders.get(id.as_str()).map(|(order, rev)| Versioned {
            value: order.clone(),
            revision: Revision(rev.to_string()),
        }))
    }

    async fn replace(&self, order: &Order, expected: &Revision) -> FirestoreResult<Revision> {
        let mut orders = self.orders.write().map_err(poisoned)?;
        let entry = orders
            .get_mut(order.id.as_str())
            .ok_or_else(|| FirestoreError::not_found(format!("orders/{}", order.id)))?;

        if entry.1.to_string() != expected.0 {
            return Err(FirestoreError::PreconditionFailed(format!(
                "orders/{} is at revision {}, expected {}",
                order.id, entry.1, expected.0
            )));
        }

        let rev = self.bump();
        *entry = (order.clone(), rev);
        Ok(Revision(rev.to_string()))
    }

    async fn list_by_status(
        &self,
        status: OrderStatus,
        limit: u32,
    ) -> FirestoreResult<Vec<Order>> {
        let orders = self.orders.read().map_err(poisoned)?;
        let mut matching: Vec<Order> = orders
            .values()
            .filter(|(order, _)| order.status == status)
            .map(|(order, _)| order.clone())
            .collect();
        matching.sort_by_key(|o| o.updated_at);
        matching.truncate(limit as usize);
        Ok(matching)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use santa_models::ChildProfile;

    fn order() -> Order {
        Order::new("user-1", vec![ChildProfile::new("Ava", 6)]).unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = InMemoryOrderStore::new();
        let o = order();
        store.create(&o).await.unwrap();
        assert!(matches!(
            store.create(&o).await,
            Err(FirestoreError::AlreadyExists(_))
        ));

        let got = store.get(&o.id).await.unwrap().unwrap();
        assert_eq!(got.value, o);
    }

    #[tokio::test]
    async fn test_replace_requires_current_revision() {
        let store = InMemoryOrderStore::new();
        let o = order();
        let first = store.create(&o).await.unwrap();
        let second = store.replace(&o, &first).await.unwrap();
        assert_ne!(first, second);

        let err = store.replace(&o, &first).await.unwrap_err();
        assert!(err.is_precondition_failed());
    }

    #[tokio::test]
    async fn test_list_by_status() {
        let store = InMemoryOrderStore::new();
        let a = order();
        let mut b = order();
        b.confirm_payment("pi_1").unwrap();
        store.create(&a).await.unwrap();
        store.create(&b).await.unwrap();

        let paid = store.list_by_status(OrderStatus::Paid, 10).await.unwrap();
        assert_eq!(paid.len(), 1);
        assert_eq!(paid[0].id, b.id);
        assert!(store
            .list_by_status(OrderStatus::Paid, 0)
            .await
            .unwrap()
            .is_empty());
    }
}
