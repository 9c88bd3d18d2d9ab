//! In-process stitch exclusion per order.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use santa_models::OrderId;

/// Set of orders with a stitch running in this process.
///
/// Cross-instance exclusion comes from the conditional
/// `generating_scenes -> stitching` write; this guard only stops two local
/// triggers from both reaching that write.
#[derive(Debug, Clone, Default)]
pub struct StitchGuard {
    in_flight: Arc<Mutex<HashSet<OrderId>>>,
}

impl StitchGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `order_id`. Returns false when it is already claimed.
    pub fn try_acquire(&self, order_id: &OrderId) -> bool {
        match self.in_flight.lock() {
            Ok(mut set) => set.insert(order_id.clone()),
            Err(poisoned) => poisoned.into_inner().insert(order_id.clone()),
        }
    }

    pub fn release(&self, order_id: &OrderId) {
        match self.in_flight.lock() {
            Ok(mut set) => set.remove(order_id),
            Err(poisoned) => poisoned.into_inner().remove(order_id),
        };
    }

    pub fn is_held(&self, order_id: &OrderId) -> bool {
        match self.in_flight.lock() {
            Ok(set) => set.contains(order_id),
            Err(poisoned) => poisoned.into_inner().contains(order_id),
        }
    }
}
