//! Structured order logging.
//!
//! Every pipeline operation logs through an [`OrderLogger`] so events carry
//! the same `order_id` and `operation` fields.

use santa_models::OrderId;
use tracing::{error, info, warn, Span};

#[derive(Debug, Clone)]
pub struct OrderLogger {
    order_id: String,
    operation: &'static str,
}

impl OrderLogger {
    /// `operation` names the pipeline step, e.g. "run", "advance", "finalize".
    pub fn new(order_id: &OrderId, operation: &'static str) -> Self {
        Self {
            order_id: order_id.to_string(),
            operation,
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            order_id = %self.order_id,
            operation = self.operation,
            "Order started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            order_id = %self.order_id,
            operation = self.operation,
            "Order progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            order_id = %self.order_id,
            operation = self.operation,
            "Order warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            order_id = %self.order_id,
            operation = self.operation,
            "Order error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            order_id = %self.order_id,
            operation = self.operation,
            "Order completed: {}", message
        );
    }

    pub fn order_id(&self) -> &str {
        &self.order_id
    }

    pub fn operation(&self) -> &str {
        self.operation
    }

    /// Span to instrument the whole operation with.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "order",
            order_id = %self.order_id,
            operation = self.operation
        )
    }
}
