//! Fire-and-forget orchestrator runs.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn, Instrument};

use santa_models::OrderId;
use santa_pipeline::Orchestrator;

use crate::metrics::record_order_triggered;

/// Run the orchestrator for `id` in the background.
///
/// The caller does not wait; failures are recorded on the order by the
/// orchestrator and only logged here.
pub fn spawn_run(
    orchestrator: Arc<Orchestrator>,
    id: OrderId,
    source: &'static str,
) -> JoinHandle<()> {
    record_order_triggered(source);
    let span = tracing::info_span!("order_trigger", order_id = %id, source);

    tokio::spawn(
        async move {
            match orchestrator.run(&id).await {
                Ok(order) => info!(status = %order.status, "Order run finished"),
                Err(e) => warn!(error = %e, "Order run ended with error"),
            }
        }
        .instrument(span),
    )
}
