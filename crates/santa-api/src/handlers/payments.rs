//! Payment confirmation webhook.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use santa_models::OrderStatus;

use crate::error::{ApiError, ApiResult};
use crate::handlers::orders::parse_order_id;
use crate::metrics::record_payment_event;
use crate::security::verify_payment_signature;
use crate::services::spawn_run;
use crate::state::AppState;

pub const TIMESTAMP_HEADER: &str = "x-payment-timestamp";
pub const SIGNATURE_HEADER: &str = "x-payment-signature";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentEvent {
    pub order_id: String,
    pub payment_reference: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentAck {
    pub order_id: String,
    pub status: OrderStatus,
    /// False for a replay of an event already applied.
    pub applied: bool,
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> ApiResult<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized(format!("Missing {} header", name)))
}

/// POST /api/webhooks/payment
///
/// Verifies the signature over the raw body, then moves the order to `paid`
/// and starts generation in the background.
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<PaymentAck>> {
    let secret = state
        .config
        .payment_webhook_secret
        .as_deref()
        .ok_or_else(|| ApiError::internal("Payment webhook secret not configured"))?;

    let timestamp = header(&headers, TIMESTAMP_HEADER)?;
    let signature = header(&headers, SIGNATURE_HEADER)?;
    let tolerance = state.config.payment_webhook_tolerance.as_secs();

    if let Err(reason) = verify_payment_signature(
        secret,
        timestamp,
        &body,
        signature,
        Utc::now().timestamp(),
        tolerance,
    ) {
        warn!(?reason, "Rejected payment event");
        record_payment_event("rejected");
        return Err(ApiError::unauthorized("Invalid payment signature"));
    }

    let event: PaymentEvent = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("Invalid payment event: {}", e)))?;
    let id = parse_order_id(&event.order_id)?;

    let (order, applied) = state
        .orchestrator
        .confirm_payment(&id, &event.payment_reference)
        .await?;

    if applied {
        info!(order_id = %id, "Payment confirmed");
        record_payment_event("applied");
        spawn_run(Arc::clone(&state.orchestrator), id, "payment");
    } else {
        info!(order_id = %id, "Payment event replayed");
        record_payment_event("replay");
    }

    Ok(Json(PaymentAck {
        order_id: order.id.to_string(),
        status: order.status,
        applied,
    }))
}
