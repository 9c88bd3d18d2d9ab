//! Order handlers: status view, status trigger, retry and finalize.
//!
//! Every handler authenticates the caller and checks order ownership before
//! touching the pipeline.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use santa_models::{
    GenerationProgress, Order, OrderId, OrderStatus, SceneOperation, Segment,
};
use santa_pipeline::PollReport;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::security::{is_valid_order_id, validate_segment_url};
use crate::services::spawn_run;
use crate::state::AppState;

// ============================================================================
// Types
// ============================================================================

/// Order as shown to its owner.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
    pub order_id: String,
    pub status: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<GenerationProgress>,
    pub child_count: u32,
    pub scene_operations: Vec<SceneOperation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_video_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Order> for OrderView {
    fn from(order: Order) -> Self {
        Self {
            order_id: order.id.to_string(),
            status: order.status,
            progress: order.generation_progress,
            child_count: order.child_count,
            scene_operations: order.scene_operations,
            final_video_url: order.final_video_url,
            error_message: order.error_message,
            retry_count: order.retry_count,
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

/// A scene job the caller believes is in flight.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRef {
    pub scene_number: u32,
    pub operation_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRequest {
    pub order_id: String,
    /// Optional; when present every entry must match a persisted job.
    #[serde(default)]
    pub operations: Vec<OperationRef>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    #[serde(flatten)]
    pub report: PollReport,
    pub status: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryRequest {
    pub order_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryResponse {
    pub order_id: String,
    pub status: OrderStatus,
    pub retry_count: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeRequest {
    pub order_id: String,
    /// Defaults to the order's completed scene videos.
    #[serde(default)]
    pub segments: Option<Vec<Segment>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeResponse {
    pub video_url: String,
}

// ============================================================================
// Helpers
// ============================================================================

pub(crate) fn parse_order_id(raw: &str) -> ApiResult<OrderId> {
    if !is_valid_order_id(raw) {
        return Err(ApiError::Validation("Invalid order ID format".to_string()));
    }
    Ok(OrderId::from_string(raw))
}

/// Load an order and check the caller owns it.
async fn load_owned(state: &AppState, raw_id: &str, user: &AuthUser) -> ApiResult<Order> {
    let id = parse_order_id(raw_id)?;
    let order = state.orchestrator.get_order(&id).await?;
    if !order.is_owned_by(&user.uid) {
        return Err(ApiError::forbidden("Access denied"));
    }
    Ok(order)
}

fn check_operation_refs(order: &Order, refs: &[OperationRef]) -> ApiResult<()> {
    for r in refs {
        let known = order.scene_operations.iter().any(|op| {
            op.scene_number == r.scene_number && op.external_handle.as_str() == r.operation_name
        });
        if !known {
            return Err(ApiError::Validation(format!(
                "Unknown operation '{}' for scene {}",
                r.operation_name, r.scene_number
            )));
        }
    }
    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/orders/:order_id
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    user: AuthUser,
) -> ApiResult<Json<OrderView>> {
    let order = load_owned(&state, &order_id, &user).await?;
    Ok(Json(OrderView::from(order)))
}

/// POST /api/orders/status
///
/// Poll the order's scene jobs once, persist the result and stitch when every
/// scene is ready.
pub async fn order_status(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<StatusRequest>,
) -> ApiResult<Json<StatusResponse>> {
    let order = load_owned(&state, &request.order_id, &user).await?;
    check_operation_refs(&order, &request.operations)?;

    let outcome = state.orchestrator.advance(&order.id).await?;
    let order = outcome.order;

    info!(
        uid = %user.uid,
        order_id = %order.id,
        completed = outcome.report.completed_count,
        total = outcome.report.total_count,
        "order_status"
    );

    Ok(Json(StatusResponse {
        report: outcome.report,
        status: order.status,
        video_url: order.final_video_url,
        error_message: order.error_message,
    }))
}

/// POST /api/orders/retry
///
/// Reset a failed order and start it again in the background.
pub async fn retry_order(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<RetryRequest>,
) -> ApiResult<(StatusCode, Json<RetryResponse>)> {
    let order = load_owned(&state, &request.order_id, &user).await?;

    let order = state.orchestrator.retry(&order.id).await?;
    info!(uid = %user.uid, order_id = %order.id, retry = order.retry_count, "retry_order");

    spawn_run(Arc::clone(&state.orchestrator), order.id.clone(), "retry");

    Ok((
        StatusCode::ACCEPTED,
        Json(RetryResponse {
            order_id: order.id.to_string(),
            status: order.status,
            retry_count: order.retry_count,
        }),
    ))
}

/// POST /api/orders/finalize
pub async fn finalize_order(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<FinalizeRequest>,
) -> ApiResult<Json<FinalizeResponse>> {
    let order = load_owned(&state, &request.order_id, &user).await?;

    if let Some(segments) = &request.segments {
        for segment in segments {
            validate_segment_url(&segment.url, &state.config.segment_allowed_hosts)
                .map_err(ApiError::Validation)?;
        }
    }

    let video_url = state
        .orchestrator
        .finalize(&order.id, request.segments)
        .await?;
    info!(uid = %user.uid, order_id = %order.id, "finalize_order");

    Ok(Json(FinalizeResponse { video_url }))
}
