//! Axum HTTP API for Santa video orders.
//!
//! This crate provides:
//! - The signed payment confirmation webhook
//! - Authenticated order status, status trigger, retry and finalize endpoints
//! - Health, readiness and Prometheus metrics endpoints
//! - The background scene sweeper

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod security;
pub mod services;
pub mod state;

pub use auth::{AuthUser, TokenVerifier};
pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use services::{SceneSweeper, SweepReport};
pub use state::AppState;
