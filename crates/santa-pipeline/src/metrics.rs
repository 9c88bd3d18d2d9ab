//! Pipeline metrics.

use std::time::Duration;

pub mod names {
    pub const POLL_QUERIES_TOTAL: &str = "santa_poll_queries_total";
    pub const SCENE_TIMEOUTS_TOTAL: &str = "santa_scene_timeouts_total";
    pub const STITCH_TOTAL: &str = "santa_stitch_total";
    pub const STITCH_DURATION_SECONDS: &str = "santa_stitch_duration_seconds";
    pub const STAGE_FAILURES_TOTAL: &str = "santa_stage_failures_total";
    pub const ORDERS_COMPLETED_TOTAL: &str = "santa_orders_completed_total";
}

/// `outcome` is one of `running`, `complete`, `failed`, `error`.
pub fn record_poll_query(outcome: &'static str) {
    metrics::counter!(names::POLL_QUERIES_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_scene_timeout() {
    metrics::counter!(names::SCENE_TIMEOUTS_TOTAL).increment(1);
}

pub fn record_stitch(success: bool, duration: Duration) {
    let outcome = if success { "success" } else { "failure" };
    metrics::counter!(names::STITCH_TOTAL, "outcome" => outcome).increment(1);
    metrics::histogram!(names::STITCH_DURATION_SECONDS).record(duration.as_secs_f64());
}

pub fn record_stage_failure(stage: &'static str) {
    metrics::counter!(names::STAGE_FAILURES_TOTAL, "stage" => stage).increment(1);
}

pub fn record_order_completed() {
    metrics::counter!(names::ORDERS_COMPLETED_TOTAL).increment(1);
}
