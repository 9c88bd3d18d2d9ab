//! API configuration.

use std::time::Duration;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Rate limit requests per second
    pub rate_limit_rps: u32,
    /// Max request body size
    pub max_body_size: usize,
    /// Environment (development/production)
    pub environment: String,
    /// Shared secret for payment confirmation signatures
    pub payment_webhook_secret: Option<String>,
    /// Accepted clock skew for signed payment events
    pub payment_webhook_tolerance: Duration,
    /// Firebase project for ID token verification
    pub firebase_project_id: Option<String>,
    /// HS256 secret used instead of Firebase in development
    pub auth_jwt_secret: Option<String>,
    /// Hosts finalize segments may be fetched from; empty allows any public host
    pub segment_allowed_hosts: Vec<String>,
    /// Scene sweeper period
    pub sweep_interval: Duration,
    /// Busy orders untouched for this long are failed by the sweeper
    pub stale_order_after: Duration,
    pub sweeper_enabled: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["*".to_string()],
            rate_limit_rps: 10,
            max_body_size: 1024 * 1024, // 1MB
            environment: "development".to_string(),
            payment_webhook_secret: None,
            payment_webhook_tolerance: Duration::from_secs(300),
            firebase_project_id: None,
            auth_jwt_secret: None,
            segment_allowed_hosts: Vec::new(),
            sweep_interval: Duration::from_secs(30),
            stale_order_after: Duration::from_secs(60 * 60),
            sweeper_enabled: true,
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("API_HOST").unwrap_or(defaults.host),
            port: env_parse("API_PORT").unwrap_or(defaults.port),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| split_list(&s))
                .unwrap_or(defaults.cors_origins),
            rate_limit_rps: env_parse("RATE_LIMIT_RPS").unwrap_or(defaults.rate_limit_rps),
            max_body_size: env_parse("MAX_BODY_SIZE").unwrap_or(defaults.max_body_size),
            environment: std::env::var("ENVIRONMENT").unwrap_or(defaults.environment),
            payment_webhook_secret: env_non_empty("PAYMENT_WEBHOOK_SECRET"),
            payment_webhook_tolerance: env_parse("PAYMENT_WEBHOOK_TOLERANCE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.payment_webhook_tolerance),
            firebase_project_id: env_non_empty("FIREBASE_PROJECT_ID")
                .or_else(|| env_non_empty("GCP_PROJECT_ID")),
            auth_jwt_secret: env_non_empty("AUTH_JWT_SECRET"),
            segment_allowed_hosts: std::env::var("SEGMENT_ALLOWED_HOSTS")
                .map(|s| split_list(&s))
                .unwrap_or_default(),
            sweep_interval: env_parse("SWEEP_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
            stale_order_after: env_parse::<u64>("STALE_ORDER_MINUTES")
                .map(|m| Duration::from_secs(m * 60))
                .unwrap_or(defaults.stale_order_after),
            sweeper_enabled: std::env::var("ENABLE_SCENE_SWEEPER")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true),
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
