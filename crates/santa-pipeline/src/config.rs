//! Pipeline configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Parent directory for per-stitch temporary work dirs
    pub work_dir: PathBuf,
    /// Concurrent status queries within one poll cycle
    pub max_parallel_queries: usize,
    /// Concurrent generator calls (keyframes, scene kickoffs, segment fetches)
    pub max_parallel_kickoffs: usize,
    /// Running polls after which a scene is declared timed out
    pub max_poll_cycles: u32,
    /// Wall time after kickoff after which a scene is declared timed out
    pub scene_timeout: Duration,
    /// Per-segment download deadline
    pub fetch_timeout: Duration,
    /// Deadline for a single synchronous generator call
    pub generator_timeout: Duration,
    /// FFmpeg wall-clock limit for one concat
    pub mux_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("/tmp/santa"),
            max_parallel_queries: 4,
            max_parallel_kickoffs: 4,
            max_poll_cycles: 120,
            scene_timeout: Duration::from_secs(1800), // 30 minutes
            fetch_timeout: Duration::from_secs(120),
            generator_timeout: Duration::from_secs(300),
            mux_timeout: Duration::from_secs(600),
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl PipelineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            work_dir: std::env::var("PIPELINE_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            max_parallel_queries: env_or("PIPELINE_MAX_PARALLEL_QUERIES", defaults.max_parallel_queries)
                .max(1),
            max_parallel_kickoffs: env_or(
                "PIPELINE_MAX_PARALLEL_KICKOFFS",
                defaults.max_parallel_kickoffs,
            )
            .max(1),
            max_poll_cycles: env_or("PIPELINE_MAX_POLL_CYCLES", defaults.max_poll_cycles),
            scene_timeout: Duration::from_secs(env_or("PIPELINE_SCENE_TIMEOUT_SECS", 1800)),
            fetch_timeout: Duration::from_secs(env_or("PIPELINE_FETCH_TIMEOUT_SECS", 120)),
            generator_timeout: Duration::from_secs(env_or("PIPELINE_GENERATOR_TIMEOUT_SECS", 300)),
            mux_timeout: Duration::from_secs(env_or("PIPELINE_MUX_TIMEOUT_SECS", 600)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn from_env_reads_overrides_and_clamps_parallelism() {
        std::env::set_var("PIPELINE_WORK_DIR", "/var/tmp/stitch");
        std::env::set_var("PIPELINE_MAX_PARALLEL_QUERIES", "0");
        std::env::set_var("PIPELINE_MAX_POLL_CYCLES", "7");

        let config = PipelineConfig::from_env();
        assert_eq!(config.work_dir, PathBuf::from("/var/tmp/stitch"));
        assert_eq!(config.max_parallel_queries, 1);
        assert_eq!(config.max_poll_cycles, 7);
        assert_eq!(config.scene_timeout, Duration::from_secs(1800));

        std::env::remove_var("PIPELINE_WORK_DIR");
        std::env::remove_var("PIPELINE_MAX_PARALLEL_QUERIES");
        std::env::remove_var("PIPELINE_MAX_POLL_CYCLES");
    }
}
