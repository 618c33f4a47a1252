//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent jobs
    pub max_concurrent_jobs: usize,
    /// Wall-clock budget for one job
    pub job_timeout: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Parent of the per-job scratch directories
    pub work_dir: PathBuf,
    /// How often to sweep for messages abandoned by a crashed worker
    pub stale_claim_interval: Duration,
    /// Extra idle time past `job_timeout` before a message counts as abandoned
    pub stale_grace: Duration,
    /// Length assumed for a video whose duration cannot be probed
    pub fallback_video_duration: f64,
    /// Prometheus exporter port
    pub metrics_port: u16,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            job_timeout: Duration::from_secs(1800),
            shutdown_timeout: Duration::from_secs(60),
            work_dir: PathBuf::from("/tmp/ai_video_editor"),
            stale_claim_interval: Duration::from_secs(60),
            stale_grace: Duration::from_secs(120),
            fallback_video_duration: 60.0,
            metrics_port: 9100,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_jobs: env_parse::<usize>("WORKER_MAX_JOBS")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_concurrent_jobs),
            job_timeout: env_parse("WORKER_JOB_TIMEOUT")
                .map(Duration::from_secs)
                .unwrap_or(defaults.job_timeout),
            shutdown_timeout: env_parse("WORKER_SHUTDOWN_TIMEOUT")
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_timeout),
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            stale_claim_interval: env_parse("WORKER_STALE_CLAIM_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.stale_claim_interval),
            stale_grace: defaults.stale_grace,
            fallback_video_duration: env_parse::<f64>("FALLBACK_VIDEO_DURATION")
                .filter(|d| d.is_finite() && *d > 0.0)
                .unwrap_or(defaults.fallback_video_duration),
            metrics_port: env_parse("METRICS_PORT").unwrap_or(defaults.metrics_port),
        }
    }

    /// Idle time after which a pending message is treated as abandoned.
    pub fn stale_after(&self) -> Duration {
        self.job_timeout + self.stale_grace
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.max_concurrent_jobs, 2);
        assert_eq!(config.job_timeout, Duration::from_secs(1800));
        assert_eq!(config.work_dir, PathBuf::from("/tmp/ai_video_editor"));
        assert_eq!(config.stale_after(), Duration::from_secs(1920));
    }
}
