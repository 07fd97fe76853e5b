use std::time::Duration;

use crate::error::{AppError, Result};

pub const TARGET_FIXTURES_URL: &str = "https://crex.live/fixtures/match-list";

/// Fixture monitor cadence (minutes).
pub const MONITOR_INTERVAL_MINUTES: u64 = 2;

/// Live-poll cadence (seconds).
pub const POLL_INTERVAL_SECS: u64 = 20;

/// Reconciliation cadence (seconds). How often persisted Live records are
/// checked for a matching poll job.
pub const RECONCILE_INTERVAL_SECS: u64 = 30;

/// Upper bound on any single discovery or detail fetch.
pub const FETCH_TIMEOUT_SECS: u64 = 60;

/// Delay before a start trigger fires when the start time is unknown or already past.
pub const START_GRACE_SECS: u64 = 10;

/// Total detail-fetch attempts a single start trigger makes before giving up.
pub const START_RETRY_ATTEMPTS: u32 = 3;

/// First start-trigger retry delay; doubled per attempt.
pub const START_RETRY_BACKOFF_SECS: u64 = 15;

/// Ceiling for the start-trigger retry delay.
pub const START_RETRY_BACKOFF_MAX_SECS: u64 = 300;

/// Max random offset applied to the first tick of a live poll, so matches that
/// start together don't fetch in lockstep.
pub const POLL_JITTER_MS: u64 = 2_000;

/// How long in-flight jobs may keep running once shutdown begins.
pub const SHUTDOWN_GRACE_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct Config {
    pub fixtures_url: String,
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    pub monitor_interval: Duration,
    pub poll_interval: Duration,
    pub reconcile_interval: Duration,
    pub fetch_timeout: Duration,
    pub start_grace: Duration,
    /// Attempts per start trigger, including the first (START_RETRY_ATTEMPTS)
    pub start_retry_attempts: u32,
    pub start_retry_backoff: Duration,
    /// Zero disables jitter (POLL_JITTER_MS)
    pub poll_jitter: Duration,
    pub shutdown_grace: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            fixtures_url: std::env::var("TARGET_FIXTURES_URL")
                .unwrap_or_else(|_| TARGET_FIXTURES_URL.to_string()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "tracker.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            monitor_interval: Duration::from_secs(
                env_u64("MONITOR_INTERVAL_MINUTES", MONITOR_INTERVAL_MINUTES)?.max(1) * 60,
            ),
            poll_interval: Duration::from_secs(
                env_u64("POLL_INTERVAL_SECONDS", POLL_INTERVAL_SECS)?.max(1),
            ),
            reconcile_interval: Duration::from_secs(
                env_u64("RECONCILE_INTERVAL_SECONDS", RECONCILE_INTERVAL_SECS)?.max(1),
            ),
            fetch_timeout: Duration::from_secs(
                env_u64("FETCH_TIMEOUT_SECONDS", FETCH_TIMEOUT_SECS)?.max(1),
            ),
            start_grace: Duration::from_secs(env_u64("START_GRACE_SECONDS", START_GRACE_SECS)?),
            start_retry_attempts: env_u64("START_RETRY_ATTEMPTS", u64::from(START_RETRY_ATTEMPTS))?
                .clamp(1, 20) as u32,
            start_retry_backoff: Duration::from_secs(env_u64(
                "START_RETRY_BACKOFF_SECONDS",
                START_RETRY_BACKOFF_SECS,
            )?),
            poll_jitter: Duration::from_millis(env_u64("POLL_JITTER_MS", POLL_JITTER_MS)?),
            shutdown_grace: Duration::from_secs(env_u64(
                "SHUTDOWN_GRACE_SECONDS",
                SHUTDOWN_GRACE_SECS,
            )?),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fixtures_url: TARGET_FIXTURES_URL.to_string(),
            log_level: "info".to_string(),
            db_path: "tracker.db".to_string(),
            api_port: 3000,
            monitor_interval: Duration::from_secs(MONITOR_INTERVAL_MINUTES * 60),
            poll_interval: Duration::from_secs(POLL_INTERVAL_SECS),
            reconcile_interval: Duration::from_secs(RECONCILE_INTERVAL_SECS),
            fetch_timeout: Duration::from_secs(FETCH_TIMEOUT_SECS),
            start_grace: Duration::from_secs(START_GRACE_SECS),
            start_retry_attempts: START_RETRY_ATTEMPTS,
            start_retry_backoff: Duration::from_secs(START_RETRY_BACKOFF_SECS),
            poll_jitter: Duration::from_millis(POLL_JITTER_MS),
            shutdown_grace: Duration::from_secs(SHUTDOWN_GRACE_SECS),
        }
    }
}

/// Unset means default; set-but-garbage is a config error rather than a silent fallback.
fn env_u64(name: &str, default: u64) -> Result<u64> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|_| AppError::Config(format!("{name} must be a non-negative integer, got {raw:?}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_cadences() {
        let cfg = Config::default();
        assert_eq!(cfg.monitor_interval, Duration::from_secs(120));
        assert_eq!(cfg.poll_interval, Duration::from_secs(20));
        assert_eq!(cfg.reconcile_interval, Duration::from_secs(30));
        assert_eq!(cfg.start_grace, Duration::from_secs(10));
        assert!(cfg.start_retry_attempts >= 1);
    }

    #[test]
    fn unset_variable_falls_back_to_default() {
        let v = env_u64("MATCH_TRACKER_TEST_SURELY_UNSET_VAR", 42).unwrap();
        assert_eq!(v, 42);
    }
}
