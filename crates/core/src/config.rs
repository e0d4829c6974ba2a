use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u16(profile: &str, key: &str, default: u16) -> u16 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_usize(profile: &str, key: &str, default: usize) -> usize {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub server: ServerConfig,
    pub queue: QueueConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `DELAYQ_PROFILE` env var. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("DELAYQ_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            server: ServerConfig::from_env_profiled(p),
            queue: QueueConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Reject values the runtime cannot work with.
    pub fn validate(&self) -> Result<(), CoreError> {
        self.queue.validate()
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  server:  {}:{} (shutdown timeout {}s)",
            self.server.host,
            self.server.port,
            self.server.shutdown_timeout_secs
        );
        tracing::info!(
            "  queue:   capacity={}, idle={}s",
            self.queue.inbox_capacity,
            self.queue.idle_timeout.as_secs()
        );
    }
}

// ── Server ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// How long in-flight HTTP requests get to finish after a shutdown signal.
    pub shutdown_timeout_secs: u64,
}

impl ServerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "HOST", "0.0.0.0"),
            port: profiled_env_u16(p, "PORT", 9292),
            shutdown_timeout_secs: profiled_env_u64(p, "SHUTDOWN_TIMEOUT_SECS", 5),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ── Queue ─────────────────────────────────────────────────────

/// Default bound of the producer inbox.
pub const DEFAULT_INBOX_CAPACITY: usize = 8192;

/// Placeholder "never" deadline for an idle timer (one day).
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(86_400);

/// Upper bound for the idle timeout (one year).
pub const MAX_IDLE_TIMEOUT: Duration = Duration::from_secs(86_400 * 365);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Bound of the producer inbox; producers wait when it is full.
    pub inbox_capacity: usize,
    /// Deadline the timer is parked at while nothing is scheduled.
    pub idle_timeout: Duration,
}

impl QueueConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            inbox_capacity: profiled_env_usize(p, "QUEUE_CAPACITY", DEFAULT_INBOX_CAPACITY),
            idle_timeout: Duration::from_secs(profiled_env_u64(
                p,
                "QUEUE_IDLE_SECS",
                DEFAULT_IDLE_TIMEOUT.as_secs(),
            )),
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.inbox_capacity == 0 {
            return Err(CoreError::InvalidConfig {
                key: "QUEUE_CAPACITY",
                reason: "inbox capacity must be at least 1".to_string(),
            });
        }
        if self.idle_timeout.is_zero() {
            return Err(CoreError::InvalidConfig {
                key: "QUEUE_IDLE_SECS",
                reason: "idle timeout must be positive".to_string(),
            });
        }
        if self.idle_timeout > MAX_IDLE_TIMEOUT {
            return Err(CoreError::InvalidConfig {
                key: "QUEUE_IDLE_SECS",
                reason: format!(
                    "idle timeout must be at most {}s",
                    MAX_IDLE_TIMEOUT.as_secs()
                ),
            });
        }
        Ok(())
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            inbox_capacity: DEFAULT_INBOX_CAPACITY,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}
