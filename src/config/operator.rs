//! # Operator Configuration
//!
//! Operator-level settings loaded from environment variables.

use std::time::Duration;

/// Operator-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Retry backoff base (milliseconds)
    /// Delay before the first retry of a failed reconciliation
    pub backoff_base_ms: u64,
    /// Retry backoff cap (milliseconds)
    pub backoff_max_ms: u64,
    /// Delay before reopening the watch stream after it ended or failed (milliseconds)
    pub watch_reconnect_delay_ms: u64,
    /// Forward every upsert to the dispatcher instead of only generation bumps
    pub skip_generation_check: bool,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            backoff_max_ms: DEFAULT_BACKOFF_MAX_MS,
            watch_reconnect_delay_ms: DEFAULT_WATCH_RECONNECT_DELAY_MS,
            skip_generation_check: false,
        }
    }
}

impl OperatorConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        use crate::constants::*;
        Self {
            backoff_base_ms: env_var_or_default("BACKOFF_BASE_MS", DEFAULT_BACKOFF_BASE_MS),
            backoff_max_ms: env_var_or_default("BACKOFF_MAX_MS", DEFAULT_BACKOFF_MAX_MS),
            watch_reconnect_delay_ms: env_var_or_default(
                "WATCH_RECONNECT_DELAY_MS",
                DEFAULT_WATCH_RECONNECT_DELAY_MS,
            ),
            skip_generation_check: env_var_or_default_bool("SKIP_GENERATION_CHECK", false),
        }
    }

    /// Get backoff base duration
    pub fn backoff_base_duration(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    /// Get backoff max duration
    pub fn backoff_max_duration(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    /// Get watch reconnect delay duration
    pub fn watch_reconnect_delay_duration(&self) -> Duration {
        Duration::from_millis(self.watch_reconnect_delay_ms)
    }
}

/// Read environment variable or return default value
pub(crate) fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read environment variable as boolean or return default
pub(crate) fn env_var_or_default_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| parse_bool(&v))
        .unwrap_or(default)
}

fn parse_bool(value: &str) -> bool {
    let v_lower = value.to_lowercase();
    v_lower == "true" || v_lower == "1" || v_lower == "yes" || v_lower == "on"
}
