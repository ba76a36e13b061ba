//! # Logging
//!
//! `tracing` subscriber setup for binaries built on the runtime.
//!
//! Output is human-readable on a terminal and JSON otherwise, so the same
//! binary logs nicely in a shell and is machine-parseable inside a cluster.
//! `LOG_FORMAT=json` or `LOG_FORMAT=text` overrides the detection. The filter
//! comes from `RUST_LOG`, defaulting to `operator_runtime=info`.

use crate::constants::DEFAULT_LOG_FILTER;
use anyhow::{anyhow, Result};
use std::io::IsTerminal;
use tracing_subscriber::EnvFilter;

/// Output format of the log subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    /// Pick the format from `LOG_FORMAT`, falling back to terminal detection
    pub fn detect() -> Self {
        Self::from_setting(
            std::env::var("LOG_FORMAT").ok().as_deref(),
            std::io::stderr().is_terminal(),
        )
    }

    fn from_setting(setting: Option<&str>, is_terminal: bool) -> Self {
        match setting.map(str::to_lowercase).as_deref() {
            Some("json") => Self::Json,
            Some("text" | "pretty" | "logfmt") => Self::Text,
            _ if is_terminal => Self::Text,
            _ => Self::Json,
        }
    }
}

/// Install the global subscriber
///
/// `default_filter` is used when `RUST_LOG` is unset; pass `None` for
/// `operator_runtime=info`. Fails if a global subscriber is already set.
pub fn init_logging(default_filter: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.unwrap_or(DEFAULT_LOG_FILTER).into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match LogFormat::detect() {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    }
    .map_err(|e| anyhow!("failed to install log subscriber: {e}"))
}
