//! # Constants
//!
//! Shared constants used throughout the operator runtime.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Default base delay of the retry backoff (milliseconds)
/// The first retry after a failed reconciliation fires after this delay
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 1000;

/// Default cap of the retry backoff (milliseconds)
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 300_000;

/// Default delay before reopening a watch stream (milliseconds)
/// Zero means reconnect immediately
pub const DEFAULT_WATCH_RECONNECT_DELAY_MS: u64 = 0;

/// Resource version used when opening a watch
/// "0" asks the API server for any cached state it already has
pub const WATCH_RESOURCE_VERSION: &str = "0";

/// Default log filter when `RUST_LOG` is not set
pub const DEFAULT_LOG_FILTER: &str = "operator_runtime=info";

/// Field manager used for status patches
pub const FIELD_MANAGER: &str = "operator-runtime";
