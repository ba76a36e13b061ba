//! # Configuration
//!
//! - `operator`: retry backoff, watch reconnect and dedup settings
//! - `server`: metrics and probe server settings

mod operator;
mod server;

pub use operator::OperatorConfig;
pub use server::ServerConfig;
