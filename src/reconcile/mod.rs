//! # Reconcile Helpers
//!
//! Idempotent building blocks for reconcilers, generic over any [`Client`].
//!
//! - [`presence`]: make sure an object exists
//! - [`absence`]: make sure an object is gone
//! - [`apply`]: create an object or bring an existing one in line
//! - [`kinds`]: `apply` with the right merge for common built-in kinds
//!
//! [`Client`]: crate::client::Client

mod absence;
mod apply;
pub mod kinds;
mod presence;

pub use absence::{absence, absence_propagated};
pub use apply::{apply, merge_metadata};
pub use presence::presence;
