//! # Controller
//!
//! Reconciliation building blocks.
//!
//! - `backoff`: exponential backoff for failed reconciliations
//! - `reconciler`: the reconciler trait and its invocation context

pub mod backoff;
pub mod reconciler;
