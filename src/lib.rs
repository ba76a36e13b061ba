//! # Operator Runtime
//!
//! A small controller runtime: watch one kind of resource, keep an in-memory
//! cache of it, and drive a user supplied [`Reconciler`] towards the state each
//! resource describes.
//!
//! ## Overview
//!
//! 1. **Watch loop** - keeps the [`Store`] in sync with the watch stream and
//!    reconnects when the stream ends or fails
//! 2. **Dispatcher** - reconciles one resource at a time from live updates and
//!    retries, so the reconciler is never called concurrently
//! 3. **Retry scheduling** - failed reconciliations are retried with capped
//!    exponential backoff (1s, 2s, 4s, ... up to 5 minutes)
//! 4. **Deduplication** - only new resources and generation bumps are
//!    reconciled; status-only changes just refresh the cache
//!
//! ## Usage
//!
//! ```rust,ignore
//! use operator_runtime::prelude::*;
//!
//! let operator = Operator::builder()
//!     .resource(ResourceType::of::<ConfigMap>())
//!     .client(KubeClient::<ConfigMap>::new(client))
//!     .reconciler(reconciler_fn(|ctx, _op, res: Arc<ConfigMap>| async move {
//!         tracing::info!(resource.key = ctx.key(), "reconciling");
//!         Ok(())
//!     }))
//!     .build()?;
//! operator.run().await?;
//! ```
//!
//! [`Reconciler`]: controller::reconciler::Reconciler
//! [`Store`]: store::Store

pub mod client;
pub mod config;
pub mod constants;
pub mod controller;
pub mod error;
pub mod observability;
pub mod operator;
pub mod prelude;
pub mod reconcile;
pub mod resource;
pub mod server;
pub mod store;

mod runtime;

pub use error::{ClientError, ConfigError, OperatorError};
pub use operator::{Operator, OperatorBuilder};
