//! # Reconciler
//!
//! The pluggable strategy the operator drives for every resource.
//!
//! A reconciler is invoked with a snapshot of the resource from the cache and
//! must move the world towards what the resource describes. It is never called
//! concurrently and is called again and again for the same resource over its
//! lifetime, so it has to be idempotent.
//!
//! Returning an error schedules a retry with exponential backoff. A panic is
//! contained and logged but does not schedule a retry.

use crate::operator::Operator;
use anyhow::Result;
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::Span;

/// Per-invocation context handed to the reconciler
#[derive(Debug, Clone)]
pub struct ReconcileContext {
    key: String,
    attempt: u32,
    span: Span,
}

impl ReconcileContext {
    pub(crate) fn new(key: String, attempt: u32, span: Span) -> Self {
        Self { key, attempt, span }
    }

    /// Cache key of the resource being reconciled
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Number of consecutive failed attempts before this one
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Span the invocation runs in; events logged by the reconciler land in it
    pub fn span(&self) -> &Span {
        &self.span
    }
}

/// Reconciliation strategy for resources of kind `K`
#[async_trait]
pub trait Reconciler<K>: Send + Sync {
    async fn reconcile(&self, ctx: ReconcileContext, op: Operator<K>, res: Arc<K>) -> Result<()>;
}

/// Adapter turning an async closure into a [`Reconciler`]
#[derive(Clone)]
pub struct ReconcilerFn<F>(F);

impl<F> fmt::Debug for ReconcilerFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ReconcilerFn").finish_non_exhaustive()
    }
}

/// Wrap an async closure as a reconciler
///
/// ```rust,ignore
/// let reconciler = reconciler_fn(|ctx, op, res| async move {
///     tracing::info!(resource.key = ctx.key(), "reconciling");
///     Ok(())
/// });
/// ```
pub fn reconciler_fn<K, F, Fut>(f: F) -> ReconcilerFn<F>
where
    F: Fn(ReconcileContext, Operator<K>, Arc<K>) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    ReconcilerFn(f)
}

#[async_trait]
impl<K, F, Fut> Reconciler<K> for ReconcilerFn<F>
where
    K: Send + Sync + 'static,
    F: Fn(ReconcileContext, Operator<K>, Arc<K>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn reconcile(&self, ctx: ReconcileContext, op: Operator<K>, res: Arc<K>) -> Result<()> {
        (self.0)(ctx, op, res).await
    }
}
