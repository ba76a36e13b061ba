//! # Reconcile Dispatcher
//!
//! Single consumer of the update and retry channels.
//!
//! The dispatcher reconciles one resource at a time, so the reconciler is
//! never called concurrently. Each invocation runs in its own task: a panic
//! in user code is caught at the task boundary, logged, and leaves the retry
//! table untouched, so a panicking resource is only retried when the watch
//! delivers a new generation or a resync is requested.
//!
//! Updates and retries are served in turn when both are waiting, so a backlog
//! of watch events cannot hold back retries and resyncs.

use crate::controller::backoff::ExponentialBackoff;
use crate::controller::reconciler::ReconcileContext;
use crate::observability::metrics;
use crate::operator::Operator;
use crate::resource::Resource;
use crate::runtime::retry::RetryTable;
use std::any::Any;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tracing::{debug, error, info, info_span, warn, Instrument};

enum Input<K> {
    Update(Arc<K>),
    Retry(String),
}

/// Run the dispatcher until the operator stops
///
/// A reconciliation in progress when the stop arrives runs to completion.
pub(crate) async fn run<K: Resource>(
    op: Operator<K>,
    mut updates: mpsc::Receiver<Arc<K>>,
    mut retries: mpsc::Receiver<String>,
) {
    let span = info_span!(parent: op.span(), "operator.dispatch");
    async move {
        let stop = op.stop_token().clone();
        let mut table = RetryTable::new(ExponentialBackoff::from_config(op.config()));
        info!("Starting reconcile dispatcher");

        // The input served last yields to the other one when both are ready
        let mut prefer_retries = false;
        loop {
            if stop.is_cancelled() {
                break;
            }
            let input = if prefer_retries {
                tokio::select! {
                    biased;
                    () = stop.cancelled() => break,
                    Some(key) = retries.recv() => Input::Retry(key),
                    Some(res) = updates.recv() => Input::Update(res),
                }
            } else {
                tokio::select! {
                    biased;
                    () = stop.cancelled() => break,
                    Some(res) = updates.recv() => Input::Update(res),
                    Some(key) = retries.recv() => Input::Retry(key),
                }
            };

            let res = match input {
                Input::Update(res) => {
                    debug!(resource.key = %res.key(), "Got resource from update channel");
                    prefer_retries = true;
                    res
                }
                Input::Retry(key) => {
                    debug!(resource.key = %key, "Got key from retry channel");
                    prefer_retries = false;
                    match op.store().get(&key) {
                        Some(res) => res,
                        None => {
                            debug!(resource.key = %key, "Resource no longer cached, skipping retry");
                            metrics::increment_retries_skipped();
                            table.forget(&key);
                            continue;
                        }
                    }
                }
            };

            dispatch(&op, &mut table, res).await;
        }

        info!(pending_retries = table.len(), "Reconcile dispatcher stopped");
    }
    .instrument(span)
    .await;
}

/// Reconcile one resource and update its retry schedule from the outcome
async fn dispatch<K: Resource>(op: &Operator<K>, table: &mut RetryTable, res: Arc<K>) {
    let key = res.key();
    table.cancel_pending(&key);
    let attempt = table.failures(&key);

    let span = info_span!(
        parent: op.span(),
        "operator.reconcile",
        resource.key = %key,
        resource.generation = res.generation(),
        attempt
    );
    let ctx = ReconcileContext::new(key.clone(), attempt, span.clone());
    let reconciler = op.reconciler();
    let handle = tokio::spawn({
        let op = op.clone();
        async move { reconciler.reconcile(ctx, op, res).await }.instrument(span.clone())
    });

    debug!(parent: &span, "Calling reconciler");
    let start = Instant::now();
    let outcome = handle.await;
    let elapsed = start.elapsed();
    metrics::increment_reconciliations();
    metrics::observe_reconciliation_duration(elapsed.as_secs_f64());

    match outcome {
        Ok(Ok(())) => {
            debug!(
                parent: &span,
                duration_ms = elapsed.as_millis() as u64,
                "Reconciler ran without errors"
            );
            table.record_success(&key);
        }
        Ok(Err(e)) => {
            metrics::increment_reconciliation_errors();
            let delay = table.record_failure(
                &key,
                op.retries_sender(),
                op.stop_token(),
                span.clone(),
            );
            warn!(
                parent: &span,
                error = %format!("{e:#}"),
                retry_in_ms = delay.as_millis() as u64,
                "Reconciler failed, scheduling retry"
            );
        }
        Err(e) => report_join_error(&span, e),
    }
}

fn report_join_error(span: &tracing::Span, error: JoinError) {
    if error.is_panic() {
        metrics::increment_reconciliation_panics();
        error!(
            parent: span,
            panic = %panic_message(error.into_panic()),
            "Reconciler panicked"
        );
    } else {
        warn!(parent: span, error = %error, "Reconciler task was cancelled");
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(message) => (*message).to_string(),
            Err(_) => "unknown panic payload".to_string(),
        },
    }
}
