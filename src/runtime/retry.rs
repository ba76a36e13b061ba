//! # Retry Scheduling
//!
//! Per-resource retry bookkeeping for failed reconciliations.
//!
//! Every key with outstanding failures has one entry holding its consecutive
//! failure count and the handle of its pending timer. When a timer fires it
//! pushes the key onto the retry channel, and the dispatcher reconciles
//! whatever version of the resource is cached at that point.
//!
//! The table is owned by the dispatcher and only touched from its task, so
//! it needs no locking.

use crate::controller::backoff::ExponentialBackoff;
use crate::observability::metrics;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, Instrument, Span};

#[derive(Debug)]
struct RetrySchedule {
    failures: u32,
    timer: Option<AbortHandle>,
}

/// Failure counts and pending retry timers, keyed by resource key
#[derive(Debug)]
pub(crate) struct RetryTable {
    backoff: ExponentialBackoff,
    schedules: HashMap<String, RetrySchedule>,
}

impl RetryTable {
    pub(crate) fn new(backoff: ExponentialBackoff) -> Self {
        Self {
            backoff,
            schedules: HashMap::new(),
        }
    }

    /// Consecutive failures recorded for `key` since its last success
    pub(crate) fn failures(&self, key: &str) -> u32 {
        self.schedules.get(key).map_or(0, |s| s.failures)
    }

    /// Whether a retry timer is pending for `key`
    #[cfg(test)]
    pub(crate) fn is_pending(&self, key: &str) -> bool {
        self.schedules
            .get(key)
            .and_then(|s| s.timer.as_ref())
            .is_some_and(|timer| !timer.is_finished())
    }

    /// Cancel the pending timer of `key`, keeping its failure count
    ///
    /// Called right before a reconciliation starts, so a timer never fires for
    /// a key that is already being reconciled.
    pub(crate) fn cancel_pending(&mut self, key: &str) {
        if let Some(timer) = self.schedules.get_mut(key).and_then(|s| s.timer.take()) {
            timer.abort();
        }
    }

    /// Forget everything about `key` after a successful reconciliation
    pub(crate) fn record_success(&mut self, key: &str) {
        self.forget(key);
    }

    /// Drop the failure count and pending timer of `key`
    ///
    /// Used when a retry fires for a resource that is no longer cached.
    pub(crate) fn forget(&mut self, key: &str) {
        if let Some(schedule) = self.schedules.remove(key) {
            if let Some(timer) = schedule.timer {
                timer.abort();
            }
        }
    }

    /// Bump the failure count of `key` and start its retry timer
    ///
    /// Returns the delay the timer was started with.
    pub(crate) fn record_failure(
        &mut self,
        key: &str,
        retries: &mpsc::Sender<String>,
        stop: &CancellationToken,
        span: Span,
    ) -> Duration {
        let schedule = self
            .schedules
            .entry(key.to_string())
            .or_insert(RetrySchedule {
                failures: 0,
                timer: None,
            });
        let delay = self.backoff.delay(schedule.failures);
        schedule.failures = schedule.failures.saturating_add(1);

        if let Some(previous) = schedule.timer.take() {
            previous.abort();
        }
        schedule.timer = Some(spawn_timer(
            key.to_string(),
            delay,
            retries.clone(),
            stop.clone(),
            span,
        ));
        metrics::increment_retries_scheduled();
        delay
    }

    pub(crate) fn len(&self) -> usize {
        self.schedules.len()
    }
}

impl Drop for RetryTable {
    fn drop(&mut self) {
        for schedule in self.schedules.values() {
            if let Some(timer) = &schedule.timer {
                timer.abort();
            }
        }
    }
}

/// Sleep for `delay`, then hand `key` to the dispatcher unless the operator
/// stopped in the meantime
fn spawn_timer(
    key: String,
    delay: Duration,
    retries: mpsc::Sender<String>,
    stop: CancellationToken,
    span: Span,
) -> AbortHandle {
    let task = async move {
        tokio::select! {
            biased;
            () = stop.cancelled() => {}
            () = tokio::time::sleep(delay) => {
                tokio::select! {
                    biased;
                    () = stop.cancelled() => {
                        debug!(resource.key = %key, "Dropping retry, operator stopped");
                    }
                    sent = retries.send(key.clone()) => {
                        if sent.is_ok() {
                            debug!(resource.key = %key, "Retry timer fired");
                        }
                    }
                }
            }
        }
    };
    tokio::spawn(task.instrument(span)).abort_handle()
}
