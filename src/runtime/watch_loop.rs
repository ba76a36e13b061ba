//! # Watch Loop
//!
//! Keeps the store in sync with the watch stream and feeds changed resources
//! to the dispatcher.
//!
//! Each pass clears the store, opens a fresh watch and consumes it until it
//! ends or fails. The API server replays the current state as `Added` events
//! on every new watch, so clearing first rebuilds the cache from scratch and
//! drops anything deleted while the stream was down. A reconnect therefore
//! reconciles every resource once more.

use crate::client::{WatchEvent, Watcher};
use crate::error::ClientError;
use crate::observability::metrics;
use crate::operator::Operator;
use crate::resource::Resource;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, Instrument};

/// Why a watch stream stopped being consumed
#[derive(Debug)]
enum StreamOutcome {
    /// The operator was stopped
    Stopped,
    /// The stream ended cleanly
    Ended,
    Failed(ClientError),
}

/// Run the watch loop until the operator stops
///
/// `initial` is the watch opened by `Operator::run`; later passes open their
/// own.
pub(crate) async fn run<K: Resource>(op: Operator<K>, mut initial: Option<Box<dyn Watcher<K>>>) {
    let span = info_span!(parent: op.span(), "operator.watch");
    async move {
        let stop = op.stop_token();
        info!("Starting watch loop");

        loop {
            if stop.is_cancelled() {
                break;
            }

            op.store().clear();
            metrics::set_cached_resources(0);

            let opened = match initial.take() {
                Some(watcher) => Ok(watcher),
                None => {
                    debug!("Opening watch stream");
                    tokio::select! {
                        biased;
                        () = stop.cancelled() => break,
                        opened = op.client().watch(op.resource_type(), op.namespace()) => opened,
                    }
                }
            };

            let mut watcher = match opened {
                Ok(watcher) => watcher,
                Err(e) => {
                    error!(error = %e, "Failed to open watch stream");
                    metrics::increment_watch_restarts("open_failed");
                    if !pause(&op).await {
                        break;
                    }
                    continue;
                }
            };

            let outcome = consume(&op, &mut watcher).await;
            if let Err(e) = watcher.close().await {
                debug!(error = %e, "Failed to close watch stream");
            }

            match outcome {
                StreamOutcome::Stopped => break,
                StreamOutcome::Ended => {
                    info!("Watch stream ended, reconnecting");
                    metrics::increment_watch_restarts("ended");
                }
                StreamOutcome::Failed(e) => {
                    error!(error = %e, "Watch stream failed, reconnecting");
                    metrics::increment_watch_restarts("failed");
                }
            }

            if !pause(&op).await {
                break;
            }
        }

        info!("Watch loop stopped");
    }
    .instrument(span)
    .await;
}

/// Consume one watch stream until it ends, fails or the operator stops
async fn consume<K: Resource>(op: &Operator<K>, watcher: &mut Box<dyn Watcher<K>>) -> StreamOutcome {
    let stop = op.stop_token();
    let updates = op.updates_sender();

    loop {
        let next = tokio::select! {
            biased;
            () = stop.cancelled() => return StreamOutcome::Stopped,
            next = watcher.next() => next,
        };
        let event = match next {
            Ok(Some(event)) => event,
            Ok(None) => return StreamOutcome::Ended,
            Err(e) => return StreamOutcome::Failed(e),
        };
        metrics::increment_watch_events(event.kind());

        match event {
            WatchEvent::Added(res) | WatchEvent::Modified(res) => {
                let res = Arc::new(res);
                let key = res.key();
                let fresh = op.store().upsert(Arc::clone(&res));
                metrics::set_cached_resources(op.store().len());
                if !fresh {
                    debug!(
                        resource.key = %key,
                        resource.generation = res.generation(),
                        "Skipping update, generation unchanged"
                    );
                    continue;
                }

                debug!(resource.key = %key, "Forwarding resource to dispatcher");
                tokio::select! {
                    biased;
                    () = stop.cancelled() => return StreamOutcome::Stopped,
                    sent = updates.send(res) => {
                        if sent.is_err() {
                            return StreamOutcome::Stopped;
                        }
                    }
                }
            }
            WatchEvent::Deleted(res) => {
                op.store().remove(&res);
                metrics::set_cached_resources(op.store().len());
                debug!(resource.key = %res.key(), "Removed resource from store");
            }
        }
    }
}

/// Wait the configured reconnect delay; false if the operator stopped meanwhile
async fn pause<K: Resource>(op: &Operator<K>) -> bool {
    let stop = op.stop_token();
    let delay = op.config().watch_reconnect_delay_duration();
    if delay.is_zero() {
        tokio::task::yield_now().await;
        return !stop.is_cancelled();
    }

    debug!(delay_ms = delay.as_millis() as u64, "Waiting before reconnecting");
    tokio::select! {
        biased;
        () = stop.cancelled() => false,
        () = tokio::time::sleep(delay) => true,
    }
}
