//! # Operator
//!
//! Composition root tying the store, the watch loop, the retry scheduler and
//! the reconcile dispatcher together for one resource kind.
//!
//! ```rust,ignore
//! let operator = Operator::builder()
//!     .resource(ResourceType::of::<Test>())
//!     .client(KubeClient::<Test>::new(client))
//!     .reconciler(reconciler_fn(|ctx, op, res| async move { Ok(()) }))
//!     .namespace("skop")
//!     .build()?;
//!
//! tokio::spawn({
//!     let operator = operator.clone();
//!     async move { operator.run().await }
//! });
//! // ...
//! operator.stop();
//! ```
//!
//! An `Operator` is a cheap handle: clones share the same cache, channels and
//! stop signal, and the reconciler receives one with every invocation.

use crate::client::Client;
use crate::config::OperatorConfig;
use crate::controller::reconciler::Reconciler;
use crate::error::{ConfigError, OperatorError};
use crate::resource::{Resource, ResourceType};
use crate::runtime::{dispatcher, watch_loop};
use crate::store::Store;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument, Span};

/// Hand-off channels hold at most one value so that a slow reconciler pushes
/// back on the watch loop and the retry timers.
const HANDOFF_CAPACITY: usize = 1;

/// Running controller for resources of kind `K`
pub struct Operator<K> {
    inner: Arc<Inner<K>>,
}

struct Inner<K> {
    resource_type: ResourceType,
    namespace: Option<String>,
    client: Arc<dyn Client<K>>,
    reconciler: Arc<dyn Reconciler<K>>,
    span: Span,
    config: OperatorConfig,
    store: Store<K>,
    updates: mpsc::Sender<Arc<K>>,
    retries: mpsc::Sender<String>,
    receivers: Mutex<Option<Receivers<K>>>,
    stop: CancellationToken,
}

/// Dispatcher side of the hand-off channels, taken by the first `run`
struct Receivers<K> {
    updates: mpsc::Receiver<Arc<K>>,
    retries: mpsc::Receiver<String>,
}

impl<K> Clone for Operator<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K> fmt::Debug for Operator<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operator")
            .field("resource_type", &self.inner.resource_type)
            .field("namespace", &self.inner.namespace)
            .field("stopped", &self.inner.stop.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl<K: Resource> Operator<K> {
    pub fn builder() -> OperatorBuilder<K> {
        OperatorBuilder::default()
    }

    /// Run the watch loop and the dispatcher until [`Operator::stop`] is called
    ///
    /// The initial watch is opened before anything else; if that fails the
    /// operator does not start and the error is returned. Afterwards watch
    /// failures are logged and the stream is reopened. Returns `Ok(())` once
    /// both loops have exited after a stop.
    ///
    /// An operator runs at most once at a time: a concurrent second call
    /// returns [`OperatorError::AlreadyRunning`]. Once stopped, `run` returns
    /// `Ok(())` without opening a watch.
    pub async fn run(&self) -> Result<(), OperatorError> {
        // Covers both a stop before the first run and a run after a finished one
        if self.is_stopped() {
            info!(parent: &self.inner.span, "Operator already stopped, not starting");
            return Ok(());
        }

        let receivers = self
            .inner
            .receivers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(OperatorError::AlreadyRunning)?;

        async {
            info!(
                resource = %self.inner.resource_type,
                namespace = self.namespace().unwrap_or("*"),
                "Starting operator"
            );

            let opened = tokio::select! {
                biased;
                () = self.inner.stop.cancelled() => {
                    info!("Operator stopped while opening the initial watch");
                    return Ok(());
                }
                opened = self.inner.client.watch(&self.inner.resource_type, self.namespace()) => opened,
            };

            let watcher = match opened {
                Ok(watcher) => watcher,
                Err(source) => {
                    // Hand the receivers back so a later run can try again
                    *self
                        .inner
                        .receivers
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner) = Some(receivers);
                    return Err(OperatorError::Startup {
                        resource: self.inner.resource_type.to_string(),
                        source,
                    });
                }
            };
            debug!("Initial watch opened");

            tokio::join!(
                watch_loop::run(self.clone(), Some(watcher)),
                dispatcher::run(self.clone(), receivers.updates, receivers.retries),
            );

            info!("Operator stopped");
            Ok(())
        }
        .instrument(self.inner.span.clone())
        .await
    }

    /// Signal the operator to stop
    ///
    /// Idempotent and safe to call from anywhere. A reconciliation already in
    /// progress runs to completion; nothing new is started afterwards.
    pub fn stop(&self) {
        if !self.inner.stop.is_cancelled() {
            info!(parent: &self.inner.span, "Stopping operator");
        }
        self.inner.stop.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stop.is_cancelled()
    }

    /// Trigger a reconciliation of every cached resource
    ///
    /// Returns immediately; the keys are queued as retries by a background task
    /// that gives up as soon as the operator stops.
    pub fn reconcile(&self) {
        let op = self.clone();
        let task = async move {
            info!("Reconciling all cached resources");
            for key in op.store().keys() {
                tokio::select! {
                    biased;
                    () = op.inner.stop.cancelled() => return,
                    sent = op.inner.retries.send(key.clone()) => {
                        if sent.is_err() {
                            return;
                        }
                        debug!(resource.key = %key, "Triggered update");
                    }
                }
            }
            debug!("Triggered update for all cached resources");
        }
        .instrument(self.inner.span.clone());

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(task);
            }
            Err(error) => warn!(
                parent: &self.inner.span,
                error = %error,
                "Cannot trigger reconciliation outside of a Tokio runtime"
            ),
        }
    }

    /// Client the operator watches through, for use inside reconcilers
    pub fn client(&self) -> &Arc<dyn Client<K>> {
        &self.inner.client
    }

    /// Read-only view of the resource cache
    pub fn store(&self) -> &Store<K> {
        &self.inner.store
    }

    pub fn resource_type(&self) -> &ResourceType {
        &self.inner.resource_type
    }

    /// Watched namespace; `None` means all namespaces
    pub fn namespace(&self) -> Option<&str> {
        self.inner.namespace.as_deref()
    }

    pub fn config(&self) -> &OperatorConfig {
        &self.inner.config
    }

    pub(crate) fn span(&self) -> &Span {
        &self.inner.span
    }

    pub(crate) fn reconciler(&self) -> Arc<dyn Reconciler<K>> {
        Arc::clone(&self.inner.reconciler)
    }

    pub(crate) fn updates_sender(&self) -> &mpsc::Sender<Arc<K>> {
        &self.inner.updates
    }

    pub(crate) fn retries_sender(&self) -> &mpsc::Sender<String> {
        &self.inner.retries
    }

    pub(crate) fn stop_token(&self) -> &CancellationToken {
        &self.inner.stop
    }
}

/// Builder for [`Operator`]
///
/// `resource`, `client` and `reconciler` are mandatory.
pub struct OperatorBuilder<K> {
    resource_type: Option<ResourceType>,
    client: Option<Arc<dyn Client<K>>>,
    reconciler: Option<Arc<dyn Reconciler<K>>>,
    namespace: Option<String>,
    span: Option<Span>,
    config: OperatorConfig,
    skip_generation_check: Option<bool>,
}

impl<K> Default for OperatorBuilder<K> {
    fn default() -> Self {
        Self {
            resource_type: None,
            client: None,
            reconciler: None,
            namespace: None,
            span: None,
            config: OperatorConfig::default(),
            skip_generation_check: None,
        }
    }
}

impl<K> fmt::Debug for OperatorBuilder<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorBuilder")
            .field("resource_type", &self.resource_type)
            .field("has_client", &self.client.is_some())
            .field("has_reconciler", &self.reconciler.is_some())
            .field("namespace", &self.namespace)
            .field("config", &self.config)
            .field("skip_generation_check", &self.skip_generation_check)
            .finish()
    }
}

impl<K: Resource> OperatorBuilder<K> {
    /// Resource type to watch
    #[must_use]
    pub fn resource(mut self, resource_type: ResourceType) -> Self {
        self.resource_type = Some(resource_type);
        self
    }

    #[must_use]
    pub fn client<C>(self, client: C) -> Self
    where
        C: Client<K> + 'static,
    {
        self.shared_client(Arc::new(client))
    }

    /// Use a client that is already shared elsewhere
    #[must_use]
    pub fn shared_client(mut self, client: Arc<dyn Client<K>>) -> Self {
        self.client = Some(client);
        self
    }

    #[must_use]
    pub fn reconciler<R>(mut self, reconciler: R) -> Self
    where
        R: Reconciler<K> + 'static,
    {
        self.reconciler = Some(Arc::new(reconciler));
        self
    }

    /// Restrict the watch to one namespace; empty means all namespaces
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        self.namespace = (!namespace.is_empty()).then_some(namespace);
        self
    }

    /// Parent span for everything the operator logs
    #[must_use]
    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    #[must_use]
    pub fn config(mut self, config: OperatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Forward every upsert to the reconciler, not only generation bumps
    ///
    /// Overrides `skip_generation_check` from the config.
    #[must_use]
    pub fn skip_generation_check(mut self, skip: bool) -> Self {
        self.skip_generation_check = Some(skip);
        self
    }

    pub fn build(self) -> Result<Operator<K>, ConfigError> {
        let resource_type = self.resource_type.ok_or(ConfigError::MissingResource)?;
        let client = self.client.ok_or(ConfigError::MissingClient)?;
        let reconciler = self.reconciler.ok_or(ConfigError::MissingReconciler)?;

        let span = self.span.unwrap_or_else(|| {
            info_span!("operator", resource = %resource_type)
        });
        let skip_generation_check = self
            .skip_generation_check
            .unwrap_or(self.config.skip_generation_check);

        let (updates_tx, updates_rx) = mpsc::channel(HANDOFF_CAPACITY);
        let (retries_tx, retries_rx) = mpsc::channel(HANDOFF_CAPACITY);

        Ok(Operator {
            inner: Arc::new(Inner {
                resource_type,
                namespace: self.namespace,
                client,
                reconciler,
                span,
                config: self.config,
                store: Store::new(skip_generation_check),
                updates: updates_tx,
                retries: retries_tx,
                receivers: Mutex::new(Some(Receivers {
                    updates: updates_rx,
                    retries: retries_rx,
                })),
                stop: CancellationToken::new(),
            }),
        })
    }
}
