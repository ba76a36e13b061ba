//! Common test utilities for operator integration tests
//!
//! Provides an in-memory `Client` whose watch streams are fed by the test, and
//! a small `Test` custom resource to run operators against.

#![allow(dead_code, reason = "each test crate uses a different subset")]

use async_trait::async_trait;
use kube::CustomResource;
use operator_runtime::client::{Client, Propagation, WatchEvent, Watcher};
use operator_runtime::controller::reconciler::ReconcileContext;
use operator_runtime::error::ClientError;
use operator_runtime::resource::{Resource, ResourceType};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

pub const NAMESPACE: &str = "skop";

#[derive(CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(group = "example.com", version = "v1", kind = "Test", namespaced)]
pub struct TestSpec {
    pub text: String,
}

/// A `Test` in the test namespace with the given generation
pub fn test_resource(name: &str, generation: i64, text: &str) -> Test {
    let mut test = Test::new(
        name,
        TestSpec {
            text: text.to_string(),
        },
    );
    test.metadata.namespace = Some(NAMESPACE.to_string());
    test.metadata.generation = Some(generation);
    test.metadata.uid = Some(format!("uid-{name}"));
    test
}

pub fn key(name: &str) -> String {
    format!("{NAMESPACE}/{name}")
}

pub fn test_type() -> ResourceType {
    ResourceType::of::<Test>()
}

/// What a reconciler saw on one invocation
#[derive(Debug, Clone)]
pub struct Invocation {
    pub key: String,
    pub text: String,
    pub generation: i64,
    pub attempt: u32,
    pub at: Instant,
}

impl Invocation {
    pub fn new(ctx: &ReconcileContext, res: &Test) -> Self {
        Self {
            key: ctx.key().to_string(),
            text: res.spec.text.clone(),
            generation: res.generation(),
            attempt: ctx.attempt(),
            at: Instant::now(),
        }
    }
}

/// Receive the next invocation, failing the test after a generous timeout
pub async fn next_invocation(rx: &mut mpsc::UnboundedReceiver<Invocation>) -> Invocation {
    tokio::time::timeout(Duration::from_secs(3600), rx.recv())
        .await
        .expect("timed out waiting for a reconciliation")
        .expect("reconciler channel closed")
}

/// Assert that nothing is reconciled within `within`
pub async fn assert_no_invocation(rx: &mut mpsc::UnboundedReceiver<Invocation>, within: Duration) {
    if let Ok(Some(invocation)) = tokio::time::timeout(within, rx.recv()).await {
        panic!("unexpected reconciliation: {invocation:?}");
    }
}

/// Poll `condition` until it holds, failing the test after a timeout
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(3600), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Client operation, for recording and error injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Create,
    Get,
    Update,
    Delete,
}

type EventResult<K> = Result<WatchEvent<K>, ClientError>;

/// Sending half of one scripted watch stream
#[derive(Debug)]
pub struct WatchFeed<K> {
    tx: mpsc::UnboundedSender<EventResult<K>>,
}

impl<K> WatchFeed<K> {
    pub fn added(&self, res: K) {
        self.send(Ok(WatchEvent::Added(res)));
    }

    pub fn modified(&self, res: K) {
        self.send(Ok(WatchEvent::Modified(res)));
    }

    pub fn deleted(&self, res: K) {
        self.send(Ok(WatchEvent::Deleted(res)));
    }

    /// Make the stream fail with an error
    pub fn fail(&self, message: &str) {
        self.send(Err(ClientError::Stream(message.to_string())));
    }

    /// End the stream cleanly
    pub fn end(self) {}

    fn send(&self, event: EventResult<K>) {
        // The watcher may already be closed after a stop; that is fine
        let _ = self.tx.send(event);
    }
}

/// Watch stream handed out by [`FakeClient::watch`]
#[derive(Debug)]
pub struct FakeWatcher<K> {
    rx: mpsc::UnboundedReceiver<EventResult<K>>,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl<K: Send + 'static> Watcher<K> for FakeWatcher<K> {
    async fn next(&mut self) -> Result<Option<WatchEvent<K>>, ClientError> {
        match self.rx.recv().await {
            Some(event) => event.map(Some),
            None => Ok(None),
        }
    }

    async fn close(&mut self) -> Result<(), ClientError> {
        self.rx.close();
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FakeState<K> {
    objects: Mutex<BTreeMap<String, K>>,
    calls: Mutex<Vec<(Op, String)>>,
    // Propagation policy of every delete, `None` for a plain delete
    deletes: Mutex<Vec<(String, Option<Propagation>)>>,
    errors: Mutex<HashMap<Op, VecDeque<ClientError>>>,
    watches: Mutex<VecDeque<Result<mpsc::UnboundedReceiver<EventResult<K>>, ClientError>>>,
    // Keeps unscripted watch streams open so they never end on their own
    idle_feeds: Mutex<Vec<mpsc::UnboundedSender<EventResult<K>>>>,
    watch_calls: AtomicUsize,
    closed_watches: Arc<AtomicUsize>,
}

/// In-memory client with scripted watch streams
///
/// Clones share state, so a test keeps one clone to drive the streams and
/// inspect calls while the operator owns another.
pub struct FakeClient<K> {
    state: Arc<FakeState<K>>,
}

impl<K> Clone for FakeClient<K> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<K> std::fmt::Debug for FakeClient<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeClient").finish_non_exhaustive()
    }
}

impl<K> Default for FakeClient<K> {
    fn default() -> Self {
        Self {
            state: Arc::new(FakeState {
                objects: Mutex::new(BTreeMap::new()),
                calls: Mutex::new(Vec::new()),
                deletes: Mutex::new(Vec::new()),
                errors: Mutex::new(HashMap::new()),
                watches: Mutex::new(VecDeque::new()),
                idle_feeds: Mutex::new(Vec::new()),
                watch_calls: AtomicUsize::new(0),
                closed_watches: Arc::new(AtomicUsize::new(0)),
            }),
        }
    }
}

impl<K: Resource> FakeClient<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the stream returned by the next unscripted `watch` call
    pub fn push_watch(&self) -> WatchFeed<K> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state.watches.lock().unwrap().push_back(Ok(rx));
        WatchFeed { tx }
    }

    /// Make the next unscripted `watch` call fail
    pub fn fail_next_watch(&self, error: ClientError) {
        self.state.watches.lock().unwrap().push_back(Err(error));
    }

    /// Make the next call of `op` fail with `error`
    pub fn fail_next(&self, op: Op, error: ClientError) {
        self.state
            .errors
            .lock()
            .unwrap()
            .entry(op)
            .or_default()
            .push_back(error);
    }

    pub fn insert(&self, res: K) {
        self.state.objects.lock().unwrap().insert(res.key(), res);
    }

    pub fn object(&self, key: &str) -> Option<K> {
        self.state.objects.lock().unwrap().get(key).cloned()
    }

    pub fn calls(&self) -> Vec<(Op, String)> {
        self.state.calls.lock().unwrap().clone()
    }

    pub fn deletes(&self) -> Vec<(String, Option<Propagation>)> {
        self.state.deletes.lock().unwrap().clone()
    }

    pub fn watch_calls(&self) -> usize {
        self.state.watch_calls.load(Ordering::SeqCst)
    }

    pub fn closed_watches(&self) -> usize {
        self.state.closed_watches.load(Ordering::SeqCst)
    }

    fn record(&self, op: Op, key: String) -> Result<(), ClientError> {
        self.state.calls.lock().unwrap().push((op, key));
        match self
            .state
            .errors
            .lock()
            .unwrap()
            .get_mut(&op)
            .and_then(VecDeque::pop_front)
        {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn remove(&self, res: &K, propagation: Option<Propagation>) -> Result<(), ClientError> {
        let key = res.key();
        self.state
            .deletes
            .lock()
            .unwrap()
            .push((key.clone(), propagation));
        self.record(Op::Delete, key.clone())?;
        self.state
            .objects
            .lock()
            .unwrap()
            .remove(&key)
            .map(|_| ())
            .ok_or(ClientError::NotFound(key))
    }
}

#[async_trait]
impl<K: Resource> Client<K> for FakeClient<K> {
    async fn create(&self, res: &K) -> Result<(), ClientError> {
        let key = res.key();
        self.record(Op::Create, key.clone())?;
        let mut objects = self.state.objects.lock().unwrap();
        if objects.contains_key(&key) {
            return Err(ClientError::Conflict(key));
        }
        objects.insert(key, res.clone());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<K, ClientError> {
        self.record(Op::Get, key.to_string())?;
        self.object(key)
            .ok_or_else(|| ClientError::NotFound(key.to_string()))
    }

    async fn update(&self, res: &K) -> Result<(), ClientError> {
        let key = res.key();
        self.record(Op::Update, key.clone())?;
        let mut objects = self.state.objects.lock().unwrap();
        match objects.get_mut(&key) {
            Some(existing) => {
                *existing = res.clone();
                Ok(())
            }
            None => Err(ClientError::NotFound(key)),
        }
    }

    async fn delete(&self, res: &K) -> Result<(), ClientError> {
        self.remove(res, None)
    }

    async fn delete_propagated(
        &self,
        res: &K,
        propagation: Propagation,
    ) -> Result<(), ClientError> {
        self.remove(res, Some(propagation))
    }

    async fn watch(
        &self,
        _resource_type: &ResourceType,
        _namespace: Option<&str>,
    ) -> Result<Box<dyn Watcher<K>>, ClientError> {
        self.state.watch_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.state.watches.lock().unwrap().pop_front();
        let rx = match scripted {
            Some(Ok(rx)) => rx,
            Some(Err(error)) => return Err(error),
            None => {
                let (tx, rx) = mpsc::unbounded_channel();
                self.state.idle_feeds.lock().unwrap().push(tx);
                rx
            }
        };
        Ok(Box::new(FakeWatcher {
            rx,
            closed: Arc::clone(&self.state.closed_watches),
        }))
    }
}
