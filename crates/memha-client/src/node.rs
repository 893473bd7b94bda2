use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::warn;

use memha_common::{Item, MemhaError, NodeDriver, Result};

/// Sentinel key probed by health checks. A miss on this key still proves the
/// node is answering, so it counts as success.
pub const HEALTHCHECK_KEY: &str = "__memha_healthcheck";

/// Outcome of one operation against one node.
///
/// Exactly one of `item`, `error`, `new_value` is the payload; the others
/// stay unset. The originating node rides along so aggregators can target
/// repair writes.
#[derive(Debug)]
pub struct NodeResponse {
    pub node: Arc<Node>,
    pub item: Option<Item>,
    pub error: Option<MemhaError>,
    pub new_value: Option<u64>,
}

impl NodeResponse {
    pub fn ok(node: Arc<Node>) -> Self {
        Self {
            node,
            item: None,
            error: None,
            new_value: None,
        }
    }

    pub fn with_item(node: Arc<Node>, item: Item) -> Self {
        Self {
            node,
            item: Some(item),
            error: None,
            new_value: None,
        }
    }

    pub fn with_error(node: Arc<Node>, error: MemhaError) -> Self {
        Self {
            node,
            item: None,
            error: Some(error),
            new_value: None,
        }
    }

    pub fn with_value(node: Arc<Node>, new_value: u64) -> Self {
        Self {
            node,
            item: None,
            error: None,
            new_value: Some(new_value),
        }
    }
}

/// A live wrapper around one cache endpoint.
///
/// Operations are non-blocking: each spawns its own task, runs the driver
/// call bounded by the node's timeout, and publishes exactly one
/// [`NodeResponse`] to the caller's channel, or discards it when the
/// channel is `None` (the fire-and-forget path repair writes use).
///
/// A transport-level failure (connection error, timeout) flips the node
/// unhealthy as a side effect; the response is still published so
/// aggregators always collect a full set. Protocol-semantic outcomes
/// (`CacheMiss`, `NotStored`) never touch health.
///
/// Nodes are shared between the membership list and every in-flight
/// operation, so all state is behind `&self`.
pub struct Node {
    pub endpoint: String,
    timeout: Duration,
    healthy: AtomicBool,
    driver: Arc<dyn NodeDriver>,
}

impl Node {
    /// Creates a node in the unhealthy state; the first successful health
    /// check brings it into rotation.
    pub fn new(endpoint: impl Into<String>, timeout: Duration, driver: Arc<dyn NodeDriver>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout,
            healthy: AtomicBool::new(false),
            driver,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    /// Store-if-absent. Publishes the driver's outcome verbatim, including
    /// `NotStored` to signal "already present".
    pub fn add(self: Arc<Self>, item: Item, reply: Option<mpsc::Sender<NodeResponse>>) {
        tokio::spawn(async move {
            let response = match self.bounded(self.driver.add(&item)).await {
                Ok(()) => NodeResponse::ok(Arc::clone(&self)),
                Err(err) => failure(&self, err),
            };
            publish(reply, response).await;
        });
    }

    /// Unconditional store.
    pub fn set(self: Arc<Self>, item: Item, reply: Option<mpsc::Sender<NodeResponse>>) {
        tokio::spawn(async move {
            let response = match self.bounded(self.driver.set(&item)).await {
                Ok(()) => NodeResponse::ok(Arc::clone(&self)),
                Err(err) => failure(&self, err),
            };
            publish(reply, response).await;
        });
    }

    /// Fetch; absence is published as a `CacheMiss` response.
    pub fn get(self: Arc<Self>, key: String, reply: Option<mpsc::Sender<NodeResponse>>) {
        tokio::spawn(async move {
            let response = match self.bounded(self.driver.get(&key)).await {
                Ok(item) => NodeResponse::with_item(Arc::clone(&self), item),
                Err(err) => failure(&self, err),
            };
            publish(reply, response).await;
        });
    }

    /// Atomic increment; the response carries the node's new value.
    pub fn increment(
        self: Arc<Self>,
        key: String,
        delta: u64,
        reply: Option<mpsc::Sender<NodeResponse>>,
    ) {
        tokio::spawn(async move {
            let response = match self.bounded(self.driver.increment(&key, delta)).await {
                Ok(value) => NodeResponse::with_value(Arc::clone(&self), value),
                Err(err) => failure(&self, err),
            };
            publish(reply, response).await;
        });
    }

    pub fn delete(self: Arc<Self>, key: String, reply: Option<mpsc::Sender<NodeResponse>>) {
        tokio::spawn(async move {
            let response = match self.bounded(self.driver.delete(&key)).await {
                Ok(()) => NodeResponse::ok(Arc::clone(&self)),
                Err(err) => failure(&self, err),
            };
            publish(reply, response).await;
        });
    }

    pub fn touch(
        self: Arc<Self>,
        key: String,
        expiry_secs: u32,
        reply: Option<mpsc::Sender<NodeResponse>>,
    ) {
        tokio::spawn(async move {
            let response = match self.bounded(self.driver.touch(&key, expiry_secs)).await {
                Ok(()) => NodeResponse::ok(Arc::clone(&self)),
                Err(err) => failure(&self, err),
            };
            publish(reply, response).await;
        });
    }

    /// Minimal liveness probe: fetch the sentinel key, treating a miss as
    /// proof of life. Success marks the node healthy; a transport failure
    /// marks it unhealthy and returns the error.
    pub async fn health_check(&self) -> Result<()> {
        match self.bounded(self.driver.get(HEALTHCHECK_KEY)).await {
            Ok(_) | Err(MemhaError::CacheMiss) => {
                self.healthy.store(true, Ordering::SeqCst);
                Ok(())
            }
            Err(err) => {
                self.healthy.store(false, Ordering::SeqCst);
                Err(err)
            }
        }
    }

    /// Bounds a driver call by the node's timeout; exceeding it is a
    /// transport failure.
    async fn bounded<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(MemhaError::Timeout(self.timeout.as_millis() as u64)),
        }
    }
}

/// Classifies a driver error: transport failures downgrade health, all
/// errors ride back to the aggregator on the response.
fn failure(node: &Arc<Node>, err: MemhaError) -> NodeResponse {
    if err.is_transport() {
        node.healthy.store(false, Ordering::SeqCst);
        warn!(endpoint = %node.endpoint, error = %err, "transport failure, node marked unhealthy");
    }
    NodeResponse::with_error(Arc::clone(node), err)
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("endpoint", &self.endpoint)
            .field("healthy", &self.is_healthy())
            .finish()
    }
}

async fn publish(reply: Option<mpsc::Sender<NodeResponse>>, response: NodeResponse) {
    if let Some(tx) = reply {
        // Channels are sized for one response per node; this never blocks.
        let _ = tx.send(response).await;
    }
}
