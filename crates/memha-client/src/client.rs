use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use memha_common::{DriverFactory, Item, MemhaError, Result};
use memha_driver::TextDriverFactory;

use crate::node::{Node, NodeResponse};
use crate::node_list::NodeList;
use crate::source::NodeSource;

/// How often the supervisor loop wakes to check whether a cadence elapsed.
const SUPERVISOR_TICK: Duration = Duration::from_millis(100);

/// Poll cadence of [`Client::wait_for_nodes`].
const WAIT_FOR_NODES_POLL: Duration = Duration::from_millis(100);

/// Tunables for a [`Client`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Per-request bound applied by every node to every operation.
    ///
    /// Default: 100ms
    pub timeout: Duration,
    /// Period between polls of the node sources for membership changes.
    ///
    /// Default: 10 seconds
    pub get_nodes_period: Duration,
    /// Period between health check sweeps over the pool.
    ///
    /// Default: 5 seconds
    pub healthcheck_period: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(100),
            get_nodes_period: Duration::from_secs(10),
            healthcheck_period: Duration::from_secs(5),
        }
    }
}

struct Supervisor {
    shutdown_tx: mpsc::Sender<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

struct ClientInner {
    nodes: Arc<NodeList>,
    sources: Vec<Arc<dyn NodeSource>>,
    factory: Arc<dyn DriverFactory>,
    config: ClientConfig,
    supervisor: Mutex<Option<Supervisor>>,
}

/// High-availability cache client fronting a pool of memcache nodes.
///
/// Every write fans out to every healthy node; reads are served from a
/// quorum-sized subset with asynchronous read-repair when replicas diverge.
/// There is no partitioning: each node holds the full key space, so the
/// pool survives any subset of nodes as long as one stays healthy
/// ("fail-open").
///
/// A background supervisor, started with [`Client::start`], polls the
/// configured [`NodeSource`]s to converge pool membership and runs periodic
/// health checks. Operations dispatch only to nodes currently marked
/// healthy and fail with [`MemhaError::NoHealthyNodes`] when there are
/// none.
///
/// `Client` is cheap to clone; clones share the pool and the supervisor.
///
/// # Example
///
/// ```no_run
/// use memha_client::{Client, StaticNodeSource, NodeSource};
/// use memha_common::Item;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let source: Arc<dyn NodeSource> =
///     Arc::new(StaticNodeSource::new(["10.0.0.1:11211", "10.0.0.2:11211"]));
/// let client = Client::new(vec![source]);
///
/// client.start().await?;
/// client.wait_for_nodes(Duration::from_secs(5)).await?;
///
/// client.set(Item::new("greeting", b"hello".to_vec())).await?;
/// let item = client.get("greeting").await?;
/// assert_eq!(item.value, b"hello");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Creates a client with default configuration and the bundled memcache
    /// text-protocol driver.
    pub fn new(sources: Vec<Arc<dyn NodeSource>>) -> Self {
        Self::with_driver_factory(sources, ClientConfig::default(), Arc::new(TextDriverFactory))
    }

    /// Creates a client with custom tunables and the bundled driver.
    pub fn with_config(sources: Vec<Arc<dyn NodeSource>>, config: ClientConfig) -> Self {
        Self::with_driver_factory(sources, config, Arc::new(TextDriverFactory))
    }

    /// Creates a client with custom tunables and a custom driver factory.
    pub fn with_driver_factory(
        sources: Vec<Arc<dyn NodeSource>>,
        config: ClientConfig,
        factory: Arc<dyn DriverFactory>,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                nodes: Arc::new(NodeList::new()),
                sources,
                factory,
                config,
                supervisor: Mutex::new(None),
            }),
        }
    }

    /// The effective membership. Exposed for observation; membership is
    /// owned by the supervisor.
    pub fn nodes(&self) -> Arc<NodeList> {
        Arc::clone(&self.inner.nodes)
    }

    /// Starts the supervisor loop. Call before any operations.
    pub async fn start(&self) -> Result<()> {
        let mut supervisor = self.inner.supervisor.lock().await;
        if supervisor.is_some() {
            return Err(MemhaError::AlreadyRunning);
        }

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(run_supervisor(inner, shutdown_rx));
        *supervisor = Some(Supervisor {
            shutdown_tx,
            handle,
        });
        Ok(())
    }

    /// Requests supervisor termination and blocks until it acknowledges.
    /// In-flight operations are not cancelled.
    pub async fn stop(&self) -> Result<()> {
        let supervisor = self.inner.supervisor.lock().await.take();
        let Some(supervisor) = supervisor else {
            return Err(MemhaError::NotRunning);
        };

        let (ack_tx, ack_rx) = oneshot::channel();
        if supervisor.shutdown_tx.send(ack_tx).await.is_ok() {
            let _ = ack_rx.await;
        }
        let _ = supervisor.handle.await;
        Ok(())
    }

    /// Waits until at least one node is healthy, polling at a ~100ms
    /// cadence; [`MemhaError::NoHealthyNodes`] once `timeout` elapses.
    pub async fn wait_for_nodes(&self, timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if self.inner.nodes.healthy_count().await > 0 {
                return Ok(());
            }
            tokio::time::sleep(WAIT_FOR_NODES_POLL).await;
        }
        Err(MemhaError::NoHealthyNodes)
    }

    /// Writes `item` to every healthy node.
    ///
    /// Individual node outcomes are not surfaced: a node that fails
    /// transport has already been marked unhealthy, and as long as at least
    /// one node stays healthy the write counts. Only a pool that emptied
    /// mid-operation fails.
    pub async fn set(&self, item: Item) -> Result<()> {
        let targets = self.healthy_snapshot().await?;
        let count = targets.len();
        let (tx, mut rx) = mpsc::channel(count);
        for node in &targets {
            Arc::clone(node).set(item.clone(), Some(tx.clone()));
        }
        drop(tx);

        let nodes = Arc::clone(&self.inner.nodes);
        let aggregator = tokio::spawn(async move {
            for _ in 0..count {
                if rx.recv().await.is_none() {
                    break;
                }
            }
            if nodes.healthy_count().await == 0 {
                return Err(MemhaError::NoHealthyNodes);
            }
            Ok(())
        });
        aggregator.await.unwrap_or(Err(MemhaError::Unknown))
    }

    /// Writes `item` only if no value exists for its key on any healthy
    /// node; [`MemhaError::NotStored`] otherwise.
    ///
    /// When replicas disagree (some held a value, some accepted the new
    /// one), the existing value is authoritative: the freshly-written
    /// replicas are repaired back to it in the background and the caller
    /// sees `NotStored`. If the surviving value cannot be re-read, the
    /// repair is skipped rather than guessed at; a later read-repair cycle
    /// converges the stragglers.
    pub async fn add(&self, item: Item) -> Result<()> {
        let targets = self.healthy_snapshot().await?;
        let count = targets.len();
        let (tx, mut rx) = mpsc::channel(count);
        for node in &targets {
            Arc::clone(node).add(item.clone(), Some(tx.clone()));
        }
        drop(tx);

        let client = self.clone();
        let key = item.key.clone();
        let aggregator = tokio::spawn(async move {
            let mut already_present = false;
            let mut freshly_stored: Vec<Arc<Node>> = Vec::new();
            for _ in 0..count {
                let Some(response) = rx.recv().await else { break };
                match response.error {
                    Some(MemhaError::NotStored) => already_present = true,
                    None => freshly_stored.push(response.node),
                    // Transport errors already downgraded the node's health.
                    Some(_) => {}
                }
            }

            if already_present {
                if !freshly_stored.is_empty() {
                    match client.get(&key).await {
                        Ok(existing) => {
                            info!(
                                key = %key,
                                nodes = freshly_stored.len(),
                                "add: reverting freshly-written replicas to the existing value"
                            );
                            for node in &freshly_stored {
                                Arc::clone(node).set(existing.clone(), None);
                            }
                        }
                        Err(err) => {
                            warn!(
                                key = %key,
                                error = %err,
                                "add: cannot re-read existing value, skipping repair"
                            );
                        }
                    }
                }
                return Err(MemhaError::NotStored);
            }

            if client.inner.nodes.healthy_count().await == 0 {
                return Err(MemhaError::NoHealthyNodes);
            }
            Ok(())
        });
        aggregator.await.unwrap_or(Err(MemhaError::Unknown))
    }

    /// Reads `key` from a quorum of healthy nodes.
    ///
    /// With more than two healthy nodes only ⌈n/2⌉ randomly chosen replicas
    /// are contacted, bounding read amplification while still spotting gaps:
    /// any quorum member that missed is asynchronously repaired with the
    /// value the others returned.
    pub async fn get(&self, key: &str) -> Result<Item> {
        let mut targets = self.healthy_snapshot().await?;
        if targets.len() > 2 {
            let quorum = targets.len().div_ceil(2);
            targets.shuffle(&mut rand::rng());
            targets.truncate(quorum);
        }
        let count = targets.len();
        let (tx, mut rx) = mpsc::channel(count);
        for node in &targets {
            Arc::clone(node).get(key.to_string(), Some(tx.clone()));
        }
        drop(tx);

        let nodes = Arc::clone(&self.inner.nodes);
        let key = key.to_string();
        let aggregator = tokio::spawn(async move {
            let mut found: Option<Item> = None;
            let mut missing: Vec<Arc<Node>> = Vec::new();
            for _ in 0..count {
                let Some(response) = rx.recv().await else { break };
                match (response.item, response.error) {
                    (Some(item), None) => found = Some(item),
                    (_, Some(MemhaError::CacheMiss)) => missing.push(response.node),
                    _ => {}
                }
            }

            let Some(item) = found else {
                return Err(MemhaError::CacheMiss);
            };

            if !missing.is_empty() {
                info!(key = %key, nodes = missing.len(), "get: repairing replicas that missed");
                for node in &missing {
                    Arc::clone(node).set(item.clone(), None);
                }
            }

            if nodes.healthy_count().await == 0 {
                return Err(MemhaError::NoHealthyNodes);
            }
            Ok(item)
        });
        aggregator.await.unwrap_or(Err(MemhaError::Unknown))
    }

    /// Atomically increments the decimal value under `key` by `delta` on
    /// every healthy node, returning the highest post-increment value.
    ///
    /// Independent per-node increments only agree when every replica held
    /// the key and stayed healthy; any skew leaves some replicas behind.
    /// The maximum is authoritative (increments are monotone), so lagging
    /// replicas and outright misses are repaired with the full item
    /// re-read from a node holding the maximum; the increment reply alone
    /// carries neither flags nor expiry.
    ///
    /// [`MemhaError::CacheMiss`] when the key exists nowhere. Wraps at 64
    /// bits, as the underlying protocol does.
    pub async fn increment(&self, key: &str, delta: u64) -> Result<u64> {
        let targets = self.healthy_snapshot().await?;
        let count = targets.len();
        let (tx, mut rx) = mpsc::channel(count);
        for node in &targets {
            Arc::clone(node).increment(key.to_string(), delta, Some(tx.clone()));
        }
        drop(tx);

        let nodes = Arc::clone(&self.inner.nodes);
        let key = key.to_string();
        let aggregator = tokio::spawn(async move {
            let mut observed: Vec<(Arc<Node>, u64)> = Vec::new();
            let mut to_repair: Vec<Arc<Node>> = Vec::new();
            for _ in 0..count {
                let Some(response) = rx.recv().await else { break };
                match (response.new_value, response.error) {
                    (Some(value), None) => observed.push((response.node, value)),
                    (_, Some(MemhaError::CacheMiss)) => to_repair.push(response.node),
                    _ => {}
                }
            }

            let Some(max) = observed.iter().map(|(_, value)| *value).max() else {
                return Err(MemhaError::CacheMiss);
            };
            let leader = observed
                .iter()
                .find(|(_, value)| *value == max)
                .map(|(node, _)| Arc::clone(node));
            to_repair.extend(
                observed
                    .iter()
                    .filter(|(_, value)| *value < max)
                    .map(|(node, _)| Arc::clone(node)),
            );

            if !to_repair.is_empty() {
                if let Some(leader) = leader {
                    // The repair write needs the item's encoded form and
                    // expiry, which only a real read provides.
                    let (reread_tx, mut reread_rx) = mpsc::channel(1);
                    leader.get(key.clone(), Some(reread_tx));
                    match reread_rx.recv().await {
                        Some(NodeResponse {
                            item: Some(item),
                            error: None,
                            ..
                        }) => {
                            info!(key = %key, nodes = to_repair.len(), "increment: repairing lagging replicas");
                            for node in &to_repair {
                                Arc::clone(node).set(item.clone(), None);
                            }
                        }
                        _ => {
                            warn!(key = %key, "increment: cannot re-read from lead node, skipping repair");
                        }
                    }
                }
            }

            if nodes.healthy_count().await == 0 {
                return Err(MemhaError::NoHealthyNodes);
            }
            Ok(max)
        });
        aggregator.await.unwrap_or(Err(MemhaError::Unknown))
    }

    /// Deletes `key` from every healthy node. [`MemhaError::CacheMiss`] if
    /// any of them did not hold it; absence is already the goal state, so
    /// no repair follows.
    pub async fn delete(&self, key: &str) -> Result<()> {
        let targets = self.healthy_snapshot().await?;
        let count = targets.len();
        let (tx, mut rx) = mpsc::channel(count);
        for node in &targets {
            Arc::clone(node).delete(key.to_string(), Some(tx.clone()));
        }
        drop(tx);

        let nodes = Arc::clone(&self.inner.nodes);
        let aggregator = tokio::spawn(async move {
            let mut missed = false;
            for _ in 0..count {
                let Some(response) = rx.recv().await else { break };
                if matches!(response.error, Some(MemhaError::CacheMiss)) {
                    missed = true;
                }
            }
            if nodes.healthy_count().await == 0 {
                return Err(MemhaError::NoHealthyNodes);
            }
            if missed {
                Err(MemhaError::CacheMiss)
            } else {
                Ok(())
            }
        });
        aggregator.await.unwrap_or(Err(MemhaError::Unknown))
    }

    /// Updates the expiry of `key` on every healthy node without touching
    /// its value. Surfaces [`MemhaError::CacheMiss`] like [`Client::delete`];
    /// no repair.
    pub async fn touch(&self, key: &str, expiry_secs: u32) -> Result<()> {
        let targets = self.healthy_snapshot().await?;
        let count = targets.len();
        let (tx, mut rx) = mpsc::channel(count);
        for node in &targets {
            Arc::clone(node).touch(key.to_string(), expiry_secs, Some(tx.clone()));
        }
        drop(tx);

        let nodes = Arc::clone(&self.inner.nodes);
        let aggregator = tokio::spawn(async move {
            let mut missed = false;
            for _ in 0..count {
                let Some(response) = rx.recv().await else { break };
                if matches!(response.error, Some(MemhaError::CacheMiss)) {
                    missed = true;
                }
            }
            if nodes.healthy_count().await == 0 {
                return Err(MemhaError::NoHealthyNodes);
            }
            if missed {
                Err(MemhaError::CacheMiss)
            } else {
                Ok(())
            }
        });
        aggregator.await.unwrap_or(Err(MemhaError::Unknown))
    }

    /// Snapshot of healthy nodes, failing fast when there are none.
    async fn healthy_snapshot(&self) -> Result<Vec<Arc<Node>>> {
        let healthy = self.inner.nodes.healthy_nodes().await;
        if healthy.is_empty() {
            return Err(MemhaError::NoHealthyNodes);
        }
        Ok(healthy.into_values().collect())
    }
}

/// The supervisor: one cooperative loop driving two independent cadences,
/// with a two-way shutdown handshake.
async fn run_supervisor(
    inner: Arc<ClientInner>,
    mut shutdown_rx: mpsc::Receiver<oneshot::Sender<()>>,
) {
    info!("supervisor running");
    let mut tick = tokio::time::interval(SUPERVISOR_TICK);
    let mut last_refresh: Option<tokio::time::Instant> = None;
    let mut last_healthcheck: Option<tokio::time::Instant> = None;

    loop {
        tokio::select! {
            _ = tick.tick() => {
                let now = tokio::time::Instant::now();
                if cadence_elapsed(last_refresh, inner.config.get_nodes_period, now) {
                    inner.refresh_membership().await;
                    last_refresh = Some(now);
                }
                if cadence_elapsed(last_healthcheck, inner.config.healthcheck_period, now) {
                    inner.health_check_all().await;
                    last_healthcheck = Some(now);
                }
            }
            ack = shutdown_rx.recv() => {
                info!("supervisor stopped");
                if let Some(ack) = ack {
                    let _ = ack.send(());
                }
                return;
            }
        }
    }
}

fn cadence_elapsed(
    last: Option<tokio::time::Instant>,
    period: Duration,
    now: tokio::time::Instant,
) -> bool {
    match last {
        None => true,
        Some(at) => now.duration_since(at) >= period,
    }
}

impl ClientInner {
    /// Converges effective membership toward the union of the sources'
    /// reports. A failing source aborts the whole round, since a partial
    /// union would read as removals.
    async fn refresh_membership(&self) {
        let mut intended: HashSet<String> = HashSet::new();
        for source in &self.sources {
            match source.get_nodes().await {
                Ok(endpoints) => intended.extend(endpoints),
                Err(err) => {
                    error!(error = %err, "node source failed, skipping reconciliation round");
                    return;
                }
            }
        }

        for endpoint in &intended {
            if !self.nodes.exists(endpoint).await {
                info!(endpoint = %endpoint, "node added");
                let driver = self.factory.create(endpoint, self.config.timeout);
                let node = Arc::new(Node::new(endpoint.clone(), self.config.timeout, driver));
                self.nodes.add(Arc::clone(&node)).await;
                if let Err(err) = node.health_check().await {
                    warn!(endpoint = %endpoint, error = %err, "initial health check failed");
                }
            }
        }

        for endpoint in self.nodes.endpoints().await {
            if !intended.contains(&endpoint) {
                info!(endpoint = %endpoint, "node removed");
                self.nodes.remove(&endpoint).await;
            }
        }
    }

    /// Health-checks every node in the pool concurrently. Failures are
    /// logged; the nodes have already adjusted their own flags.
    async fn health_check_all(&self) {
        let checks = self.nodes.all_nodes().await.into_iter().map(|node| async move {
            if let Err(err) = node.health_check().await {
                warn!(endpoint = %node.endpoint, error = %err, "health check failed");
            }
        });
        futures::future::join_all(checks).await;
    }
}
