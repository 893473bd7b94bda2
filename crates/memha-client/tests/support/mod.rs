//! Shared scaffolding for the client integration tests: an in-memory
//! fault-injecting driver so replication outcomes are deterministic, and a
//! mutable node source for membership tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use memha_client::{Client, ClientConfig, NodeSource, StaticNodeSource, HEALTHCHECK_KEY};
use memha_common::{DriverFactory, Item, MemhaError, NodeDriver, Result};

/// Everything a driver was asked to do, for dispatch assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Get(String),
    Set(String, Vec<u8>),
    Add(String, Vec<u8>),
    Delete(String),
    Incr(String, u64),
    Touch(String, u32),
}

/// In-memory cache endpoint with fault injection.
///
/// - `failing`: every operation fails at the transport level
/// - `drop_writes`: stores acknowledge but persist nothing, simulating a
///   node that loses a write right after acking it
pub struct MemoryDriver {
    store: Mutex<HashMap<String, Item>>,
    failing: AtomicBool,
    drop_writes: AtomicBool,
    ops: Mutex<Vec<Op>>,
}

impl MemoryDriver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            store: Mutex::new(HashMap::new()),
            failing: AtomicBool::new(false),
            drop_writes: AtomicBool::new(false),
            ops: Mutex::new(Vec::new()),
        })
    }

    pub fn seed(&self, key: &str, value: &[u8]) {
        self.store
            .lock()
            .unwrap()
            .insert(key.to_string(), Item::new(key, value.to_vec()));
    }

    pub fn value(&self, key: &str) -> Option<Vec<u8>> {
        self.store
            .lock()
            .unwrap()
            .get(key)
            .map(|item| item.value.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.store.lock().unwrap().contains_key(key)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_drop_writes(&self, drop: bool) {
        self.drop_writes.store(drop, Ordering::SeqCst);
    }

    /// All recorded operations except health probes.
    pub fn data_ops(&self) -> Vec<Op> {
        self.ops
            .lock()
            .unwrap()
            .iter()
            .filter(|op| !matches!(op, Op::Get(key) if key == HEALTHCHECK_KEY))
            .cloned()
            .collect()
    }

    fn record(&self, op: Op) {
        self.ops.lock().unwrap().push(op);
    }

    fn gate(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(MemhaError::Transport("injected failure".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl NodeDriver for MemoryDriver {
    async fn get(&self, key: &str) -> Result<Item> {
        self.record(Op::Get(key.to_string()));
        self.gate()?;
        self.store
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or(MemhaError::CacheMiss)
    }

    async fn set(&self, item: &Item) -> Result<()> {
        self.record(Op::Set(item.key.clone(), item.value.clone()));
        self.gate()?;
        if !self.drop_writes.load(Ordering::SeqCst) {
            self.store
                .lock()
                .unwrap()
                .insert(item.key.clone(), item.clone());
        }
        Ok(())
    }

    async fn add(&self, item: &Item) -> Result<()> {
        self.record(Op::Add(item.key.clone(), item.value.clone()));
        self.gate()?;
        let mut store = self.store.lock().unwrap();
        if store.contains_key(&item.key) {
            return Err(MemhaError::NotStored);
        }
        if !self.drop_writes.load(Ordering::SeqCst) {
            store.insert(item.key.clone(), item.clone());
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.record(Op::Delete(key.to_string()));
        self.gate()?;
        self.store
            .lock()
            .unwrap()
            .remove(key)
            .map(|_| ())
            .ok_or(MemhaError::CacheMiss)
    }

    async fn increment(&self, key: &str, delta: u64) -> Result<u64> {
        self.record(Op::Incr(key.to_string(), delta));
        self.gate()?;
        let mut store = self.store.lock().unwrap();
        let Some(item) = store.get_mut(key) else {
            return Err(MemhaError::CacheMiss);
        };
        let current = std::str::from_utf8(&item.value)
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or_else(|| {
                MemhaError::Protocol("cannot increment non-numeric value".to_string())
            })?;
        let next = current.wrapping_add(delta);
        if !self.drop_writes.load(Ordering::SeqCst) {
            item.value = next.to_string().into_bytes();
        }
        Ok(next)
    }

    async fn touch(&self, key: &str, expiry_secs: u32) -> Result<()> {
        self.record(Op::Touch(key.to_string(), expiry_secs));
        self.gate()?;
        if self.store.lock().unwrap().contains_key(key) {
            Ok(())
        } else {
            Err(MemhaError::CacheMiss)
        }
    }
}

/// Hands each endpoint its own [`MemoryDriver`], created on demand, so
/// tests can seed and inspect endpoints before or after the supervisor
/// builds nodes for them.
pub struct MemoryCluster {
    drivers: Mutex<HashMap<String, Arc<MemoryDriver>>>,
}

impl MemoryCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            drivers: Mutex::new(HashMap::new()),
        })
    }

    pub fn driver(&self, endpoint: &str) -> Arc<MemoryDriver> {
        Arc::clone(
            self.drivers
                .lock()
                .unwrap()
                .entry(endpoint.to_string())
                .or_insert_with(MemoryDriver::new),
        )
    }
}

impl DriverFactory for MemoryCluster {
    fn create(&self, endpoint: &str, _timeout: Duration) -> Arc<dyn NodeDriver> {
        self.driver(endpoint)
    }
}

/// Node source whose report can be swapped or made to fail mid-test.
pub struct MutableSource {
    endpoints: Mutex<Vec<String>>,
    failing: AtomicBool,
}

impl MutableSource {
    pub fn new<I, S>(endpoints: I) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Arc::new(Self {
            endpoints: Mutex::new(endpoints.into_iter().map(Into::into).collect()),
            failing: AtomicBool::new(false),
        })
    }

    pub fn set_endpoints<I, S>(&self, endpoints: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.endpoints.lock().unwrap() = endpoints.into_iter().map(Into::into).collect();
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl NodeSource for MutableSource {
    async fn get_nodes(&self) -> Result<Vec<String>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(MemhaError::Source("injected source failure".to_string()));
        }
        Ok(self.endpoints.lock().unwrap().clone())
    }
}

/// Short cadences so supervisor behavior is observable within a test.
pub fn fast_config() -> ClientConfig {
    ClientConfig {
        timeout: Duration::from_millis(100),
        get_nodes_period: Duration::from_millis(50),
        healthcheck_period: Duration::from_millis(25),
    }
}

/// Builds a client over a fresh in-memory cluster, starts it, and waits
/// until every endpoint is healthy.
pub async fn start_cluster(endpoints: &[&str]) -> (Client, Arc<MemoryCluster>) {
    let cluster = MemoryCluster::new();
    let source: Arc<dyn NodeSource> = Arc::new(StaticNodeSource::new(endpoints.iter().copied()));
    let client = Client::with_driver_factory(
        vec![source],
        fast_config(),
        Arc::clone(&cluster) as Arc<dyn DriverFactory>,
    );
    client.start().await.unwrap();
    wait_for_healthy(&client, endpoints.len()).await;
    (client, cluster)
}

pub async fn wait_for_healthy(client: &Client, n: usize) {
    for _ in 0..200 {
        if client.nodes().healthy_count().await == n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("pool never reached {} healthy nodes", n);
}
