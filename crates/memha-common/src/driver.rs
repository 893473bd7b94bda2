use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::item::Item;

/// One cache endpoint, seen through a synchronous-per-operation lens.
///
/// A driver performs a single cache operation against a single endpoint and
/// reports the outcome through the shared error taxonomy:
///
/// - [`MemhaError::CacheMiss`](crate::MemhaError::CacheMiss) when the key is
///   absent (`get`, `delete`, `increment`, `touch`);
/// - [`MemhaError::NotStored`](crate::MemhaError::NotStored) when a
///   conditional store loses (`add`);
/// - transport errors (`Timeout`, `Transport`, `Io`) when the endpoint could
///   not be reached; the replication core downgrades node health on these
///   and only these.
///
/// Drivers must tolerate concurrent use; the core issues overlapping
/// operations against the same driver from independent tasks.
#[async_trait]
pub trait NodeDriver: Send + Sync {
    /// Fetch the item stored under `key`.
    async fn get(&self, key: &str) -> Result<Item>;

    /// Store `item` unconditionally.
    async fn set(&self, item: &Item) -> Result<()>;

    /// Store `item` only if `item.key` is currently absent.
    async fn add(&self, item: &Item) -> Result<()>;

    /// Remove `key`.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Atomically add `delta` to the decimal value under `key`, returning
    /// the new value. Wraps at 64 bits, as the underlying protocol does.
    async fn increment(&self, key: &str, delta: u64) -> Result<u64>;

    /// Update the expiry of `key` without touching its value.
    async fn touch(&self, key: &str, expiry_secs: u32) -> Result<()>;
}

/// Builds a driver for an endpoint.
///
/// The supervisor calls this whenever a node source reports an endpoint that
/// is not yet in the pool. `timeout` is the per-request bound the client was
/// configured with; drivers should apply it to connection establishment at
/// minimum.
pub trait DriverFactory: Send + Sync {
    fn create(&self, endpoint: &str, timeout: Duration) -> Arc<dyn NodeDriver>;
}
