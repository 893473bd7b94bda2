//! MemHA Client
//!
//! A high-availability client fronting a pool of independent
//! memcache-protocol cache nodes as a single logical cache.
//!
//! # Overview
//!
//! MemHA does no partitioning or sharding. Every write is replicated to
//! every healthy node; reads are served from a quorum-sized subset and
//! divergence observed along the way is reconciled with background
//! write-backs ("read-repair"). The result is a cache that stays available
//! as long as any one node is reachable, with replicas lazily converging
//! toward agreement: the same consistency envelope as memcache itself,
//! spread over a pool.
//!
//! # Key Behaviors
//!
//! - **Fail-open writes**: [`Client::set`] succeeds as long as one node
//!   stays healthy; transport failures quietly drop nodes out of rotation
//! - **Authoritative existing values**: [`Client::add`] treats any replica
//!   that already held the key as the source of truth and reverts replicas
//!   that raced the new value in
//! - **Quorum reads**: [`Client::get`] contacts ⌈n/2⌉ randomly chosen
//!   replicas when the pool is larger than two, repairing any of them that
//!   missed
//! - **Monotone counters**: [`Client::increment`] takes the maximum across
//!   replicas as authoritative and backfills stragglers
//! - **Dynamic membership**: a background supervisor polls pluggable
//!   [`NodeSource`]s and health-checks the pool on independent cadences
//!
//! # Components
//!
//! - [`client`] - the replicating [`Client`], its configuration, and the
//!   supervisor loop
//! - [`node`] - one endpoint in the pool: spawned per-operation tasks,
//!   health state
//! - [`node_list`] - the thread-safe membership map
//! - [`source`] - the [`NodeSource`] trait and bundled implementations
//!
//! # Example
//!
//! ```no_run
//! use memha_client::{Client, NodeSource, StaticNodeSource};
//! use memha_common::Item;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let source: Arc<dyn NodeSource> =
//!         Arc::new(StaticNodeSource::new(["10.0.0.1:11211", "10.0.0.2:11211"]));
//!
//!     let client = Client::new(vec![source]);
//!     client.start().await?;
//!     client.wait_for_nodes(Duration::from_secs(5)).await?;
//!
//!     client.set(Item::new("greeting", b"hello".to_vec())).await?;
//!     println!("{:?}", client.get("greeting").await?.value);
//!
//!     client.stop().await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod node;
pub mod node_list;
pub mod source;

#[cfg(test)]
pub(crate) mod testutil;

pub use client::{Client, ClientConfig};
pub use node::{Node, NodeResponse, HEALTHCHECK_KEY};
pub use node_list::NodeList;
pub use source::{JsonFileNodeSource, NodeSource, StaticNodeSource};

// Re-exported so callers need only this crate for ordinary use.
pub use memha_common::{DriverFactory, Expiration, Item, MemhaError, NodeDriver, Result};
