//! MemHA Common Types
//!
//! This crate provides the shared vocabulary for the MemHA replicating
//! memcache client: the error taxonomy, the cache item model, and the driver
//! traits that decouple the replication core from any particular wire
//! protocol implementation.
//!
//! # Components
//!
//! - [`error`] - The [`MemhaError`] taxonomy and [`Result`] alias shared by
//!   the driver and the client, with transport/semantic classification
//! - [`item`] - The [`Item`] cache entry model and key validation
//! - [`driver`] - The [`NodeDriver`] and [`DriverFactory`] traits consumed
//!   by the replication core
//!
//! # Error Classes
//!
//! Errors fall into three classes with different handling in the core:
//!
//! - **Protocol-semantic** (`CacheMiss`, `NotStored`): part of the normal
//!   API, propagated to callers per the aggregation rules, never affect
//!   node health
//! - **Transport** (`Timeout`, `Transport`, `Io`): mark the producing node
//!   unhealthy and are otherwise ignored by aggregation
//! - **Operational** (`NoHealthyNodes`, `AlreadyRunning`, `NotRunning`,
//!   `Unknown`): surfaced by the client itself

pub mod driver;
pub mod error;
pub mod item;

pub use driver::{DriverFactory, NodeDriver};
pub use error::{MemhaError, Result};
pub use item::{validate_key, Expiration, Item, MAX_KEY_LENGTH, RELATIVE_EXPIRY_LIMIT};
