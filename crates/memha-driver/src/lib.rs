//! MemHA Memcache Text Protocol Driver
//!
//! A [`NodeDriver`](memha_common::NodeDriver) implementation speaking the
//! memcache ASCII protocol over TCP. This is the driver the MemHA client
//! uses by default; any memcache-compatible implementation of the trait can
//! be substituted through
//! [`DriverFactory`](memha_common::DriverFactory).
//!
//! # Wire Protocol
//!
//! The ASCII protocol is line-oriented with an out-of-band data block for
//! values:
//!
//! ```text
//! client: gets user:1\r\n
//! server: VALUE user:1 0 5 42\r\n
//!         hello\r\n
//!         END\r\n
//! ```
//!
//! Retrievals use `gets` so the server's CAS token rides along on the item
//! and survives repair writes unchanged.
//!
//! # Components
//!
//! - [`codec`] - command encoding and reply parsing, free of socket concerns
//! - [`text`] - the connection-per-request TCP driver and its factory

pub mod codec;
pub mod text;

pub use codec::{StorageVerb, ValueHeader};
pub use text::{TextDriver, TextDriverFactory};
