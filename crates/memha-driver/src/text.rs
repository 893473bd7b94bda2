//! TCP driver speaking the memcache ASCII protocol.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

use memha_common::{DriverFactory, Item, MemhaError, NodeDriver, Result};

use crate::codec::{self, StorageVerb};

/// Memcache text-protocol driver for one endpoint.
///
/// Uses a connection-per-request strategy: each operation opens a fresh TCP
/// connection, performs one command exchange, and drops the connection. This
/// keeps concurrent operations fully isolated from each other (a stalled or
/// poisoned connection can never affect another request) at the cost of a
/// connect per call, which is acceptable for the same-network deployments
/// cache pools run in.
///
/// Every operation, connection establishment included, is bounded by the
/// driver's timeout; exceeding it is reported as
/// [`MemhaError::Timeout`].
pub struct TextDriver {
    endpoint: String,
    timeout: Duration,
}

impl TextDriver {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout,
        }
    }

    /// Bounds `fut` by the configured timeout.
    async fn bounded<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(MemhaError::Timeout(self.timeout.as_millis() as u64)),
        }
    }

    async fn connect(&self) -> Result<TcpStream> {
        TcpStream::connect(&self.endpoint).await.map_err(|e| {
            debug!(endpoint = %self.endpoint, error = %e, "connect failed");
            MemhaError::Transport(format!("connect {}: {}", self.endpoint, e))
        })
    }

    /// One command, one reply line.
    async fn exchange(&self, command: Vec<u8>) -> Result<String> {
        let stream = self.connect().await?;
        let mut reader = BufReader::new(stream);
        reader.write_all(&command).await?;
        read_line(&mut reader).await
    }

    /// Full retrieval exchange: `gets`, a `VALUE` header, the data block,
    /// and the closing `END`.
    async fn fetch(&self, key: &str) -> Result<Item> {
        let command = codec::encode_get(key)?;
        let stream = self.connect().await?;
        let mut reader = BufReader::new(stream);
        reader.write_all(&command).await?;

        let header_line = read_line(&mut reader).await?;
        let Some(header) = codec::parse_value_header(&header_line)? else {
            return Err(MemhaError::CacheMiss);
        };

        // Data block is followed by its own \r\n terminator.
        let mut data = vec![0u8; header.len + 2];
        reader.read_exact(&mut data).await?;
        data.truncate(header.len);

        let end = read_line(&mut reader).await?;
        if end != "END" {
            return Err(MemhaError::Protocol(format!("expected END, got {}", end)));
        }

        let mut item = Item::new(key, data).with_flags(header.flags);
        if let Some(cas) = header.cas {
            item = item.with_cas(cas);
        }
        Ok(item)
    }
}

#[async_trait]
impl NodeDriver for TextDriver {
    async fn get(&self, key: &str) -> Result<Item> {
        self.bounded(self.fetch(key)).await
    }

    async fn set(&self, item: &Item) -> Result<()> {
        let command = codec::encode_storage(StorageVerb::Set, item)?;
        let line = self.bounded(self.exchange(command)).await?;
        codec::parse_storage_reply(&line)
    }

    async fn add(&self, item: &Item) -> Result<()> {
        let command = codec::encode_storage(StorageVerb::Add, item)?;
        let line = self.bounded(self.exchange(command)).await?;
        codec::parse_storage_reply(&line)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let command = codec::encode_delete(key)?;
        let line = self.bounded(self.exchange(command)).await?;
        codec::parse_delete_reply(&line)
    }

    async fn increment(&self, key: &str, delta: u64) -> Result<u64> {
        let command = codec::encode_increment(key, delta)?;
        let line = self.bounded(self.exchange(command)).await?;
        codec::parse_increment_reply(&line)
    }

    async fn touch(&self, key: &str, expiry_secs: u32) -> Result<()> {
        let command = codec::encode_touch(key, expiry_secs)?;
        let line = self.bounded(self.exchange(command)).await?;
        codec::parse_touch_reply(&line)
    }
}

/// Builds [`TextDriver`]s; the client's default factory.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextDriverFactory;

impl DriverFactory for TextDriverFactory {
    fn create(&self, endpoint: &str, timeout: Duration) -> Arc<dyn NodeDriver> {
        Arc::new(TextDriver::new(endpoint, timeout))
    }
}

/// Reads one protocol line, stripping the trailing `\r\n`.
async fn read_line<R: AsyncBufReadExt + Unpin>(reader: &mut R) -> Result<String> {
    let mut buf = Vec::new();
    let n = reader.read_until(b'\n', &mut buf).await?;
    if n == 0 {
        return Err(MemhaError::Transport("connection closed by peer".to_string()));
    }
    while buf.last() == Some(&b'\n') || buf.last() == Some(&b'\r') {
        buf.pop();
    }
    String::from_utf8(buf).map_err(|_| MemhaError::Protocol("non-ASCII reply line".to_string()))
}
