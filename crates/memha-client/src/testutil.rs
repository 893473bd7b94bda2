//! Minimal scripted driver for unit tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use memha_common::{Item, MemhaError, NodeDriver, Result};

/// What the stub pretends the endpoint is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubMode {
    /// Every operation succeeds; reads return a fixed item.
    Healthy,
    /// The endpoint answers but holds nothing: reads and key-addressed
    /// operations miss, `add` reports the opposite (`NotStored`).
    Missing,
    /// Every operation fails at the transport level.
    Failing,
    /// Every operation stalls until the caller's timeout fires.
    Hanging,
}

pub struct StubDriver {
    mode: Mutex<StubMode>,
}

impl StubDriver {
    pub fn new(mode: StubMode) -> Arc<Self> {
        Arc::new(Self {
            mode: Mutex::new(mode),
        })
    }

    pub fn set_mode(&self, mode: StubMode) {
        *self.mode.lock().unwrap() = mode;
    }

    fn mode(&self) -> StubMode {
        *self.mode.lock().unwrap()
    }

    async fn gate(&self) -> Result<StubMode> {
        match self.mode() {
            StubMode::Failing => Err(MemhaError::Transport("injected failure".to_string())),
            StubMode::Hanging => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(MemhaError::Transport("woke from hang".to_string()))
            }
            mode => Ok(mode),
        }
    }
}

#[async_trait]
impl NodeDriver for StubDriver {
    async fn get(&self, key: &str) -> Result<Item> {
        match self.gate().await? {
            StubMode::Missing => Err(MemhaError::CacheMiss),
            _ => Ok(Item::new(key, b"value".to_vec())),
        }
    }

    async fn set(&self, _item: &Item) -> Result<()> {
        self.gate().await?;
        Ok(())
    }

    async fn add(&self, _item: &Item) -> Result<()> {
        match self.gate().await? {
            StubMode::Missing => Err(MemhaError::NotStored),
            _ => Ok(()),
        }
    }

    async fn delete(&self, _key: &str) -> Result<()> {
        match self.gate().await? {
            StubMode::Missing => Err(MemhaError::CacheMiss),
            _ => Ok(()),
        }
    }

    async fn increment(&self, _key: &str, delta: u64) -> Result<u64> {
        match self.gate().await? {
            StubMode::Missing => Err(MemhaError::CacheMiss),
            _ => Ok(delta),
        }
    }

    async fn touch(&self, _key: &str, _expiry_secs: u32) -> Result<()> {
        match self.gate().await? {
            StubMode::Missing => Err(MemhaError::CacheMiss),
            _ => Ok(()),
        }
    }
}
