use std::path::PathBuf;

use async_trait::async_trait;

use memha_common::{MemhaError, Result};

/// Enumerates the endpoints that *should* exist.
///
/// A client may hold several sources; the union of their latest reports is
/// the intended membership the supervisor converges the pool toward. Each
/// call enumerates the source's current view from scratch.
#[async_trait]
pub trait NodeSource: Send + Sync {
    async fn get_nodes(&self) -> Result<Vec<String>>;
}

/// A fixed endpoint list.
pub struct StaticNodeSource {
    endpoints: Vec<String>,
}

impl StaticNodeSource {
    pub fn new<I, S>(endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            endpoints: endpoints.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl NodeSource for StaticNodeSource {
    async fn get_nodes(&self) -> Result<Vec<String>> {
        Ok(self.endpoints.clone())
    }
}

/// Re-reads a JSON array of endpoint strings from disk on every poll, so an
/// orchestration layer can reshape the pool by rewriting one file.
///
/// ```json
/// ["10.0.0.1:11211", "10.0.0.2:11211"]
/// ```
pub struct JsonFileNodeSource {
    path: PathBuf,
}

impl JsonFileNodeSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl NodeSource for JsonFileNodeSource {
    async fn get_nodes(&self) -> Result<Vec<String>> {
        let raw = tokio::fs::read(&self.path).await.map_err(|e| {
            MemhaError::Source(format!("read {}: {}", self.path.display(), e))
        })?;
        serde_json::from_slice(&raw)
            .map_err(|e| MemhaError::Source(format!("parse {}: {}", self.path.display(), e)))
    }
}
