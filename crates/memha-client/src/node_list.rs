use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::node::Node;

/// The current effective membership: endpoint address to node.
///
/// Membership is mutated only by the supervisor loop; node health flags are
/// mutated from anywhere. [`NodeList::healthy_nodes`] returns an independent
/// snapshot precisely so callers may trim it (quorum sizing for reads)
/// without holding, or racing, the live map.
pub struct NodeList {
    nodes: RwLock<HashMap<String, Arc<Node>>>,
}

impl NodeList {
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
        }
    }

    /// Inserts a node keyed by its endpoint, replacing any previous entry.
    pub async fn add(&self, node: Arc<Node>) {
        self.nodes
            .write()
            .await
            .insert(node.endpoint.clone(), node);
    }

    pub async fn remove(&self, endpoint: &str) -> Option<Arc<Node>> {
        self.nodes.write().await.remove(endpoint)
    }

    pub async fn exists(&self, endpoint: &str) -> bool {
        self.nodes.read().await.contains_key(endpoint)
    }

    pub async fn get(&self, endpoint: &str) -> Option<Arc<Node>> {
        self.nodes.read().await.get(endpoint).cloned()
    }

    pub async fn endpoints(&self) -> Vec<String> {
        self.nodes.read().await.keys().cloned().collect()
    }

    pub async fn all_nodes(&self) -> Vec<Arc<Node>> {
        self.nodes.read().await.values().cloned().collect()
    }

    /// Snapshot of the currently healthy subset, owned by the caller.
    pub async fn healthy_nodes(&self) -> HashMap<String, Arc<Node>> {
        self.nodes
            .read()
            .await
            .iter()
            .filter(|(_, node)| node.is_healthy())
            .map(|(endpoint, node)| (endpoint.clone(), Arc::clone(node)))
            .collect()
    }

    pub async fn healthy_count(&self) -> usize {
        self.nodes
            .read()
            .await
            .values()
            .filter(|node| node.is_healthy())
            .count()
    }

    pub async fn len(&self) -> usize {
        self.nodes.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.nodes.read().await.is_empty()
    }
}

impl Default for NodeList {
    fn default() -> Self {
        Self::new()
    }
}
