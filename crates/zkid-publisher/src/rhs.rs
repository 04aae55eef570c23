//! Reverse hash service publication.
//!
//! After a state is confirmed, the tree nodes it introduced are pushed to
//! a reverse hash service so holders can build non-revocation proofs
//! without asking the issuer.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use zkid_core::Hash;

use crate::error::PublishError;

/// Sink for `(hash, preimage)` tree nodes.
#[async_trait]
pub trait RhsPublisher: Send + Sync {
    async fn publish_nodes(&self, nodes: &[(Hash, Vec<Hash>)]) -> Result<(), PublishError>;
}

/// In-memory reverse hash service.
#[derive(Debug, Default)]
pub struct MemoryRhs {
    nodes: RwLock<HashMap<Hash, Vec<Hash>>>,
}

impl MemoryRhs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preimage of `hash`, if published.
    pub fn node(&self, hash: &Hash) -> Option<Vec<Hash>> {
        self.nodes.read().get(hash).cloned()
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }
}

#[async_trait]
impl RhsPublisher for MemoryRhs {
    async fn publish_nodes(&self, nodes: &[(Hash, Vec<Hash>)]) -> Result<(), PublishError> {
        let mut map = self.nodes.write();
        for (hash, children) in nodes {
            map.insert(*hash, children.clone());
        }
        tracing::debug!(count = nodes.len(), "nodes published to reverse hash service");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn published_nodes_are_retrievable() {
        let rhs = MemoryRhs::new();
        assert!(rhs.is_empty());
        let node = (Hash::from_u64(7), vec![Hash::from_u64(1), Hash::from_u64(2)]);
        rhs.publish_nodes(std::slice::from_ref(&node)).await.unwrap();
        rhs.publish_nodes(std::slice::from_ref(&node)).await.unwrap();
        assert_eq!(rhs.len(), 1);
        assert_eq!(rhs.node(&node.0), Some(node.1));
        assert_eq!(rhs.node(&Hash::from_u64(8)), None);
    }
}
