//! The three sparse Merkle trees behind an identity.

use serde::{Deserialize, Serialize};
use zkid_core::Hash;
use zkid_crypto::{MerkleProof, Node, SparseMerkleTree};

use crate::claim::Claim;
use crate::error::StateError;
use crate::state::TreeRoots;

/// Which identity tree an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TreeKind {
    /// claim hIndex → hValue
    Claims,
    /// revocation nonce → 0
    Revocation,
    /// historical claims root → 0
    Roots,
}

/// Claims, revocation and roots trees of one identity.
#[derive(Debug, Clone)]
pub struct IdentityTrees {
    claims: SparseMerkleTree,
    revocations: SparseMerkleTree,
    roots: SparseMerkleTree,
}

impl IdentityTrees {
    /// Three empty trees of the given depth.
    pub fn new(max_levels: usize) -> Self {
        Self {
            claims: SparseMerkleTree::new(max_levels),
            revocations: SparseMerkleTree::new(max_levels),
            roots: SparseMerkleTree::new(max_levels),
        }
    }

    fn tree(&self, kind: TreeKind) -> &SparseMerkleTree {
        match kind {
            TreeKind::Claims => &self.claims,
            TreeKind::Revocation => &self.revocations,
            TreeKind::Roots => &self.roots,
        }
    }

    /// Current roots.
    pub fn roots(&self) -> TreeRoots {
        TreeRoots {
            claims_root: self.claims.root(),
            revocation_root: self.revocations.root(),
            roots_root: self.roots.root(),
        }
    }

    /// Insert a claim under its index hash.
    pub fn add_claim(&mut self, claim: &Claim) -> Result<Hash, StateError> {
        let h_index = claim.h_index()?;
        let h_value = claim.h_value()?;
        self.claims.add(h_index, h_value)?;
        Ok(h_index)
    }

    /// Whether `nonce` is in the revocation tree.
    pub fn is_revoked(&self, nonce: u64) -> Result<bool, StateError> {
        let (proof, _) = self.revocations.generate_proof(&Hash::from_u64(nonce), None)?;
        Ok(proof.existence)
    }

    /// Insert `nonce` into the revocation tree.
    pub fn revoke(&mut self, nonce: u64) -> Result<(), StateError> {
        match self.revocations.add(Hash::from_u64(nonce), Hash::zero()) {
            Ok(()) => Ok(()),
            Err(zkid_crypto::SmtError::DuplicateIndex(_)) => Err(StateError::AlreadyRevoked(nonce)),
            Err(e) => Err(e.into()),
        }
    }

    /// Record the current claims root in the roots tree, if it is new.
    pub fn commit_claims_root(&mut self) -> Result<(), StateError> {
        let root = self.claims.root();
        let (proof, _) = self.roots.generate_proof(&root, None)?;
        if !proof.existence {
            self.roots.add(root, Hash::zero())?;
        }
        Ok(())
    }

    /// Proof for `key` in tree `kind`, against `root` or the current root.
    pub fn prove(
        &self,
        kind: TreeKind,
        key: &Hash,
        root: Option<&Hash>,
    ) -> Result<(MerkleProof, Option<Hash>), StateError> {
        Ok(self.tree(kind).generate_proof(key, root)?)
    }

    /// Drain nodes created since the last call, with their preimages.
    pub fn take_new_nodes(&mut self) -> Vec<(Hash, Vec<Hash>)> {
        let mut out = Vec::new();
        for tree in [&mut self.claims, &mut self.revocations, &mut self.roots] {
            for hash in tree.take_new_nodes() {
                if let Some(node) = tree.node(&hash) {
                    if !matches!(node, Node::Empty) {
                        out.push((hash, node.children()));
                    }
                }
            }
        }
        out
    }
}
