//! # Sparse Merkle Tree
//!
//! A binary Merkle tree addressed by field elements, the structure behind
//! the claims, revocation and roots trees of an identity.
//!
//! ## Layout
//!
//! - The path to a key follows the key's bits, least significant first:
//!   bit `i` set means "go right" at depth `i`.
//! - A leaf sits at the shallowest depth where its path no longer collides
//!   with another leaf. Subtrees with a single leaf collapse to that leaf.
//! - Nodes are content-addressed and never deleted, so proofs can be
//!   generated against any root this tree has ever had.
//!
//! ## Proofs
//!
//! A [`MerkleProof`] lists the sibling of every node on the path from the
//! root down to where the search stopped. For a non-member key the search
//! stops either at an empty slot or at a different leaf, which is returned
//! as `node_aux` so the verifier can rebuild it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use zkid_core::Hash;

use crate::error::{CryptoError, SmtError};
use crate::poseidon::{hash_leaf, hash_node};

/// Default depth of identity trees.
pub const DEFAULT_MAX_LEVELS: usize = 40;

/// A stored tree node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// No content; hashes to zero.
    Empty,
    /// A key/value entry.
    Leaf {
        /// Entry key.
        key: Hash,
        /// Entry value.
        value: Hash,
    },
    /// An inner node.
    Middle {
        /// Left child hash.
        left: Hash,
        /// Right child hash.
        right: Hash,
    },
}

impl Node {
    /// Hash this node is stored under.
    pub fn hash(&self) -> Result<Hash, CryptoError> {
        match self {
            Node::Empty => Ok(Hash::zero()),
            Node::Leaf { key, value } => hash_leaf(key, value),
            Node::Middle { left, right } => hash_node(left, right),
        }
    }

    /// Preimage of the node hash, as published to a reverse hash service.
    pub fn children(&self) -> Vec<Hash> {
        match self {
            Node::Empty => Vec::new(),
            Node::Leaf { key, value } => vec![*key, *value, Hash::from_u64(1)],
            Node::Middle { left, right } => vec![*left, *right],
        }
    }
}

/// The leaf a non-membership proof ended at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAux {
    /// Key of the leaf found on the path.
    pub key: Hash,
    /// Value of the leaf found on the path.
    pub value: Hash,
}

/// Membership or non-membership proof for one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    /// Whether the key is in the tree.
    pub existence: bool,
    /// Siblings from the root downward, one per level walked.
    pub siblings: Vec<Hash>,
    /// Leaf occupying the key's path, for non-membership.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_aux: Option<NodeAux>,
}

impl MerkleProof {
    /// Number of levels walked.
    pub fn depth(&self) -> usize {
        self.siblings.len()
    }

    /// Siblings padded with zeros to `levels`, the shape circuits expect.
    pub fn padded_siblings(&self, levels: usize) -> Vec<Hash> {
        let mut out = self.siblings.clone();
        out.resize(levels.max(out.len()), Hash::zero());
        out
    }

    /// Recompute the root implied by this proof for `(key, value)`.
    ///
    /// For non-membership proofs `value` is ignored.
    pub fn root_for(&self, key: &Hash, value: &Hash) -> Result<Hash, CryptoError> {
        let mut mid = if self.existence {
            hash_leaf(key, value)?
        } else if let Some(aux) = &self.node_aux {
            hash_leaf(&aux.key, &aux.value)?
        } else {
            Hash::zero()
        };
        for (lvl, sibling) in self.siblings.iter().enumerate().rev() {
            mid = if key.bit(lvl) {
                hash_node(sibling, &mid)?
            } else {
                hash_node(&mid, sibling)?
            };
        }
        Ok(mid)
    }

    /// Check this proof against `root`.
    pub fn verify(&self, root: &Hash, key: &Hash, value: &Hash) -> bool {
        if let (false, Some(aux)) = (self.existence, &self.node_aux) {
            if aux.key == *key {
                return false;
            }
        }
        matches!(self.root_for(key, value), Ok(r) if r == *root)
    }
}

/// In-memory sparse Merkle tree.
#[derive(Debug, Clone)]
pub struct SparseMerkleTree {
    root: Hash,
    max_levels: usize,
    nodes: HashMap<Hash, Node>,
    journal: Vec<Hash>,
}

impl Default for SparseMerkleTree {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LEVELS)
    }
}

impl SparseMerkleTree {
    /// Create an empty tree of the given depth.
    pub fn new(max_levels: usize) -> Self {
        Self {
            root: Hash::zero(),
            max_levels,
            nodes: HashMap::new(),
            journal: Vec::new(),
        }
    }

    /// Current root.
    pub fn root(&self) -> Hash {
        self.root
    }

    /// Configured depth.
    pub fn max_levels(&self) -> usize {
        self.max_levels
    }

    /// Look up a stored node. The zero hash is always the empty node.
    pub fn node(&self, hash: &Hash) -> Option<Node> {
        if hash.is_zero() {
            return Some(Node::Empty);
        }
        self.nodes.get(hash).cloned()
    }

    /// Hashes of nodes stored since the last call, in insertion order.
    pub fn take_new_nodes(&mut self) -> Vec<Hash> {
        std::mem::take(&mut self.journal)
    }

    fn store(&mut self, node: Node) -> Result<Hash, SmtError> {
        let hash = node.hash()?;
        if !hash.is_zero() && self.nodes.insert(hash, node).is_none() {
            self.journal.push(hash);
        }
        Ok(hash)
    }

    fn load(&self, hash: &Hash) -> Result<Node, SmtError> {
        self.node(hash).ok_or(SmtError::NodeNotFound(*hash))
    }

    /// Insert a new entry. Fails with `DuplicateIndex` if `key` exists.
    pub fn add(&mut self, key: Hash, value: Hash) -> Result<(), SmtError> {
        let root = self.root;
        let new_root = self.add_leaf(key, value, root, 0)?;
        self.root = new_root;
        Ok(())
    }

    fn add_leaf(&mut self, key: Hash, value: Hash, at: Hash, lvl: usize) -> Result<Hash, SmtError> {
        if lvl >= self.max_levels {
            return Err(SmtError::ReachedMaxLevel(self.max_levels));
        }
        match self.load(&at)? {
            Node::Empty => self.store(Node::Leaf { key, value }),
            Node::Leaf {
                key: old_key,
                value: old_value,
            } => {
                if old_key == key {
                    return Err(SmtError::DuplicateIndex(key));
                }
                self.push_leaf(key, value, old_key, old_value, lvl)
            }
            Node::Middle { left, right } => {
                let node = if key.bit(lvl) {
                    let next = self.add_leaf(key, value, right, lvl + 1)?;
                    Node::Middle { left, right: next }
                } else {
                    let next = self.add_leaf(key, value, left, lvl + 1)?;
                    Node::Middle { left: next, right }
                };
                self.store(node)
            }
        }
    }

    /// Split a collapsed leaf until the new and old paths diverge.
    fn push_leaf(
        &mut self,
        key: Hash,
        value: Hash,
        old_key: Hash,
        old_value: Hash,
        lvl: usize,
    ) -> Result<Hash, SmtError> {
        if lvl + 1 >= self.max_levels {
            return Err(SmtError::ReachedMaxLevel(self.max_levels));
        }
        let new_bit = key.bit(lvl);
        if new_bit == old_key.bit(lvl) {
            let next = self.push_leaf(key, value, old_key, old_value, lvl + 1)?;
            let node = if new_bit {
                Node::Middle {
                    left: Hash::zero(),
                    right: next,
                }
            } else {
                Node::Middle {
                    left: next,
                    right: Hash::zero(),
                }
            };
            return self.store(node);
        }
        let old_hash = self.store(Node::Leaf {
            key: old_key,
            value: old_value,
        })?;
        let new_hash = self.store(Node::Leaf { key, value })?;
        let node = if new_bit {
            Node::Middle {
                left: old_hash,
                right: new_hash,
            }
        } else {
            Node::Middle {
                left: new_hash,
                right: old_hash,
            }
        };
        self.store(node)
    }

    /// Value stored under `key` at the current root.
    pub fn get(&self, key: &Hash) -> Result<Hash, SmtError> {
        let (proof, value) = self.generate_proof(key, None)?;
        match (proof.existence, value) {
            (true, Some(v)) => Ok(v),
            _ => Err(SmtError::KeyNotFound(*key)),
        }
    }

    /// Proof for `key` against `root` (the current root when `None`).
    ///
    /// Returns the proof and, for members, the stored value.
    pub fn generate_proof(
        &self,
        key: &Hash,
        root: Option<&Hash>,
    ) -> Result<(MerkleProof, Option<Hash>), SmtError> {
        let mut next = root.copied().unwrap_or(self.root);
        let mut siblings = Vec::new();
        for lvl in 0..self.max_levels {
            match self.load(&next)? {
                Node::Empty => {
                    return Ok((
                        MerkleProof {
                            existence: false,
                            siblings,
                            node_aux: None,
                        },
                        None,
                    ))
                }
                Node::Leaf {
                    key: leaf_key,
                    value,
                } => {
                    if leaf_key == *key {
                        return Ok((
                            MerkleProof {
                                existence: true,
                                siblings,
                                node_aux: None,
                            },
                            Some(value),
                        ));
                    }
                    return Ok((
                        MerkleProof {
                            existence: false,
                            siblings,
                            node_aux: Some(NodeAux {
                                key: leaf_key,
                                value,
                            }),
                        },
                        None,
                    ));
                }
                Node::Middle { left, right } => {
                    if key.bit(lvl) {
                        siblings.push(left);
                        next = right;
                    } else {
                        siblings.push(right);
                        next = left;
                    }
                }
            }
        }
        Err(SmtError::ReachedMaxLevel(self.max_levels))
    }
}
