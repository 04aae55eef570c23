//! Error types for hashing, key management and tree operations.

use thiserror::Error;
use zkid_core::Hash;

/// Error in cryptographic operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Poseidon rejected its inputs (arity or non-canonical element).
    #[error("poseidon error: {0}")]
    Poseidon(String),

    /// The key store has no key with this id.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// Key bytes could not be parsed.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Signature verification failed.
    #[error("signature verification failed: {0}")]
    VerificationFailed(String),
}

/// Error in sparse Merkle tree operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SmtError {
    /// A leaf with this key already exists.
    #[error("duplicate index {0}")]
    DuplicateIndex(Hash),

    /// No leaf with this key exists.
    #[error("key {0} not found")]
    KeyNotFound(Hash),

    /// Inserting would exceed the configured tree depth.
    #[error("reached maximum tree depth {0}")]
    ReachedMaxLevel(usize),

    /// A root or intermediate node is not in storage.
    #[error("node {0} not found in storage")]
    NodeNotFound(Hash),

    /// Node hashing failed.
    #[error(transparent)]
    Hash(#[from] CryptoError),
}
