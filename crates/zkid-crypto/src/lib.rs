//! # zkid-crypto — Cryptographic Primitives
//!
//! Provides the cryptographic building blocks for identity state:
//!
//! - **Poseidon** over the BN254 scalar field, circom-compatible parameters.
//!   Used for claim hashing, tree nodes and the identity state hash.
//! - **Sparse Merkle Tree** keyed by field elements, with membership and
//!   non-membership proofs verifiable against any historical root.
//! - **Ed25519** key material behind the [`KeyStore`] capability, used to
//!   sign state transitions and JWS envelopes.
//!
//! ## Crate Policy
//!
//! - Depends only on `zkid-core` internally.
//! - No mocking of cryptographic operations in tests: all tests use real
//!   Poseidon and real Ed25519.
//! - No `unsafe` code.

pub mod ed25519;
pub mod error;
pub mod keystore;
pub mod poseidon;
pub mod smt;

pub use ed25519::{Ed25519PublicKey, Ed25519Signature};
pub use error::{CryptoError, SmtError};
pub use keystore::{KeyId, KeyStore, LocalKeyStore};
pub use poseidon::{hash_leaf, hash_node, poseidon_hash};
pub use smt::{MerkleProof, Node, NodeAux, SparseMerkleTree};
