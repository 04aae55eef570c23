//! # Key Store
//!
//! Abstracts Ed25519 key custody behind a trait. Identities reference their
//! auth key by [`KeyId`]; the store signs on their behalf and never hands
//! out private key material.
//!
//! [`LocalKeyStore`] keeps keys in process memory and is what tests and
//! the development publisher loop use. Remote custody (a KMS or vault)
//! plugs in by implementing [`KeyStore`].

use std::collections::HashMap;
use std::fmt;

use ed25519_dalek::{Signer, SigningKey};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::ed25519::{Ed25519PublicKey, Ed25519Signature};
use crate::error::CryptoError;

/// Identifier of a key held by a [`KeyStore`]: `ed25519:<public key hex>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeyId(String);

impl KeyId {
    /// Derive the id of a public key.
    pub fn for_public_key(pk: &Ed25519PublicKey) -> Self {
        Self(format!("ed25519:{}", pk.to_hex()))
    }

    /// String form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for KeyId {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s
            .strip_prefix("ed25519:")
            .ok_or_else(|| CryptoError::InvalidKey(format!("unsupported key id {s}")))?;
        Ed25519PublicKey::from_hex(hex)?;
        Ok(Self(s.to_string()))
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Key custody capability.
///
/// Implementations must be `Send + Sync` for use across async tasks.
pub trait KeyStore: Send + Sync {
    /// Generate a new key and return its id.
    fn create_key(&self) -> Result<KeyId, CryptoError>;

    /// Public half of a stored key.
    fn public_key(&self, key: &KeyId) -> Result<Ed25519PublicKey, CryptoError>;

    /// Sign `message` with a stored key.
    fn sign(&self, key: &KeyId, message: &[u8]) -> Result<Ed25519Signature, CryptoError>;

    /// Human-readable backend name for diagnostics.
    fn store_name(&self) -> &str;
}

/// In-memory key store.
#[derive(Default)]
pub struct LocalKeyStore {
    keys: RwLock<HashMap<KeyId, SigningKey>>,
}

impl LocalKeyStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Import a key from a 32-byte seed, returning its id.
    pub fn import_seed(&self, seed: &[u8; 32]) -> KeyId {
        self.insert(SigningKey::from_bytes(seed))
    }

    /// Import a key from a 64-character hex seed.
    pub fn import_hex_seed(&self, hex_seed: &str) -> Result<KeyId, CryptoError> {
        let bytes =
            hex::decode(hex_seed.trim()).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let seed: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| {
            CryptoError::InvalidKey(format!("seed must be 32 bytes, got {}", v.len()))
        })?;
        Ok(self.import_seed(&seed))
    }

    /// Number of keys held.
    pub fn len(&self) -> usize {
        self.keys.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.keys.read().is_empty()
    }

    fn insert(&self, key: SigningKey) -> KeyId {
        let pk = Ed25519PublicKey(key.verifying_key().to_bytes());
        let id = KeyId::for_public_key(&pk);
        self.keys.write().insert(id.clone(), key);
        id
    }
}

impl KeyStore for LocalKeyStore {
    fn create_key(&self) -> Result<KeyId, CryptoError> {
        let key = SigningKey::generate(&mut rand::rngs::OsRng);
        let id = self.insert(key);
        tracing::debug!(key = %id, "generated ed25519 key");
        Ok(id)
    }

    fn public_key(&self, key: &KeyId) -> Result<Ed25519PublicKey, CryptoError> {
        let keys = self.keys.read();
        let sk = keys
            .get(key)
            .ok_or_else(|| CryptoError::KeyNotFound(key.to_string()))?;
        Ok(Ed25519PublicKey(sk.verifying_key().to_bytes()))
    }

    fn sign(&self, key: &KeyId, message: &[u8]) -> Result<Ed25519Signature, CryptoError> {
        let keys = self.keys.read();
        let sk = keys
            .get(key)
            .ok_or_else(|| CryptoError::KeyNotFound(key.to_string()))?;
        Ok(Ed25519Signature(sk.sign(message).to_bytes()))
    }

    fn store_name(&self) -> &str {
        "LocalKeyStore"
    }
}

impl fmt::Debug for LocalKeyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LocalKeyStore({} keys)", self.len())
    }
}
