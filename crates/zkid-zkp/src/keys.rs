//! # Verification Key Loading
//!
//! Verification keys are JSON documents looked up by circuit identifier.
//! Their content is opaque here; loaders only check that the bytes parse as
//! JSON before handing them to a [`ProofSystem`](crate::ProofSystem).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::circuits::CircuitId;
use crate::error::KeyLoadError;

/// Source of verification keys.
pub trait VerificationKeyLoader: Send + Sync {
    /// Key bytes for `circuit`.
    fn load(&self, circuit: CircuitId) -> Result<Vec<u8>, KeyLoadError>;
}

fn check_json(circuit: CircuitId, bytes: &[u8]) -> Result<(), KeyLoadError> {
    serde_json::from_slice::<serde_json::Value>(bytes)
        .map(|_| ())
        .map_err(|e| KeyLoadError::Malformed {
            circuit: circuit.to_string(),
            reason: e.to_string(),
        })
}

/// Reads `<dir>/<circuitId>.json`, caching each key after the first read.
#[derive(Debug)]
pub struct FsKeyLoader {
    dir: PathBuf,
    cache: RwLock<HashMap<CircuitId, Vec<u8>>>,
}

impl FsKeyLoader {
    /// Loader over `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Directory keys are read from.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, circuit: CircuitId) -> PathBuf {
        self.dir.join(format!("{}.json", circuit.as_str()))
    }
}

impl VerificationKeyLoader for FsKeyLoader {
    fn load(&self, circuit: CircuitId) -> Result<Vec<u8>, KeyLoadError> {
        if let Some(key) = self.cache.read().get(&circuit) {
            return Ok(key.clone());
        }
        let path = self.path(circuit);
        let bytes = match std::fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(KeyLoadError::NotFound(circuit.to_string()))
            }
            Err(source) => {
                return Err(KeyLoadError::Io {
                    path: path.display().to_string(),
                    source,
                })
            }
        };
        check_json(circuit, &bytes)?;
        tracing::debug!(circuit = %circuit, path = %path.display(), "verification key loaded");
        self.cache.write().insert(circuit, bytes.clone());
        Ok(bytes)
    }
}

/// In-memory keys, for tests and embedded deployments.
#[derive(Debug, Default)]
pub struct MemoryKeyLoader {
    keys: RwLock<HashMap<CircuitId, Vec<u8>>>,
}

impl MemoryKeyLoader {
    /// Empty loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a key.
    pub fn insert(&self, circuit: CircuitId, key: impl Into<Vec<u8>>) {
        self.keys.write().insert(circuit, key.into());
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(self, circuit: CircuitId, key: impl Into<Vec<u8>>) -> Self {
        self.insert(circuit, key);
        self
    }
}

impl VerificationKeyLoader for MemoryKeyLoader {
    fn load(&self, circuit: CircuitId) -> Result<Vec<u8>, KeyLoadError> {
        self.keys
            .read()
            .get(&circuit)
            .cloned()
            .ok_or_else(|| KeyLoadError::NotFound(circuit.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fs_loader_reads_circuit_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("authV2.json"), br#"{"protocol":"groth16"}"#).unwrap();
        let loader = FsKeyLoader::new(dir.path());
        let key = loader.load(CircuitId::AuthV2).unwrap();
        assert_eq!(key, br#"{"protocol":"groth16"}"#);
    }

    #[test]
    fn fs_loader_caches() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("authV2.json");
        std::fs::write(&path, b"{}").unwrap();
        let loader = FsKeyLoader::new(dir.path());
        loader.load(CircuitId::AuthV2).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loader.load(CircuitId::AuthV2).unwrap(), b"{}");
    }

    #[test]
    fn missing_key_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let loader = FsKeyLoader::new(dir.path());
        assert!(matches!(
            loader.load(CircuitId::AtomicQuerySigV2),
            Err(KeyLoadError::NotFound(c)) if c == "credentialAtomicQuerySigV2"
        ));
    }

    #[test]
    fn non_json_key_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("authV2.json"), b"not json").unwrap();
        let loader = FsKeyLoader::new(dir.path());
        assert!(matches!(
            loader.load(CircuitId::AuthV2),
            Err(KeyLoadError::Malformed { .. })
        ));
    }

    #[test]
    fn memory_loader() {
        let loader = MemoryKeyLoader::new().with(CircuitId::AuthV2, b"k".to_vec());
        assert_eq!(loader.load(CircuitId::AuthV2).unwrap(), b"k");
        assert!(loader.load(CircuitId::AtomicQueryMtpV2).is_err());
    }
}
