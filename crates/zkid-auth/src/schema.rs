//! # Schemas
//!
//! JSON-LD schemas are used only to interpret queries: to compute the
//! schema hash a credential type is issued under, and to find which claim
//! slot a field is serialized into. They never enter the cryptographic
//! core.
//!
//! The schema hash of type `T` in context `C` is the last 16 bytes of
//! `keccak256("C#T")`.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use sha3::{Digest, Keccak256};
use zkid_core::ValidationError;
use zkid_state::SchemaHash;

use crate::error::VerificationError;

/// Fetches schema documents.
#[async_trait]
pub trait SchemaLoader: Send + Sync {
    /// Raw schema bytes at `url`.
    async fn load(&self, url: &str) -> Result<Vec<u8>, VerificationError>;
}

/// Reject URLs that are neither HTTP(S) nor IPFS.
pub fn validate_url(url: &str) -> Result<(), ValidationError> {
    let ok = ["https://", "http://", "ipfs://"]
        .iter()
        .any(|p| url.len() > p.len() && url.starts_with(p));
    if !ok {
        return Err(ValidationError::MalformedUrl(url.to_string()));
    }
    Ok(())
}

/// Schema hash of `schema_type` in the JSON-LD context at `context_url`.
pub fn schema_hash(context_url: &str, schema_type: &str) -> SchemaHash {
    let digest = Keccak256::digest(format!("{context_url}#{schema_type}").as_bytes());
    let mut out = [0u8; 16];
    out.copy_from_slice(&digest[digest.len() - 16..]);
    SchemaHash(out)
}

/// Claim slot a field of `schema_type` is serialized into, from the
/// type's `iden3_serialization` map (`slotIndexA` → 2, `slotIndexB` → 3,
/// `slotValueA` → 6, `slotValueB` → 7).
pub fn field_slot(schema: &Value, schema_type: &str, field: &str) -> Result<u64, VerificationError> {
    let type_def = find_type(schema, schema_type).ok_or_else(|| {
        VerificationError::Schema(format!("type {schema_type} not found in schema"))
    })?;
    let serialization = type_def
        .get("@context")
        .and_then(|c| c.get("iden3_serialization"))
        .and_then(Value::as_object)
        .ok_or_else(|| {
            VerificationError::Schema(format!("type {schema_type} has no iden3_serialization"))
        })?;
    let slot = serialization
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| {
            VerificationError::QueryNotSatisfied(format!("field {field} is not serialized into a slot"))
        })?;
    match slot {
        "slotIndexA" => Ok(2),
        "slotIndexB" => Ok(3),
        "slotValueA" => Ok(6),
        "slotValueB" => Ok(7),
        other => Err(VerificationError::Schema(format!("unknown slot {other}"))),
    }
}

fn find_type<'a>(schema: &'a Value, schema_type: &str) -> Option<&'a Value> {
    let contexts: Vec<&Value> = match schema.get("@context") {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(other) => vec![other],
        None => return None,
    };
    contexts
        .into_iter()
        .find_map(|c| c.get(schema_type).filter(|v| v.is_object()))
}

/// Schemas held in memory, keyed by URL.
#[derive(Debug, Default)]
pub struct MemorySchemaLoader {
    schemas: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemorySchemaLoader {
    /// Empty loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema document.
    pub fn insert(&self, url: impl Into<String>, schema: impl Into<Vec<u8>>) {
        self.schemas.write().insert(url.into(), schema.into());
    }
}

#[async_trait]
impl SchemaLoader for MemorySchemaLoader {
    async fn load(&self, url: &str) -> Result<Vec<u8>, VerificationError> {
        validate_url(url)?;
        self.schemas
            .read()
            .get(url)
            .cloned()
            .ok_or_else(|| VerificationError::Schema(format!("schema {url} not found")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KYC: &str = r#"{
        "@context": [{
            "@version": 1.1,
            "KYCAgeCredential": {
                "@id": "https://schemas.example/kyc#KYCAgeCredential",
                "@context": {
                    "iden3_serialization": { "birthday": "slotIndexA", "documentType": "slotValueB" }
                }
            }
        }]
    }"#;

    #[test]
    fn schema_hash_is_keccak_suffix() {
        let a = schema_hash("https://schemas.example/kyc.jsonld", "KYCAgeCredential");
        let b = schema_hash("https://schemas.example/kyc.jsonld", "KYCCountryCredential");
        assert_ne!(a, b);
        let digest = Keccak256::digest(b"https://schemas.example/kyc.jsonld#KYCAgeCredential");
        assert_eq!(&a.0[..], &digest[16..]);
    }

    #[test]
    fn serialized_fields_map_to_slots() {
        let schema: Value = serde_json::from_str(KYC).unwrap();
        assert_eq!(field_slot(&schema, "KYCAgeCredential", "birthday").unwrap(), 2);
        assert_eq!(field_slot(&schema, "KYCAgeCredential", "documentType").unwrap(), 7);
        assert!(matches!(
            field_slot(&schema, "KYCAgeCredential", "name"),
            Err(VerificationError::QueryNotSatisfied(_))
        ));
        assert!(matches!(
            field_slot(&schema, "Other", "birthday"),
            Err(VerificationError::Schema(_))
        ));
    }

    #[test]
    fn urls_are_validated() {
        validate_url("https://schemas.example/kyc.jsonld").unwrap();
        validate_url("ipfs://QmXyz").unwrap();
        assert!(validate_url("ftp://x").is_err());
        assert!(validate_url("https://").is_err());
    }

    #[tokio::test]
    async fn memory_loader_serves_registered_schemas() {
        let loader = MemorySchemaLoader::new();
        loader.insert("https://schemas.example/kyc.jsonld", KYC);
        assert!(loader.load("https://schemas.example/kyc.jsonld").await.is_ok());
        assert!(matches!(
            loader.load("https://schemas.example/other.jsonld").await,
            Err(VerificationError::Schema(_))
        ));
        assert!(matches!(
            loader.load("not a url").await,
            Err(VerificationError::Validation(_))
        ));
    }
}
