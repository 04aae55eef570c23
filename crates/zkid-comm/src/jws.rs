//! # Signed Envelopes
//!
//! Compact JWS with `alg = EdDSA`. The `kid` header is
//! `<sender DID>#<key id>`; on unpack the key is resolved through a
//! [`KeyResolver`] and the message `from` must equal the DID part.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use zkid_core::Did;
use zkid_crypto::{Ed25519PublicKey, Ed25519Signature, KeyId, KeyStore};

use crate::error::PackError;
use crate::jwz::{b64_decode, b64_encode};
use crate::message::{BasicMessage, MediaType};
use crate::packer::{check_sender, PackParams, Packer};

const ALG_EDDSA: &str = "EdDSA";

/// Resolves the public key behind a `kid`.
#[async_trait]
pub trait KeyResolver: Send + Sync {
    /// Public key `key_id` of `did`.
    async fn resolve(&self, did: &Did, key_id: &KeyId) -> Result<Ed25519PublicKey, PackError>;
}

/// Resolver over an explicit table of (DID, key id) → key.
#[derive(Debug, Default)]
pub struct StaticKeyResolver {
    keys: RwLock<HashMap<(Did, KeyId), Ed25519PublicKey>>,
}

impl StaticKeyResolver {
    /// Empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `key` to `did`.
    pub fn insert(&self, did: Did, key_id: KeyId, key: Ed25519PublicKey) {
        self.keys.write().insert((did, key_id), key);
    }
}

#[async_trait]
impl KeyResolver for StaticKeyResolver {
    async fn resolve(&self, did: &Did, key_id: &KeyId) -> Result<Ed25519PublicKey, PackError> {
        self.keys
            .read()
            .get(&(*did, key_id.clone()))
            .copied()
            .ok_or_else(|| PackError::KeyNotResolved(format!("{did}#{key_id}")))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct JwsHeader {
    alg: String,
    kid: String,
    typ: MediaType,
}

/// Packer for `application/iden3comm-signed-json`.
pub struct JwsPacker {
    keys: Arc<dyn KeyStore>,
    resolver: Arc<dyn KeyResolver>,
}

impl JwsPacker {
    /// Sign through `keys`, verify through `resolver`.
    pub fn new(keys: Arc<dyn KeyStore>, resolver: Arc<dyn KeyResolver>) -> Self {
        Self { keys, resolver }
    }
}

impl std::fmt::Debug for JwsPacker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwsPacker")
            .field("key_store", &self.keys.store_name())
            .finish()
    }
}

#[async_trait]
impl Packer for JwsPacker {
    fn media_type(&self) -> MediaType {
        MediaType::Signed
    }

    async fn pack(&self, payload: &[u8], params: &PackParams) -> Result<Vec<u8>, PackError> {
        let PackParams::Signed { sender, key } = params else {
            return Err(PackError::InvalidParams("signed packer needs a sender and key".into()));
        };
        let msg: BasicMessage = serde_json::from_slice(payload)?;
        check_sender(&msg, sender)?;

        let header = JwsHeader {
            alg: ALG_EDDSA.into(),
            kid: format!("{sender}#{key}"),
            typ: MediaType::Signed,
        };
        let signing_input = format!(
            "{}.{}",
            b64_encode(&serde_json::to_vec(&header)?),
            b64_encode(payload)
        );
        let signature = self.keys.sign(key, signing_input.as_bytes())?;
        Ok(format!("{signing_input}.{}", b64_encode(signature.as_bytes())).into_bytes())
    }

    async fn unpack(&self, envelope: &[u8]) -> Result<BasicMessage, PackError> {
        let token = std::str::from_utf8(envelope)
            .map_err(|e| PackError::TokenMalformed(format!("not utf-8: {e}")))?
            .trim();
        let segments: Vec<&str> = token.split('.').collect();
        if segments.len() != 3 {
            return Err(PackError::TokenMalformed(format!(
                "expected 3 segments, got {}",
                segments.len()
            )));
        }
        let header: JwsHeader = serde_json::from_slice(&b64_decode(segments[0], "header")?)
            .map_err(|e| PackError::TokenMalformed(format!("header: {e}")))?;
        if header.alg != ALG_EDDSA {
            return Err(PackError::UnsupportedMediaType(format!("JWS alg {}", header.alg)));
        }
        let (did, key_id) = header
            .kid
            .split_once('#')
            .ok_or_else(|| PackError::TokenMalformed(format!("kid {} has no fragment", header.kid)))?;
        let did = Did::parse(did)?;
        let key_id: KeyId = key_id.parse()?;

        let public_key = self.resolver.resolve(&did, &key_id).await?;
        let signature = Ed25519Signature::from_slice(&b64_decode(segments[2], "signature")?)
            .map_err(|e| PackError::TokenMalformed(e.to_string()))?;
        let signing_input = &token[..segments[0].len() + 1 + segments[1].len()];
        public_key
            .verify(signing_input.as_bytes(), &signature)
            .map_err(|e| PackError::SignatureInvalid(e.to_string()))?;

        let msg: BasicMessage = serde_json::from_slice(&b64_decode(segments[1], "payload")?)?;
        check_sender(&msg, &did)?;
        Ok(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zkid_core::{Blockchain, DidMethod, Hash, Id, Network};
    use zkid_crypto::LocalKeyStore;

    fn did() -> Did {
        let mut genesis = [0u8; 32];
        genesis[25] = 4;
        Id::from_genesis(
            DidMethod::Iden3,
            Blockchain::Polygon,
            Network::Amoy,
            &Hash::from_le_bytes(genesis).unwrap(),
        )
        .unwrap()
        .to_did()
        .unwrap()
    }

    fn setup() -> (JwsPacker, Did, KeyId) {
        let keys = Arc::new(LocalKeyStore::new());
        let key = keys.create_key().unwrap();
        let resolver = Arc::new(StaticKeyResolver::new());
        let sender = did();
        resolver.insert(sender, key.clone(), keys.public_key(&key).unwrap());
        (JwsPacker::new(keys, resolver), sender, key)
    }

    fn payload(from: &Did) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "id": "m1",
            "type": "https://iden3-communication.io/credentials/1.0/offer",
            "from": from.to_string(),
            "body": {}
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn signed_round_trip() {
        let (packer, sender, key) = setup();
        let token = packer
            .pack(&payload(&sender), &PackParams::Signed { sender, key })
            .await
            .unwrap();
        let msg = packer.unpack(&token).await.unwrap();
        assert_eq!(msg.id, "m1");
        assert_eq!(msg.from.as_deref(), Some(sender.to_string().as_str()));
    }

    #[tokio::test]
    async fn tampered_payload_fails_signature() {
        let (packer, sender, key) = setup();
        let token = packer
            .pack(&payload(&sender), &PackParams::Signed { sender, key })
            .await
            .unwrap();
        let token = String::from_utf8(token).unwrap();
        let parts: Vec<&str> = token.split('.').collect();
        let mut forged: serde_json::Value =
            serde_json::from_slice(&b64_decode(parts[1], "payload").unwrap()).unwrap();
        forged["id"] = "m2".into();
        let forged = format!(
            "{}.{}.{}",
            parts[0],
            b64_encode(&serde_json::to_vec(&forged).unwrap()),
            parts[2]
        );
        let err = packer.unpack(forged.as_bytes()).await.unwrap_err();
        assert!(matches!(err, PackError::SignatureInvalid(_)));
    }

    #[tokio::test]
    async fn unknown_key_is_not_resolved() {
        let (_, sender, _) = setup();
        let keys = Arc::new(LocalKeyStore::new());
        let key = keys.create_key().unwrap();
        let packer = JwsPacker::new(keys, Arc::new(StaticKeyResolver::new()));
        let token = packer
            .pack(&payload(&sender), &PackParams::Signed { sender, key })
            .await
            .unwrap();
        assert!(matches!(
            packer.unpack(&token).await,
            Err(PackError::KeyNotResolved(_))
        ));
    }

    #[tokio::test]
    async fn sender_must_match_from() {
        let (packer, sender, key) = setup();
        let mut other = serde_json::from_slice::<serde_json::Value>(&payload(&sender)).unwrap();
        other["from"] = "did:iden3:polygon:amoy:someoneelse".into();
        let err = packer
            .pack(
                &serde_json::to_vec(&other).unwrap(),
                &PackParams::Signed { sender, key },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PackError::SenderMismatch { .. }));
    }

    #[tokio::test]
    async fn wrong_params_are_rejected() {
        let (packer, sender, _) = setup();
        let err = packer.pack(&payload(&sender), &PackParams::None).await.unwrap_err();
        assert!(matches!(err, PackError::InvalidParams(_)));
    }
}
