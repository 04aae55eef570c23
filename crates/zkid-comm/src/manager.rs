//! # Package Manager
//!
//! Routes envelopes to packers by media type. On unpack the media type is
//! detected from the envelope itself: a JSON object is plain (or names its
//! `typ`), anything else is a compact token whose header carries `typ`.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::PackError;
use crate::jwz::b64_decode;
use crate::message::{BasicMessage, MediaType};
use crate::packer::{PackParams, Packer};

/// Packers keyed by media type.
#[derive(Default)]
pub struct PackageManager {
    packers: HashMap<MediaType, Arc<dyn Packer>>,
}

impl PackageManager {
    /// Empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `packer` for its media type.
    pub fn register(&mut self, packer: Arc<dyn Packer>) -> &mut Self {
        self.packers.insert(packer.media_type(), packer);
        self
    }

    fn packer(&self, media: MediaType) -> Result<&Arc<dyn Packer>, PackError> {
        self.packers
            .get(&media)
            .ok_or_else(|| PackError::UnsupportedMediaType(media.to_string()))
    }

    /// Pack `payload` as `media`.
    pub async fn pack(&self, media: MediaType, payload: &[u8], params: &PackParams) -> Result<Vec<u8>, PackError> {
        self.packer(media)?.pack(payload, params).await
    }

    /// Unpack an envelope of any registered media type.
    pub async fn unpack(&self, envelope: &[u8]) -> Result<(BasicMessage, MediaType), PackError> {
        let media = Self::media_type_of(envelope)?;
        let msg = self.packer(media)?.unpack(envelope).await?;
        tracing::debug!(media = %media, message_type = %msg.message_type, "envelope unpacked");
        Ok((msg, media))
    }

    /// Detect the media type of an envelope.
    pub fn media_type_of(envelope: &[u8]) -> Result<MediaType, PackError> {
        let trimmed = std::str::from_utf8(envelope)
            .map_err(|e| PackError::TokenMalformed(format!("not utf-8: {e}")))?
            .trim();
        if trimmed.starts_with('{') {
            let value: serde_json::Value = serde_json::from_str(trimmed)?;
            return match value.get("typ").and_then(|t| t.as_str()) {
                Some(typ) => typ.parse(),
                None => Ok(MediaType::Plain),
            };
        }
        let header = trimmed
            .split('.')
            .next()
            .ok_or_else(|| PackError::TokenMalformed("empty envelope".into()))?;
        let header: serde_json::Value = serde_json::from_slice(&b64_decode(header, "header")?)
            .map_err(|e| PackError::TokenMalformed(format!("header: {e}")))?;
        header
            .get("typ")
            .and_then(|t| t.as_str())
            .ok_or_else(|| PackError::TokenMalformed("header has no typ".into()))?
            .parse()
    }
}

impl std::fmt::Debug for PackageManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageManager")
            .field("media_types", &self.packers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwz::b64_encode;
    use crate::plain::PlainPacker;

    #[test]
    fn json_without_typ_is_plain() {
        assert_eq!(
            PackageManager::media_type_of(br#" {"id":"1","type":"t"}"#).unwrap(),
            MediaType::Plain
        );
    }

    #[test]
    fn token_typ_comes_from_header() {
        let header = b64_encode(br#"{"alg":"EdDSA","typ":"application/iden3comm-signed-json"}"#);
        let envelope = format!("{header}.e30.sig");
        assert_eq!(
            PackageManager::media_type_of(envelope.as_bytes()).unwrap(),
            MediaType::Signed
        );
    }

    #[test]
    fn unknown_typ_is_unsupported() {
        let err = PackageManager::media_type_of(br#"{"typ":"text/html"}"#).unwrap_err();
        assert!(matches!(err, PackError::UnsupportedMediaType(_)));
    }

    #[tokio::test]
    async fn unregistered_media_type_is_unsupported() {
        let mut manager = PackageManager::new();
        manager.register(Arc::new(PlainPacker));
        let err = manager
            .pack(MediaType::Zkp, b"{}", &PackParams::None)
            .await
            .unwrap_err();
        assert!(matches!(err, PackError::UnsupportedMediaType(_)));
    }

    #[tokio::test]
    async fn plain_through_manager() {
        let mut manager = PackageManager::new();
        manager.register(Arc::new(PlainPacker));
        let packed = manager
            .pack(MediaType::Plain, br#"{"id":"1","type":"t"}"#, &PackParams::None)
            .await
            .unwrap();
        let (msg, media) = manager.unpack(&packed).await.unwrap();
        assert_eq!(media, MediaType::Plain);
        assert_eq!(msg.id, "1");
    }
}
