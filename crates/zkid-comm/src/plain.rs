//! Plain JSON envelopes: the payload is the message.

use async_trait::async_trait;

use crate::error::PackError;
use crate::message::{BasicMessage, MediaType};
use crate::packer::{PackParams, Packer};

/// Packer for `application/iden3comm-plain-json`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainPacker;

#[async_trait]
impl Packer for PlainPacker {
    fn media_type(&self) -> MediaType {
        MediaType::Plain
    }

    async fn pack(&self, payload: &[u8], _params: &PackParams) -> Result<Vec<u8>, PackError> {
        let mut msg: BasicMessage = serde_json::from_slice(payload)?;
        msg.typ = Some(MediaType::Plain);
        Ok(serde_json::to_vec(&msg)?)
    }

    async fn unpack(&self, envelope: &[u8]) -> Result<BasicMessage, PackError> {
        Ok(serde_json::from_slice(envelope)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn plain_round_trip() {
        let payload = br#"{"id":"1","type":"https://iden3-communication.io/authorization/1.0/request","body":{"x":1}}"#;
        let packed = PlainPacker.pack(payload, &PackParams::None).await.unwrap();
        let msg = PlainPacker.unpack(&packed).await.unwrap();
        assert_eq!(msg.typ, Some(MediaType::Plain));
        assert_eq!(msg.body["x"], 1);
    }

    #[tokio::test]
    async fn non_message_is_rejected() {
        let err = PlainPacker.pack(b"[1,2]", &PackParams::None).await.unwrap_err();
        assert!(matches!(err, PackError::InvalidMessage(_)));
    }
}
