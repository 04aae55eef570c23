//! The packer capability and its parameters.

use async_trait::async_trait;
use zkid_core::Did;
use zkid_crypto::KeyId;

use crate::error::PackError;
use crate::message::{BasicMessage, MediaType};
use crate::registry::ProvingMethodAlg;

/// Per-call packing parameters.
#[derive(Debug, Clone)]
pub enum PackParams {
    /// Nothing to add (plain messages).
    None,
    /// Sign as `sender` with `key`.
    Signed {
        /// Signing identity.
        sender: Did,
        /// Key in the key store.
        key: KeyId,
    },
    /// Prove as `sender` with `method`.
    Zkp {
        /// Proving identity.
        sender: Did,
        /// Proving method to use.
        method: ProvingMethodAlg,
    },
}

/// Encodes and decodes one envelope media type.
#[async_trait]
pub trait Packer: Send + Sync {
    /// Media type handled.
    fn media_type(&self) -> MediaType;

    /// Wrap a JSON message payload.
    async fn pack(&self, payload: &[u8], params: &PackParams) -> Result<Vec<u8>, PackError>;

    /// Open an envelope, verifying whatever protects it.
    async fn unpack(&self, envelope: &[u8]) -> Result<BasicMessage, PackError>;
}

/// Check that `msg.from` names `proven`.
pub(crate) fn check_sender(msg: &BasicMessage, proven: &Did) -> Result<(), PackError> {
    let proven = proven.to_string();
    match msg.from.as_deref() {
        Some(from) if from == proven => Ok(()),
        other => Err(PackError::SenderMismatch {
            claimed: other.unwrap_or("<none>").to_string(),
            proven,
        }),
    }
}
