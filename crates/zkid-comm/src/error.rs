//! Packing and unpacking errors.

use thiserror::Error;
use zkid_core::ValidationError;
use zkid_crypto::CryptoError;
use zkid_zkp::{CircuitError, ProofError, VerifyError};

/// Error from a packer or the package manager.
#[derive(Error, Debug)]
pub enum PackError {
    /// No packer, or no proving/verification method, for the envelope.
    #[error("unsupported media type or method: {0}")]
    UnsupportedMediaType(String),

    /// Wrong segment count, bad base64 or bad header JSON.
    #[error("malformed token: {0}")]
    TokenMalformed(String),

    /// The embedded proof or its state check was rejected.
    #[error("proof verification failed: {0}")]
    ProofVerificationFailed(String),

    /// The JWS signature does not verify.
    #[error("signature verification failed: {0}")]
    SignatureInvalid(String),

    /// The message `from` is not the identity that proved or signed it.
    #[error("sender mismatch: message from {claimed}, proven by {proven}")]
    SenderMismatch {
        /// DID in the message.
        claimed: String,
        /// DID bound by the proof or signature.
        proven: String,
    },

    /// Missing or wrong packing parameters.
    #[error("invalid pack parameters: {0}")]
    InvalidParams(String),

    /// The signing key is not known to the resolver.
    #[error("key not resolved: {0}")]
    KeyNotResolved(String),

    /// Payload is not a protocol message.
    #[error("invalid message: {0}")]
    InvalidMessage(#[from] serde_json::Error),

    /// Proof generation failed.
    #[error("proving failed: {0}")]
    Proving(#[from] ProofError),

    /// Signing failed.
    #[error("signing failed: {0}")]
    Crypto(#[from] CryptoError),

    /// Identifier validation failed.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl From<VerifyError> for PackError {
    fn from(err: VerifyError) -> Self {
        PackError::ProofVerificationFailed(err.to_string())
    }
}

impl From<CircuitError> for PackError {
    fn from(err: CircuitError) -> Self {
        PackError::ProofVerificationFailed(err.to_string())
    }
}
