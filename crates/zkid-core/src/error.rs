//! # Validation Errors
//!
//! Input validation failures shared by every crate. These map to the
//! "malformed input" class of the error taxonomy: they are never retried
//! and always carry the offending value.

use thiserror::Error;

/// A value supplied from outside the process failed validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The DID string does not follow `did:<method>:<blockchain>:<network>:<id>`.
    #[error("malformed DID {did:?}: {reason}")]
    MalformedDid {
        /// The rejected input.
        did: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The method/blockchain/network combination is not supported.
    #[error("unsupported DID metadata: method={method} blockchain={blockchain} network={network}")]
    UnsupportedDidMetadata {
        /// DID method name.
        method: String,
        /// Blockchain name.
        blockchain: String,
        /// Network name.
        network: String,
    },

    /// The identity id failed length, encoding or checksum validation.
    #[error("malformed identity id: {0}")]
    MalformedId(String),

    /// A value is not a canonical element of the BN254 scalar field.
    #[error("value is not a field element: {0}")]
    NotFieldElement(String),

    /// A URL-like field is empty or unparseable.
    #[error("malformed url {0:?}")]
    MalformedUrl(String),
}
