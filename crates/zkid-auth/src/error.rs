//! # Verification Errors
//!
//! Proof and query failures are terminal for the presented proof: the
//! holder must produce a new one. Resolver failures are I/O and the whole
//! verification may be retried.

use thiserror::Error;
use zkid_core::ValidationError;
use zkid_zkp::{CircuitError, KeyLoadError, VerifyError};

/// Error from the proof verification engine.
#[derive(Error, Debug)]
pub enum VerificationError {
    /// Signal count, circuit id or proof shape is wrong.
    #[error("invalid proof structure: {0}")]
    InvalidProofStructure(String),

    /// The proof does not verify against the circuit's key.
    #[error("proof is not valid: {0}")]
    ProofInvalid(String),

    /// The public signals do not answer the declared query.
    #[error("query not satisfied: {0}")]
    QueryNotSatisfied(String),

    /// The query itself is malformed.
    #[error("malformed query: {0}")]
    MalformedQuery(String),

    /// No resolver is registered for the chain.
    #[error("no state resolver for {0}")]
    ResolverNotFound(String),

    /// The issuer state was never published and is not its genesis state.
    #[error("issuer state is not valid: {0}")]
    IssuerStateInvalid(String),

    /// The issuer's non-revocation state was replaced too long ago.
    #[error("issuer non-revocation state is stale: replaced {age_secs}s ago, tolerance {tolerance_secs}s")]
    IssuerNonRevocationStateStale {
        /// Seconds since the state was replaced.
        age_secs: i64,
        /// Configured tolerance.
        tolerance_secs: i64,
    },

    /// The global identity state root is unknown or stale.
    #[error("global state root is not valid: {0}")]
    GistRootInvalid(String),

    /// The proving identity is not the message sender.
    #[error("sender mismatch: expected {expected}, proof is for {proven}")]
    SenderMismatch {
        /// Sender named by the message.
        expected: String,
        /// Identity in the public signals.
        proven: String,
    },

    /// The proof answers a different request.
    #[error("request id mismatch: expected {expected}, proof carries {got}")]
    RequestIdMismatch {
        /// Request id the verifier issued.
        expected: String,
        /// Request id in the public signals.
        got: String,
    },

    /// The response does not belong to the request's thread.
    #[error("thread mismatch: expected {expected}, got {got}")]
    ThreadMismatch {
        /// Request thread id.
        expected: String,
        /// Response thread id.
        got: String,
    },

    /// A protocol message or body could not be decoded.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// A required scope has no proof in the response.
    #[error("no proof for scope {0}")]
    MissingScope(u32),

    /// Resolving a state did not finish in time.
    #[error("state resolution timed out after {0}ms")]
    ResolverTimeout(u128),

    /// Resolver I/O failure.
    #[error("resolver error: {0}")]
    Resolver(String),

    /// The schema could not be loaded.
    #[error("schema error: {0}")]
    Schema(String),

    /// Verification key could not be loaded.
    #[error(transparent)]
    KeyLoad(#[from] KeyLoadError),

    /// Identifier validation failed.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl VerificationError {
    /// Whether the caller may retry the same verification.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ResolverTimeout(_) | Self::Resolver(_) | Self::ResolverNotFound(_) | Self::Schema(_)
        )
    }
}

impl From<CircuitError> for VerificationError {
    fn from(err: CircuitError) -> Self {
        Self::InvalidProofStructure(err.to_string())
    }
}

impl From<VerifyError> for VerificationError {
    fn from(err: VerifyError) -> Self {
        match err {
            VerifyError::Malformed(m) => Self::InvalidProofStructure(m),
            other => Self::ProofInvalid(other.to_string()),
        }
    }
}
