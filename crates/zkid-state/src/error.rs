//! Errors raised by the Merkle state engine.
//!
//! These are domain invariant violations: they are surfaced verbatim and
//! never retried internally.

use thiserror::Error;
use zkid_core::{Hash, Id, ValidationError};
use zkid_crypto::{CryptoError, SmtError};

use crate::state::StateStatus;

/// Error from a state engine operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// A claim with the same index hash already exists in the claims tree.
    #[error("claim index {0} already exists")]
    DuplicateIndex(Hash),

    /// The revocation nonce is already in the revocation tree.
    #[error("revocation nonce {0} is already revoked")]
    AlreadyRevoked(u64),

    /// The nonce lies outside the configured revocation nonce space.
    #[error("revocation nonce {nonce} is outside the nonce space of {budget}")]
    IndexOutOfBudget {
        /// The rejected nonce.
        nonce: u64,
        /// Size of the nonce space.
        budget: u64,
    },

    /// No identity with this id is held by the store.
    #[error("identity {0} not found")]
    IdentityNotFound(Id),

    /// No claim matches the lookup.
    #[error("claim not found: {0}")]
    ClaimNotFound(String),

    /// No state with this hash or sequence number exists for the identity.
    #[error("state not found: {0}")]
    StateNotFound(String),

    /// The status machine rejected the transition.
    #[error("invalid state transition {from} -> {to}")]
    InvalidTransition {
        /// Current status.
        from: StateStatus,
        /// Requested status.
        to: StateStatus,
    },

    /// A state of this identity is already pending or transacted.
    #[error("identity {0} already has a state transition in flight")]
    TransitionInFlight(Id),

    /// The identity has no changes since its current state.
    #[error("identity {0} has no unpublished changes")]
    NothingToPublish(Id),

    /// Tree operation failed.
    #[error("tree error: {0}")]
    Tree(SmtError),

    /// Hashing or signing failed.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Input validation failed.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl From<SmtError> for StateError {
    fn from(err: SmtError) -> Self {
        match err {
            SmtError::DuplicateIndex(h) => StateError::DuplicateIndex(h),
            other => StateError::Tree(other),
        }
    }
}
