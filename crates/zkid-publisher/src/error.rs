//! # Publisher Errors
//!
//! `NoStatesToProcess` and `StateIsBeingProcessed` are expected outcomes
//! reported back to callers, not faults. Chain I/O errors may be retried;
//! a failed transaction leaves the identity's changes dirty so the next
//! publish picks them up.

use std::path::PathBuf;

use thiserror::Error;
use zkid_core::Id;
use zkid_crypto::CryptoError;
use zkid_state::StateError;

/// Error from publishing or confirming a state.
#[derive(Error, Debug)]
pub enum PublishError {
    /// Nothing changed since the identity's current state.
    #[error("no states to process for {0}")]
    NoStatesToProcess(Id),

    /// A transition of this identity is already pending or transacted.
    #[error("state of {0} is being processed")]
    StateIsBeingProcessed(Id),

    /// A chain call did not answer in time.
    #[error("{call} timed out after {ms}ms")]
    RpcTimeout {
        /// The RPC that timed out.
        call: &'static str,
        /// The bound applied.
        ms: u128,
    },

    /// A chain call failed.
    #[error("chain error: {0}")]
    Chain(String),

    /// The transaction was dropped or reverted.
    #[error("transaction {tx_id} failed: {reason}")]
    TransactionFailed {
        /// Transaction id.
        tx_id: String,
        /// Drop or revert reason.
        reason: String,
    },

    /// A transacted state has no transaction id recorded.
    #[error("state {seq} of {id} has no transaction id")]
    MissingTransaction {
        /// Identity.
        id: Id,
        /// Log position.
        seq: u64,
    },

    /// Pushing nodes to the reverse hash service failed.
    #[error("reverse hash service error: {0}")]
    Rhs(String),

    /// State engine refused the operation.
    #[error(transparent)]
    State(StateError),

    /// Signing the transition failed.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl PublishError {
    /// Expected, non-fatal conditions reported to the caller as information.
    pub fn is_informational(&self) -> bool {
        matches!(self, Self::NoStatesToProcess(_) | Self::StateIsBeingProcessed(_))
    }

    /// Chain or RHS I/O worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RpcTimeout { .. } | Self::Chain(_) | Self::Rhs(_))
    }
}

impl From<StateError> for PublishError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::NothingToPublish(id) => Self::NoStatesToProcess(id),
            StateError::TransitionInFlight(id) => Self::StateIsBeingProcessed(id),
            other => Self::State(other),
        }
    }
}

/// Error loading or validating publisher configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The YAML document is malformed.
    #[error("malformed configuration: {0}")]
    Yaml(String),

    /// A value could not be parsed or is out of range.
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        /// Setting name.
        key: String,
        /// Offending value.
        value: String,
        /// What was wrong.
        reason: String,
    },

    /// `min_gas_price` exceeds `max_gas_price`.
    #[error("min gas price {min} exceeds max gas price {max}")]
    GasBounds {
        /// Configured minimum.
        min: u64,
        /// Configured maximum.
        max: u64,
    },
}
