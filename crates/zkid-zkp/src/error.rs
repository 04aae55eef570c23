//! Errors of the proof layer.

use thiserror::Error;

/// Error during proof generation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProofError {
    /// The inputs do not fit the circuit.
    #[error("circuit error: {0}")]
    Circuit(#[from] CircuitError),
    /// Witness generation failed.
    #[error("witness error: {0}")]
    Witness(String),
    /// Internal prover error.
    #[error("prover error: {0}")]
    Prover(String),
}

/// Error during proof verification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    /// The proof does not verify against the key and public signals.
    #[error("invalid proof: {0}")]
    InvalidProof(String),
    /// The proof is not shaped like a Groth16 proof.
    #[error("malformed proof: {0}")]
    Malformed(String),
    /// The verification key is unusable.
    #[error("key mismatch: {0}")]
    KeyMismatch(String),
}

/// Public signals that do not match a circuit's layout.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CircuitError {
    /// No circuit with this identifier is known.
    #[error("unknown circuit: {0}")]
    UnknownCircuit(String),
    /// Wrong number of public signals.
    #[error("circuit {circuit} expects {expected} public signals, got {got}")]
    SignalCount {
        /// Circuit identifier.
        circuit: String,
        /// Layout length.
        expected: usize,
        /// Signals supplied.
        got: usize,
    },
    /// A signal is not a valid value for its position.
    #[error("public signal {index} ({name}) is invalid: {reason}")]
    BadSignal {
        /// Position in the signal list.
        index: usize,
        /// Name of the signal in the layout.
        name: &'static str,
        /// What was wrong.
        reason: String,
    },
}

/// Error loading verification key material.
#[derive(Error, Debug)]
pub enum KeyLoadError {
    /// No key exists for the circuit.
    #[error("no verification key for circuit {0}")]
    NotFound(String),
    /// Reading the key failed.
    #[error("reading verification key {path}: {source}")]
    Io {
        /// File that failed.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The key file is not JSON.
    #[error("verification key for {circuit} is not valid JSON: {reason}")]
    Malformed {
        /// Circuit identifier.
        circuit: String,
        /// Parser message.
        reason: String,
    },
}
