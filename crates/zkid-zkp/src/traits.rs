//! # Proof System Trait
//!
//! The prover and verifier are opaque capabilities. Implementations are
//! interchangeable behind `Arc<dyn ProofSystem>`: the deterministic mock in
//! [`crate::mock`] for tests and development, a Groth16 backend in
//! production.
//!
//! ## Security Invariant
//!
//! Verification is a pure function of the verification key, the circuit and
//! the proof with its public signals. Implementations hold no mutable state.

use serde::{Deserialize, Serialize};
use zkid_core::Hash;

use crate::circuits::CircuitId;
use crate::error::{ProofError, VerifyError};
use crate::proof::ZkProof;

/// Inputs to one proving run.
///
/// Witness calculation happens outside this workspace, so callers supply
/// the circuit's public outputs together with the private inputs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CircuitInputs {
    /// Public signals, in circuit order.
    pub public: Vec<Hash>,
    /// Private inputs, circuit-specific.
    #[serde(default)]
    pub private: serde_json::Value,
}

/// A zero-knowledge proof system.
pub trait ProofSystem: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Produce a proof for `circuit`.
    fn prove(
        &self,
        circuit: CircuitId,
        proving_key: &[u8],
        inputs: &CircuitInputs,
    ) -> Result<ZkProof, ProofError>;

    /// Verify `proof` for `circuit`. `Ok(())` means the proof is valid.
    fn verify(
        &self,
        circuit: CircuitId,
        verification_key: &[u8],
        proof: &ZkProof,
    ) -> Result<(), VerifyError>;
}
