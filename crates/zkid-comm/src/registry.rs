//! # Proving Method Registry
//!
//! Proof-carrying tokens name their proving method by `(alg, circuitId)`.
//! The registry maps that pair to a [`ProvingMethod`], which lets several
//! circuit versions and proof backends coexist behind one packer. It is a
//! constructed value handed to [`ZkpPacker`](crate::ZkpPacker), never a
//! process-wide table.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use zkid_core::Hash;
use zkid_zkp::{AuthV2PubSignals, CircuitId, CircuitInputs, ProofSystem, ZkProof};

use crate::error::PackError;

/// Algorithm name of Groth16 proofs.
pub const ALG_GROTH16: &str = "groth16";

/// Key of a proving method.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvingMethodAlg {
    /// Proof algorithm, e.g. `groth16`.
    pub alg: String,
    /// Circuit identifier.
    pub circuit_id: CircuitId,
}

impl ProvingMethodAlg {
    /// Build a key.
    pub fn new(alg: impl Into<String>, circuit_id: CircuitId) -> Self {
        Self {
            alg: alg.into(),
            circuit_id,
        }
    }
}

impl ProvingMethodAlg {
    /// Whether proofs of this circuit carry the token's message hash as a
    /// public signal. Only such circuits can protect a JWZ payload.
    pub fn binds_message_hash(&self) -> bool {
        self.circuit_id == CircuitId::AuthV2
    }
}

impl fmt::Display for ProvingMethodAlg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.alg, self.circuit_id)
    }
}

/// Produces and checks the proof bound into a token.
pub trait ProvingMethod: Send + Sync {
    /// The key this method is registered under.
    fn alg(&self) -> &ProvingMethodAlg;

    /// Prove over prepared inputs.
    fn prove(&self, inputs: &CircuitInputs, proving_key: &[u8]) -> Result<ZkProof, PackError>;

    /// Check that `proof` is valid and bound to `message_hash`.
    fn verify(&self, message_hash: &Hash, proof: &ZkProof, verification_key: &[u8]) -> Result<(), PackError>;
}

/// A proving method backed by a [`ProofSystem`].
///
/// The `authV2` challenge signal must equal the token's message hash.
/// Circuits without such a signal are refused in both directions.
pub struct SnarkProvingMethod {
    alg: ProvingMethodAlg,
    system: Arc<dyn ProofSystem>,
}

impl SnarkProvingMethod {
    /// Method `alg` over `system`.
    pub fn new(alg: ProvingMethodAlg, system: Arc<dyn ProofSystem>) -> Self {
        Self { alg, system }
    }
}

impl fmt::Debug for SnarkProvingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnarkProvingMethod")
            .field("alg", &self.alg)
            .field("system", &self.system.name())
            .finish()
    }
}

impl ProvingMethod for SnarkProvingMethod {
    fn alg(&self) -> &ProvingMethodAlg {
        &self.alg
    }

    fn prove(&self, inputs: &CircuitInputs, proving_key: &[u8]) -> Result<ZkProof, PackError> {
        require_binding(&self.alg)?;
        Ok(self.system.prove(self.alg.circuit_id, proving_key, inputs)?)
    }

    fn verify(&self, message_hash: &Hash, proof: &ZkProof, verification_key: &[u8]) -> Result<(), PackError> {
        require_binding(&self.alg)?;
        let signals = AuthV2PubSignals::from_signals(&proof.pub_signals)?;
        if signals.challenge != *message_hash {
            return Err(PackError::ProofVerificationFailed(
                "challenge is not the message hash".into(),
            ));
        }
        self.system
            .verify(self.alg.circuit_id, verification_key, proof)?;
        Ok(())
    }
}

pub(crate) fn require_binding(alg: &ProvingMethodAlg) -> Result<(), PackError> {
    if alg.binds_message_hash() {
        Ok(())
    } else {
        Err(PackError::UnsupportedMediaType(format!(
            "{alg} has no signal binding the message hash"
        )))
    }
}

/// Proving methods keyed by `(alg, circuitId)`.
#[derive(Default)]
pub struct ProvingMethodRegistry {
    methods: RwLock<HashMap<ProvingMethodAlg, Arc<dyn ProvingMethod>>>,
}

impl ProvingMethodRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `method` under its own key, replacing any previous one.
    pub fn register(&self, method: Arc<dyn ProvingMethod>) {
        let alg = method.alg().clone();
        tracing::debug!(method = %alg, "proving method registered");
        self.methods.write().insert(alg, method);
    }

    /// Method for `alg`.
    pub fn get(&self, alg: &ProvingMethodAlg) -> Result<Arc<dyn ProvingMethod>, PackError> {
        self.methods
            .read()
            .get(alg)
            .cloned()
            .ok_or_else(|| PackError::UnsupportedMediaType(format!("no proving method {alg}")))
    }

    /// Registered keys, sorted.
    pub fn algs(&self) -> Vec<ProvingMethodAlg> {
        let mut algs: Vec<_> = self.methods.read().keys().cloned().collect();
        algs.sort_by(|a, b| (&a.alg, a.circuit_id).cmp(&(&b.alg, b.circuit_id)));
        algs
    }
}

impl fmt::Debug for ProvingMethodRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvingMethodRegistry")
            .field("methods", &self.algs())
            .finish()
    }
}
