//! # Proof-Carrying Envelopes
//!
//! [`ZkpPacker`] packs a message into a JWZ token whose proof binds the
//! message hash, and on unpack:
//!
//! 1. parses the three segments (`TokenMalformed` on failure),
//! 2. looks up the proving method named by `(alg, circuitId)` and its
//!    verification parameters (`UnsupportedMediaType` if absent, or if the
//!    circuit has no signal binding the message hash),
//! 3. verifies the proof against the message hash
//!    (`ProofVerificationFailed`),
//! 4. runs the state check for the circuit's public signals,
//! 5. checks that the prover is the message sender (`SenderMismatch`).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use zkid_core::{Did, Hash};
use zkid_zkp::{AuthV2PubSignals, CircuitId, CircuitInputs};

use crate::error::PackError;
use crate::jwz::Token;
use crate::message::{BasicMessage, MediaType};
use crate::packer::{check_sender, PackParams, Packer};
use crate::registry::{require_binding, ProvingMethodAlg, ProvingMethodRegistry};

/// Checks that the states named in a proof's public signals are genuine.
#[async_trait]
pub trait StateVerifier: Send + Sync {
    /// Verify the states referenced by `pub_signals` of `circuit`.
    async fn verify_state(&self, circuit: CircuitId, pub_signals: &[String]) -> Result<(), PackError>;
}

/// Builds circuit inputs binding a token's message hash.
pub trait InputsPreparer: Send + Sync {
    /// Inputs for `sender` proving `circuit` over `message_hash`.
    fn prepare(&self, message_hash: &Hash, sender: &Did, circuit: CircuitId) -> Result<CircuitInputs, PackError>;
}

/// Prepares the public part of `authV2` inputs: the sender id, the
/// message hash as challenge and a fixed GIST root.
#[derive(Debug, Clone, Copy)]
pub struct AuthV2InputsPreparer {
    /// Global identity state tree root to prove against.
    pub gist_root: Hash,
}

impl InputsPreparer for AuthV2InputsPreparer {
    fn prepare(&self, message_hash: &Hash, sender: &Did, circuit: CircuitId) -> Result<CircuitInputs, PackError> {
        if circuit != CircuitId::AuthV2 {
            return Err(PackError::InvalidParams(format!(
                "auth inputs cannot prove {circuit}"
            )));
        }
        let signals = AuthV2PubSignals {
            user_id: sender.id,
            challenge: *message_hash,
            gist_root: self.gist_root,
        };
        Ok(CircuitInputs {
            public: vec![signals.user_id.to_field(), signals.challenge, signals.gist_root],
            private: serde_json::json!({ "genesisID": sender.id.to_field().to_decimal() }),
        })
    }
}

/// Everything needed to prove with one method.
#[derive(Clone)]
pub struct ProvingParams {
    /// Input preparation.
    pub inputs: Arc<dyn InputsPreparer>,
    /// Proving key bytes.
    pub proving_key: Vec<u8>,
}

/// Everything needed to verify one method.
#[derive(Clone)]
pub struct VerificationParams {
    /// Verification key bytes.
    pub verification_key: Vec<u8>,
    /// State check over the public signals.
    pub state_verifier: Arc<dyn StateVerifier>,
}

/// Packer for `application/iden3-zkp-json`.
pub struct ZkpPacker {
    registry: Arc<ProvingMethodRegistry>,
    proving: HashMap<ProvingMethodAlg, ProvingParams>,
    verification: HashMap<ProvingMethodAlg, VerificationParams>,
}

impl ZkpPacker {
    /// Packer over `registry`. Either parameter map may be empty for a
    /// pack-only or unpack-only packer.
    pub fn new(
        registry: Arc<ProvingMethodRegistry>,
        proving: HashMap<ProvingMethodAlg, ProvingParams>,
        verification: HashMap<ProvingMethodAlg, VerificationParams>,
    ) -> Self {
        Self {
            registry,
            proving,
            verification,
        }
    }
}

impl std::fmt::Debug for ZkpPacker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZkpPacker")
            .field("registry", &self.registry)
            .field("proving", &self.proving.keys().collect::<Vec<_>>())
            .field("verification", &self.verification.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[async_trait]
impl Packer for ZkpPacker {
    fn media_type(&self) -> MediaType {
        MediaType::Zkp
    }

    async fn pack(&self, payload: &[u8], params: &PackParams) -> Result<Vec<u8>, PackError> {
        let PackParams::Zkp { sender, method } = params else {
            return Err(PackError::InvalidParams("zkp packer needs a sender and method".into()));
        };
        require_binding(method)?;
        let proving_method = self.registry.get(method)?;
        let proving = self
            .proving
            .get(method)
            .ok_or_else(|| PackError::UnsupportedMediaType(format!("no proving params for {method}")))?;

        let mut token = Token::new(method, payload)?;
        let inputs = proving
            .inputs
            .prepare(&token.message_hash(), sender, method.circuit_id)?;
        token.prove(proving_method.as_ref(), &inputs, &proving.proving_key)?;
        tracing::debug!(sender = %sender, method = %method, "message packed with proof");
        Ok(token.compact_serialize()?.into_bytes())
    }

    async fn unpack(&self, envelope: &[u8]) -> Result<BasicMessage, PackError> {
        let raw = std::str::from_utf8(envelope)
            .map_err(|e| PackError::TokenMalformed(format!("not utf-8: {e}")))?;
        let token = Token::parse(raw)?;
        let method = token.header().method();
        require_binding(&method)?;
        let proving_method = self.registry.get(&method)?;
        let params = self.verification.get(&method).ok_or_else(|| {
            PackError::UnsupportedMediaType(format!("no verification params for {method}"))
        })?;

        token.verify(proving_method.as_ref(), &params.verification_key)?;
        let proof = token
            .zk_proof()
            .ok_or_else(|| PackError::ProofVerificationFailed("token carries no proof".into()))?;
        params
            .state_verifier
            .verify_state(method.circuit_id, &proof.pub_signals)
            .await?;

        let msg: BasicMessage = serde_json::from_slice(token.payload())?;
        let signals = AuthV2PubSignals::from_signals(&proof.pub_signals)?;
        check_sender(&msg, &signals.user_id.to_did()?)?;
        Ok(msg)
    }
}
