//! # JWZ Tokens
//!
//! A compact, three-segment token carrying a zero-knowledge proof where a
//! JWS would carry a signature:
//!
//! ```text
//! base64url(header) . base64url(payload) . base64url({"proof":…,"pub_signals":[…]})
//! ```
//!
//! The header names the proving method (`alg`, `circuitId`) and lists
//! `circuitId` in `crit`. The proof commits to the message hash: SHA-256 of
//! the first two segments joined by `.`, reduced into the field.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zkid_core::Hash;
use zkid_zkp::{CircuitId, CircuitInputs, ZkProof};

use crate::error::PackError;
use crate::message::MediaType;
use crate::registry::{ProvingMethod, ProvingMethodAlg};

const CRIT_CIRCUIT_ID: &str = "circuitId";

/// Protected header of a JWZ token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JwzHeader {
    /// Proof algorithm.
    pub alg: String,
    /// Circuit the proof was produced with.
    pub circuit_id: CircuitId,
    /// Header fields the receiver must understand.
    #[serde(default)]
    pub crit: Vec<String>,
    /// Media type.
    pub typ: MediaType,
}

impl JwzHeader {
    /// Header for `method`.
    pub fn new(method: &ProvingMethodAlg) -> Self {
        Self {
            alg: method.alg.clone(),
            circuit_id: method.circuit_id,
            crit: vec![CRIT_CIRCUIT_ID.to_string()],
            typ: MediaType::Zkp,
        }
    }

    /// Proving method named by the header.
    pub fn method(&self) -> ProvingMethodAlg {
        ProvingMethodAlg::new(self.alg.clone(), self.circuit_id)
    }
}

pub(crate) fn b64_decode(segment: &str, what: &str) -> Result<Vec<u8>, PackError> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| PackError::TokenMalformed(format!("{what} is not base64url: {e}")))
}

pub(crate) fn b64_encode(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// A JWZ token, proven or not yet proven.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    header: JwzHeader,
    raw_header: String,
    payload: Vec<u8>,
    raw_payload: String,
    zk_proof: Option<ZkProof>,
}

impl Token {
    /// Unproven token over `payload`.
    pub fn new(method: &ProvingMethodAlg, payload: &[u8]) -> Result<Self, PackError> {
        let header = JwzHeader::new(method);
        let raw_header = b64_encode(&serde_json::to_vec(&header)?);
        Ok(Self {
            header,
            raw_header,
            payload: payload.to_vec(),
            raw_payload: b64_encode(payload),
            zk_proof: None,
        })
    }

    /// Header.
    pub fn header(&self) -> &JwzHeader {
        &self.header
    }

    /// Decoded payload.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Attached proof, once proven or parsed.
    pub fn zk_proof(&self) -> Option<&ZkProof> {
        self.zk_proof.as_ref()
    }

    /// The value the proof must bind: SHA-256 over `header.payload`,
    /// big-endian, reduced into the field.
    pub fn message_hash(&self) -> Hash {
        let mut h = Sha256::new();
        h.update(self.raw_header.as_bytes());
        h.update(b".");
        h.update(self.raw_payload.as_bytes());
        Hash::from_be_bytes_reduced(&h.finalize())
    }

    /// Prove with `method` over inputs prepared for this token's hash.
    pub fn prove(
        &mut self,
        method: &dyn ProvingMethod,
        inputs: &CircuitInputs,
        proving_key: &[u8],
    ) -> Result<(), PackError> {
        if *method.alg() != self.header.method() {
            return Err(PackError::InvalidParams(format!(
                "token is for {}, method is {}",
                self.header.method(),
                method.alg()
            )));
        }
        self.zk_proof = Some(method.prove(inputs, proving_key)?);
        Ok(())
    }

    /// Verify the attached proof with `method`.
    pub fn verify(&self, method: &dyn ProvingMethod, verification_key: &[u8]) -> Result<(), PackError> {
        let proof = self
            .zk_proof
            .as_ref()
            .ok_or_else(|| PackError::ProofVerificationFailed("token carries no proof".into()))?;
        method.verify(&self.message_hash(), proof, verification_key)
    }

    /// Compact serialization. Fails if the token has not been proven.
    pub fn compact_serialize(&self) -> Result<String, PackError> {
        let proof = self
            .zk_proof
            .as_ref()
            .ok_or_else(|| PackError::InvalidParams("token has not been proven".into()))?;
        let raw_proof = b64_encode(&serde_json::to_vec(proof)?);
        Ok(format!("{}.{}.{}", self.raw_header, self.raw_payload, raw_proof))
    }

    /// Parse a compact token.
    ///
    /// Segments are kept verbatim so the message hash is computed over the
    /// exact bytes the prover saw.
    pub fn parse(token: &str) -> Result<Self, PackError> {
        let segments: Vec<&str> = token.trim().split('.').collect();
        if segments.len() != 3 {
            return Err(PackError::TokenMalformed(format!(
                "expected 3 segments, got {}",
                segments.len()
            )));
        }
        let header_bytes = b64_decode(segments[0], "header")?;
        let header: JwzHeader = serde_json::from_slice(&header_bytes)
            .map_err(|e| PackError::TokenMalformed(format!("header: {e}")))?;
        if !header.crit.iter().any(|c| c == CRIT_CIRCUIT_ID) {
            return Err(PackError::TokenMalformed(
                "header does not mark circuitId as critical".into(),
            ));
        }
        let payload = b64_decode(segments[1], "payload")?;
        let proof_bytes = b64_decode(segments[2], "proof")?;
        let zk_proof: ZkProof = serde_json::from_slice(&proof_bytes)
            .map_err(|e| PackError::TokenMalformed(format!("proof: {e}")))?;
        Ok(Self {
            header,
            raw_header: segments[0].to_string(),
            payload,
            raw_payload: segments[1].to_string(),
            zk_proof: Some(zk_proof),
        })
    }
}
