//! # Proof Verification Engine
//!
//! Each presented proof moves through fixed stages, stopping at the first
//! failure:
//!
//! | stage | checks | failure |
//! |---|---|---|
//! | structural | circuit, scope id, signal count, proof shape, proof validity | `InvalidProofStructure`, `ProofInvalid` |
//! | query | issuer, schema, slot, operator, values | `QueryNotSatisfied` |
//! | states | issuer state on chain, non-revocation freshness | `IssuerStateInvalid`, `IssuerNonRevocationStateStale` |
//! | ownership | request id, prover is sender | `RequestIdMismatch`, `SenderMismatch` |
//!
//! Outcomes are counted in `zkid_verifications_total` labelled by stage
//! and outcome.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use zkid_comm::{
    AuthorizationRequestBody, AuthorizationResponseBody, BasicMessage, PackError, StateVerifier,
    ZeroKnowledgeProofRequest, ZeroKnowledgeProofResponse,
};
use zkid_core::{Did, ValidationError};
use zkid_zkp::{CircuitId, ProofSystem, VerificationKeyLoader};

use crate::error::VerificationError;
use crate::pubsignals::CircuitPubSignals;
use crate::query::Query;
use crate::resolver::ResolverRegistry;
use crate::schema::SchemaLoader;

/// Tolerances applied during verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyOptions {
    /// How long a replaced issuer state (or GIST root) stays acceptable.
    #[serde(with = "secs")]
    pub accepted_state_transition_delay: Duration,
    /// Bound on each resolver call.
    #[serde(with = "secs")]
    pub resolve_timeout: Duration,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            accepted_state_transition_delay: Duration::from_secs(60 * 60),
            resolve_timeout: Duration::from_secs(10),
        }
    }
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

/// Verification stage, used in logs and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Structural,
    Query,
    States,
    Ownership,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Structural => "structural",
            Self::Query => "query",
            Self::States => "states",
            Self::Ownership => "ownership",
        }
    }
}

fn record(stage: Stage, outcome: &'static str) {
    metrics::counter!("zkid_verifications_total", "stage" => stage.as_str(), "outcome" => outcome).increment(1);
}

/// A scope whose proof was accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedScope {
    /// Scope id from the request.
    pub id: u32,
    /// Decoded public signals.
    pub signals: CircuitPubSignals,
}

/// Verifies proofs against proof requests.
pub struct ProofVerifier {
    proof_system: Arc<dyn ProofSystem>,
    keys: Arc<dyn VerificationKeyLoader>,
    resolvers: ResolverRegistry,
    schemas: Arc<dyn SchemaLoader>,
    options: VerifyOptions,
}

impl ProofVerifier {
    /// Verifier with default options.
    pub fn new(
        proof_system: Arc<dyn ProofSystem>,
        keys: Arc<dyn VerificationKeyLoader>,
        resolvers: ResolverRegistry,
        schemas: Arc<dyn SchemaLoader>,
    ) -> Self {
        Self {
            proof_system,
            keys,
            resolvers,
            schemas,
            options: VerifyOptions::default(),
        }
    }

    /// Replace the verification options.
    pub fn with_options(mut self, options: VerifyOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &VerifyOptions {
        &self.options
    }

    pub fn resolvers(&self) -> &ResolverRegistry {
        &self.resolvers
    }

    /// Run every stage for one proof presented by `sender`.
    pub async fn verify_proof(
        &self,
        response: &ZeroKnowledgeProofResponse,
        request: &ZeroKnowledgeProofRequest,
        sender: &Did,
    ) -> Result<CircuitPubSignals, VerificationError> {
        let mut stage = Stage::Structural;
        let result = self.run_stages(response, request, sender, &mut stage).await;
        match &result {
            Ok(_) => {
                record(Stage::Ownership, "accepted");
                tracing::info!(
                    scope = request.id,
                    circuit = %request.circuit_id,
                    sender = %sender,
                    "proof accepted"
                );
            }
            Err(err) => {
                record(stage, "rejected");
                tracing::warn!(
                    scope = request.id,
                    circuit = %request.circuit_id,
                    sender = %sender,
                    stage = stage.as_str(),
                    error = %err,
                    "proof rejected"
                );
            }
        }
        result
    }

    async fn run_stages(
        &self,
        response: &ZeroKnowledgeProofResponse,
        request: &ZeroKnowledgeProofRequest,
        sender: &Did,
        stage: &mut Stage,
    ) -> Result<CircuitPubSignals, VerificationError> {
        *stage = Stage::Structural;
        let signals = self.verify_structure(response, request)?;

        *stage = Stage::Query;
        let query = match request.circuit_id {
            CircuitId::AuthV2 => None,
            _ => Some(Query::from_value(&request.query)?),
        };
        if let Some(query) = &query {
            signals.verify_query(query, self.schemas.as_ref()).await?;
        }

        *stage = Stage::States;
        let skip_revocation = query.as_ref().is_some_and(|q| q.skip_claim_revocation_check);
        signals
            .verify_states(&self.resolvers, &self.options, skip_revocation)
            .await?;

        *stage = Stage::Ownership;
        signals.verify_id_ownership(sender, request.id)?;
        Ok(signals)
    }

    fn verify_structure(
        &self,
        response: &ZeroKnowledgeProofResponse,
        request: &ZeroKnowledgeProofRequest,
    ) -> Result<CircuitPubSignals, VerificationError> {
        if response.id != request.id {
            return Err(VerificationError::InvalidProofStructure(format!(
                "response scope {} does not answer request scope {}",
                response.id, request.id
            )));
        }
        if response.circuit_id != request.circuit_id {
            return Err(VerificationError::InvalidProofStructure(format!(
                "proof is for {}, request asks for {}",
                response.circuit_id, request.circuit_id
            )));
        }
        let circuit = response.circuit_id;
        circuit.check_signal_count(response.zk_proof.pub_signals.len())?;
        response.zk_proof.proof.check_shape()?;

        let key = self.keys.load(circuit)?;
        self.proof_system.verify(circuit, &key, &response.zk_proof)?;
        tracing::debug!(circuit = %circuit, system = self.proof_system.name(), "proof verified");

        CircuitPubSignals::parse(circuit, &response.zk_proof.pub_signals)
    }

    /// Verify an authorization response against the request it answers:
    /// thread correlation, then every scope. Optional scopes may be left
    /// unanswered.
    pub async fn verify_authorization_response(
        &self,
        request: &BasicMessage,
        response: &BasicMessage,
    ) -> Result<Vec<VerifiedScope>, VerificationError> {
        let expected_thread = request.thid.as_deref().unwrap_or(&request.id);
        let got_thread = response.thid.as_deref().unwrap_or_default();
        if got_thread != expected_thread {
            return Err(VerificationError::ThreadMismatch {
                expected: expected_thread.to_string(),
                got: got_thread.to_string(),
            });
        }

        let from = response.from.as_deref().ok_or_else(|| {
            VerificationError::Validation(ValidationError::MalformedDid {
                did: String::new(),
                reason: "response has no sender".into(),
            })
        })?;
        let sender = Did::parse(from)?;

        let request_body: AuthorizationRequestBody = request.body_as().map_err(malformed)?;
        let response_body: AuthorizationResponseBody = response.body_as().map_err(malformed)?;

        let mut verified = Vec::with_capacity(request_body.scope.len());
        for scope in &request_body.scope {
            let Some(answer) = response_body.scope.iter().find(|r| r.id == scope.id) else {
                if scope.optional.unwrap_or(false) {
                    continue;
                }
                return Err(VerificationError::MissingScope(scope.id));
            };
            let signals = self.verify_proof(answer, scope, &sender).await?;
            verified.push(VerifiedScope {
                id: scope.id,
                signals,
            });
        }
        Ok(verified)
    }
}

fn malformed(err: PackError) -> VerificationError {
    VerificationError::MalformedMessage(err.to_string())
}

impl std::fmt::Debug for ProofVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProofVerifier")
            .field("proof_system", &self.proof_system.name())
            .field("resolvers", &self.resolvers)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// State check for proof-carrying envelopes: resolves the states named
/// in a token's public signals.
#[derive(Debug, Clone)]
pub struct AuthStateVerifier {
    resolvers: ResolverRegistry,
    options: VerifyOptions,
}

impl AuthStateVerifier {
    pub fn new(resolvers: ResolverRegistry, options: VerifyOptions) -> Self {
        Self { resolvers, options }
    }
}

#[async_trait]
impl StateVerifier for AuthStateVerifier {
    async fn verify_state(&self, circuit: CircuitId, pub_signals: &[String]) -> Result<(), PackError> {
        let signals = CircuitPubSignals::parse(circuit, pub_signals)
            .map_err(|e| PackError::ProofVerificationFailed(e.to_string()))?;
        signals
            .verify_states(&self.resolvers, &self.options, false)
            .await
            .map_err(|e| PackError::ProofVerificationFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options() {
        let opts = VerifyOptions::default();
        assert_eq!(opts.accepted_state_transition_delay, Duration::from_secs(3600));
        assert_eq!(opts.resolve_timeout, Duration::from_secs(10));
    }

    #[test]
    fn options_serialize_as_seconds() {
        let json = serde_json::to_value(VerifyOptions::default()).unwrap();
        assert_eq!(json["accepted_state_transition_delay"], 3600);
        let back: VerifyOptions = serde_json::from_value(json).unwrap();
        assert_eq!(back, VerifyOptions::default());
    }
}
