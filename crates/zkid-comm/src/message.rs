//! # Protocol Messages
//!
//! The JSON envelope exchanged between parties and the bodies of the
//! authorization protocol. Field names follow the wire format (`thid`,
//! `typ`, `type`, `circuitId`, `pub_signals`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use zkid_zkp::{CircuitId, ZkProof};

use crate::error::PackError;

/// Message type URI of an authorization request.
pub const AUTHORIZATION_REQUEST: &str = "https://iden3-communication.io/authorization/1.0/request";
/// Message type URI of an authorization response.
pub const AUTHORIZATION_RESPONSE: &str = "https://iden3-communication.io/authorization/1.0/response";
/// Message type URI of a credential offer.
pub const CREDENTIAL_OFFER: &str = "https://iden3-communication.io/credentials/1.0/offer";

// ─── Media types ─────────────────────────────────────────────────────

/// Envelope media type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaType {
    /// Unprotected JSON.
    #[serde(rename = "application/iden3comm-plain-json")]
    Plain,
    /// Compact JWS.
    #[serde(rename = "application/iden3comm-signed-json")]
    Signed,
    /// JWZ proof-carrying token.
    #[serde(rename = "application/iden3-zkp-json")]
    Zkp,
}

impl MediaType {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "application/iden3comm-plain-json",
            Self::Signed => "application/iden3comm-signed-json",
            Self::Zkp => "application/iden3-zkp-json",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = PackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Self::Plain, Self::Signed, Self::Zkp]
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| PackError::UnsupportedMediaType(s.to_string()))
    }
}

// ─── Envelope ────────────────────────────────────────────────────────

/// A protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicMessage {
    /// Message id.
    pub id: String,
    /// Envelope media type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<MediaType>,
    /// Message type URI.
    #[serde(rename = "type")]
    pub message_type: String,
    /// Thread id correlating request and response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thid: Option<String>,
    /// Type-specific body.
    #[serde(default)]
    pub body: serde_json::Value,
    /// Sender DID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    /// Recipient DID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
}

impl BasicMessage {
    /// Decode the body as `T`.
    pub fn body_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, PackError> {
        Ok(serde_json::from_value(self.body.clone())?)
    }
}

// ─── Authorization protocol ──────────────────────────────────────────

/// One requested proof.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZeroKnowledgeProofRequest {
    /// Scope id; also the `requestID` the proof must carry.
    pub id: u32,
    /// Circuit to prove with.
    pub circuit_id: CircuitId,
    /// Whether the holder may omit this scope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optional: Option<bool>,
    /// Query predicate, interpreted by the verifier.
    #[serde(default)]
    pub query: serde_json::Value,
}

/// One returned proof.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZeroKnowledgeProofResponse {
    /// Scope id this answers.
    pub id: u32,
    /// Circuit proven with.
    #[serde(rename = "circuitId")]
    pub circuit_id: CircuitId,
    /// Proof and public signals.
    #[serde(flatten)]
    pub zk_proof: ZkProof,
}

/// Body of an authorization request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationRequestBody {
    /// Where the response is posted.
    #[serde(rename = "callbackUrl")]
    pub callback_url: String,
    /// Human-readable reason.
    pub reason: String,
    /// Optional message the holder signs over.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Requested proofs.
    #[serde(default)]
    pub scope: Vec<ZeroKnowledgeProofRequest>,
}

/// Body of an authorization response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationResponseBody {
    /// Echo of the request message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Proofs, one per answered scope.
    #[serde(default)]
    pub scope: Vec<ZeroKnowledgeProofResponse>,
}
