//! # Authorization Requests
//!
//! A verifier opens an exchange with an authorization request naming the
//! proofs it wants (scopes). The holder answers on the same thread; see
//! [`ProofVerifier::verify_authorization_response`](crate::ProofVerifier::verify_authorization_response).
//!
//! Requests are kept for audit only. Nothing reads them back during
//! verification except to match the response thread.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use uuid::Uuid;
use zkid_comm::{
    AuthorizationRequestBody, BasicMessage, MediaType, ZeroKnowledgeProofRequest,
    AUTHORIZATION_REQUEST,
};
use zkid_core::Did;
use zkid_zkp::CircuitId;

use crate::error::VerificationError;
use crate::query::Query;
use crate::schema::validate_url;

/// A new authorization request from `audience` with no scopes. The
/// message id doubles as the thread id.
pub fn create_authorization_request(
    reason: &str,
    audience: &Did,
    callback_url: &str,
) -> Result<BasicMessage, VerificationError> {
    validate_url(callback_url)?;
    let id = Uuid::new_v4().to_string();
    let body = AuthorizationRequestBody {
        callback_url: callback_url.to_string(),
        reason: reason.to_string(),
        message: None,
        scope: Vec::new(),
    };
    Ok(BasicMessage {
        id: id.clone(),
        typ: Some(MediaType::Plain),
        message_type: AUTHORIZATION_REQUEST.to_string(),
        thid: Some(id),
        body: serde_json::to_value(body).map_err(|e| VerificationError::MalformedMessage(e.to_string()))?,
        from: Some(audience.to_string()),
        to: None,
    })
}

/// A proof request for `circuit` answering `query`.
pub fn query_scope(id: u32, circuit: CircuitId, query: &Query) -> Result<ZeroKnowledgeProofRequest, VerificationError> {
    Ok(ZeroKnowledgeProofRequest {
        id,
        circuit_id: circuit,
        optional: None,
        query: serde_json::to_value(query).map_err(|e| VerificationError::MalformedQuery(e.to_string()))?,
    })
}

/// Append a scope to an authorization request. Scope ids must be unique.
pub fn add_scope(request: &mut BasicMessage, scope: ZeroKnowledgeProofRequest) -> Result<(), VerificationError> {
    let mut body: AuthorizationRequestBody = request
        .body_as()
        .map_err(|e| VerificationError::MalformedMessage(e.to_string()))?;
    if body.scope.iter().any(|s| s.id == scope.id) {
        return Err(VerificationError::MalformedQuery(format!(
            "scope {} already requested",
            scope.id
        )));
    }
    body.scope.push(scope);
    request.body = serde_json::to_value(body).map_err(|e| VerificationError::MalformedMessage(e.to_string()))?;
    Ok(())
}

/// A stored request.
#[derive(Debug, Clone)]
pub struct StoredRequest {
    pub message: BasicMessage,
    pub created_at: DateTime<Utc>,
}

/// Requests keyed by thread id.
#[derive(Debug, Default)]
pub struct AuthRequestStore {
    requests: DashMap<String, StoredRequest>,
}

impl AuthRequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `request` under its thread id and return that id.
    pub fn save(&self, request: BasicMessage) -> String {
        let thid = request.thid.clone().unwrap_or_else(|| request.id.clone());
        tracing::debug!(thid = %thid, "authorization request stored");
        self.requests.insert(
            thid.clone(),
            StoredRequest {
                message: request,
                created_at: Utc::now(),
            },
        );
        thid
    }

    pub fn get(&self, thid: &str) -> Option<StoredRequest> {
        self.requests.get(thid).map(|r| r.value().clone())
    }

    pub fn remove(&self, thid: &str) -> Option<StoredRequest> {
        self.requests.remove(thid).map(|(_, r)| r)
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

/// Scope ids present in a request body.
pub fn scope_ids(request: &BasicMessage) -> Vec<u32> {
    request
        .body
        .get("scope")
        .and_then(Value::as_array)
        .map(|scopes| {
            scopes
                .iter()
                .filter_map(|s| s.get("id").and_then(Value::as_u64))
                .filter_map(|id| u32::try_from(id).ok())
                .collect()
        })
        .unwrap_or_default()
}
