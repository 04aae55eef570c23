//! # Query Model
//!
//! A verifier asks for a predicate over one credential field:
//!
//! ```json
//! {
//!   "allowedIssuers": ["*"],
//!   "context": "https://schemas.example/kyc.jsonld",
//!   "type": "KYCAgeCredential",
//!   "credentialSubject": { "birthday": { "$lt": 20000101 } }
//! }
//! ```
//!
//! The proof's public signals must carry the schema hash of `type`, the
//! slot the field is serialized into, the operator code and the values.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use zkid_core::Hash;
use zkid_zkp::{AtomicQueryPubSignals, VALUE_ARRAY_SIZE};

use crate::error::VerificationError;
use crate::schema::{field_slot, schema_hash, validate_url, SchemaLoader};

/// Comparison operators and their circuit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Noop = 0,
    Eq = 1,
    Lt = 2,
    Gt = 3,
    In = 4,
    Nin = 5,
    Ne = 6,
}

impl Operator {
    /// Code carried in the `operator` public signal.
    pub fn code(self) -> u64 {
        self as u64
    }

    /// Query syntax, e.g. `$lt`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Noop => "$noop",
            Self::Eq => "$eq",
            Self::Lt => "$lt",
            Self::Gt => "$gt",
            Self::In => "$in",
            Self::Nin => "$nin",
            Self::Ne => "$ne",
        }
    }

    fn takes_set(self) -> bool {
        matches!(self, Self::In | Self::Nin)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = VerificationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "$noop" => Self::Noop,
            "$eq" => Self::Eq,
            "$lt" => Self::Lt,
            "$gt" => Self::Gt,
            "$in" => Self::In,
            "$nin" => Self::Nin,
            "$ne" => Self::Ne,
            other => return Err(VerificationError::MalformedQuery(format!("unknown operator {other}"))),
        })
    }
}

/// A verifier's declared predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    /// Issuer DIDs accepted; `"*"` accepts any issuer.
    pub allowed_issuers: Vec<String>,
    /// `{ field: { $op: value } }`; absent for a pure possession check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_subject: Option<Value>,
    /// JSON-LD context URL of the credential schema.
    pub context: String,
    /// Credential type within the context.
    #[serde(rename = "type")]
    pub schema_type: String,
    /// Accept the issuer's non-revocation state without freshness checks.
    #[serde(default)]
    pub skip_claim_revocation_check: bool,
}

/// The field predicate extracted from `credentialSubject`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPredicate {
    /// Field name, `None` when no subject predicate is given.
    pub field: Option<String>,
    /// Operator.
    pub operator: Operator,
    /// Values padded with zeros to the circuit's value array size.
    pub values: Vec<Hash>,
}

impl Query {
    /// Parse a query from the JSON of a proof request scope.
    pub fn from_value(value: &Value) -> Result<Self, VerificationError> {
        serde_json::from_value(value.clone()).map_err(|e| VerificationError::MalformedQuery(e.to_string()))
    }

    /// Whether proofs from `issuer` are acceptable.
    pub fn allows_issuer(&self, issuer: &str) -> bool {
        self.allowed_issuers.iter().any(|a| a == "*" || a == issuer)
    }

    /// Extract the single field predicate.
    pub fn predicate(&self) -> Result<FieldPredicate, VerificationError> {
        let malformed = |m: String| VerificationError::MalformedQuery(m);
        let Some(subject) = &self.credential_subject else {
            return Ok(FieldPredicate {
                field: None,
                operator: Operator::Noop,
                values: vec![Hash::default(); VALUE_ARRAY_SIZE],
            });
        };
        let fields = subject
            .as_object()
            .ok_or_else(|| malformed("credentialSubject must be an object".into()))?;
        if fields.len() != 1 {
            return Err(malformed(format!(
                "credentialSubject must name exactly one field, got {}",
                fields.len()
            )));
        }
        let (field, condition) = fields
            .iter()
            .next()
            .ok_or_else(|| malformed("credentialSubject is empty".into()))?;
        let condition = condition
            .as_object()
            .ok_or_else(|| malformed(format!("condition on {field} must be an object")))?;

        let (operator, values) = match condition.len() {
            0 => (Operator::Noop, Vec::new()),
            1 => {
                let (op, raw) = condition
                    .iter()
                    .next()
                    .ok_or_else(|| malformed(format!("condition on {field} is empty")))?;
                let op: Operator = op.parse()?;
                (op, parse_values(op, raw)?)
            }
            n => return Err(malformed(format!("condition on {field} has {n} operators"))),
        };

        let mut values = values;
        values.resize(VALUE_ARRAY_SIZE, Hash::default());
        Ok(FieldPredicate {
            field: Some(field.clone()),
            operator,
            values,
        })
    }

    /// Check that `signals` answer this query.
    ///
    /// Checked in order: issuer allowed, schema hash, merklization, slot
    /// index, operator, values. Revocation freshness is a separate stage.
    pub async fn check(
        &self,
        signals: &AtomicQueryPubSignals,
        schemas: &dyn SchemaLoader,
    ) -> Result<(), VerificationError> {
        let unsatisfied = |m: String| VerificationError::QueryNotSatisfied(m);

        let issuer = signals.issuer_id.to_did()?.to_string();
        if !self.allows_issuer(&issuer) {
            return Err(unsatisfied(format!("issuer {issuer} is not allowed")));
        }

        validate_url(&self.context)?;
        let expected_schema = schema_hash(&self.context, &self.schema_type).to_field();
        if signals.claim_schema != expected_schema {
            return Err(unsatisfied(format!(
                "proof is for schema {}, query asks for {}",
                signals.claim_schema, expected_schema
            )));
        }

        if signals.merklized {
            return Err(unsatisfied("merklized credentials are not supported".into()));
        }

        let predicate = self.predicate()?;
        if let Some(field) = &predicate.field {
            let raw = schemas.load(&self.context).await?;
            let schema: Value = serde_json::from_slice(&raw)
                .map_err(|e| VerificationError::Schema(format!("{}: {e}", self.context)))?;
            let slot = field_slot(&schema, &self.schema_type, field)?;
            if signals.slot_index != slot {
                return Err(unsatisfied(format!(
                    "proof is over slot {}, field {field} is in slot {slot}",
                    signals.slot_index
                )));
            }
        }

        if signals.operator != predicate.operator.code() {
            return Err(unsatisfied(format!(
                "proof uses operator {}, query asks for {}",
                signals.operator,
                predicate.operator.code()
            )));
        }

        let mut proven = signals.value.clone();
        proven.resize(VALUE_ARRAY_SIZE, Hash::default());
        if proven != predicate.values {
            return Err(unsatisfied("comparison values differ from the query".into()));
        }
        Ok(())
    }
}

fn parse_values(op: Operator, raw: &Value) -> Result<Vec<Hash>, VerificationError> {
    let items: Vec<&Value> = match (op.takes_set(), raw) {
        (true, Value::Array(items)) => items.iter().collect(),
        (true, _) => {
            return Err(VerificationError::MalformedQuery(format!("{op} takes an array")));
        }
        (false, Value::Array(_)) => {
            return Err(VerificationError::MalformedQuery(format!("{op} takes a single value")));
        }
        (false, single) => vec![single],
    };
    if items.len() > VALUE_ARRAY_SIZE {
        return Err(VerificationError::MalformedQuery(format!(
            "{} values exceed the limit of {VALUE_ARRAY_SIZE}",
            items.len()
        )));
    }
    items.into_iter().map(parse_value).collect()
}

fn parse_value(v: &Value) -> Result<Hash, VerificationError> {
    match v {
        Value::Number(n) => n
            .as_u64()
            .map(Hash::from_u64)
            .ok_or_else(|| VerificationError::MalformedQuery(format!("{n} is not a non-negative integer"))),
        Value::String(s) => Ok(Hash::from_decimal(s)?),
        Value::Bool(b) => Ok(Hash::from_u64(u64::from(*b))),
        other => Err(VerificationError::MalformedQuery(format!("unsupported value {other}"))),
    }
}
