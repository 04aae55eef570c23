//! # Public-Signal Checks
//!
//! Typed public signals of a supported circuit and the three checks a
//! verifier runs over them once the proof itself verified: the query,
//! the on-chain states, and ownership by the message sender.

use chrono::Utc;
use zkid_core::{Did, Hash};
use zkid_zkp::{AtomicQueryPubSignals, AuthV2PubSignals, CircuitId};

use crate::error::VerificationError;
use crate::query::Query;
use crate::resolver::{bounded, ResolverRegistry};
use crate::schema::SchemaLoader;
use crate::verifier::VerifyOptions;

/// Public signals of a supported circuit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CircuitPubSignals {
    Auth(AuthV2PubSignals),
    Query(AtomicQueryPubSignals),
}

impl CircuitPubSignals {
    /// Decode `signals` with the layout of `circuit`.
    pub fn parse(circuit: CircuitId, signals: &[String]) -> Result<Self, VerificationError> {
        Ok(match circuit {
            CircuitId::AuthV2 => Self::Auth(AuthV2PubSignals::from_signals(signals)?),
            query => Self::Query(AtomicQueryPubSignals::from_signals(query, signals)?),
        })
    }

    pub fn circuit(&self) -> CircuitId {
        match self {
            Self::Auth(_) => CircuitId::AuthV2,
            Self::Query(q) => q.circuit,
        }
    }

    /// Check the signals answer `query`. Authentication proofs carry no
    /// query and always pass.
    pub async fn verify_query(&self, query: &Query, schemas: &dyn SchemaLoader) -> Result<(), VerificationError> {
        match self {
            Self::Auth(_) => Ok(()),
            Self::Query(signals) => query.check(signals, schemas).await,
        }
    }

    /// Check the on-chain states the proof was built against.
    ///
    /// For queries: the issuer state must be genuine. When the proof
    /// checked revocation and `skip_revocation` is unset, the issuer's
    /// non-revocation state must be latest or replaced within the
    /// accepted transition delay.
    pub async fn verify_states(
        &self,
        resolvers: &ResolverRegistry,
        opts: &VerifyOptions,
        skip_revocation: bool,
    ) -> Result<(), VerificationError> {
        let tolerance = opts.accepted_state_transition_delay.as_secs() as i64;
        match self {
            Self::Auth(signals) => {
                let resolver = resolvers.for_id(&signals.user_id)?;
                let gist = bounded(opts.resolve_timeout, resolver.resolve_gist(&signals.gist_root)).await?;
                if let Some(age) = gist.replaced_for(Utc::now().timestamp()) {
                    if age > tolerance {
                        return Err(VerificationError::GistRootInvalid(format!(
                            "root {} was replaced {age}s ago",
                            signals.gist_root
                        )));
                    }
                }
                Ok(())
            }
            Self::Query(signals) => {
                let resolver = resolvers.for_id(&signals.issuer_id)?;
                bounded(
                    opts.resolve_timeout,
                    resolver.resolve(&signals.issuer_id, &signals.issuer_state),
                )
                .await?;

                if !signals.is_revocation_checked || skip_revocation {
                    return Ok(());
                }

                let non_rev = bounded(
                    opts.resolve_timeout,
                    resolver.resolve(&signals.issuer_id, &signals.issuer_claim_non_rev_state),
                )
                .await?;
                if let Some(age) = non_rev.replaced_for(Utc::now().timestamp()) {
                    if age > tolerance {
                        return Err(VerificationError::IssuerNonRevocationStateStale {
                            age_secs: age,
                            tolerance_secs: tolerance,
                        });
                    }
                }
                Ok(())
            }
        }
    }

    /// Check the proof was produced by `sender`, and for queries that it
    /// answers request `request_id`.
    pub fn verify_id_ownership(&self, sender: &Did, request_id: u32) -> Result<(), VerificationError> {
        let user_id = match self {
            Self::Auth(signals) => signals.user_id,
            Self::Query(signals) => {
                let expected = Hash::from_u64(u64::from(request_id));
                if signals.request_id != expected {
                    return Err(VerificationError::RequestIdMismatch {
                        expected: expected.to_string(),
                        got: signals.request_id.to_string(),
                    });
                }
                signals.user_id
            }
        };
        if user_id != sender.id {
            return Err(VerificationError::SenderMismatch {
                expected: sender.to_string(),
                proven: user_id.to_did().map(|d| d.to_string()).unwrap_or_else(|_| user_id.to_string()),
            });
        }
        Ok(())
    }
}
