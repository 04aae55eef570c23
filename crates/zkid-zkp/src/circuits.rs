//! # Circuits and Public-Signal Layouts
//!
//! Each supported circuit exposes a fixed, ordered list of public signals.
//! This module names the circuits and decodes their signals into typed
//! structs; it has no opinion on whether the values are acceptable.
//!
//! | circuit | signals |
//! |---|---|
//! | `authV2` | userID, challenge, gistRoot |
//! | `credentialAtomicQueryMTPV2` | merklized, userID, requestID, issuerID, issuerClaimIdenState, isRevocationChecked, issuerClaimNonRevState, timestamp, claimSchema, claimPathNotExists, claimPathKey, slotIndex, operator, value\[64\] |
//! | `credentialAtomicQuerySigV2` | merklized, userID, issuerAuthState, requestID, issuerID, isRevocationChecked, issuerClaimNonRevState, timestamp, claimSchema, claimPathNotExists, claimPathKey, slotIndex, operator, value\[64\] |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zkid_core::{Hash, Id};

use crate::error::CircuitError;

/// Number of comparison values carried by atomic query circuits.
pub const VALUE_ARRAY_SIZE: usize = 64;

/// Identifier of a supported circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CircuitId {
    /// Authentication: proves control of an identity's auth claim.
    AuthV2,
    /// Credential query with a Merkle inclusion proof of the claim.
    AtomicQueryMtpV2,
    /// Credential query with an issuer signature over the claim.
    AtomicQuerySigV2,
}

impl CircuitId {
    /// All supported circuits.
    pub const ALL: [CircuitId; 3] = [Self::AuthV2, Self::AtomicQueryMtpV2, Self::AtomicQuerySigV2];

    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthV2 => "authV2",
            Self::AtomicQueryMtpV2 => "credentialAtomicQueryMTPV2",
            Self::AtomicQuerySigV2 => "credentialAtomicQuerySigV2",
        }
    }

    /// Number of public signals the circuit emits.
    pub fn signal_count(&self) -> usize {
        match self {
            Self::AuthV2 => 3,
            Self::AtomicQueryMtpV2 | Self::AtomicQuerySigV2 => 13 + VALUE_ARRAY_SIZE,
        }
    }

    /// Whether the circuit answers a credential query.
    pub fn is_query(&self) -> bool {
        !matches!(self, Self::AuthV2)
    }

    /// Check that `signals` has this circuit's length.
    pub fn check_signal_count(&self, got: usize) -> Result<(), CircuitError> {
        if got != self.signal_count() {
            return Err(CircuitError::SignalCount {
                circuit: self.as_str().to_string(),
                expected: self.signal_count(),
                got,
            });
        }
        Ok(())
    }
}

impl fmt::Display for CircuitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CircuitId {
    type Err = CircuitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| CircuitError::UnknownCircuit(s.to_string()))
    }
}

impl Serialize for CircuitId {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CircuitId {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ─── Signal decoding ─────────────────────────────────────────────────

struct Reader<'a> {
    signals: &'a [String],
    names: &'static [&'static str],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(signals: &'a [String], names: &'static [&'static str]) -> Self {
        Self { signals, names, pos: 0 }
    }

    fn bad(&self, index: usize, reason: impl Into<String>) -> CircuitError {
        CircuitError::BadSignal {
            index,
            name: self.names.get(index).copied().unwrap_or("value"),
            reason: reason.into(),
        }
    }

    fn hash(&mut self) -> Result<Hash, CircuitError> {
        let i = self.pos;
        self.pos += 1;
        let raw = self.signals.get(i).ok_or_else(|| self.bad(i, "missing"))?;
        Hash::from_decimal(raw).map_err(|e| self.bad(i, e.to_string()))
    }

    fn id(&mut self) -> Result<Id, CircuitError> {
        let i = self.pos;
        let h = self.hash()?;
        Id::from_field(&h).map_err(|e| self.bad(i, e.to_string()))
    }

    fn small(&mut self) -> Result<u64, CircuitError> {
        let i = self.pos;
        let h = self.hash()?;
        h.to_u64().ok_or_else(|| self.bad(i, "does not fit in 64 bits"))
    }

    fn flag(&mut self) -> Result<bool, CircuitError> {
        let i = self.pos;
        match self.small()? {
            0 => Ok(false),
            1 => Ok(true),
            n => Err(self.bad(i, format!("expected 0 or 1, got {n}"))),
        }
    }
}

const AUTH_V2_SIGNALS: &[&str] = &["userID", "challenge", "gistRoot"];

const MTP_V2_SIGNALS: &[&str] = &[
    "merklized",
    "userID",
    "requestID",
    "issuerID",
    "issuerClaimIdenState",
    "isRevocationChecked",
    "issuerClaimNonRevState",
    "timestamp",
    "claimSchema",
    "claimPathNotExists",
    "claimPathKey",
    "slotIndex",
    "operator",
];

const SIG_V2_SIGNALS: &[&str] = &[
    "merklized",
    "userID",
    "issuerAuthState",
    "requestID",
    "issuerID",
    "isRevocationChecked",
    "issuerClaimNonRevState",
    "timestamp",
    "claimSchema",
    "claimPathNotExists",
    "claimPathKey",
    "slotIndex",
    "operator",
];

/// Public signals of `authV2`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthV2PubSignals {
    /// Prover's identity.
    pub user_id: Id,
    /// Challenge bound into the proof (the message hash for tokens).
    pub challenge: Hash,
    /// Global identity state tree root the proof was built against.
    pub gist_root: Hash,
}

impl AuthV2PubSignals {
    /// Decode from the circuit's signal list.
    pub fn from_signals(signals: &[String]) -> Result<Self, CircuitError> {
        CircuitId::AuthV2.check_signal_count(signals.len())?;
        let mut r = Reader::new(signals, AUTH_V2_SIGNALS);
        Ok(Self {
            user_id: r.id()?,
            challenge: r.hash()?,
            gist_root: r.hash()?,
        })
    }

    /// Encode in circuit order.
    pub fn to_signals(&self) -> Vec<String> {
        vec![
            self.user_id.to_field().to_decimal(),
            self.challenge.to_decimal(),
            self.gist_root.to_decimal(),
        ]
    }
}

/// Public signals shared by the atomic query circuits.
///
/// `issuer_state` is `issuerClaimIdenState` for the MTP variant and
/// `issuerAuthState` for the signature variant; both are issuer states
/// that must be resolvable on chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtomicQueryPubSignals {
    /// Which circuit produced the signals.
    pub circuit: CircuitId,
    /// Whether the credential is merklized.
    pub merklized: bool,
    /// Prover's identity.
    pub user_id: Id,
    /// Request the proof answers.
    pub request_id: Hash,
    /// Credential issuer.
    pub issuer_id: Id,
    /// Issuer state the claim (or the signing key) is included in.
    pub issuer_state: Hash,
    /// Whether non-revocation was proven.
    pub is_revocation_checked: bool,
    /// Issuer state the non-revocation proof is against.
    pub issuer_claim_non_rev_state: Hash,
    /// Unix seconds the proof was generated at.
    pub timestamp: u64,
    /// Schema hash of the claim.
    pub claim_schema: Hash,
    /// Whether the merklized path was proven absent.
    pub claim_path_not_exists: bool,
    /// Merklized path key.
    pub claim_path_key: Hash,
    /// Claim slot compared, for non-merklized credentials.
    pub slot_index: u64,
    /// Query operator code.
    pub operator: u64,
    /// Comparison values, zero-padded.
    pub value: Vec<Hash>,
}

impl AtomicQueryPubSignals {
    /// Decode the signals of `circuit`.
    pub fn from_signals(circuit: CircuitId, signals: &[String]) -> Result<Self, CircuitError> {
        if !circuit.is_query() {
            return Err(CircuitError::UnknownCircuit(format!(
                "{circuit} is not a query circuit"
            )));
        }
        circuit.check_signal_count(signals.len())?;
        match circuit {
            CircuitId::AtomicQuerySigV2 => {
                let mut r = Reader::new(signals, SIG_V2_SIGNALS);
                let merklized = r.flag()?;
                let user_id = r.id()?;
                let issuer_state = r.hash()?;
                let request_id = r.hash()?;
                let issuer_id = r.id()?;
                Self::finish(circuit, &mut r, merklized, user_id, request_id, issuer_id, issuer_state)
            }
            _ => {
                let mut r = Reader::new(signals, MTP_V2_SIGNALS);
                let merklized = r.flag()?;
                let user_id = r.id()?;
                let request_id = r.hash()?;
                let issuer_id = r.id()?;
                let issuer_state = r.hash()?;
                Self::finish(circuit, &mut r, merklized, user_id, request_id, issuer_id, issuer_state)
            }
        }
    }

    fn finish(
        circuit: CircuitId,
        r: &mut Reader<'_>,
        merklized: bool,
        user_id: Id,
        request_id: Hash,
        issuer_id: Id,
        issuer_state: Hash,
    ) -> Result<Self, CircuitError> {
        let is_revocation_checked = r.flag()?;
        let issuer_claim_non_rev_state = r.hash()?;
        let timestamp = r.small()?;
        let claim_schema = r.hash()?;
        let claim_path_not_exists = r.flag()?;
        let claim_path_key = r.hash()?;
        let slot_index = r.small()?;
        let operator = r.small()?;
        let value = (0..VALUE_ARRAY_SIZE)
            .map(|_| r.hash())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            circuit,
            merklized,
            user_id,
            request_id,
            issuer_id,
            issuer_state,
            is_revocation_checked,
            issuer_claim_non_rev_state,
            timestamp,
            claim_schema,
            claim_path_not_exists,
            claim_path_key,
            slot_index,
            operator,
            value,
        })
    }

    /// Encode in circuit order. `value` is padded or cut to 64 slots.
    pub fn to_signals(&self) -> Vec<String> {
        let flag = |b: bool| if b { "1".to_string() } else { "0".to_string() };
        let mut out = vec![flag(self.merklized), self.user_id.to_field().to_decimal()];
        match self.circuit {
            CircuitId::AtomicQuerySigV2 => {
                out.push(self.issuer_state.to_decimal());
                out.push(self.request_id.to_decimal());
                out.push(self.issuer_id.to_field().to_decimal());
            }
            _ => {
                out.push(self.request_id.to_decimal());
                out.push(self.issuer_id.to_field().to_decimal());
                out.push(self.issuer_state.to_decimal());
            }
        }
        out.push(flag(self.is_revocation_checked));
        out.push(self.issuer_claim_non_rev_state.to_decimal());
        out.push(self.timestamp.to_string());
        out.push(self.claim_schema.to_decimal());
        out.push(flag(self.claim_path_not_exists));
        out.push(self.claim_path_key.to_decimal());
        out.push(self.slot_index.to_string());
        out.push(self.operator.to_string());
        out.extend(
            self.value
                .iter()
                .chain(std::iter::repeat(&Hash::zero()))
                .take(VALUE_ARRAY_SIZE)
                .map(Hash::to_decimal),
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zkid_core::{Blockchain, DidMethod, Network};

    fn id(seed: u8) -> Id {
        let mut genesis = [0u8; 32];
        genesis[20] = seed;
        Id::from_genesis(
            DidMethod::PolygonId,
            Blockchain::Polygon,
            Network::Amoy,
            &Hash::from_le_bytes(genesis).unwrap(),
        )
        .unwrap()
    }

    fn query(circuit: CircuitId) -> AtomicQueryPubSignals {
        AtomicQueryPubSignals {
            circuit,
            merklized: false,
            user_id: id(1),
            request_id: Hash::from_u64(10),
            issuer_id: id(2),
            issuer_state: Hash::from_u64(555),
            is_revocation_checked: true,
            issuer_claim_non_rev_state: Hash::from_u64(556),
            timestamp: 1_671_543_597,
            claim_schema: Hash::from_u64(77),
            claim_path_not_exists: false,
            claim_path_key: Hash::zero(),
            slot_index: 2,
            operator: 5,
            value: vec![Hash::from_u64(840), Hash::from_u64(120)],
        }
    }

    #[test]
    fn circuit_names_parse() {
        for c in CircuitId::ALL {
            assert_eq!(c.as_str().parse::<CircuitId>().unwrap(), c);
        }
        assert!(matches!(
            "auth".parse::<CircuitId>(),
            Err(CircuitError::UnknownCircuit(_))
        ));
    }

    #[test]
    fn auth_signals_decode() {
        let signals = AuthV2PubSignals {
            user_id: id(3),
            challenge: Hash::from_u64(6789),
            gist_root: Hash::from_u64(1),
        };
        let decoded = AuthV2PubSignals::from_signals(&signals.to_signals()).unwrap();
        assert_eq!(decoded, signals);
    }

    #[test]
    fn mtp_and_sig_layouts_differ_in_position() {
        let mtp = query(CircuitId::AtomicQueryMtpV2).to_signals();
        let sig = query(CircuitId::AtomicQuerySigV2).to_signals();
        assert_eq!(mtp.len(), 77);
        assert_eq!(sig.len(), 77);
        assert_eq!(mtp[2], "10");
        assert_eq!(mtp[4], "555");
        assert_eq!(sig[2], "555");
        assert_eq!(sig[3], "10");
        assert_eq!(mtp[13], "840");
        assert_eq!(mtp[76], "0");
    }

    #[test]
    fn sig_signals_decode() {
        let q = query(CircuitId::AtomicQuerySigV2);
        let decoded =
            AtomicQueryPubSignals::from_signals(CircuitId::AtomicQuerySigV2, &q.to_signals()).unwrap();
        assert_eq!(decoded.issuer_state, q.issuer_state);
        assert_eq!(decoded.request_id, q.request_id);
        assert_eq!(decoded.issuer_id, q.issuer_id);
        assert_eq!(decoded.value.len(), VALUE_ARRAY_SIZE);
    }

    #[test]
    fn wrong_count_is_rejected() {
        let mut signals = query(CircuitId::AtomicQueryMtpV2).to_signals();
        signals.pop();
        let err = AtomicQueryPubSignals::from_signals(CircuitId::AtomicQueryMtpV2, &signals).unwrap_err();
        assert_eq!(
            err,
            CircuitError::SignalCount {
                circuit: "credentialAtomicQueryMTPV2".into(),
                expected: 77,
                got: 76
            }
        );
    }

    #[test]
    fn non_boolean_flag_is_rejected() {
        let mut signals = query(CircuitId::AtomicQueryMtpV2).to_signals();
        signals[5] = "2".into();
        let err = AtomicQueryPubSignals::from_signals(CircuitId::AtomicQueryMtpV2, &signals).unwrap_err();
        assert!(matches!(
            err,
            CircuitError::BadSignal { index: 5, name: "isRevocationChecked", .. }
        ));
    }

    #[test]
    fn auth_circuit_is_not_a_query() {
        let err = AtomicQueryPubSignals::from_signals(CircuitId::AuthV2, &[]).unwrap_err();
        assert!(matches!(err, CircuitError::UnknownCircuit(_)));
    }
}
