//! # Proof Data
//!
//! The wire form of a Groth16 proof: three group elements as decimal
//! strings (projective coordinates, as snarkjs emits them) plus the ordered
//! public signals. The group elements are opaque to this workspace; only
//! their shape is checked.

use serde::{Deserialize, Serialize};
use zkid_core::Hash;

use crate::error::VerifyError;

/// Default value of the `protocol` field.
pub const GROTH16: &str = "groth16";

/// Group elements of a proof.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProofData {
    /// G1 point `A`.
    pub pi_a: Vec<String>,
    /// G2 point `B`.
    pub pi_b: Vec<Vec<String>>,
    /// G1 point `C`.
    pub pi_c: Vec<String>,
    /// Proof protocol name.
    #[serde(default)]
    pub protocol: String,
}

impl ProofData {
    /// Check the element counts of a Groth16 proof.
    pub fn check_shape(&self) -> Result<(), VerifyError> {
        if self.pi_a.len() != 3 || self.pi_c.len() != 3 {
            return Err(VerifyError::Malformed(
                "pi_a and pi_c must have 3 coordinates".into(),
            ));
        }
        if self.pi_b.len() != 3 || self.pi_b.iter().any(|p| p.len() != 2) {
            return Err(VerifyError::Malformed("pi_b must be 3x2".into()));
        }
        Ok(())
    }
}

/// A proof together with its public signals.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ZkProof {
    /// Group elements.
    pub proof: ProofData,
    /// Public signals as decimal strings, in circuit order.
    pub pub_signals: Vec<String>,
}

impl ZkProof {
    /// Parse every public signal as a field element.
    pub fn signals(&self) -> Result<Vec<Hash>, VerifyError> {
        self.pub_signals
            .iter()
            .enumerate()
            .map(|(i, s)| {
                Hash::from_decimal(s)
                    .map_err(|e| VerifyError::Malformed(format!("public signal {i}: {e}")))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proof() -> ProofData {
        ProofData {
            pi_a: vec!["1".into(), "2".into(), "1".into()],
            pi_b: vec![
                vec!["1".into(), "2".into()],
                vec!["3".into(), "4".into()],
                vec!["1".into(), "0".into()],
            ],
            pi_c: vec!["5".into(), "6".into(), "1".into()],
            protocol: GROTH16.into(),
        }
    }

    #[test]
    fn groth16_shape_accepted() {
        proof().check_shape().unwrap();
    }

    #[test]
    fn truncated_b_rejected() {
        let mut p = proof();
        p.pi_b[1].pop();
        assert!(matches!(p.check_shape(), Err(VerifyError::Malformed(_))));
    }

    #[test]
    fn json_uses_snarkjs_field_names() {
        let zk = ZkProof {
            proof: proof(),
            pub_signals: vec!["7".into()],
        };
        let json = serde_json::to_value(&zk).unwrap();
        assert!(json["proof"]["pi_a"].is_array());
        assert_eq!(json["pub_signals"][0], "7");
    }

    #[test]
    fn non_decimal_signal_is_malformed() {
        let zk = ZkProof {
            proof: proof(),
            pub_signals: vec!["12".into(), "x".into()],
        };
        let err = zk.signals().unwrap_err();
        assert!(err.to_string().contains("public signal 1"));
    }
}
