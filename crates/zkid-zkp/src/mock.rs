//! # Mock Proof System
//!
//! A deterministic, transparent stand-in for Groth16. The "proof" is a
//! SHA-256 digest over the circuit name, the key and the public signals,
//! laid out in the shape of a Groth16 proof. Changing any public signal, the
//! circuit or the key makes verification fail, which is all the packer and
//! verifier tests need.
//!
//! The mock treats the proving key and the verification key as the same
//! bytes.
//!
//! ## Security Notice
//!
//! Provides NO zero-knowledge and NO soundness. Never enable it for
//! production verification.

use sha2::{Digest, Sha256};
use zkid_core::Hash;

use crate::circuits::CircuitId;
use crate::error::{ProofError, VerifyError};
use crate::proof::{ProofData, ZkProof, GROTH16};
use crate::traits::{CircuitInputs, ProofSystem};

const DOMAIN: &[u8] = b"zkid-mock-groth16/v1";

/// Deterministic mock prover and verifier.
#[derive(Debug, Default, Clone, Copy)]
pub struct MockProofSystem;

impl MockProofSystem {
    fn digest(circuit: CircuitId, key: &[u8], signals: &[Hash]) -> [u8; 32] {
        let mut h = Sha256::new();
        h.update(DOMAIN);
        h.update(circuit.as_str().as_bytes());
        h.update([0u8]);
        h.update((key.len() as u64).to_le_bytes());
        h.update(key);
        for s in signals {
            h.update(s.as_le_bytes());
        }
        h.finalize().into()
    }

    fn elements(digest: &[u8; 32]) -> ProofData {
        let mut lo = [0u8; 16];
        let mut hi = [0u8; 16];
        lo.copy_from_slice(&digest[..16]);
        hi.copy_from_slice(&digest[16..]);
        let a = u128::from_le_bytes(lo).to_string();
        let b = u128::from_le_bytes(hi).to_string();
        ProofData {
            pi_a: vec![a.clone(), b.clone(), "1".into()],
            pi_b: vec![
                vec![a.clone(), b.clone()],
                vec![b.clone(), a.clone()],
                vec!["1".into(), "0".into()],
            ],
            pi_c: vec![b, a, "1".into()],
            protocol: GROTH16.into(),
        }
    }
}

impl ProofSystem for MockProofSystem {
    fn name(&self) -> &str {
        "groth16-mock"
    }

    fn prove(
        &self,
        circuit: CircuitId,
        proving_key: &[u8],
        inputs: &CircuitInputs,
    ) -> Result<ZkProof, ProofError> {
        circuit.check_signal_count(inputs.public.len())?;
        let digest = Self::digest(circuit, proving_key, &inputs.public);
        Ok(ZkProof {
            proof: Self::elements(&digest),
            pub_signals: inputs.public.iter().map(Hash::to_decimal).collect(),
        })
    }

    fn verify(
        &self,
        circuit: CircuitId,
        verification_key: &[u8],
        proof: &ZkProof,
    ) -> Result<(), VerifyError> {
        proof.proof.check_shape()?;
        let signals = proof.signals()?;
        circuit
            .check_signal_count(signals.len())
            .map_err(|e| VerifyError::Malformed(e.to_string()))?;
        let expected = Self::elements(&Self::digest(circuit, verification_key, &signals));
        if expected.pi_a != proof.proof.pi_a
            || expected.pi_b != proof.proof.pi_b
            || expected.pi_c != proof.proof.pi_c
        {
            return Err(VerifyError::InvalidProof(format!(
                "{circuit} proof does not match its public signals"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> CircuitInputs {
        CircuitInputs {
            public: vec![Hash::from_u64(1), Hash::from_u64(2), Hash::from_u64(3)],
            private: serde_json::Value::Null,
        }
    }

    #[test]
    fn proof_verifies_with_same_key() {
        let sys = MockProofSystem;
        let proof = sys.prove(CircuitId::AuthV2, b"vk", &inputs()).unwrap();
        sys.verify(CircuitId::AuthV2, b"vk", &proof).unwrap();
        assert_eq!(proof.pub_signals, vec!["1", "2", "3"]);
    }

    #[test]
    fn proving_is_deterministic() {
        let sys = MockProofSystem;
        let a = sys.prove(CircuitId::AuthV2, b"vk", &inputs()).unwrap();
        let b = sys.prove(CircuitId::AuthV2, b"vk", &inputs()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn tampered_signal_fails() {
        let sys = MockProofSystem;
        let mut proof = sys.prove(CircuitId::AuthV2, b"vk", &inputs()).unwrap();
        proof.pub_signals[1] = "6789".into();
        assert!(matches!(
            sys.verify(CircuitId::AuthV2, b"vk", &proof),
            Err(VerifyError::InvalidProof(_))
        ));
    }

    #[test]
    fn wrong_key_fails() {
        let sys = MockProofSystem;
        let proof = sys.prove(CircuitId::AuthV2, b"vk", &inputs()).unwrap();
        assert!(sys.verify(CircuitId::AuthV2, b"other", &proof).is_err());
    }

    #[test]
    fn signal_count_is_enforced_when_proving() {
        let sys = MockProofSystem;
        let err = sys
            .prove(CircuitId::AtomicQueryMtpV2, b"vk", &inputs())
            .unwrap_err();
        assert!(matches!(err, ProofError::Circuit(_)));
    }
}
