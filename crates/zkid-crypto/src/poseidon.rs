//! # Poseidon — ZK-Friendly Hash over BN254
//!
//! Circom-compatible Poseidon as implemented by `light-poseidon`. Every
//! hash the circuits recompute goes through here: claim index/value
//! hashes, tree leaves and middles, and the identity state hash.
//!
//! ## Node hashing
//!
//! - Leaf: `Poseidon(key, value, 1)`.
//! - Middle: `Poseidon(left, right)`.
//! - Empty: the zero element, never hashed.

use ark_bn254::Fr;
use ark_ff::{BigInteger, PrimeField};
use light_poseidon::{Poseidon, PoseidonHasher};
use zkid_core::Hash;

use crate::error::CryptoError;

/// Largest arity supported by the circom parameter sets.
pub const MAX_INPUTS: usize = 12;

fn to_fr(h: &Hash) -> Fr {
    Fr::from_le_bytes_mod_order(h.as_le_bytes())
}

fn from_fr(f: Fr) -> Result<Hash, CryptoError> {
    let le = f.into_bigint().to_bytes_le();
    let mut bytes = [0u8; 32];
    bytes[..le.len()].copy_from_slice(&le);
    Hash::from_le_bytes(bytes).map_err(|e| CryptoError::Poseidon(e.to_string()))
}

/// Hash 1 to 12 field elements.
pub fn poseidon_hash(inputs: &[Hash]) -> Result<Hash, CryptoError> {
    if inputs.is_empty() || inputs.len() > MAX_INPUTS {
        return Err(CryptoError::Poseidon(format!(
            "unsupported arity {}",
            inputs.len()
        )));
    }
    let mut hasher = Poseidon::<Fr>::new_circom(inputs.len())
        .map_err(|e| CryptoError::Poseidon(e.to_string()))?;
    let frs: Vec<Fr> = inputs.iter().map(to_fr).collect();
    let out = hasher
        .hash(&frs)
        .map_err(|e| CryptoError::Poseidon(e.to_string()))?;
    from_fr(out)
}

/// Hash of a tree leaf.
pub fn hash_leaf(key: &Hash, value: &Hash) -> Result<Hash, CryptoError> {
    poseidon_hash(&[*key, *value, Hash::from_u64(1)])
}

/// Hash of a tree middle node.
pub fn hash_node(left: &Hash, right: &Hash) -> Result<Hash, CryptoError> {
    poseidon_hash(&[*left, *right])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_circomlib_vector() {
        // poseidon([1, 2]) from circomlibjs
        let h = poseidon_hash(&[Hash::from_u64(1), Hash::from_u64(2)]).unwrap();
        assert_eq!(
            h.to_decimal(),
            "7853200120776062878684798364095072458815029376092732009249414926327459813530"
        );
    }

    #[test]
    fn leaf_and_node_differ() {
        let a = Hash::from_u64(5);
        let b = Hash::from_u64(6);
        assert_ne!(hash_leaf(&a, &b).unwrap(), hash_node(&a, &b).unwrap());
    }

    #[test]
    fn empty_and_oversized_inputs_are_rejected() {
        assert!(poseidon_hash(&[]).is_err());
        let many = vec![Hash::zero(); MAX_INPUTS + 1];
        assert!(poseidon_hash(&many).is_err());
    }

    #[test]
    fn four_input_hash_is_deterministic() {
        let slots = [1u64, 2, 3, 4].map(Hash::from_u64);
        assert_eq!(poseidon_hash(&slots).unwrap(), poseidon_hash(&slots).unwrap());
    }
}
