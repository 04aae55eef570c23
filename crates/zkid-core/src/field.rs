//! # Field Elements
//!
//! [`Hash`] is the universal value type of the identity stack: tree keys,
//! tree values, roots, state hashes and public signals are all elements of
//! the BN254 scalar field. The byte representation is little-endian, the
//! same order the circuits use when packing ids and states into signals.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use num_bigint::BigUint;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ValidationError;

/// Decimal form of the BN254 scalar field modulus.
pub const FIELD_MODULUS: &str =
    "21888242871839275222246405745257275088548364400416034343698204186575808495617";

fn modulus() -> &'static BigUint {
    static Q: OnceLock<BigUint> = OnceLock::new();
    Q.get_or_init(|| {
        BigUint::parse_bytes(FIELD_MODULUS.as_bytes(), 10).unwrap_or_default()
    })
}

/// A canonical BN254 scalar field element, stored little-endian.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hash([u8; 32]);

impl Hash {
    /// The zero element. Also the hash of an empty tree.
    pub const fn zero() -> Self {
        Self([0u8; 32])
    }

    /// Build from little-endian bytes, rejecting values `>= q`.
    pub fn from_le_bytes(bytes: [u8; 32]) -> Result<Self, ValidationError> {
        let value = BigUint::from_bytes_le(&bytes);
        if &value >= modulus() {
            return Err(ValidationError::NotFieldElement(value.to_str_radix(10)));
        }
        Ok(Self(bytes))
    }

    /// Build from big-endian bytes, rejecting values `>= q`.
    pub fn from_be_bytes(mut bytes: [u8; 32]) -> Result<Self, ValidationError> {
        bytes.reverse();
        Self::from_le_bytes(bytes)
    }

    /// Build from an arbitrary-precision integer.
    pub fn from_biguint(value: &BigUint) -> Result<Self, ValidationError> {
        if value >= modulus() {
            return Err(ValidationError::NotFieldElement(value.to_str_radix(10)));
        }
        let le = value.to_bytes_le();
        let mut bytes = [0u8; 32];
        bytes[..le.len()].copy_from_slice(&le);
        Ok(Self(bytes))
    }

    /// Interpret big-endian bytes as an integer and reduce it modulo `q`.
    ///
    /// Used to map digests (SHA-256, Keccak) into the field.
    pub fn from_be_bytes_reduced(bytes: &[u8]) -> Self {
        let value = BigUint::from_bytes_be(bytes) % modulus();
        let le = value.to_bytes_le();
        let mut out = [0u8; 32];
        out[..le.len()].copy_from_slice(&le);
        Self(out)
    }

    /// Build from a small integer. Never fails.
    pub fn from_u64(value: u64) -> Self {
        let mut bytes = [0u8; 32];
        bytes[..8].copy_from_slice(&value.to_le_bytes());
        Self(bytes)
    }

    /// Parse a base-10 string as used in public signals.
    pub fn from_decimal(s: &str) -> Result<Self, ValidationError> {
        let trimmed = s.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ValidationError::NotFieldElement(s.to_string()));
        }
        let value = BigUint::parse_bytes(trimmed.as_bytes(), 10)
            .ok_or_else(|| ValidationError::NotFieldElement(s.to_string()))?;
        Self::from_biguint(&value)
    }

    /// Parse a big-endian hex string, with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, ValidationError> {
        let raw = s.strip_prefix("0x").unwrap_or(s);
        let padded = format!("{raw:0>64}");
        let decoded =
            hex::decode(&padded).map_err(|e| ValidationError::NotFieldElement(e.to_string()))?;
        let bytes: [u8; 32] = decoded
            .try_into()
            .map_err(|_| ValidationError::NotFieldElement(s.to_string()))?;
        Self::from_be_bytes(bytes)
    }

    /// Little-endian byte view.
    pub fn as_le_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Big-endian bytes, as used for contract calls.
    pub fn to_be_bytes(&self) -> [u8; 32] {
        let mut out = self.0;
        out.reverse();
        out
    }

    /// Arbitrary-precision integer value.
    pub fn to_biguint(&self) -> BigUint {
        BigUint::from_bytes_le(&self.0)
    }

    /// Base-10 string form.
    pub fn to_decimal(&self) -> String {
        self.to_biguint().to_str_radix(10)
    }

    /// Big-endian hex form without prefix, always 64 characters.
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_be_bytes())
    }

    /// Whether this is the zero element.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// Bit `i` of the little-endian integer value.
    pub fn bit(&self, i: usize) -> bool {
        if i >= 256 {
            return false;
        }
        (self.0[i / 8] >> (i % 8)) & 1 == 1
    }

    /// Value as a `u64` if it fits.
    pub fn to_u64(&self) -> Option<u64> {
        if self.0[8..].iter().any(|b| *b != 0) {
            return None;
        }
        let mut low = [0u8; 8];
        low.copy_from_slice(&self.0[..8]);
        Some(u64::from_le_bytes(low))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_decimal())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.to_decimal())
    }
}

impl FromStr for Hash {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_decimal(s)
    }
}

impl From<u64> for Hash {
    fn from(value: u64) -> Self {
        Self::from_u64(value)
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_decimal())
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_decimal(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn zero_is_zero() {
        assert!(Hash::zero().is_zero());
        assert_eq!(Hash::zero().to_decimal(), "0");
        assert!(!Hash::from_u64(1).is_zero());
    }

    #[test]
    fn reduced_digest_wraps_modulus() {
        let q = BigUint::parse_bytes(FIELD_MODULUS.as_bytes(), 10).unwrap();
        let bytes = (&q + 5u32).to_bytes_be();
        assert_eq!(Hash::from_be_bytes_reduced(&bytes), Hash::from_u64(5));
        assert_eq!(Hash::from_be_bytes_reduced(&[0x01, 0x00]), Hash::from_u64(256));
    }

    #[test]
    fn modulus_is_rejected() {
        let err = Hash::from_decimal(FIELD_MODULUS).unwrap_err();
        assert!(matches!(err, ValidationError::NotFieldElement(_)));
    }

    #[test]
    fn modulus_minus_one_is_accepted() {
        let q_minus_one =
            "21888242871839275222246405745257275088548364400416034343698204186575808495616";
        let h = Hash::from_decimal(q_minus_one).unwrap();
        assert_eq!(h.to_decimal(), q_minus_one);
    }

    #[test]
    fn garbage_decimal_is_rejected() {
        assert!(Hash::from_decimal("").is_err());
        assert!(Hash::from_decimal("12a").is_err());
        assert!(Hash::from_decimal("-1").is_err());
    }

    #[test]
    fn hex_and_decimal_agree() {
        let h = Hash::from_hex("0x0100").unwrap();
        assert_eq!(h.to_decimal(), "256");
        assert_eq!(Hash::from_hex(&h.to_hex()).unwrap(), h);
    }

    #[test]
    fn bits_are_little_endian() {
        let h = Hash::from_u64(0b1010);
        assert!(!h.bit(0));
        assert!(h.bit(1));
        assert!(!h.bit(2));
        assert!(h.bit(3));
        assert!(!h.bit(300));
    }

    #[test]
    fn serde_uses_decimal_strings() {
        let h = Hash::from_u64(12345);
        let json = serde_json::to_string(&h).unwrap();
        assert_eq!(json, "\"12345\"");
        let back: Hash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, h);
    }

    #[test]
    fn to_u64_only_for_small_values() {
        assert_eq!(Hash::from_u64(7).to_u64(), Some(7));
        let big = Hash::from_hex("010000000000000000").unwrap();
        assert_eq!(big.to_u64(), None);
    }

    proptest! {
        #[test]
        fn decimal_parse_is_inverse_of_display(v in any::<u64>()) {
            let h = Hash::from_u64(v);
            prop_assert_eq!(Hash::from_decimal(&h.to_string()).unwrap(), h);
        }
    }
}
