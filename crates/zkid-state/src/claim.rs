//! # Claims
//!
//! A claim is eight field-element slots: four index slots whose hash is the
//! claims-tree key, and four value slots whose hash is the leaf value.
//!
//! ```text
//! index[0]  schema hash (16 bytes) | flags (1 byte) | .. | version (4 bytes)
//! index[1]  subject id, when the subject sits in the index
//! index[2]  data
//! index[3]  data
//! value[0]  revocation nonce (8 bytes) | expiration unix seconds (8 bytes)
//! value[1]  subject id, when the subject sits in the value
//! value[2]  data
//! value[3]  data
//! ```
//!
//! Two claims with equal index slots collide in the tree, which is how
//! "one claim of this schema per subject" uniqueness is enforced.

use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;
use zkid_core::{Did, Hash, Id, ValidationError};
use zkid_crypto::{poseidon_hash, CryptoError, MerkleProof};

const FLAG_SUBJECT_INDEX: u8 = 0b010;
const FLAG_SUBJECT_VALUE: u8 = 0b011;
const FLAG_SUBJECT_MASK: u8 = 0b111;
const FLAG_EXPIRATION: u8 = 0b1000;

/// The 16-byte schema hash stored in `index[0]`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SchemaHash(pub [u8; 16]);

impl SchemaHash {
    /// Parse 32 hex characters.
    pub fn from_hex(s: &str) -> Result<Self, ValidationError> {
        let bytes = hex::decode(s).map_err(|_| ValidationError::NotFieldElement(s.to_string()))?;
        let arr: [u8; 16] = bytes
            .try_into()
            .map_err(|_| ValidationError::NotFieldElement(format!("schema hash {s:?} is not 16 bytes")))?;
        Ok(Self(arr))
    }

    /// Lowercase hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// The schema hash as a field element, the form used in public signals.
    pub fn to_field(&self) -> Hash {
        let mut le = [0u8; 32];
        le[..16].copy_from_slice(&self.0);
        Hash::from_le_bytes(le).unwrap_or_default()
    }
}

impl fmt::Debug for SchemaHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SchemaHash({})", self.to_hex())
    }
}

impl fmt::Display for SchemaHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for SchemaHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for SchemaHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Where the claim subject's id is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubjectPosition {
    /// The issuer claims something about itself.
    SelfSubject,
    /// Subject id in `index[1]`.
    Index,
    /// Subject id in `value[1]`.
    Value,
}

/// An eight-slot claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    index: [Hash; 4],
    value: [Hash; 4],
}

impl Claim {
    /// Start building a claim of `schema`.
    pub fn builder(schema: SchemaHash) -> ClaimBuilder {
        ClaimBuilder {
            schema,
            version: 0,
            subject: None,
            index_data: [Hash::zero(); 2],
            value_data: [Hash::zero(); 2],
            revocation_nonce: 0,
            expiration: None,
        }
    }

    /// Index slots.
    pub fn index_slots(&self) -> &[Hash; 4] {
        &self.index
    }

    /// Value slots.
    pub fn value_slots(&self) -> &[Hash; 4] {
        &self.value
    }

    /// All eight slots, index first.
    pub fn slots(&self) -> [Hash; 8] {
        let mut out = [Hash::zero(); 8];
        out[..4].copy_from_slice(&self.index);
        out[4..].copy_from_slice(&self.value);
        out
    }

    /// Claims-tree key.
    pub fn h_index(&self) -> Result<Hash, CryptoError> {
        poseidon_hash(&self.index)
    }

    /// Claims-tree value.
    pub fn h_value(&self) -> Result<Hash, CryptoError> {
        poseidon_hash(&self.value)
    }

    /// Schema hash from `index[0]`.
    pub fn schema_hash(&self) -> SchemaHash {
        let mut out = [0u8; 16];
        out.copy_from_slice(&self.index[0].as_le_bytes()[..16]);
        SchemaHash(out)
    }

    fn flags(&self) -> u8 {
        self.index[0].as_le_bytes()[16]
    }

    /// Schema version from `index[0]`.
    pub fn version(&self) -> u32 {
        let b = self.index[0].as_le_bytes();
        u32::from_le_bytes([b[20], b[21], b[22], b[23]])
    }

    /// Revocation nonce from `value[0]`.
    pub fn revocation_nonce(&self) -> u64 {
        let b = self.value[0].as_le_bytes();
        let mut n = [0u8; 8];
        n.copy_from_slice(&b[..8]);
        u64::from_le_bytes(n)
    }

    /// Expiration from `value[0]`, if the expiration flag is set.
    pub fn expiration(&self) -> Option<DateTime<Utc>> {
        if self.flags() & FLAG_EXPIRATION == 0 {
            return None;
        }
        let b = self.value[0].as_le_bytes();
        let mut secs = [0u8; 8];
        secs.copy_from_slice(&b[8..16]);
        Utc.timestamp_opt(i64::from_le_bytes(secs), 0).single()
    }

    /// Where the subject id sits.
    pub fn subject_position(&self) -> SubjectPosition {
        match self.flags() & FLAG_SUBJECT_MASK {
            FLAG_SUBJECT_INDEX => SubjectPosition::Index,
            FLAG_SUBJECT_VALUE => SubjectPosition::Value,
            _ => SubjectPosition::SelfSubject,
        }
    }

    /// Subject id, if the claim is about another identity.
    pub fn subject_id(&self) -> Option<Id> {
        match self.subject_position() {
            SubjectPosition::Index => Id::from_field(&self.index[1]).ok(),
            SubjectPosition::Value => Id::from_field(&self.value[1]).ok(),
            SubjectPosition::SelfSubject => None,
        }
    }
}

/// Builder for [`Claim`].
#[derive(Debug, Clone)]
pub struct ClaimBuilder {
    schema: SchemaHash,
    version: u32,
    subject: Option<(Id, SubjectPosition)>,
    index_data: [Hash; 2],
    value_data: [Hash; 2],
    revocation_nonce: u64,
    expiration: Option<DateTime<Utc>>,
}

impl ClaimBuilder {
    /// Schema version.
    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Claim about another identity.
    pub fn subject(mut self, id: Id, position: SubjectPosition) -> Self {
        self.subject = match position {
            SubjectPosition::SelfSubject => None,
            _ => Some((id, position)),
        };
        self
    }

    /// Data in `index[2]` and `index[3]`.
    pub fn index_data(mut self, a: Hash, b: Hash) -> Self {
        self.index_data = [a, b];
        self
    }

    /// Data in `value[2]` and `value[3]`.
    pub fn value_data(mut self, a: Hash, b: Hash) -> Self {
        self.value_data = [a, b];
        self
    }

    /// Revocation nonce.
    pub fn revocation_nonce(mut self, nonce: u64) -> Self {
        self.revocation_nonce = nonce;
        self
    }

    /// Expiration time, truncated to seconds.
    pub fn expiration(mut self, at: Option<DateTime<Utc>>) -> Self {
        self.expiration = at;
        self
    }

    /// Assemble the slots.
    pub fn build(self) -> Claim {
        let mut header = [0u8; 32];
        header[..16].copy_from_slice(&self.schema.0);
        let mut flags = match self.subject {
            Some((_, SubjectPosition::Index)) => FLAG_SUBJECT_INDEX,
            Some((_, SubjectPosition::Value)) => FLAG_SUBJECT_VALUE,
            _ => 0,
        };
        if self.expiration.is_some() {
            flags |= FLAG_EXPIRATION;
        }
        header[16] = flags;
        header[20..24].copy_from_slice(&self.version.to_le_bytes());

        let mut v0 = [0u8; 32];
        v0[..8].copy_from_slice(&self.revocation_nonce.to_le_bytes());
        if let Some(exp) = self.expiration {
            v0[8..16].copy_from_slice(&exp.timestamp().to_le_bytes());
        }

        // Both headers occupy at most 24 bytes, always below the modulus.
        let mut index = [
            Hash::from_le_bytes(header).unwrap_or_default(),
            Hash::zero(),
            self.index_data[0],
            self.index_data[1],
        ];
        let mut value = [
            Hash::from_le_bytes(v0).unwrap_or_default(),
            Hash::zero(),
            self.value_data[0],
            self.value_data[1],
        ];
        match self.subject {
            Some((id, SubjectPosition::Index)) => index[1] = id.to_field(),
            Some((id, SubjectPosition::Value)) => value[1] = id.to_field(),
            _ => {}
        }
        Claim { index, value }
    }
}

// ─── Claim records ──────────────────────────────────────────────────

/// A claim as held by the issuer, with its publication bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimRecord {
    /// Record id.
    pub id: Uuid,
    /// Issuing identity.
    pub issuer: Did,
    /// Subject, if not the issuer itself.
    pub subject: Option<Did>,
    /// JSON-LD schema URL.
    pub schema_url: String,
    /// Schema type name.
    pub schema_type: String,
    /// Schema hash in `index[0]`.
    pub schema_hash: SchemaHash,
    /// Credential subject as issued.
    pub credential_subject: serde_json::Value,
    /// The eight slots.
    pub claim: Claim,
    /// Claims-tree key.
    pub h_index: Hash,
    /// Revocation nonce.
    pub revocation_nonce: u64,
    /// Whether the nonce has been revoked.
    pub revoked: bool,
    /// State this claim was first committed in.
    pub identity_state: Option<Hash>,
    /// Inclusion proof against that state's claims root, once confirmed.
    pub mtp: Option<MerkleProof>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl ClaimRecord {
    /// Whether the claim is committed in a confirmed state.
    pub fn is_published(&self) -> bool {
        self.mtp.is_some()
    }

    /// Whether the claim has expired at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.claim.expiration().map(|e| e <= now).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zkid_core::{Blockchain, DidMethod, Network};

    fn schema() -> SchemaHash {
        SchemaHash::from_hex("ca938857241db9451ea329256b9c06e5").unwrap()
    }

    fn subject() -> Id {
        Id::from_genesis(
            DidMethod::Iden3,
            Blockchain::Polygon,
            Network::Amoy,
            &Hash::from_u64(42),
        )
        .unwrap()
    }

    #[test]
    fn header_fields_round_trip() {
        let exp = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let claim = Claim::builder(schema())
            .version(3)
            .revocation_nonce(77)
            .expiration(Some(exp))
            .subject(subject(), SubjectPosition::Index)
            .build();
        assert_eq!(claim.schema_hash(), schema());
        assert_eq!(claim.version(), 3);
        assert_eq!(claim.revocation_nonce(), 77);
        assert_eq!(claim.expiration(), Some(exp));
        assert_eq!(claim.subject_position(), SubjectPosition::Index);
        assert_eq!(claim.subject_id(), Some(subject()));
    }

    #[test]
    fn value_subject_goes_to_value_slot() {
        let claim = Claim::builder(schema())
            .subject(subject(), SubjectPosition::Value)
            .build();
        assert!(claim.index_slots()[1].is_zero());
        assert_eq!(claim.value_slots()[1], subject().to_field());
        assert_eq!(claim.subject_id(), Some(subject()));
    }

    #[test]
    fn nonce_does_not_change_index_hash() {
        let a = Claim::builder(schema()).revocation_nonce(1).build();
        let b = Claim::builder(schema()).revocation_nonce(2).build();
        assert_eq!(a.h_index().unwrap(), b.h_index().unwrap());
        assert_ne!(a.h_value().unwrap(), b.h_value().unwrap());
    }

    #[test]
    fn no_expiration_by_default() {
        let claim = Claim::builder(schema()).build();
        assert_eq!(claim.expiration(), None);
        assert_eq!(claim.subject_position(), SubjectPosition::SelfSubject);
        assert_eq!(claim.subject_id(), None);
    }

    #[test]
    fn schema_hash_hex_is_validated() {
        assert!(SchemaHash::from_hex("abcd").is_err());
        assert!(SchemaHash::from_hex("zz938857241db9451ea329256b9c06e5").is_err());
        assert_eq!(schema().to_hex(), "ca938857241db9451ea329256b9c06e5");
    }
}
