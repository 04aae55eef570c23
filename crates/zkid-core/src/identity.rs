//! # Identity Identifiers
//!
//! An [`Id`] is 31 bytes: two type bytes (DID method, blockchain/network),
//! 27 bytes of the genesis state, and a two-byte checksum. The textual form
//! is base58; the DID form prefixes it with method, blockchain and network.
//!
//! Because the type bytes encode the method and the chain, a [`Did`] can be
//! recovered from an [`Id`] alone. This is how verifiers turn the `userID`
//! public signal back into a DID for sender comparison.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::base58;
use crate::error::ValidationError;
use crate::field::Hash;

const ID_LEN: usize = 31;
const GENESIS_LEN: usize = 27;

/// Supported DID methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DidMethod {
    /// `did:iden3`
    Iden3,
    /// `did:polygonid`
    PolygonId,
}

impl DidMethod {
    /// The method name as it appears in a DID string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Iden3 => "iden3",
            Self::PolygonId => "polygonid",
        }
    }

    fn byte(&self) -> u8 {
        match self {
            Self::Iden3 => 0b0000_0001,
            Self::PolygonId => 0b0000_0010,
        }
    }

    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0b0000_0001 => Some(Self::Iden3),
            0b0000_0010 => Some(Self::PolygonId),
            _ => None,
        }
    }

    /// Parse the name used in DID strings.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "iden3" => Some(Self::Iden3),
            "polygonid" => Some(Self::PolygonId),
            _ => None,
        }
    }
}

/// Blockchain an identity anchors its state on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Blockchain {
    /// Ethereum family.
    Ethereum,
    /// Polygon family.
    Polygon,
    /// Identity never publishes state; only its genesis state is valid.
    ReadOnly,
}

impl Blockchain {
    /// The blockchain name as it appears in a DID string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ethereum => "eth",
            Self::Polygon => "polygon",
            Self::ReadOnly => "readonly",
        }
    }

    /// Parse the name used in DID strings.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "eth" => Some(Self::Ethereum),
            "polygon" => Some(Self::Polygon),
            "readonly" => Some(Self::ReadOnly),
            _ => None,
        }
    }
}

/// Network within a blockchain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Network {
    /// Main network.
    Main,
    /// Ethereum Goerli.
    Goerli,
    /// Ethereum Sepolia.
    Sepolia,
    /// Polygon Mumbai.
    Mumbai,
    /// Polygon Amoy.
    Amoy,
    /// Only valid with [`Blockchain::ReadOnly`].
    NoNetwork,
}

impl Network {
    /// The network name as it appears in a DID string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Goerli => "goerli",
            Self::Sepolia => "sepolia",
            Self::Mumbai => "mumbai",
            Self::Amoy => "amoy",
            Self::NoNetwork => "",
        }
    }

    /// Parse the name used in DID strings.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "main" => Some(Self::Main),
            "goerli" => Some(Self::Goerli),
            "sepolia" => Some(Self::Sepolia),
            "mumbai" => Some(Self::Mumbai),
            "amoy" => Some(Self::Amoy),
            _ => None,
        }
    }
}

/// Supported (blockchain, network) pairs and their type byte.
const CHAIN_BYTES: &[(Blockchain, Network, u8)] = &[
    (Blockchain::ReadOnly, Network::NoNetwork, 0b0000_0000),
    (Blockchain::Polygon, Network::Main, 0b0001_0001),
    (Blockchain::Polygon, Network::Mumbai, 0b0001_0010),
    (Blockchain::Polygon, Network::Amoy, 0b0001_0011),
    (Blockchain::Ethereum, Network::Main, 0b0010_0001),
    (Blockchain::Ethereum, Network::Goerli, 0b0010_0010),
    (Blockchain::Ethereum, Network::Sepolia, 0b0010_0011),
];

fn chain_byte(blockchain: Blockchain, network: Network) -> Option<u8> {
    CHAIN_BYTES
        .iter()
        .find(|(b, n, _)| *b == blockchain && *n == network)
        .map(|(_, _, byte)| *byte)
}

fn chain_from_byte(byte: u8) -> Option<(Blockchain, Network)> {
    CHAIN_BYTES
        .iter()
        .find(|(_, _, b)| *b == byte)
        .map(|(bc, n, _)| (*bc, *n))
}

fn checksum(type_and_genesis: &[u8]) -> [u8; 2] {
    let sum = type_and_genesis
        .iter()
        .fold(0u16, |acc, b| acc.wrapping_add(*b as u16));
    sum.to_le_bytes()
}

// ─── Id ─────────────────────────────────────────────────────────────

/// A 31-byte identity identifier derived from a genesis state.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id([u8; ID_LEN]);

impl Id {
    /// Derive an id from the DID type and the identity's genesis state.
    pub fn from_genesis(
        method: DidMethod,
        blockchain: Blockchain,
        network: Network,
        genesis_state: &Hash,
    ) -> Result<Self, ValidationError> {
        let type_bytes = did_type(method, blockchain, network)?;
        let state = genesis_state.as_le_bytes();
        let mut bytes = [0u8; ID_LEN];
        bytes[..2].copy_from_slice(&type_bytes);
        bytes[2..2 + GENESIS_LEN].copy_from_slice(&state[32 - GENESIS_LEN..]);
        let cs = checksum(&bytes[..2 + GENESIS_LEN]);
        bytes[2 + GENESIS_LEN..].copy_from_slice(&cs);
        Ok(Self(bytes))
    }

    /// Validate raw bytes: length, checksum and known type.
    pub fn from_bytes(raw: &[u8]) -> Result<Self, ValidationError> {
        let bytes: [u8; ID_LEN] = raw.try_into().map_err(|_| {
            ValidationError::MalformedId(format!("expected {ID_LEN} bytes, got {}", raw.len()))
        })?;
        let id = Self(bytes);
        if checksum(&bytes[..2 + GENESIS_LEN]) != [bytes[29], bytes[30]] {
            return Err(ValidationError::MalformedId("checksum mismatch".into()));
        }
        id.type_parts()?;
        Ok(id)
    }

    /// Parse the base58 string form.
    pub fn from_base58(s: &str) -> Result<Self, ValidationError> {
        Self::from_bytes(&base58::decode(s)?)
    }

    /// Recover an id from its public-signal encoding.
    pub fn from_field(value: &Hash) -> Result<Self, ValidationError> {
        let le = value.as_le_bytes();
        if le[ID_LEN] != 0 {
            return Err(ValidationError::MalformedId(format!(
                "field value {value} exceeds {ID_LEN} bytes"
            )));
        }
        Self::from_bytes(&le[..ID_LEN])
    }

    /// Public-signal encoding: the bytes read as a little-endian integer.
    pub fn to_field(&self) -> Hash {
        let mut le = [0u8; 32];
        le[..ID_LEN].copy_from_slice(&self.0);
        // 248 bits is always below the modulus.
        Hash::from_le_bytes(le).unwrap_or_default()
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; ID_LEN] {
        &self.0
    }

    /// Base58 string form.
    pub fn to_base58(&self) -> String {
        base58::encode(&self.0)
    }

    /// Whether `state` is the genesis state this id was derived from.
    pub fn is_genesis_state(&self, state: &Hash) -> bool {
        match self.type_parts() {
            Ok((m, b, n)) => Id::from_genesis(m, b, n, state).map(|id| id == *self).unwrap_or(false),
            Err(_) => false,
        }
    }

    fn type_parts(&self) -> Result<(DidMethod, Blockchain, Network), ValidationError> {
        let method = DidMethod::from_byte(self.0[0]).ok_or_else(|| {
            ValidationError::MalformedId(format!("unknown method byte {:#04x}", self.0[0]))
        })?;
        let (blockchain, network) = chain_from_byte(self.0[1]).ok_or_else(|| {
            ValidationError::MalformedId(format!("unknown network byte {:#04x}", self.0[1]))
        })?;
        Ok((method, blockchain, network))
    }

    /// The DID this id belongs to.
    pub fn to_did(&self) -> Result<Did, ValidationError> {
        let (method, blockchain, network) = self.type_parts()?;
        Ok(Did {
            method,
            blockchain,
            network,
            id: *self,
        })
    }
}

fn did_type(
    method: DidMethod,
    blockchain: Blockchain,
    network: Network,
) -> Result<[u8; 2], ValidationError> {
    let byte = chain_byte(blockchain, network).ok_or_else(|| {
        ValidationError::UnsupportedDidMetadata {
            method: method.as_str().into(),
            blockchain: blockchain.as_str().into(),
            network: network.as_str().into(),
        }
    })?;
    Ok([method.byte(), byte])
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base58())
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self.to_base58())
    }
}

impl Serialize for Id {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base58())
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_base58(&s).map_err(serde::de::Error::custom)
    }
}

// ─── Did ────────────────────────────────────────────────────────────

/// A decentralized identifier: `did:<method>:<blockchain>:<network>:<id>`.
///
/// Read-only identities use the short form `did:<method>:<id>`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Did {
    /// DID method.
    pub method: DidMethod,
    /// Anchor chain.
    pub blockchain: Blockchain,
    /// Anchor network.
    pub network: Network,
    /// The identity id.
    pub id: Id,
}

impl Did {
    /// Parse and validate a DID string.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        let malformed = |reason: &str| ValidationError::MalformedDid {
            did: s.to_string(),
            reason: reason.to_string(),
        };
        let parts: Vec<&str> = s.split(':').collect();
        if parts.first() != Some(&"did") {
            return Err(malformed("missing did: prefix"));
        }
        let (method, blockchain, network, id_str) = match parts.as_slice() {
            [_, m, id] => (*m, "readonly", "", *id),
            [_, m, b, n, id] => (*m, *b, *n, *id),
            _ => return Err(malformed("expected did:<method>:<blockchain>:<network>:<id>")),
        };
        let unsupported = || ValidationError::UnsupportedDidMetadata {
            method: method.to_string(),
            blockchain: blockchain.to_string(),
            network: network.to_string(),
        };
        let method = DidMethod::parse(method).ok_or_else(unsupported)?;
        let blockchain_v = Blockchain::parse(blockchain).ok_or_else(unsupported)?;
        let network_v = if blockchain_v == Blockchain::ReadOnly {
            Network::NoNetwork
        } else {
            Network::parse(network).ok_or_else(unsupported)?
        };
        let type_bytes = did_type(method, blockchain_v, network_v)?;

        let id = Id::from_base58(id_str).map_err(|e| malformed(&e.to_string()))?;
        if id.as_bytes()[..2] != type_bytes {
            return Err(malformed("id type does not match DID method and network"));
        }
        Ok(Self {
            method,
            blockchain: blockchain_v,
            network: network_v,
            id,
        })
    }

    /// The `blockchain:network` key used to select a state resolver.
    pub fn chain_key(&self) -> String {
        format!("{}:{}", self.blockchain.as_str(), self.network.as_str())
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.blockchain == Blockchain::ReadOnly {
            write!(f, "did:{}:{}", self.method.as_str(), self.id)
        } else {
            write!(
                f,
                "did:{}:{}:{}:{}",
                self.method.as_str(),
                self.blockchain.as_str(),
                self.network.as_str(),
                self.id
            )
        }
    }
}

impl fmt::Debug for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Did({self})")
    }
}

impl FromStr for Did {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Did {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Did {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
