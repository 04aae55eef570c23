//! # zkid-comm — Protocol Packing
//!
//! Encodes and decodes the envelopes parties exchange:
//!
//! | media type | packer | protection |
//! |---|---|---|
//! | `application/iden3comm-plain-json` | [`PlainPacker`] | none |
//! | `application/iden3comm-signed-json` | [`JwsPacker`] | EdDSA compact JWS |
//! | `application/iden3-zkp-json` | [`ZkpPacker`] | JWZ token with a zero-knowledge proof |
//!
//! The [`PackageManager`] detects the media type of an incoming envelope
//! and routes it. Proving methods are looked up by `(alg, circuitId)` in a
//! [`ProvingMethodRegistry`] that callers construct and pass in.
//!
//! ## Crate Policy
//!
//! - Unpacking never returns a message whose protection failed to verify.
//! - Key material stays in the [`KeyStore`](zkid_crypto::KeyStore).
//! - Chain access happens only through the [`StateVerifier`] and
//!   [`KeyResolver`] capabilities.

pub mod error;
pub mod jws;
pub mod jwz;
pub mod manager;
pub mod message;
pub mod packer;
pub mod plain;
pub mod registry;
pub mod zkp;

pub use error::PackError;
pub use jws::{JwsPacker, KeyResolver, StaticKeyResolver};
pub use jwz::{JwzHeader, Token};
pub use manager::PackageManager;
pub use message::{
    AuthorizationRequestBody, AuthorizationResponseBody, BasicMessage, MediaType,
    ZeroKnowledgeProofRequest, ZeroKnowledgeProofResponse, AUTHORIZATION_REQUEST,
    AUTHORIZATION_RESPONSE, CREDENTIAL_OFFER,
};
pub use packer::{PackParams, Packer};
pub use plain::PlainPacker;
pub use registry::{ProvingMethod, ProvingMethodAlg, ProvingMethodRegistry, SnarkProvingMethod, ALG_GROTH16};
pub use zkp::{
    AuthV2InputsPreparer, InputsPreparer, ProvingParams, StateVerifier, VerificationParams,
    ZkpPacker,
};
