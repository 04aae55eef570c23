//! # zkid-auth — Proof Verification Engine
//!
//! Decides whether a presented zero-knowledge proof answers a verifier's
//! request. A proof is accepted only after it passes, in order:
//!
//! 1. **Structural**: circuit and scope match the request, the signal
//!    count fits the circuit, and the proof verifies against the
//!    circuit's verification key.
//! 2. **Query**: the public signals carry the requested issuer, schema,
//!    slot, operator and values ([`Query`]).
//! 3. **States**: the issuer state is published on its chain (or is the
//!    issuer's genesis state) and, when the proof checked revocation, the
//!    non-revocation state is latest or recently replaced
//!    ([`ResolverRegistry`], [`VerifyOptions`]).
//! 4. **Ownership**: the proof answers this request id and was produced
//!    by the message sender.
//!
//! ## Crate Policy
//!
//! - Proof, query and state failures are terminal for the proof and never
//!   retried. Resolver I/O failures are retryable
//!   ([`VerificationError::is_retryable`]).
//! - Chains are reached only through [`StateResolver`]s selected by the
//!   `blockchain:network` key of the issuer's DID.
//! - Schemas interpret queries only; they are never hashed into proofs.

pub mod error;
pub mod pubsignals;
pub mod query;
pub mod request;
pub mod resolver;
pub mod schema;
pub mod verifier;

pub use error::VerificationError;
pub use pubsignals::CircuitPubSignals;
pub use query::{FieldPredicate, Operator, Query};
pub use request::{
    add_scope, create_authorization_request, query_scope, scope_ids, AuthRequestStore, StoredRequest,
};
pub use resolver::{
    ChainStateResolver, GistRootInfo, MemoryStateReader, ResolvedState, ResolverRegistry, StateInfo,
    StateReader, StateResolver,
};
pub use schema::{field_slot, schema_hash, MemorySchemaLoader, SchemaLoader};
pub use verifier::{AuthStateVerifier, ProofVerifier, Stage, VerifiedScope, VerifyOptions};
