//! # zkid-state — Merkle State Engine
//!
//! Owns the cryptographic state of every identity the node manages:
//!
//! - three sparse Merkle trees per identity (claims, revocations, roots),
//! - the append-only [`StateLog`] of identity states,
//! - the status machine each state walks on its way to being anchored.
//!
//! The [`IdentityEngine`] is the only writer. Publishers drive states
//! through `begin_publish` → `record_transaction` → `confirm_state` (or
//! `fail_state`); the status machine in [`IdentityState::transition`]
//! rejects anything else.
//!
//! ## Crate Policy
//!
//! - Depends on `zkid-core` and `zkid-crypto` only.
//! - All mutation for one identity is serialized by [`IdentityStore`].
//! - Confirmed states are immutable.

pub mod claim;
pub mod engine;
pub mod error;
pub mod log;
pub mod state;
pub mod store;
pub mod trees;

pub use claim::{Claim, ClaimBuilder, ClaimRecord, SchemaHash, SubjectPosition};
pub use engine::{
    ClaimSignature, ConfirmedState, EngineConfig, IdentityEngine, InsertedClaim, NewClaim,
    RevocationStatus, TransitionInputs, AUTH_SCHEMA_HASH,
};
pub use error::StateError;
pub use log::StateLog;
pub use state::{IdentityState, StateStatus, StatusTransition, TreeRoots};
pub use store::{IdentityRecord, IdentityStore};
pub use trees::{IdentityTrees, TreeKind};
