//! # zkid-core — Foundational Types for the zkid Stack
//!
//! Every other crate in the workspace depends on `zkid-core`; it depends on
//! nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Field elements are a newtype.** [`Hash`] is a little-endian
//!    32-byte value that is always strictly below the BN254 scalar field
//!    modulus. Decimal strings (the wire form used in public signals) are
//!    parsed and range-checked at the boundary.
//!
//! 2. **Identifiers are validated on construction.** [`Id`] carries its
//!    type bytes and checksum; [`Did`] can only be built from a supported
//!    method, blockchain and network combination.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `zkid-*` crates (this is the leaf of the DAG).
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod base58;
pub mod error;
pub mod field;
pub mod identity;

pub use error::ValidationError;
pub use field::{Hash, FIELD_MODULUS};
pub use identity::{Blockchain, Did, DidMethod, Id, Network};
