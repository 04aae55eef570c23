//! # zkid-zkp — Zero-Knowledge Proof Layer
//!
//! Treats the proof system as an opaque capability and gives everything
//! around it a type.
//!
//! ## Architecture
//!
//! - **Traits** (`traits.rs`): [`ProofSystem`] proves and verifies for a
//!   [`CircuitId`]. Mock and real backends are interchangeable.
//! - **Proof data** (`proof.rs`): the Groth16 wire triple plus public
//!   signals as decimal strings.
//! - **Circuits** (`circuits.rs`): the supported circuits and decoders for
//!   their public-signal layouts.
//! - **Mock** (`mock.rs`): [`MockProofSystem`], a deterministic SHA-256
//!   stand-in. Behind the default `mock` feature.
//! - **Keys** (`keys.rs`): verification key loaders keyed by circuit.
//!
//! ## Crate Policy
//!
//! - Depends on `zkid-core` only.
//! - No circuit arithmetic lives here.
//! - No `unsafe` code.

pub mod circuits;
pub mod error;
pub mod keys;
#[cfg(feature = "mock")]
pub mod mock;
pub mod proof;
pub mod traits;

pub use circuits::{AtomicQueryPubSignals, AuthV2PubSignals, CircuitId, VALUE_ARRAY_SIZE};
pub use error::{CircuitError, KeyLoadError, ProofError, VerifyError};
pub use keys::{FsKeyLoader, MemoryKeyLoader, VerificationKeyLoader};
#[cfg(feature = "mock")]
pub use mock::MockProofSystem;
pub use proof::{ProofData, ZkProof};
pub use traits::{CircuitInputs, ProofSystem};
