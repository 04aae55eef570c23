//! # zkid-publisher — State Publisher
//!
//! Anchors identity state transitions on chain. [`StatePublisher`] claims
//! a state from the [`zkid_state::IdentityEngine`], signs and submits
//! the transition through a [`ChainClient`], and confirms or fails it
//! once the transaction settles. [`task::run`] sweeps transacted states
//! on a fixed interval.
//!
//! ## Crate Policy
//!
//! - At most one transition per identity is in flight. A second publish
//!   reports [`PublishError::StateIsBeingProcessed`].
//! - Every chain call is bounded by the RPC response timeout. Gas prices
//!   are clamped to the configured bounds.
//! - A failed transition never loses changes: they stay pending for the
//!   next publish.
//! - [`MockChain`] stands in for the state contract in tests and in the
//!   development loop of the `zkid` binary.

pub mod chain;
pub mod config;
pub mod error;
pub mod gas;
pub mod mock;
pub mod publisher;
pub mod rhs;
pub mod task;

pub use chain::{ChainClient, ChainTimeouts, Receipt, ReceiptStatus, StateContract, TransitionPayload, TxStatus};
pub use config::PublisherConfig;
pub use error::{ConfigError, PublishError};
pub use gas::GasPolicy;
pub use mock::MockChain;
pub use publisher::{PublishedState, StatePublisher, SweepReport};
pub use rhs::{MemoryRhs, RhsPublisher};
pub use task::{LoopStats, Schedule};
