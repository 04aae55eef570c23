//! # Identity State
//!
//! An [`IdentityState`] commits to the three tree roots of an identity at a
//! point in time. Its status tracks publication on chain:
//!
//! ```text
//! Created ──▶ PendingTransaction ──▶ Transacted ──▶ Confirmed
//!    │                 │                  │
//!    │                 └────▶ Failed ◀────┘
//!    │
//!    └──▶ Confirmed (genesis state only)
//! ```
//!
//! `Confirmed` and `Failed` are terminal. A confirmed state is never
//! mutated again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zkid_core::Hash;
use zkid_crypto::poseidon_hash;

use crate::error::StateError;

// ─── Status ──────────────────────────────────────────────────────────

/// Publication status of an identity state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StateStatus {
    /// Computed locally, not yet submitted.
    Created,
    /// A publisher has claimed this state and is building the transaction.
    PendingTransaction,
    /// Submitted on chain, awaiting confirmations.
    Transacted,
    /// Anchored with enough confirmations (terminal).
    Confirmed,
    /// Dropped, reverted or otherwise abandoned (terminal).
    Failed,
}

impl StateStatus {
    /// Whether this status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Failed)
    }

    /// Whether a publish is in flight.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::PendingTransaction | Self::Transacted)
    }
}

impl std::fmt::Display for StateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::PendingTransaction => "pending_transaction",
            Self::Transacted => "transacted",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

// ─── Roots ───────────────────────────────────────────────────────────

/// The three tree roots an identity state commits to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeRoots {
    /// Claims tree root.
    pub claims_root: Hash,
    /// Revocation tree root.
    pub revocation_root: Hash,
    /// Roots tree root.
    pub roots_root: Hash,
}

impl TreeRoots {
    /// `Poseidon(claimsRoot, revocationRoot, rootsRoot)`.
    pub fn state_hash(&self) -> Result<Hash, StateError> {
        Ok(poseidon_hash(&[
            self.claims_root,
            self.revocation_root,
            self.roots_root,
        ])?)
    }
}

// ─── State ───────────────────────────────────────────────────────────

/// Record of a status change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusTransition {
    /// Status before.
    pub from: StateStatus,
    /// Status after.
    pub to: StateStatus,
    /// When it happened.
    pub at: DateTime<Utc>,
}

/// A snapshot of an identity's cryptographic commitment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityState {
    /// Position in the identity's state log.
    pub seq: u64,
    /// State hash.
    pub state: Hash,
    /// The roots it commits to.
    pub roots: TreeRoots,
    /// Hash of the state this one replaces; `None` for genesis.
    pub previous_state: Option<Hash>,
    /// Publication status.
    pub status: StateStatus,
    /// Chain transaction id, once submitted.
    pub tx_id: Option<String>,
    /// Block the transaction was mined in.
    pub block_number: Option<u64>,
    /// Timestamp of that block.
    pub block_timestamp: Option<DateTime<Utc>>,
    /// Reason recorded on failure.
    pub failure: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub modified_at: DateTime<Utc>,
    /// Status history.
    pub transitions: Vec<StatusTransition>,
}

impl IdentityState {
    /// New `Created` state over `roots`.
    pub fn new(seq: u64, roots: TreeRoots, previous_state: Option<Hash>) -> Result<Self, StateError> {
        let now = Utc::now();
        Ok(Self {
            seq,
            state: roots.state_hash()?,
            roots,
            previous_state,
            status: StateStatus::Created,
            tx_id: None,
            block_number: None,
            block_timestamp: None,
            failure: None,
            created_at: now,
            modified_at: now,
            transitions: Vec::new(),
        })
    }

    /// Whether this is the genesis state.
    pub fn is_genesis(&self) -> bool {
        self.previous_state.is_none()
    }

    /// Apply a status change, enforcing the status machine.
    pub fn transition(&mut self, to: StateStatus) -> Result<(), StateError> {
        use StateStatus::*;
        let allowed = match (self.status, to) {
            (Created, PendingTransaction) => true,
            (PendingTransaction, Transacted) => true,
            (Transacted, Confirmed) => true,
            (PendingTransaction, Failed) | (Transacted, Failed) => true,
            (Created, Confirmed) => self.is_genesis(),
            _ => false,
        };
        if !allowed {
            return Err(StateError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        let now = Utc::now();
        self.transitions.push(StatusTransition {
            from: self.status,
            to,
            at: now,
        });
        self.status = to;
        self.modified_at = now;
        Ok(())
    }
}
