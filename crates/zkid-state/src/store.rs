//! # Identity Store
//!
//! In-memory store of identity records. Each record sits behind its own
//! mutex, so every operation on one identity is serialized while distinct
//! identities proceed in parallel. The outer map is only locked long enough
//! to clone the record handle.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use zkid_core::{Did, Hash, Id};
use zkid_crypto::KeyId;

use crate::claim::ClaimRecord;
use crate::error::StateError;
use crate::log::StateLog;
use crate::trees::IdentityTrees;

/// Everything held for one identity.
#[derive(Debug, Clone)]
pub struct IdentityRecord {
    /// The identity's DID.
    pub did: Did,
    /// Key signing state transitions.
    pub auth_key: KeyId,
    /// Index hash of the auth claim.
    pub auth_claim_index: Hash,
    /// Working trees.
    pub trees: IdentityTrees,
    /// State history.
    pub log: StateLog,
    /// Issued claims, in issue order.
    pub claims: Vec<ClaimRecord>,
    /// Next revocation nonce handed to a regular claim.
    pub next_nonce: u64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl IdentityRecord {
    /// Whether the working trees differ from the current state.
    pub fn is_dirty(&self) -> bool {
        match self.log.current() {
            Some(current) => current.roots != self.trees.roots(),
            None => true,
        }
    }
}

/// Thread-safe map of identity records.
#[derive(Debug, Default)]
pub struct IdentityStore {
    records: DashMap<Id, Arc<Mutex<IdentityRecord>>>,
}

impl IdentityStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a freshly provisioned identity.
    pub fn insert(&self, record: IdentityRecord) -> Id {
        let id = record.did.id;
        self.records.insert(id, Arc::new(Mutex::new(record)));
        id
    }

    fn handle(&self, id: &Id) -> Result<Arc<Mutex<IdentityRecord>>, StateError> {
        self.records
            .get(id)
            .map(|r| Arc::clone(r.value()))
            .ok_or(StateError::IdentityNotFound(*id))
    }

    /// Run `f` with exclusive access to one identity.
    pub fn with_identity<T>(
        &self,
        id: &Id,
        f: impl FnOnce(&mut IdentityRecord) -> Result<T, StateError>,
    ) -> Result<T, StateError> {
        let handle = self.handle(id)?;
        let mut record = handle.lock();
        f(&mut record)
    }

    /// Whether the identity exists.
    pub fn contains(&self, id: &Id) -> bool {
        self.records.contains_key(id)
    }

    /// All identity ids, sorted.
    pub fn ids(&self) -> Vec<Id> {
        let mut ids: Vec<Id> = self.records.iter().map(|r| *r.key()).collect();
        ids.sort();
        ids
    }

    /// Number of identities.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
