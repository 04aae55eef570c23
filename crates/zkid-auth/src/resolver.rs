//! # State Resolution
//!
//! Answers "is this state genuine, and is it still current?" for an
//! issuer. Resolvers are selected by the `blockchain:network` key of the
//! identity's DID, so one verifier can accept proofs anchored on several
//! chains.
//!
//! [`ChainStateResolver`] reads the state contract through a
//! [`StateReader`]. A state the contract has never seen is accepted only
//! as the identity's genesis state.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use zkid_core::{Did, Hash, Id};

use crate::error::VerificationError;

/// State record as the state contract stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateInfo {
    pub id: Id,
    pub state: Hash,
    /// Zero while this is the identity's latest state.
    pub replaced_by_state: Hash,
    pub created_at_timestamp: i64,
    pub replaced_at_timestamp: i64,
    pub created_at_block: u64,
    pub replaced_at_block: u64,
}

/// GIST root record as the state contract stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GistRootInfo {
    pub root: Hash,
    pub replaced_by_root: Hash,
    pub created_at_timestamp: i64,
    pub replaced_at_timestamp: i64,
}

/// Read access to a state contract.
#[async_trait]
pub trait StateReader: Send + Sync {
    /// The record for `state`, `None` if the contract never saw it.
    async fn state_info_by_state(&self, state: &Hash) -> Result<Option<StateInfo>, VerificationError>;

    /// The record for a GIST root, `None` if unknown.
    async fn gist_root_info(&self, root: &Hash) -> Result<Option<GistRootInfo>, VerificationError>;
}

/// Outcome of resolving a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedState {
    pub state: Hash,
    /// No newer state has replaced it.
    pub latest: bool,
    /// Accepted as an unpublished genesis state.
    pub genesis: bool,
    /// When it was replaced, zero if latest.
    pub transition_timestamp: i64,
}

impl ResolvedState {
    /// Seconds since this state was replaced, `None` if it is the latest.
    pub fn replaced_for(&self, now: i64) -> Option<i64> {
        (!self.latest).then(|| now - self.transition_timestamp)
    }
}

/// Resolves issuer states and GIST roots on one chain.
#[async_trait]
pub trait StateResolver: Send + Sync {
    /// Resolve `state` of identity `id`.
    async fn resolve(&self, id: &Id, state: &Hash) -> Result<ResolvedState, VerificationError>;

    /// Resolve a GIST root.
    async fn resolve_gist(&self, root: &Hash) -> Result<ResolvedState, VerificationError>;
}

/// Resolver backed by a state contract.
pub struct ChainStateResolver {
    reader: Arc<dyn StateReader>,
}

impl ChainStateResolver {
    /// Resolver over `reader`.
    pub fn new(reader: Arc<dyn StateReader>) -> Self {
        Self { reader }
    }
}

impl std::fmt::Debug for ChainStateResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainStateResolver").finish_non_exhaustive()
    }
}

#[async_trait]
impl StateResolver for ChainStateResolver {
    async fn resolve(&self, id: &Id, state: &Hash) -> Result<ResolvedState, VerificationError> {
        match self.reader.state_info_by_state(state).await? {
            None if id.is_genesis_state(state) => Ok(ResolvedState {
                state: *state,
                latest: true,
                genesis: true,
                transition_timestamp: 0,
            }),
            None => Err(VerificationError::IssuerStateInvalid(format!(
                "state {state} of {id} is not published and is not its genesis state"
            ))),
            Some(info) if info.id != *id => Err(VerificationError::IssuerStateInvalid(format!(
                "state {state} belongs to {}, not {id}",
                info.id
            ))),
            Some(info) => Ok(ResolvedState {
                state: info.state,
                latest: info.replaced_by_state.is_zero(),
                genesis: false,
                transition_timestamp: info.replaced_at_timestamp,
            }),
        }
    }

    async fn resolve_gist(&self, root: &Hash) -> Result<ResolvedState, VerificationError> {
        let info = self
            .reader
            .gist_root_info(root)
            .await?
            .ok_or_else(|| VerificationError::GistRootInvalid(format!("root {root} not found")))?;
        Ok(ResolvedState {
            state: info.root,
            latest: info.replaced_by_root.is_zero(),
            genesis: false,
            transition_timestamp: info.replaced_at_timestamp,
        })
    }
}

/// Resolvers keyed by `blockchain:network`.
#[derive(Default, Clone)]
pub struct ResolverRegistry {
    resolvers: HashMap<String, Arc<dyn StateResolver>>,
}

impl ResolverRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `resolver` for `chain_key`, e.g. `polygon:amoy`.
    pub fn register(&mut self, chain_key: impl Into<String>, resolver: Arc<dyn StateResolver>) -> &mut Self {
        self.resolvers.insert(chain_key.into(), resolver);
        self
    }

    /// The resolver for the chain `did` anchors on.
    pub fn for_did(&self, did: &Did) -> Result<&Arc<dyn StateResolver>, VerificationError> {
        let key = did.chain_key();
        self.resolvers
            .get(&key)
            .ok_or(VerificationError::ResolverNotFound(key))
    }

    /// The resolver for the chain `id` anchors on.
    pub fn for_id(&self, id: &Id) -> Result<&Arc<dyn StateResolver>, VerificationError> {
        self.for_did(&id.to_did()?)
    }

    /// Registered chain keys, sorted.
    pub fn chain_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.resolvers.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl std::fmt::Debug for ResolverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverRegistry")
            .field("chains", &self.chain_keys())
            .finish()
    }
}

/// Bound a resolver call by `limit`.
pub(crate) async fn bounded<T>(
    limit: Duration,
    fut: impl Future<Output = Result<T, VerificationError>>,
) -> Result<T, VerificationError> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| VerificationError::ResolverTimeout(limit.as_millis()))?
}

/// In-memory state contract ledger.
///
/// Publishing a state replaces the identity's previous latest state, the
/// way the on-chain contract does.
#[derive(Debug, Default)]
pub struct MemoryStateReader {
    inner: RwLock<Ledger>,
}

#[derive(Debug, Default)]
struct Ledger {
    states: HashMap<Hash, StateInfo>,
    latest: HashMap<Id, Hash>,
    gist: HashMap<Hash, GistRootInfo>,
    latest_gist: Option<Hash>,
}

impl MemoryStateReader {
    /// Empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `state` as the latest state of `id`.
    pub fn publish_state(&self, id: Id, state: Hash, timestamp: i64, block: u64) {
        let mut ledger = self.inner.write();
        if let Some(prev) = ledger.latest.insert(id, state) {
            if let Some(info) = ledger.states.get_mut(&prev) {
                info.replaced_by_state = state;
                info.replaced_at_timestamp = timestamp;
                info.replaced_at_block = block;
            }
        }
        ledger.states.insert(
            state,
            StateInfo {
                id,
                state,
                replaced_by_state: Hash::default(),
                created_at_timestamp: timestamp,
                replaced_at_timestamp: 0,
                created_at_block: block,
                replaced_at_block: 0,
            },
        );
    }

    /// Record `root` as the latest GIST root.
    pub fn publish_gist_root(&self, root: Hash, timestamp: i64) {
        let mut ledger = self.inner.write();
        if let Some(prev) = ledger.latest_gist.replace(root) {
            if let Some(info) = ledger.gist.get_mut(&prev) {
                info.replaced_by_root = root;
                info.replaced_at_timestamp = timestamp;
            }
        }
        ledger.gist.insert(
            root,
            GistRootInfo {
                root,
                replaced_by_root: Hash::default(),
                created_at_timestamp: timestamp,
                replaced_at_timestamp: 0,
            },
        );
    }

    /// Latest state published for `id`.
    pub fn latest_state(&self, id: &Id) -> Option<Hash> {
        self.inner.read().latest.get(id).copied()
    }
}

#[async_trait]
impl StateReader for MemoryStateReader {
    async fn state_info_by_state(&self, state: &Hash) -> Result<Option<StateInfo>, VerificationError> {
        Ok(self.inner.read().states.get(state).cloned())
    }

    async fn gist_root_info(&self, root: &Hash) -> Result<Option<GistRootInfo>, VerificationError> {
        Ok(self.inner.read().gist.get(root).cloned())
    }
}
