//! # Merkle State Engine
//!
//! The authoritative holder of per-identity cryptographic state. Every
//! mutation runs under the identity's lock in [`IdentityStore`], so claim
//! insertion, revocation, snapshotting and publication bookkeeping for one
//! identity never interleave.
//!
//! ## Lifecycle
//!
//! 1. [`IdentityEngine::create_identity`] builds the auth claim, derives the
//!    id from the genesis state and records that state as confirmed.
//! 2. [`IdentityEngine::insert_claim`] / [`IdentityEngine::revoke`] mutate
//!    the working trees; the identity becomes dirty.
//! 3. [`IdentityEngine::begin_publish`] snapshots the trees and claims the
//!    new state for a publisher, atomically.
//! 4. The publisher reports back through `record_transaction`,
//!    `confirm_state` or `fail_state`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zkid_core::{Blockchain, Did, DidMethod, Hash, Id, Network};
use zkid_crypto::{Ed25519PublicKey, Ed25519Signature, KeyId, KeyStore, MerkleProof};

use crate::claim::{Claim, ClaimRecord, SchemaHash, SubjectPosition};
use crate::error::StateError;
use crate::log::StateLog;
use crate::state::{IdentityState, StateStatus, TreeRoots};
use crate::store::{IdentityRecord, IdentityStore};
use crate::trees::{IdentityTrees, TreeKind};

/// Schema hash of the auth claim holding an identity's signing key.
pub const AUTH_SCHEMA_HASH: SchemaHash = SchemaHash([
    0xca, 0x93, 0x88, 0x57, 0x24, 0x1d, 0xb9, 0x45, 0x1e, 0xa3, 0x29, 0x25, 0x6b, 0x9c, 0x06, 0xe5,
]);

/// Engine tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Depth of each identity tree.
    pub max_levels: usize,
    /// Nonces `0..auth_nonce_slots` are reserved for auth claims.
    pub auth_nonce_slots: u64,
    /// Nonces at or above this bound are rejected.
    pub revocation_nonce_space: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_levels: zkid_crypto::smt::DEFAULT_MAX_LEVELS,
            auth_nonce_slots: 16,
            revocation_nonce_space: 1 << 32,
        }
    }
}

/// A claim to issue.
#[derive(Debug, Clone)]
pub struct NewClaim {
    /// JSON-LD schema URL.
    pub schema_url: String,
    /// Schema type name.
    pub schema_type: String,
    /// Schema hash for `index[0]`.
    pub schema_hash: SchemaHash,
    /// Schema version.
    pub version: u32,
    /// Subject, if not the issuer.
    pub subject: Option<Did>,
    /// Where the subject id goes.
    pub subject_position: SubjectPosition,
    /// `index[2]`, `index[3]`.
    pub index_data: [Hash; 2],
    /// `value[2]`, `value[3]`.
    pub value_data: [Hash; 2],
    /// Expiration.
    pub expiration: Option<DateTime<Utc>>,
    /// Credential subject as issued.
    pub credential_subject: serde_json::Value,
}

/// Result of inserting a claim.
#[derive(Debug, Clone)]
pub struct InsertedClaim {
    /// The stored record.
    pub record: ClaimRecord,
    /// Working roots after insertion.
    pub roots: TreeRoots,
}

/// Issuer state and revocation proof for one nonce.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevocationStatus {
    /// State the proof is against.
    pub state: Hash,
    /// Its roots.
    pub roots: TreeRoots,
    /// Revocation tree proof for the nonce; `existence` means revoked.
    pub mtp: MerkleProof,
}

/// A claim signed with the issuer's auth key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimSignature {
    /// Signing issuer.
    pub issuer: Did,
    /// Public key of the auth claim.
    pub public_key: Ed25519PublicKey,
    /// Signature over `hIndex || hValue`.
    pub signature: Ed25519Signature,
    /// Latest confirmed issuer state.
    pub issuer_state: Hash,
    /// Auth claim inclusion proof in that state.
    pub auth_claim_mtp: MerkleProof,
}

/// Everything a publisher needs to submit one state transition.
#[derive(Debug, Clone)]
pub struct TransitionInputs {
    /// Identity.
    pub id: Id,
    /// Log position of the new state.
    pub seq: u64,
    /// State currently anchored.
    pub old_state: Hash,
    /// Whether the anchored state is the genesis state.
    pub is_old_state_genesis: bool,
    /// State being published.
    pub new_state: Hash,
    /// Roots of the new state.
    pub new_roots: TreeRoots,
    /// The auth claim.
    pub auth_claim: Claim,
    /// Its inclusion proof in the old state's claims tree.
    pub auth_claim_mtp: MerkleProof,
    /// Key to sign with.
    pub auth_key: KeyId,
}

impl TransitionInputs {
    /// Bytes signed to authorize the transition: old state then new state,
    /// little-endian.
    pub fn signing_message(&self) -> Vec<u8> {
        let mut msg = Vec::with_capacity(64);
        msg.extend_from_slice(self.old_state.as_le_bytes());
        msg.extend_from_slice(self.new_state.as_le_bytes());
        msg
    }
}

/// Result of confirming a state.
#[derive(Debug, Clone)]
pub struct ConfirmedState {
    /// The confirmed state.
    pub state: IdentityState,
    /// Tree nodes (hash, preimage) to publish to a reverse hash service,
    /// including the state node itself.
    pub new_nodes: Vec<(Hash, Vec<Hash>)>,
}

/// Per-identity Merkle state engine.
#[derive(Clone)]
pub struct IdentityEngine {
    store: Arc<IdentityStore>,
    keys: Arc<dyn KeyStore>,
    config: EngineConfig,
}

impl std::fmt::Debug for IdentityEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityEngine")
            .field("identities", &self.store.len())
            .field("key_store", &self.keys.store_name())
            .field("config", &self.config)
            .finish()
    }
}

impl IdentityEngine {
    /// Engine over a fresh store.
    pub fn new(keys: Arc<dyn KeyStore>, config: EngineConfig) -> Self {
        Self::with_store(Arc::new(IdentityStore::new()), keys, config)
    }

    /// Engine over an existing store.
    pub fn with_store(store: Arc<IdentityStore>, keys: Arc<dyn KeyStore>, config: EngineConfig) -> Self {
        Self { store, keys, config }
    }

    /// The key store.
    pub fn keys(&self) -> &Arc<dyn KeyStore> {
        &self.keys
    }

    /// Tuning.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn check_budget(&self, nonce: u64) -> Result<(), StateError> {
        if nonce >= self.config.revocation_nonce_space {
            return Err(StateError::IndexOutOfBudget {
                nonce,
                budget: self.config.revocation_nonce_space,
            });
        }
        Ok(())
    }

    // ─── Provisioning ────────────────────────────────────────────────

    /// Provision a new identity and record its genesis state as confirmed.
    pub fn create_identity(
        &self,
        method: DidMethod,
        blockchain: Blockchain,
        network: Network,
    ) -> Result<(Did, IdentityState), StateError> {
        let auth_key = self.keys.create_key()?;
        let pk = self.keys.public_key(&auth_key)?;
        let (lo, hi) = pk.to_field_halves();
        let auth_claim = Claim::builder(AUTH_SCHEMA_HASH)
            .index_data(lo, hi)
            .revocation_nonce(0)
            .build();

        let mut trees = IdentityTrees::new(self.config.max_levels);
        let auth_index = trees.add_claim(&auth_claim)?;
        let roots = trees.roots();
        let genesis = roots.state_hash()?;
        let id = Id::from_genesis(method, blockchain, network, &genesis)?;
        let did = id.to_did()?;

        let mut log = StateLog::new();
        log.append(roots)?;
        log.get_mut(0)?.transition(StateStatus::Confirmed)?;
        let state = log.get_mut(0)?.clone();

        let (mtp, _) = trees.prove(TreeKind::Claims, &auth_index, Some(&roots.claims_root))?;
        let auth_record = ClaimRecord {
            id: Uuid::new_v4(),
            issuer: did,
            subject: None,
            schema_url: String::new(),
            schema_type: "AuthEd25519Credential".into(),
            schema_hash: AUTH_SCHEMA_HASH,
            credential_subject: serde_json::json!({ "publicKey": pk.to_hex() }),
            claim: auth_claim,
            h_index: auth_index,
            revocation_nonce: 0,
            revoked: false,
            identity_state: Some(genesis),
            mtp: Some(mtp),
            created_at: Utc::now(),
        };

        self.store.insert(IdentityRecord {
            did,
            auth_key,
            auth_claim_index: auth_index,
            trees,
            log,
            claims: vec![auth_record],
            next_nonce: self.config.auth_nonce_slots,
            created_at: Utc::now(),
        });
        tracing::info!(identity = %did, state = %genesis, "identity created");
        Ok((did, state))
    }

    // ─── Tree mutation ───────────────────────────────────────────────

    /// Insert a claim into the issuer's claims tree.
    pub fn insert_claim(&self, issuer: &Id, new: NewClaim) -> Result<InsertedClaim, StateError> {
        self.store.with_identity(issuer, |rec| {
            let nonce = rec.next_nonce;
            self.check_budget(nonce)?;
            let mut builder = Claim::builder(new.schema_hash)
                .version(new.version)
                .index_data(new.index_data[0], new.index_data[1])
                .value_data(new.value_data[0], new.value_data[1])
                .revocation_nonce(nonce)
                .expiration(new.expiration);
            if let Some(subject) = &new.subject {
                builder = builder.subject(subject.id, new.subject_position);
            }
            let claim = builder.build();
            let h_index = rec.trees.add_claim(&claim)?;
            rec.next_nonce += 1;

            let record = ClaimRecord {
                id: Uuid::new_v4(),
                issuer: rec.did,
                subject: new.subject,
                schema_url: new.schema_url,
                schema_type: new.schema_type,
                schema_hash: new.schema_hash,
                credential_subject: new.credential_subject,
                claim,
                h_index,
                revocation_nonce: nonce,
                revoked: false,
                identity_state: None,
                mtp: None,
                created_at: Utc::now(),
            };
            rec.claims.push(record.clone());
            tracing::info!(identity = %rec.did, claim = %record.id, nonce, "claim inserted");
            Ok(InsertedClaim {
                record,
                roots: rec.trees.roots(),
            })
        })
    }

    /// Insert `nonce` into the revocation tree.
    pub fn revoke(&self, id: &Id, nonce: u64) -> Result<TreeRoots, StateError> {
        self.check_budget(nonce)?;
        self.store.with_identity(id, |rec| {
            rec.trees.revoke(nonce)?;
            for claim in rec.claims.iter_mut().filter(|c| c.revocation_nonce == nonce) {
                claim.revoked = true;
            }
            tracing::info!(identity = %rec.did, nonce, "nonce revoked");
            Ok(rec.trees.roots())
        })
    }

    fn snapshot_locked(rec: &mut IdentityRecord) -> Result<IdentityState, StateError> {
        if !rec.is_dirty() {
            return rec
                .log
                .current()
                .cloned()
                .ok_or_else(|| StateError::StateNotFound(format!("no state for {}", rec.did)));
        }
        rec.trees.commit_claims_root()?;
        let state = rec.log.stage(rec.trees.roots())?.clone();
        for claim in rec.claims.iter_mut().filter(|c| c.mtp.is_none()) {
            claim.identity_state = Some(state.state);
        }
        Ok(state)
    }

    /// Commit the working trees into a state chained to the current one.
    ///
    /// Returns the current state unchanged when nothing changed since.
    pub fn snapshot(&self, id: &Id) -> Result<IdentityState, StateError> {
        self.store.with_identity(id, Self::snapshot_locked)
    }

    /// Membership or non-membership proof for `key` in tree `kind`.
    ///
    /// With `at_state`, the proof is against that state's roots; otherwise
    /// against the working trees.
    pub fn prove_inclusion(
        &self,
        id: &Id,
        kind: TreeKind,
        key: &Hash,
        at_state: Option<&Hash>,
    ) -> Result<MerkleProof, StateError> {
        self.store.with_identity(id, |rec| {
            let root = match at_state {
                Some(state) => {
                    let s = rec
                        .log
                        .by_hash(state)
                        .ok_or_else(|| StateError::StateNotFound(state.to_string()))?;
                    Some(match kind {
                        TreeKind::Claims => s.roots.claims_root,
                        TreeKind::Revocation => s.roots.revocation_root,
                        TreeKind::Roots => s.roots.roots_root,
                    })
                }
                None => None,
            };
            let (proof, _) = rec.trees.prove(kind, key, root.as_ref())?;
            Ok(proof)
        })
    }

    /// Revocation proof for `nonce` against the latest confirmed state.
    pub fn revocation_status(&self, id: &Id, nonce: u64) -> Result<RevocationStatus, StateError> {
        self.store.with_identity(id, |rec| {
            let state = rec
                .log
                .latest_confirmed()
                .ok_or_else(|| StateError::StateNotFound(format!("no confirmed state for {}", rec.did)))?;
            let (mtp, _) = rec.trees.prove(
                TreeKind::Revocation,
                &Hash::from_u64(nonce),
                Some(&state.roots.revocation_root),
            )?;
            Ok(RevocationStatus {
                state: state.state,
                roots: state.roots,
                mtp,
            })
        })
    }

    /// Sign a claim with the issuer's auth key.
    pub fn sign_claim(&self, issuer: &Id, claim: &Claim) -> Result<ClaimSignature, StateError> {
        let (did, key, state, index) = self.store.with_identity(issuer, |rec| {
            let state = rec
                .log
                .latest_confirmed()
                .ok_or_else(|| StateError::StateNotFound(format!("no confirmed state for {}", rec.did)))?;
            Ok((rec.did, rec.auth_key.clone(), state.state, rec.auth_claim_index))
        })?;
        let auth_claim_mtp = self.prove_inclusion(issuer, TreeKind::Claims, &index, Some(&state))?;
        let mut message = Vec::with_capacity(64);
        message.extend_from_slice(claim.h_index()?.as_le_bytes());
        message.extend_from_slice(claim.h_value()?.as_le_bytes());
        Ok(ClaimSignature {
            issuer: did,
            public_key: self.keys.public_key(&key)?,
            signature: self.keys.sign(&key, &message)?,
            issuer_state: state,
            auth_claim_mtp,
        })
    }

    // ─── Publication bookkeeping ─────────────────────────────────────

    /// Atomically snapshot and claim the next state for publication.
    ///
    /// Fails with `TransitionInFlight` when a publish is already pending or
    /// transacted, and `NothingToPublish` when nothing changed.
    pub fn begin_publish(&self, id: &Id) -> Result<TransitionInputs, StateError> {
        self.store.with_identity(id, |rec| {
            if rec.log.in_flight().is_some() {
                return Err(StateError::TransitionInFlight(*id));
            }
            let staged = rec
                .log
                .current()
                .map(|s| s.status == StateStatus::Created && !s.is_genesis())
                .unwrap_or(false);
            if !rec.is_dirty() && !staged {
                return Err(StateError::NothingToPublish(*id));
            }
            let old = rec
                .log
                .latest_confirmed()
                .cloned()
                .ok_or_else(|| StateError::StateNotFound(format!("no confirmed state for {id}")))?;
            rec.log.relink_staged();
            let new = Self::snapshot_locked(rec)?;
            rec.log.get_mut(new.seq)?.transition(StateStatus::PendingTransaction)?;

            let (auth_claim_mtp, _) = rec.trees.prove(
                TreeKind::Claims,
                &rec.auth_claim_index,
                Some(&old.roots.claims_root),
            )?;
            let auth_claim = rec
                .claims
                .iter()
                .find(|c| c.h_index == rec.auth_claim_index)
                .map(|c| c.claim.clone())
                .ok_or_else(|| StateError::ClaimNotFound("auth claim".into()))?;
            tracing::info!(identity = %id, old = %old.state, new = %new.state, "state transition pending");
            Ok(TransitionInputs {
                id: *id,
                seq: new.seq,
                old_state: old.state,
                is_old_state_genesis: old.is_genesis(),
                new_state: new.state,
                new_roots: new.roots,
                auth_claim,
                auth_claim_mtp,
                auth_key: rec.auth_key.clone(),
            })
        })
    }

    /// Record the submitted transaction: `PendingTransaction → Transacted`.
    pub fn record_transaction(&self, id: &Id, seq: u64, tx_id: &str) -> Result<IdentityState, StateError> {
        self.store.with_identity(id, |rec| {
            let state = rec.log.get_mut(seq)?;
            state.transition(StateStatus::Transacted)?;
            state.tx_id = Some(tx_id.to_string());
            Ok(state.clone())
        })
    }

    /// Mark a transacted state confirmed and attach claim proofs.
    pub fn confirm_state(
        &self,
        id: &Id,
        seq: u64,
        block_number: u64,
        block_timestamp: DateTime<Utc>,
    ) -> Result<ConfirmedState, StateError> {
        self.store.with_identity(id, |rec| {
            let state = {
                let s = rec.log.get_mut(seq)?;
                s.transition(StateStatus::Confirmed)?;
                s.block_number = Some(block_number);
                s.block_timestamp = Some(block_timestamp);
                s.clone()
            };
            for i in 0..rec.claims.len() {
                if rec.claims[i].mtp.is_none() && rec.claims[i].identity_state == Some(state.state) {
                    let (mtp, _) = rec.trees.prove(
                        TreeKind::Claims,
                        &rec.claims[i].h_index,
                        Some(&state.roots.claims_root),
                    )?;
                    rec.claims[i].mtp = Some(mtp);
                }
            }
            let mut new_nodes = rec.trees.take_new_nodes();
            new_nodes.push((
                state.state,
                vec![
                    state.roots.claims_root,
                    state.roots.revocation_root,
                    state.roots.roots_root,
                ],
            ));
            tracing::info!(identity = %id, state = %state.state, block_number, "state confirmed");
            Ok(ConfirmedState { state, new_nodes })
        })
    }

    /// Mark an in-flight state failed. Its changes stay in the working
    /// trees and remain eligible for the next publish.
    pub fn fail_state(&self, id: &Id, seq: u64, reason: &str) -> Result<IdentityState, StateError> {
        self.store.with_identity(id, |rec| {
            let state = rec.log.get_mut(seq)?;
            state.transition(StateStatus::Failed)?;
            state.failure = Some(reason.to_string());
            tracing::warn!(identity = %id, state = %state.state, reason, "state transition failed");
            Ok(state.clone())
        })
    }

    // ─── Queries ─────────────────────────────────────────────────────

    /// All identities, sorted by id.
    pub fn identities(&self) -> Vec<Did> {
        self.store
            .ids()
            .iter()
            .filter_map(|id| self.store.with_identity(id, |r| Ok(r.did)).ok())
            .collect()
    }

    /// Whether the identity has changes not yet anchored.
    pub fn has_unprocessed_states(&self, id: &Id) -> Result<bool, StateError> {
        self.store.with_identity(id, |rec| {
            let staged = rec
                .log
                .current()
                .map(|s| s.status == StateStatus::Created && !s.is_genesis())
                .unwrap_or(false);
            Ok(rec.is_dirty() || staged)
        })
    }

    /// Identities with changes not yet anchored.
    pub fn unprocessed_identities(&self) -> Vec<Id> {
        self.store
            .ids()
            .into_iter()
            .filter(|id| self.has_unprocessed_states(id).unwrap_or(false))
            .collect()
    }

    /// Every state with `status`, across identities.
    pub fn states_by_status(&self, status: StateStatus) -> Vec<(Id, IdentityState)> {
        let mut out = Vec::new();
        for id in self.store.ids() {
            if let Ok(states) = self.store.with_identity(&id, |rec| {
                Ok(rec.log.with_status(status).cloned().collect::<Vec<_>>())
            }) {
                out.extend(states.into_iter().map(|s| (id, s)));
            }
        }
        out
    }

    /// Current state: highest sequence number not failed.
    pub fn current_state(&self, id: &Id) -> Result<IdentityState, StateError> {
        self.store.with_identity(id, |rec| {
            rec.log
                .current()
                .cloned()
                .ok_or_else(|| StateError::StateNotFound(format!("no state for {id}")))
        })
    }

    /// Latest confirmed state.
    pub fn latest_confirmed_state(&self, id: &Id) -> Result<IdentityState, StateError> {
        self.store.with_identity(id, |rec| {
            rec.log
                .latest_confirmed()
                .cloned()
                .ok_or_else(|| StateError::StateNotFound(format!("no confirmed state for {id}")))
        })
    }

    /// State by sequence number.
    pub fn state(&self, id: &Id, seq: u64) -> Result<IdentityState, StateError> {
        self.store.with_identity(id, |rec| {
            rec.log
                .get(seq)
                .cloned()
                .ok_or_else(|| StateError::StateNotFound(format!("seq {seq}")))
        })
    }

    /// Full state history.
    pub fn states(&self, id: &Id) -> Result<Vec<IdentityState>, StateError> {
        self.store.with_identity(id, |rec| Ok(rec.log.iter().cloned().collect()))
    }

    /// Working roots.
    pub fn roots(&self, id: &Id) -> Result<TreeRoots, StateError> {
        self.store.with_identity(id, |rec| Ok(rec.trees.roots()))
    }

    /// The identity's auth claim.
    pub fn auth_claim(&self, id: &Id) -> Result<ClaimRecord, StateError> {
        self.store.with_identity(id, |rec| {
            rec.claims
                .iter()
                .find(|c| c.h_index == rec.auth_claim_index)
                .cloned()
                .ok_or_else(|| StateError::ClaimNotFound("auth claim".into()))
        })
    }

    /// Key id of the identity's auth claim.
    pub fn auth_key(&self, id: &Id) -> Result<KeyId, StateError> {
        self.store.with_identity(id, |rec| Ok(rec.auth_key.clone()))
    }

    /// Claim by record id.
    pub fn get_claim(&self, issuer: &Id, claim_id: &Uuid) -> Result<ClaimRecord, StateError> {
        self.store.with_identity(issuer, |rec| {
            rec.claims
                .iter()
                .find(|c| c.id == *claim_id)
                .cloned()
                .ok_or_else(|| StateError::ClaimNotFound(claim_id.to_string()))
        })
    }

    /// Claim by revocation nonce.
    pub fn claim_by_revocation_nonce(&self, issuer: &Id, nonce: u64) -> Result<ClaimRecord, StateError> {
        self.store.with_identity(issuer, |rec| {
            rec.claims
                .iter()
                .find(|c| c.revocation_nonce == nonce)
                .cloned()
                .ok_or_else(|| StateError::ClaimNotFound(format!("nonce {nonce}")))
        })
    }

    /// Claims first committed in `state`.
    pub fn claims_by_state(&self, issuer: &Id, state: &Hash) -> Result<Vec<ClaimRecord>, StateError> {
        self.store.with_identity(issuer, |rec| {
            Ok(rec
                .claims
                .iter()
                .filter(|c| c.identity_state.as_ref() == Some(state))
                .cloned()
                .collect())
        })
    }

    /// Non-revoked claims of a schema.
    pub fn find_claims_by_schema_hash(
        &self,
        issuer: &Id,
        schema: &SchemaHash,
    ) -> Result<Vec<ClaimRecord>, StateError> {
        self.store.with_identity(issuer, |rec| {
            Ok(rec
                .claims
                .iter()
                .filter(|c| c.schema_hash == *schema && !c.revoked)
                .cloned()
                .collect())
        })
    }

    /// Claims not yet included in a confirmed state.
    pub fn pending_claims(&self, issuer: &Id) -> Result<Vec<ClaimRecord>, StateError> {
        self.store.with_identity(issuer, |rec| {
            Ok(rec.claims.iter().filter(|c| c.mtp.is_none()).cloned().collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use zkid_crypto::LocalKeyStore;

    fn engine() -> IdentityEngine {
        IdentityEngine::new(Arc::new(LocalKeyStore::new()), EngineConfig::default())
    }

    fn issuer(engine: &IdentityEngine) -> Id {
        engine
            .create_identity(DidMethod::PolygonId, Blockchain::Polygon, Network::Amoy)
            .unwrap()
            .0
            .id
    }

    fn new_claim(n: u64) -> NewClaim {
        NewClaim {
            schema_url: "https://schemas.example/kyc.json-ld".into(),
            schema_type: "KYCAgeCredential".into(),
            schema_hash: SchemaHash([7u8; 16]),
            version: 0,
            subject: None,
            subject_position: SubjectPosition::SelfSubject,
            index_data: [Hash::from_u64(n), Hash::zero()],
            value_data: [Hash::from_u64(n * 10), Hash::zero()],
            expiration: None,
            credential_subject: serde_json::json!({ "n": n }),
        }
    }

    fn publish(engine: &IdentityEngine, id: &Id) -> IdentityState {
        let inputs = engine.begin_publish(id).unwrap();
        engine.record_transaction(id, inputs.seq, "0xabc").unwrap();
        engine
            .confirm_state(id, inputs.seq, 100, Utc::now())
            .unwrap()
            .state
    }

    #[test]
    fn genesis_state_is_confirmed_and_derives_the_id() {
        let engine = engine();
        let (did, state) = engine
            .create_identity(DidMethod::Iden3, Blockchain::Polygon, Network::Main)
            .unwrap();
        assert_eq!(state.status, StateStatus::Confirmed);
        assert!(state.is_genesis());
        assert!(did.id.is_genesis_state(&state.state));
        assert!(state.roots.revocation_root.is_zero());
        assert!(state.roots.roots_root.is_zero());
        assert!(!engine.has_unprocessed_states(&did.id).unwrap());
    }

    #[test]
    fn auth_claim_is_published_at_genesis() {
        let engine = engine();
        let id = issuer(&engine);
        let auth = engine.auth_claim(&id).unwrap();
        assert!(auth.is_published());
        assert_eq!(auth.revocation_nonce, 0);
        let state = engine.current_state(&id).unwrap();
        assert!(auth
            .mtp
            .unwrap()
            .verify(&state.roots.claims_root, &auth.h_index, &auth.claim.h_value().unwrap()));
    }

    #[test]
    fn regular_claims_use_nonces_after_auth_slots() {
        let engine = engine();
        let id = issuer(&engine);
        let a = engine.insert_claim(&id, new_claim(1)).unwrap();
        let b = engine.insert_claim(&id, new_claim(2)).unwrap();
        assert_eq!(a.record.revocation_nonce, 16);
        assert_eq!(b.record.revocation_nonce, 17);
        assert!(engine.has_unprocessed_states(&id).unwrap());
        assert_eq!(engine.unprocessed_identities(), vec![id]);
    }

    #[test]
    fn duplicate_index_does_not_consume_a_nonce() {
        let engine = engine();
        let id = issuer(&engine);
        engine.insert_claim(&id, new_claim(1)).unwrap();
        let err = engine.insert_claim(&id, new_claim(1)).unwrap_err();
        assert!(matches!(err, StateError::DuplicateIndex(_)));
        let next = engine.insert_claim(&id, new_claim(2)).unwrap();
        assert_eq!(next.record.revocation_nonce, 17);
    }

    #[test]
    fn double_revoke_fails_and_keeps_root() {
        let engine = engine();
        let id = issuer(&engine);
        let first = engine.revoke(&id, 16).unwrap();
        let err = engine.revoke(&id, 16).unwrap_err();
        assert_eq!(err, StateError::AlreadyRevoked(16));
        assert_eq!(engine.roots(&id).unwrap().revocation_root, first.revocation_root);
    }

    #[test]
    fn nonce_outside_budget_is_rejected() {
        let engine = IdentityEngine::new(
            Arc::new(LocalKeyStore::new()),
            EngineConfig {
                revocation_nonce_space: 17,
                ..EngineConfig::default()
            },
        );
        let id = issuer(&engine);
        assert_eq!(
            engine.revoke(&id, 17).unwrap_err(),
            StateError::IndexOutOfBudget { nonce: 17, budget: 17 }
        );
        engine.insert_claim(&id, new_claim(1)).unwrap();
        assert!(matches!(
            engine.insert_claim(&id, new_claim(2)).unwrap_err(),
            StateError::IndexOutOfBudget { nonce: 17, .. }
        ));
    }

    #[test]
    fn revoke_marks_claim_record() {
        let engine = engine();
        let id = issuer(&engine);
        let c = engine.insert_claim(&id, new_claim(1)).unwrap();
        engine.revoke(&id, c.record.revocation_nonce).unwrap();
        assert!(engine.get_claim(&id, &c.record.id).unwrap().revoked);
        assert!(engine
            .find_claims_by_schema_hash(&id, &SchemaHash([7u8; 16]))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn snapshot_is_deterministic_and_chained() {
        let engine = engine();
        let id = issuer(&engine);
        let genesis = engine.current_state(&id).unwrap();
        engine.insert_claim(&id, new_claim(1)).unwrap();
        let s1 = engine.snapshot(&id).unwrap();
        let s2 = engine.snapshot(&id).unwrap();
        assert_eq!(s1.state, s2.state);
        assert_eq!(s1.seq, s2.seq);
        assert_eq!(s1.previous_state, Some(genesis.state));
        assert_eq!(s1.state, s1.roots.state_hash().unwrap());
    }

    #[test]
    fn snapshot_commits_claims_root_to_roots_tree() {
        let engine = engine();
        let id = issuer(&engine);
        engine.insert_claim(&id, new_claim(1)).unwrap();
        let s = engine.snapshot(&id).unwrap();
        let proof = engine
            .prove_inclusion(&id, TreeKind::Roots, &s.roots.claims_root, Some(&s.state))
            .unwrap();
        assert!(proof.existence);
        assert!(proof.verify(&s.roots.roots_root, &s.roots.claims_root, &Hash::zero()));
    }

    #[test]
    fn begin_publish_is_exclusive() {
        let engine = engine();
        let id = issuer(&engine);
        engine.insert_claim(&id, new_claim(1)).unwrap();
        let inputs = engine.begin_publish(&id).unwrap();
        assert!(inputs.is_old_state_genesis);
        assert_eq!(
            engine.begin_publish(&id).unwrap_err(),
            StateError::TransitionInFlight(id)
        );
        let mtp_ok = inputs.auth_claim_mtp.verify(
            &engine.state(&id, 0).unwrap().roots.claims_root,
            &inputs.auth_claim.h_index().unwrap(),
            &inputs.auth_claim.h_value().unwrap(),
        );
        assert!(mtp_ok);
    }

    #[test]
    fn nothing_to_publish_without_changes() {
        let engine = engine();
        let id = issuer(&engine);
        assert_eq!(
            engine.begin_publish(&id).unwrap_err(),
            StateError::NothingToPublish(id)
        );
    }

    #[test]
    fn confirmation_attaches_claim_proofs() {
        let engine = engine();
        let id = issuer(&engine);
        let c = engine.insert_claim(&id, new_claim(1)).unwrap();
        assert_eq!(engine.pending_claims(&id).unwrap().len(), 1);
        let state = publish(&engine, &id);
        assert_eq!(state.status, StateStatus::Confirmed);
        assert_eq!(state.block_number, Some(100));
        let record = engine.get_claim(&id, &c.record.id).unwrap();
        let mtp = record.mtp.unwrap();
        assert!(mtp.verify(&state.roots.claims_root, &record.h_index, &record.claim.h_value().unwrap()));
        assert!(engine.pending_claims(&id).unwrap().is_empty());
        assert_eq!(engine.claims_by_state(&id, &state.state).unwrap().len(), 1);
        assert!(!engine.has_unprocessed_states(&id).unwrap());
    }

    #[test]
    fn failed_publish_leaves_changes_dirty() {
        let engine = engine();
        let id = issuer(&engine);
        engine.insert_claim(&id, new_claim(1)).unwrap();
        let inputs = engine.begin_publish(&id).unwrap();
        engine.fail_state(&id, inputs.seq, "reverted").unwrap();
        assert!(engine.has_unprocessed_states(&id).unwrap());
        assert_eq!(engine.current_state(&id).unwrap().seq, 0);
        let retry = engine.begin_publish(&id).unwrap();
        assert_eq!(retry.new_state, inputs.new_state);
        assert_ne!(retry.seq, inputs.seq);
    }

    #[test]
    fn retry_after_failure_links_to_the_anchored_state() {
        let engine = engine();
        let id = issuer(&engine);
        let genesis = engine.current_state(&id).unwrap().state;
        engine.insert_claim(&id, new_claim(1)).unwrap();
        let first = engine.begin_publish(&id).unwrap();
        engine.record_transaction(&id, first.seq, "0xabc").unwrap();

        engine.insert_claim(&id, new_claim(2)).unwrap();
        let staged = engine.snapshot(&id).unwrap();
        assert_eq!(staged.previous_state, Some(first.new_state));

        engine.fail_state(&id, first.seq, "dropped").unwrap();
        let retry = engine.begin_publish(&id).unwrap();
        assert_eq!(retry.old_state, genesis);
        let entry = engine.state(&id, retry.seq).unwrap();
        assert_eq!(entry.previous_state, Some(retry.old_state));
    }

    #[test]
    fn revocation_status_reflects_confirmed_state() {
        let engine = engine();
        let id = issuer(&engine);
        let c = engine.insert_claim(&id, new_claim(1)).unwrap();
        publish(&engine, &id);
        let nonce = c.record.revocation_nonce;
        let before = engine.revocation_status(&id, nonce).unwrap();
        assert!(!before.mtp.existence);

        engine.revoke(&id, nonce).unwrap();
        // Not yet anchored: still reported as unrevoked.
        assert!(!engine.revocation_status(&id, nonce).unwrap().mtp.existence);

        publish(&engine, &id);
        let after = engine.revocation_status(&id, nonce).unwrap();
        assert!(after.mtp.existence);
        assert!(after
            .mtp
            .verify(&after.roots.revocation_root, &Hash::from_u64(nonce), &Hash::zero()));
    }

    #[test]
    fn confirm_returns_state_node_for_rhs() {
        let engine = engine();
        let id = issuer(&engine);
        engine.insert_claim(&id, new_claim(1)).unwrap();
        let inputs = engine.begin_publish(&id).unwrap();
        engine.record_transaction(&id, inputs.seq, "0x1").unwrap();
        let confirmed = engine.confirm_state(&id, inputs.seq, 5, Utc::now()).unwrap();
        let (hash, children) = confirmed.new_nodes.last().unwrap();
        assert_eq!(*hash, confirmed.state.state);
        assert_eq!(children.len(), 3);
    }

    #[test]
    fn signed_claims_verify_with_auth_key() {
        let engine = engine();
        let id = issuer(&engine);
        let claim = Claim::builder(SchemaHash([9u8; 16])).build();
        let sig = engine.sign_claim(&id, &claim).unwrap();
        let mut message = Vec::new();
        message.extend_from_slice(claim.h_index().unwrap().as_le_bytes());
        message.extend_from_slice(claim.h_value().unwrap().as_le_bytes());
        sig.public_key.verify(&message, &sig.signature).unwrap();
    }

    #[test]
    fn states_by_status_spans_identities() {
        let engine = engine();
        let a = issuer(&engine);
        let _b = issuer(&engine);
        engine.insert_claim(&a, new_claim(1)).unwrap();
        engine.begin_publish(&a).unwrap();
        assert_eq!(engine.states_by_status(StateStatus::Confirmed).len(), 2);
        let pending = engine.states_by_status(StateStatus::PendingTransaction);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].0, a);
        assert_eq!(engine.identities().len(), 2);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(8))]

        #[test]
        fn membership_independent_of_insertion_order(
            values in proptest::collection::btree_set(1u64..10_000, 2..6)
        ) {
            let values: Vec<u64> = values.into_iter().collect();
            let forward = engine();
            let fid = issuer(&forward);
            let backward = engine();
            let bid = issuer(&backward);
            let mut records = Vec::new();
            for v in &values {
                records.push(forward.insert_claim(&fid, new_claim(*v)).unwrap().record);
            }
            for v in values.iter().rev() {
                backward.insert_claim(&bid, new_claim(*v)).unwrap();
            }
            for r in &records {
                let proof = forward.prove_inclusion(&fid, TreeKind::Claims, &r.h_index, None).unwrap();
                prop_assert!(proof.existence);
                let proof_b = backward.prove_inclusion(&bid, TreeKind::Claims, &r.h_index, None).unwrap();
                prop_assert!(proof_b.existence);
            }
        }
    }
}
