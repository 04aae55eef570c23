//! # State Log
//!
//! Append-only history of an identity's states. Entries are addressed by
//! sequence number; the current state is the highest-sequence entry whose
//! status is not `Failed`.

use serde::{Deserialize, Serialize};
use zkid_core::Hash;

use crate::error::StateError;
use crate::state::{IdentityState, StateStatus, TreeRoots};

/// Per-identity state history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateLog {
    entries: Vec<IdentityState>,
}

impl StateLog {
    /// Empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a new `Created` state chained to the current one.
    pub fn append(&mut self, roots: TreeRoots) -> Result<&IdentityState, StateError> {
        let previous = self.current().map(|s| s.state);
        let seq = self.entries.len() as u64;
        self.entries.push(IdentityState::new(seq, roots, previous)?);
        let last = self.entries.len() - 1;
        Ok(&self.entries[last])
    }

    /// Stage `roots` as the next state to publish.
    ///
    /// A `Created` non-genesis entry has never left the process, so it is
    /// refreshed in place rather than chained behind.
    pub fn stage(&mut self, roots: TreeRoots) -> Result<&IdentityState, StateError> {
        match self.staged_index() {
            Some(i) => {
                let entry = &mut self.entries[i];
                entry.state = roots.state_hash()?;
                entry.roots = roots;
                entry.modified_at = chrono::Utc::now();
                self.relink_staged();
                Ok(&self.entries[i])
            }
            None => self.append(roots),
        }
    }

    /// Re-point the staged entry at its nearest non-failed predecessor.
    ///
    /// An entry staged behind an in-flight state links to it only while
    /// that state has not failed.
    pub fn relink_staged(&mut self) {
        let Some(i) = self.staged_index() else {
            return;
        };
        if let Some(previous) = self.entries[..i]
            .iter()
            .rev()
            .find(|s| s.status != StateStatus::Failed)
            .map(|s| s.state)
        {
            self.entries[i].previous_state = Some(previous);
        }
    }

    fn staged_index(&self) -> Option<usize> {
        self.entries
            .iter()
            .rposition(|s| s.status != StateStatus::Failed)
            .filter(|i| {
                let s = &self.entries[*i];
                s.status == StateStatus::Created && !s.is_genesis()
            })
    }

    /// Entry by sequence number.
    pub fn get(&self, seq: u64) -> Option<&IdentityState> {
        self.entries.get(seq as usize)
    }

    /// Mutable entry by sequence number.
    pub fn get_mut(&mut self, seq: u64) -> Result<&mut IdentityState, StateError> {
        self.entries
            .get_mut(seq as usize)
            .ok_or_else(|| StateError::StateNotFound(format!("seq {seq}")))
    }

    /// Most recent non-failed entry with this state hash.
    pub fn by_hash(&self, state: &Hash) -> Option<&IdentityState> {
        self.entries
            .iter()
            .rev()
            .find(|s| s.state == *state && s.status != StateStatus::Failed)
    }

    /// Highest-sequence entry whose status is not `Failed`.
    pub fn current(&self) -> Option<&IdentityState> {
        self.entries
            .iter()
            .rev()
            .find(|s| s.status != StateStatus::Failed)
    }

    /// Highest-sequence confirmed entry.
    pub fn latest_confirmed(&self) -> Option<&IdentityState> {
        self.entries
            .iter()
            .rev()
            .find(|s| s.status == StateStatus::Confirmed)
    }

    /// The entry with a publish in flight, if any.
    pub fn in_flight(&self) -> Option<&IdentityState> {
        self.entries.iter().rev().find(|s| s.status.is_in_flight())
    }

    /// Entries with the given status, oldest first.
    pub fn with_status(&self, status: StateStatus) -> impl Iterator<Item = &IdentityState> {
        self.entries.iter().filter(move |s| s.status == status)
    }

    /// All entries, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &IdentityState> {
        self.entries.iter()
    }

    /// Number of entries, including failed ones.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roots(c: u64) -> TreeRoots {
        TreeRoots {
            claims_root: Hash::from_u64(c),
            revocation_root: Hash::zero(),
            roots_root: Hash::zero(),
        }
    }

    #[test]
    fn append_chains_previous_state() {
        let mut log = StateLog::new();
        let genesis = log.append(roots(1)).unwrap().state;
        let next = log.append(roots(2)).unwrap();
        assert_eq!(next.seq, 1);
        assert_eq!(next.previous_state, Some(genesis));
    }

    #[test]
    fn current_skips_failed_entries() {
        let mut log = StateLog::new();
        log.append(roots(1)).unwrap();
        log.get_mut(0).unwrap().transition(StateStatus::Confirmed).unwrap();
        log.append(roots(2)).unwrap();
        let s = log.get_mut(1).unwrap();
        s.transition(StateStatus::PendingTransaction).unwrap();
        s.transition(StateStatus::Failed).unwrap();

        assert_eq!(log.current().unwrap().seq, 0);
        // A retry chains to the confirmed state, not the failed one.
        let confirmed = log.get(0).map(|s| s.state);
        let retry = log.append(roots(2)).unwrap();
        assert_eq!(retry.seq, 2);
        assert_eq!(retry.previous_state, confirmed);
    }

    #[test]
    fn staged_entry_relinks_past_a_failed_predecessor() {
        let mut log = StateLog::new();
        let genesis = log.append(roots(1)).unwrap().state;
        log.get_mut(0).unwrap().transition(StateStatus::Confirmed).unwrap();
        log.append(roots(2)).unwrap();
        let in_flight = log.get_mut(1).unwrap();
        in_flight.transition(StateStatus::PendingTransaction).unwrap();
        in_flight.transition(StateStatus::Transacted).unwrap();
        let behind = in_flight.state;

        assert_eq!(log.stage(roots(3)).unwrap().previous_state, Some(behind));
        log.get_mut(1).unwrap().transition(StateStatus::Failed).unwrap();

        log.relink_staged();
        assert_eq!(log.get(2).unwrap().previous_state, Some(genesis));
        assert_eq!(log.stage(roots(4)).unwrap().previous_state, Some(genesis));
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn in_flight_and_status_queries() {
        let mut log = StateLog::new();
        log.append(roots(1)).unwrap();
        log.get_mut(0).unwrap().transition(StateStatus::Confirmed).unwrap();
        log.append(roots(2)).unwrap();
        assert!(log.in_flight().is_none());
        log.get_mut(1)
            .unwrap()
            .transition(StateStatus::PendingTransaction)
            .unwrap();
        assert_eq!(log.in_flight().unwrap().seq, 1);
        assert_eq!(log.with_status(StateStatus::Confirmed).count(), 1);
        assert_eq!(log.latest_confirmed().unwrap().seq, 0);
    }

    #[test]
    fn stage_refreshes_unpublished_state() {
        let mut log = StateLog::new();
        log.append(roots(1)).unwrap();
        log.get_mut(0).unwrap().transition(StateStatus::Confirmed).unwrap();
        let first = log.stage(roots(2)).unwrap().seq;
        let second = log.stage(roots(3)).unwrap();
        assert_eq!(second.seq, first);
        assert_eq!(second.roots, roots(3));
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn unknown_seq_is_reported() {
        let mut log = StateLog::new();
        assert!(matches!(log.get_mut(3), Err(StateError::StateNotFound(_))));
    }
}
