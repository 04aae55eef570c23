//! # Mock Chain
//!
//! An in-process state contract for tests and the development publisher
//! loop. Submitted transitions wait in a mempool until [`MockChain::mine`]
//! produces a block. When mined, a transition is checked the way the
//! contract checks it: the signature must verify against the submitted
//! key, and the old state must be the identity's latest anchored state
//! (or its genesis state on first publication). Accepted transitions are
//! written to a [`MemoryStateReader`] ledger, so the same chain also
//! serves verifiers as a [`StateReader`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use zkid_auth::{GistRootInfo, MemoryStateReader, StateInfo, StateReader, VerificationError};
use zkid_core::Hash;

use crate::chain::{Receipt, ReceiptStatus, StateContract, TransitionPayload, TxStatus};
use crate::error::PublishError;

#[derive(Debug, Default)]
struct Node {
    head: u64,
    next_tx: u64,
    gas_price: u64,
    mempool: Vec<(String, TransitionPayload)>,
    mined: HashMap<String, Receipt>,
    dropped: HashSet<String>,
    reject_submissions: bool,
}

/// In-memory chain.
#[derive(Debug)]
pub struct MockChain {
    name: String,
    node: Mutex<Node>,
    ledger: Arc<MemoryStateReader>,
}

impl Default for MockChain {
    fn default() -> Self {
        Self::new("mock")
    }
}

impl MockChain {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            node: Mutex::new(Node {
                gas_price: 30_000_000_000,
                ..Node::default()
            }),
            ledger: Arc::new(MemoryStateReader::new()),
        }
    }

    /// The ledger of anchored states.
    pub fn ledger(&self) -> Arc<MemoryStateReader> {
        self.ledger.clone()
    }

    pub fn set_gas_price(&self, price: u64) {
        self.node.lock().gas_price = price;
    }

    /// Make subsequent submissions fail as if the node were unreachable.
    pub fn reject_submissions(&self, reject: bool) {
        self.node.lock().reject_submissions = reject;
    }

    pub fn head(&self) -> u64 {
        self.node.lock().head
    }

    pub fn pending_transactions(&self) -> usize {
        self.node.lock().mempool.len()
    }

    /// Evict every pending transaction without mining it.
    pub fn drop_pending(&self) -> usize {
        let mut node = self.node.lock();
        let evicted: Vec<String> = node.mempool.drain(..).map(|(tx, _)| tx).collect();
        let n = evicted.len();
        node.dropped.extend(evicted);
        n
    }

    /// Produce one block containing every pending transaction.
    pub fn mine(&self) -> u64 {
        let mut node = self.node.lock();
        node.head += 1;
        let block = node.head;
        let timestamp = Utc::now();
        let pending = std::mem::take(&mut node.mempool);
        for (tx_id, payload) in pending {
            let status = match self.apply(&payload, timestamp.timestamp(), block) {
                Ok(()) => ReceiptStatus::Success,
                Err(reason) => {
                    tracing::debug!(tx_id = %tx_id, reason, "transition reverted");
                    ReceiptStatus::Reverted
                }
            };
            node.mined.insert(
                tx_id.clone(),
                Receipt {
                    tx_id,
                    block_number: block,
                    block_timestamp: timestamp,
                    status,
                },
            );
        }
        block
    }

    /// Mine `n` blocks.
    pub fn advance(&self, n: u64) -> u64 {
        (0..n).fold(self.head(), |_, _| self.mine())
    }

    fn apply(&self, p: &TransitionPayload, timestamp: i64, block: u64) -> Result<(), &'static str> {
        let mut message = Vec::with_capacity(64);
        message.extend_from_slice(p.old_state.as_le_bytes());
        message.extend_from_slice(p.new_state.as_le_bytes());
        p.public_key
            .verify(&message, &p.signature)
            .map_err(|_| "signature does not verify")?;

        match self.ledger.latest_state(&p.id) {
            Some(latest) if latest != p.old_state => return Err("old state is not the latest state"),
            Some(_) => {}
            None => {
                if !p.is_old_state_genesis || !p.id.is_genesis_state(&p.old_state) {
                    return Err("old state is not the genesis state");
                }
                self.ledger.publish_state(p.id, p.old_state, timestamp, block);
            }
        }
        self.ledger.publish_state(p.id, p.new_state, timestamp, block);
        Ok(())
    }
}

#[async_trait]
impl StateContract for MockChain {
    fn chain_name(&self) -> &str {
        &self.name
    }

    async fn submit_transition(&self, payload: &TransitionPayload) -> Result<String, PublishError> {
        let mut node = self.node.lock();
        if node.reject_submissions {
            return Err(PublishError::Chain("node rejected the transaction".into()));
        }
        node.next_tx += 1;
        let tx_id = format!("0x{:064x}", node.next_tx);
        node.mempool.push((tx_id.clone(), payload.clone()));
        Ok(tx_id)
    }

    async fn transaction_status(&self, tx_id: &str) -> Result<TxStatus, PublishError> {
        let node = self.node.lock();
        if let Some(receipt) = node.mined.get(tx_id) {
            return Ok(TxStatus::Mined(receipt.clone()));
        }
        if node.dropped.contains(tx_id) {
            return Ok(TxStatus::Dropped);
        }
        if node.mempool.iter().any(|(tx, _)| tx == tx_id) {
            return Ok(TxStatus::Pending);
        }
        Err(PublishError::Chain(format!("unknown transaction {tx_id}")))
    }

    async fn suggested_gas_price(&self) -> Result<u64, PublishError> {
        Ok(self.node.lock().gas_price)
    }

    async fn block_number(&self) -> Result<u64, PublishError> {
        Ok(self.node.lock().head)
    }
}

#[async_trait]
impl StateReader for MockChain {
    async fn state_info_by_state(&self, state: &Hash) -> Result<Option<StateInfo>, VerificationError> {
        self.ledger.state_info_by_state(state).await
    }

    async fn gist_root_info(&self, root: &Hash) -> Result<Option<GistRootInfo>, VerificationError> {
        self.ledger.gist_root_info(root).await
    }
}
