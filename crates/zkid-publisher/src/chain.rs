//! # Chain Access
//!
//! [`StateContract`] is the raw capability: submit a transition, read a
//! transaction's status, read the gas suggestion and the head block.
//! [`ChainClient`] wraps it with the publisher's policies: every call is
//! bounded by the RPC timeout, prices are clamped, and receipts are
//! polled on a fixed cycle until the confirmation timeout.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use zkid_core::{Hash, Id};
use zkid_crypto::{Ed25519PublicKey, Ed25519Signature, MerkleProof};

use crate::error::PublishError;
use crate::gas::GasPolicy;

/// Arguments of a state transition call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionPayload {
    /// Identity being transitioned.
    pub id: Id,
    /// State the contract must currently hold for the identity.
    pub old_state: Hash,
    /// State to anchor.
    pub new_state: Hash,
    /// Set when `old_state` has never been anchored and is the genesis state.
    pub is_old_state_genesis: bool,
    /// Auth claim inclusion in the old state's claims tree.
    pub auth_claim_mtp: MerkleProof,
    /// Auth key the signature verifies against.
    pub public_key: Ed25519PublicKey,
    /// Signature over `old_state ‖ new_state`, little-endian.
    pub signature: Ed25519Signature,
    /// Price per gas unit in wei, already clamped.
    pub gas_price: u64,
    /// Gas limit for the call.
    pub gas_limit: u64,
}

/// Execution outcome of a mined transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiptStatus {
    Success,
    /// Executed and rolled back by the contract.
    Reverted,
}

/// A mined transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Transaction id as returned on submission.
    pub tx_id: String,
    /// Block the transaction was mined in.
    pub block_number: u64,
    /// Timestamp of that block.
    pub block_timestamp: DateTime<Utc>,
    /// Whether the call succeeded.
    pub status: ReceiptStatus,
}

/// Where a transaction stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxStatus {
    /// Known to the node, not yet mined.
    Pending,
    /// Included in a block.
    Mined(Receipt),
    /// Evicted without being mined.
    Dropped,
}

/// The state contract as seen through a node.
#[async_trait]
pub trait StateContract: Send + Sync {
    /// Chain name for logs.
    fn chain_name(&self) -> &str;

    /// Submit a transition; returns the transaction id.
    async fn submit_transition(&self, payload: &TransitionPayload) -> Result<String, PublishError>;

    async fn transaction_status(&self, tx_id: &str) -> Result<TxStatus, PublishError>;

    async fn suggested_gas_price(&self) -> Result<u64, PublishError>;

    /// Head block number.
    async fn block_number(&self) -> Result<u64, PublishError>;
}

/// Timeouts the client applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainTimeouts {
    /// Upper bound on any single RPC call.
    pub rpc_response: Duration,
    /// Delay between receipt polls.
    pub wait_receipt_cycle: Duration,
    /// How long [`ChainClient::wait_receipt`] polls before giving up.
    pub confirmation: Duration,
}

/// A [`StateContract`] with timeouts and gas policy applied.
#[derive(Clone)]
pub struct ChainClient {
    contract: Arc<dyn StateContract>,
    gas: GasPolicy,
    timeouts: ChainTimeouts,
}

impl ChainClient {
    pub fn new(contract: Arc<dyn StateContract>, gas: GasPolicy, timeouts: ChainTimeouts) -> Self {
        Self {
            contract,
            gas,
            timeouts,
        }
    }

    pub fn chain_name(&self) -> &str {
        self.contract.chain_name()
    }

    pub fn gas(&self) -> &GasPolicy {
        &self.gas
    }

    async fn rpc<T>(
        &self,
        call: &'static str,
        fut: impl Future<Output = Result<T, PublishError>>,
    ) -> Result<T, PublishError> {
        let limit = self.timeouts.rpc_response;
        tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| PublishError::RpcTimeout {
                call,
                ms: limit.as_millis(),
            })?
    }

    /// The suggested price, clamped to the policy bounds.
    pub async fn gas_price(&self) -> Result<u64, PublishError> {
        let suggested = self
            .rpc("suggested_gas_price", self.contract.suggested_gas_price())
            .await?;
        let price = self.gas.price(suggested);
        if price != suggested {
            tracing::debug!(suggested, price, "gas price clamped");
        }
        Ok(price)
    }

    pub async fn submit(&self, payload: &TransitionPayload) -> Result<String, PublishError> {
        self.rpc("submit_transition", self.contract.submit_transition(payload))
            .await
    }

    pub async fn status(&self, tx_id: &str) -> Result<TxStatus, PublishError> {
        self.rpc("transaction_status", self.contract.transaction_status(tx_id))
            .await
    }

    pub async fn block_number(&self) -> Result<u64, PublishError> {
        self.rpc("block_number", self.contract.block_number()).await
    }

    /// Poll until the transaction is mined or dropped. Returns
    /// [`TxStatus::Pending`] if the confirmation timeout elapses first.
    pub async fn wait_receipt(&self, tx_id: &str) -> Result<TxStatus, PublishError> {
        let deadline = Instant::now() + self.timeouts.confirmation;
        loop {
            match self.status(tx_id).await? {
                TxStatus::Pending => {}
                done => return Ok(done),
            }
            let now = Instant::now();
            if now >= deadline {
                tracing::info!(tx_id, chain = self.chain_name(), "receipt not available before timeout");
                return Ok(TxStatus::Pending);
            }
            tokio::time::sleep(self.timeouts.wait_receipt_cycle.min(deadline - now)).await;
        }
    }
}

impl std::fmt::Debug for ChainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainClient")
            .field("chain", &self.chain_name())
            .field("gas", &self.gas)
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Mines a transaction after a fixed number of status polls.
    struct SlowContract {
        polls: AtomicU32,
        mine_after: u32,
        hang: bool,
    }

    #[async_trait]
    impl StateContract for SlowContract {
        fn chain_name(&self) -> &str {
            "slow"
        }

        async fn submit_transition(&self, _payload: &TransitionPayload) -> Result<String, PublishError> {
            Ok("0x1".into())
        }

        async fn transaction_status(&self, tx_id: &str) -> Result<TxStatus, PublishError> {
            if self.hang {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            let n = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < self.mine_after {
                return Ok(TxStatus::Pending);
            }
            Ok(TxStatus::Mined(Receipt {
                tx_id: tx_id.into(),
                block_number: 9,
                block_timestamp: Utc::now(),
                status: ReceiptStatus::Success,
            }))
        }

        async fn suggested_gas_price(&self) -> Result<u64, PublishError> {
            Ok(1)
        }

        async fn block_number(&self) -> Result<u64, PublishError> {
            Ok(10)
        }
    }

    fn client(mine_after: u32, hang: bool, confirmation: Duration) -> ChainClient {
        ChainClient::new(
            Arc::new(SlowContract {
                polls: AtomicU32::new(0),
                mine_after,
                hang,
            }),
            GasPolicy::new(5, 50, 100).unwrap(),
            ChainTimeouts {
                rpc_response: Duration::from_millis(200),
                wait_receipt_cycle: Duration::from_millis(5),
                confirmation,
            },
        )
    }

    #[tokio::test]
    async fn receipt_is_polled_until_mined() {
        let status = client(3, false, Duration::from_secs(5)).wait_receipt("0x1").await.unwrap();
        assert!(matches!(status, TxStatus::Mined(r) if r.block_number == 9));
    }

    #[tokio::test]
    async fn wait_gives_up_at_confirmation_timeout() {
        let status = client(u32::MAX, false, Duration::from_millis(30))
            .wait_receipt("0x1")
            .await
            .unwrap();
        assert_eq!(status, TxStatus::Pending);
    }

    #[tokio::test]
    async fn hung_rpc_times_out() {
        let err = client(1, true, Duration::from_secs(5)).status("0x1").await.unwrap_err();
        assert!(matches!(err, PublishError::RpcTimeout { call: "transaction_status", .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn gas_price_is_clamped() {
        assert_eq!(client(1, false, Duration::from_secs(1)).gas_price().await.unwrap(), 5);
    }
}
