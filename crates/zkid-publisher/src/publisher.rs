//! # State Publisher
//!
//! Drives identity states from `Created` to `Confirmed` on chain.
//!
//! ## Publish
//!
//! 1. Claim the next state through [`IdentityEngine::begin_publish`].
//!    This fails fast when nothing changed or a transition is in flight.
//! 2. Sign `old_state ‖ new_state` with the identity's auth key.
//! 3. Price gas within the configured bounds and submit.
//! 4. Record the transaction id, then wait for a receipt.
//!
//! A submission error or a dropped or reverted transaction fails the
//! state. Its changes stay pending and are picked up by the next publish.
//!
//! ## Confirm
//!
//! A mined transaction confirms its state once the head is at least
//! `confirmation_block_count` blocks past the receipt's block. States that
//! are still short of that are left `Transacted` for
//! [`StatePublisher::check_transaction_status`], which the background task
//! runs on a fixed interval. On confirmation the new tree nodes are
//! pushed to the reverse hash service, if one is configured.

use std::sync::Arc;

use serde::Serialize;
use zkid_core::{Hash, Id};
use zkid_state::{IdentityEngine, StateError, StateStatus, TransitionInputs};

use crate::chain::{ChainClient, Receipt, ReceiptStatus, TransitionPayload, TxStatus};
use crate::error::PublishError;
use crate::rhs::RhsPublisher;

/// Outcome of one publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedState {
    /// Identity whose state was published.
    pub id: Id,
    /// Log position of the published state.
    pub seq: u64,
    /// The new state hash.
    pub state: Hash,
    /// Transaction carrying the transition.
    pub tx_id: String,
    /// `Transacted` if the receipt or its confirmations are still pending.
    pub status: StateStatus,
}

/// Result of one confirmation sweep.
#[derive(Debug, Default)]
pub struct SweepReport {
    /// States confirmed by this sweep, as `(identity, seq)`.
    pub confirmed: Vec<(Id, u64)>,
    /// States whose transaction was dropped or reverted.
    pub failed: Vec<(Id, u64)>,
    /// States still waiting for a receipt or confirmations.
    pub pending: Vec<(Id, u64)>,
    /// Identities whose check errored. Their states stay `Transacted`.
    pub errors: Vec<(Id, PublishError)>,
}

impl SweepReport {
    /// Whether the sweep found nothing to do.
    pub fn is_empty(&self) -> bool {
        self.confirmed.is_empty() && self.failed.is_empty() && self.pending.is_empty() && self.errors.is_empty()
    }
}

/// Publishes identity states through a [`ChainClient`].
#[derive(Clone)]
pub struct StatePublisher {
    engine: IdentityEngine,
    chain: ChainClient,
    rhs: Option<Arc<dyn RhsPublisher>>,
    confirmation_block_count: u64,
}

impl StatePublisher {
    pub fn new(engine: IdentityEngine, chain: ChainClient, confirmation_block_count: u64) -> Self {
        Self {
            engine,
            chain,
            rhs: None,
            confirmation_block_count,
        }
    }

    /// Push confirmed tree nodes to `rhs`.
    pub fn with_rhs(mut self, rhs: Arc<dyn RhsPublisher>) -> Self {
        self.rhs = Some(rhs);
        self
    }

    pub fn engine(&self) -> &IdentityEngine {
        &self.engine
    }

    pub fn chain(&self) -> &ChainClient {
        &self.chain
    }

    /// Publish the identity's pending changes as a new state.
    pub async fn publish_state(&self, id: &Id) -> Result<PublishedState, PublishError> {
        let inputs = match self.engine.begin_publish(id) {
            Ok(inputs) => inputs,
            Err(e) => {
                let err = PublishError::from(e);
                record_publish(if err.is_informational() { "skipped" } else { "error" });
                return Err(err);
            }
        };
        let seq = inputs.seq;

        let tx_id = match self.submit(&inputs).await {
            Ok(tx_id) => tx_id,
            Err(err) => {
                self.engine.fail_state(id, seq, &err.to_string())?;
                record_publish("failed");
                return Err(err);
            }
        };
        self.engine.record_transaction(id, seq, &tx_id)?;
        tracing::info!(
            identity = %id,
            seq,
            tx_id = %tx_id,
            chain = self.chain.chain_name(),
            "state transition submitted"
        );

        let status = match self.chain.wait_receipt(&tx_id).await {
            Ok(status) => self.settle(id, seq, &tx_id, status).await?,
            Err(err) => {
                // The sweep picks the transaction up again.
                tracing::warn!(identity = %id, tx_id = %tx_id, error = %err, "receipt check failed");
                StateStatus::Transacted
            }
        };
        record_publish(status.to_string().as_str());
        Ok(PublishedState {
            id: *id,
            seq,
            state: inputs.new_state,
            tx_id,
            status,
        })
    }

    /// Publish every identity with pending changes.
    pub async fn publish_all(&self) -> Vec<(Id, Result<PublishedState, PublishError>)> {
        let mut out = Vec::new();
        for id in self.engine.unprocessed_identities() {
            let result = self.publish_state(&id).await;
            if let Err(err) = &result {
                if !err.is_informational() {
                    tracing::error!(identity = %id, error = %err, "publish failed");
                }
            }
            out.push((id, result));
        }
        out
    }

    /// Re-check every transacted state and confirm or fail it.
    ///
    /// Errors are collected per identity; one failing identity does not
    /// stop the sweep.
    pub async fn check_transaction_status(&self) -> SweepReport {
        let mut report = SweepReport::default();
        for (id, state) in self.engine.states_by_status(StateStatus::Transacted) {
            let seq = state.seq;
            let result = match state.tx_id {
                Some(tx_id) => match self.chain.status(&tx_id).await {
                    Ok(status) => self.settle(&id, seq, &tx_id, status).await,
                    Err(e) => Err(e),
                },
                None => Err(PublishError::MissingTransaction { id, seq }),
            };
            match result {
                Ok(StateStatus::Confirmed) => report.confirmed.push((id, seq)),
                Ok(StateStatus::Failed) => report.failed.push((id, seq)),
                Ok(_) => report.pending.push((id, seq)),
                Err(err) => {
                    tracing::warn!(identity = %id, seq, error = %err, "transaction status check failed");
                    report.errors.push((id, err));
                }
            }
        }
        for (outcome, n) in [
            ("confirmed", report.confirmed.len()),
            ("failed", report.failed.len()),
            ("pending", report.pending.len()),
            ("error", report.errors.len()),
        ] {
            metrics::counter!("zkid_sweep_total", "outcome" => outcome).increment(n as u64);
        }
        if !report.is_empty() {
            tracing::info!(
                confirmed = report.confirmed.len(),
                failed = report.failed.len(),
                pending = report.pending.len(),
                errors = report.errors.len(),
                "transaction status sweep"
            );
        }
        report
    }

    async fn submit(&self, inputs: &TransitionInputs) -> Result<String, PublishError> {
        let keys = self.engine.keys();
        let signature = keys.sign(&inputs.auth_key, &inputs.signing_message())?;
        let public_key = keys.public_key(&inputs.auth_key)?;
        let gas_price = self.chain.gas_price().await?;
        let payload = TransitionPayload {
            id: inputs.id,
            old_state: inputs.old_state,
            new_state: inputs.new_state,
            is_old_state_genesis: inputs.is_old_state_genesis,
            auth_claim_mtp: inputs.auth_claim_mtp.clone(),
            public_key,
            signature,
            gas_price,
            gas_limit: self.chain.gas().gas_limit(),
        };
        self.chain.submit(&payload).await
    }

    /// Apply a transaction status to a transacted state.
    async fn settle(&self, id: &Id, seq: u64, tx_id: &str, status: TxStatus) -> Result<StateStatus, PublishError> {
        let receipt = match status {
            TxStatus::Pending => return Ok(StateStatus::Transacted),
            TxStatus::Dropped => return self.fail(id, seq, tx_id, "transaction dropped"),
            TxStatus::Mined(Receipt {
                status: ReceiptStatus::Reverted,
                ..
            }) => return self.fail(id, seq, tx_id, "transaction reverted"),
            TxStatus::Mined(receipt) => receipt,
        };

        let head = self.chain.block_number().await?;
        let confirmations = head.saturating_sub(receipt.block_number);
        if confirmations < self.confirmation_block_count {
            tracing::debug!(identity = %id, tx_id, confirmations, "awaiting confirmations");
            return Ok(StateStatus::Transacted);
        }

        let confirmed = match self
            .engine
            .confirm_state(id, seq, receipt.block_number, receipt.block_timestamp)
        {
            Ok(confirmed) => confirmed,
            Err(err) => return settled_elsewhere(id, seq, err),
        };
        if let Some(rhs) = &self.rhs {
            if let Err(err) = rhs.publish_nodes(&confirmed.new_nodes).await {
                metrics::counter!("zkid_rhs_failures_total").increment(1);
                tracing::warn!(identity = %id, error = %err, "reverse hash service publication failed");
            }
        }
        Ok(StateStatus::Confirmed)
    }

    fn fail(&self, id: &Id, seq: u64, tx_id: &str, reason: &str) -> Result<StateStatus, PublishError> {
        let err = PublishError::TransactionFailed {
            tx_id: tx_id.to_string(),
            reason: reason.to_string(),
        };
        match self.engine.fail_state(id, seq, &err.to_string()) {
            Ok(_) => Ok(StateStatus::Failed),
            Err(e) => settled_elsewhere(id, seq, e),
        }
    }
}

/// The sweep and an inline publish may settle the same state. The loser
/// sees a transition out of a terminal status and reports that status.
fn settled_elsewhere(id: &Id, seq: u64, err: StateError) -> Result<StateStatus, PublishError> {
    match err {
        StateError::InvalidTransition { from, .. } if from.is_terminal() => {
            tracing::debug!(identity = %id, seq, status = %from, "state already settled");
            Ok(from)
        }
        err => Err(err.into()),
    }
}

fn record_publish(outcome: &str) {
    metrics::counter!("zkid_publish_total", "outcome" => outcome.to_string()).increment(1);
}

impl std::fmt::Debug for StatePublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatePublisher")
            .field("chain", &self.chain)
            .field("rhs", &self.rhs.is_some())
            .field("confirmation_block_count", &self.confirmation_block_count)
            .finish()
    }
}
