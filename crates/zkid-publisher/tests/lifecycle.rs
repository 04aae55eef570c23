//! Publish, confirm and fail identity states against the in-memory chain.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use zkid_auth::{schema_hash, ChainStateResolver, StateResolver};
use zkid_core::{Blockchain, Did, DidMethod, Hash, Id, Network};
use zkid_crypto::LocalKeyStore;
use zkid_publisher::{
    task, ChainClient, ChainTimeouts, GasPolicy, MemoryRhs, MockChain, PublishError, ReceiptStatus, Schedule,
    StateContract, StatePublisher, TransitionPayload, TxStatus,
};
use zkid_state::{EngineConfig, IdentityEngine, NewClaim, StateStatus, SubjectPosition};

const CONTEXT: &str = "https://schemas.example/kyc-v3.jsonld";

struct Harness {
    engine: IdentityEngine,
    chain: Arc<MockChain>,
    issuer: Did,
}

impl Harness {
    fn new() -> Self {
        let engine = IdentityEngine::new(Arc::new(LocalKeyStore::new()), EngineConfig::default());
        let (issuer, _) = engine
            .create_identity(DidMethod::Iden3, Blockchain::Polygon, Network::Amoy)
            .unwrap();
        Self {
            engine,
            chain: Arc::new(MockChain::new("polygon:amoy")),
            issuer,
        }
    }

    fn publisher(&self, confirmations: u64, confirmation_timeout: Duration) -> StatePublisher {
        self.publisher_on(
            self.chain.clone(),
            confirmations,
            Duration::from_millis(2),
            confirmation_timeout,
        )
    }

    fn publisher_on(
        &self,
        contract: Arc<dyn StateContract>,
        confirmations: u64,
        wait_receipt_cycle: Duration,
        confirmation_timeout: Duration,
    ) -> StatePublisher {
        let client = ChainClient::new(
            contract,
            GasPolicy::new(1_000_000_000, 300_000_000_000, 600_000).unwrap(),
            ChainTimeouts {
                rpc_response: Duration::from_secs(1),
                wait_receipt_cycle,
                confirmation: confirmation_timeout,
            },
        );
        StatePublisher::new(self.engine.clone(), client, confirmations)
    }

    fn issue(&self, birthday: u64) {
        self.issue_to(&self.issuer.id, birthday);
    }

    fn issue_to(&self, issuer: &Id, birthday: u64) {
        self.engine
            .insert_claim(
                issuer,
                NewClaim {
                    schema_url: CONTEXT.into(),
                    schema_type: "KYCAgeCredential".into(),
                    schema_hash: schema_hash(CONTEXT, "KYCAgeCredential"),
                    version: 0,
                    subject: None,
                    subject_position: SubjectPosition::Index,
                    index_data: [Hash::from_u64(birthday), Hash::default()],
                    value_data: [Hash::default(), Hash::default()],
                    expiration: None,
                    credential_subject: json!({ "birthday": birthday }),
                },
            )
            .unwrap();
    }

    /// Yield until some state has been submitted.
    async fn until_transacted(&self) {
        while self.engine.states_by_status(StateStatus::Transacted).is_empty() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    /// Mine a block every few milliseconds until dropped.
    fn auto_mine(&self) -> tokio::task::JoinHandle<()> {
        let chain = self.chain.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(3)).await;
                chain.mine();
            }
        })
    }
}

#[tokio::test]
async fn state_confirms_only_after_enough_blocks() {
    let h = Harness::new();
    h.issue(19_960_424);
    let publisher = h.publisher(2, Duration::from_millis(20));

    let published = publisher.publish_state(&h.issuer.id).await.unwrap();
    assert_eq!(published.status, StateStatus::Transacted);
    assert_eq!(h.chain.pending_transactions(), 1);

    h.chain.mine();
    let report = publisher.check_transaction_status().await;
    assert_eq!(report.pending, vec![(h.issuer.id, published.seq)]);
    assert_eq!(h.chain.ledger().latest_state(&h.issuer.id), Some(published.state));

    h.chain.advance(1);
    assert!(publisher.check_transaction_status().await.confirmed.is_empty());

    h.chain.advance(1);
    let report = publisher.check_transaction_status().await;
    assert_eq!(report.confirmed, vec![(h.issuer.id, published.seq)]);

    let confirmed = h.engine.latest_confirmed_state(&h.issuer.id).unwrap();
    assert_eq!(confirmed.state, published.state);
    assert_eq!(confirmed.block_number, Some(1));
    assert_eq!(confirmed.tx_id.as_deref(), Some(published.tx_id.as_str()));
    assert!(publisher.check_transaction_status().await.is_empty());
}

#[tokio::test]
async fn publish_confirms_inline_when_mined_while_waiting() {
    let h = Harness::new();
    h.issue(1);
    let miner = h.auto_mine();
    let publisher = h.publisher(0, Duration::from_secs(5));

    let published = publisher.publish_state(&h.issuer.id).await.unwrap();
    miner.abort();
    assert_eq!(published.status, StateStatus::Confirmed);
    assert_eq!(h.engine.current_state(&h.issuer.id).unwrap().status, StateStatus::Confirmed);
}

#[tokio::test]
async fn second_publish_while_in_flight_is_refused() {
    let h = Harness::new();
    h.issue(1);
    let publisher = h.publisher(0, Duration::from_millis(10));
    publisher.publish_state(&h.issuer.id).await.unwrap();

    h.issue(2);
    let err = publisher.publish_state(&h.issuer.id).await.unwrap_err();
    assert!(matches!(err, PublishError::StateIsBeingProcessed(id) if id == h.issuer.id));
    assert!(err.is_informational());
    assert_eq!(h.chain.pending_transactions(), 1);
}

#[tokio::test]
async fn sweep_confirming_under_a_waiting_publish_is_not_an_error() {
    let h = Harness::new();
    h.issue(7);
    let publisher = h.publisher_on(h.chain.clone(), 0, Duration::from_millis(200), Duration::from_secs(5));

    let inline = {
        let publisher = publisher.clone();
        let id = h.issuer.id;
        tokio::spawn(async move { publisher.publish_state(&id).await })
    };
    h.until_transacted().await;
    h.chain.mine();

    let report = publisher.check_transaction_status().await;
    assert_eq!(report.confirmed.len(), 1);
    assert!(report.errors.is_empty());

    let published = inline.await.unwrap().unwrap();
    assert_eq!(published.status, StateStatus::Confirmed);
    let state = h.engine.state(&h.issuer.id, published.seq).unwrap();
    assert_eq!(state.status, StateStatus::Confirmed);
    assert_eq!(state.transitions.last().map(|t| t.to), Some(StateStatus::Confirmed));
}

#[tokio::test]
async fn sweep_failing_under_a_waiting_publish_is_not_an_error() {
    let h = Harness::new();
    h.issue(7);
    let publisher = h.publisher_on(h.chain.clone(), 0, Duration::from_millis(200), Duration::from_secs(5));

    let inline = {
        let publisher = publisher.clone();
        let id = h.issuer.id;
        tokio::spawn(async move { publisher.publish_state(&id).await })
    };
    h.until_transacted().await;
    assert_eq!(h.chain.drop_pending(), 1);

    let report = publisher.check_transaction_status().await;
    assert_eq!(report.failed.len(), 1);

    let published = inline.await.unwrap().unwrap();
    assert_eq!(published.status, StateStatus::Failed);
    assert_eq!(h.engine.unprocessed_identities(), vec![h.issuer.id]);
}

/// Delegates to a [`MockChain`] but cannot read back the first
/// transaction submitted through it.
struct UnreadableFirstTx {
    chain: Arc<MockChain>,
    broken: Mutex<Option<String>>,
}

#[async_trait]
impl StateContract for UnreadableFirstTx {
    fn chain_name(&self) -> &str {
        self.chain.chain_name()
    }

    async fn submit_transition(&self, payload: &TransitionPayload) -> Result<String, PublishError> {
        let tx_id = self.chain.submit_transition(payload).await?;
        self.broken.lock().get_or_insert_with(|| tx_id.clone());
        Ok(tx_id)
    }

    async fn transaction_status(&self, tx_id: &str) -> Result<TxStatus, PublishError> {
        if self.broken.lock().as_deref() == Some(tx_id) {
            return Err(PublishError::Chain("transaction not found on node".into()));
        }
        self.chain.transaction_status(tx_id).await
    }

    async fn suggested_gas_price(&self) -> Result<u64, PublishError> {
        self.chain.suggested_gas_price().await
    }

    async fn block_number(&self) -> Result<u64, PublishError> {
        self.chain.block_number().await
    }
}

#[tokio::test]
async fn sweep_continues_past_an_identity_whose_check_fails() {
    let h = Harness::new();
    let (other, _) = h
        .engine
        .create_identity(DidMethod::Iden3, Blockchain::Polygon, Network::Amoy)
        .unwrap();
    h.issue(1);
    h.issue_to(&other.id, 2);

    let contract = Arc::new(UnreadableFirstTx {
        chain: h.chain.clone(),
        broken: Mutex::new(None),
    });
    let publisher = h.publisher_on(contract, 0, Duration::from_millis(2), Duration::from_millis(10));
    let published = publisher.publish_all().await;
    assert_eq!(published.len(), 2);
    assert!(published
        .iter()
        .all(|(_, r)| matches!(r, Ok(p) if p.status == StateStatus::Transacted)));

    h.chain.mine();
    let report = publisher.check_transaction_status().await;
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.confirmed.len(), 1);
    assert!(matches!(report.errors[0].1, PublishError::Chain(_)));

    let (stuck, _) = &report.errors[0];
    let (done, _) = report.confirmed[0];
    assert_ne!(*stuck, done);
    assert_eq!(h.engine.current_state(stuck).unwrap().status, StateStatus::Transacted);
    assert_eq!(h.engine.current_state(&done).unwrap().status, StateStatus::Confirmed);
}

#[tokio::test]
async fn nothing_to_publish_without_changes() {
    let h = Harness::new();
    let publisher = h.publisher(0, Duration::from_millis(10));
    let err = publisher.publish_state(&h.issuer.id).await.unwrap_err();
    assert!(matches!(err, PublishError::NoStatesToProcess(_)));
    assert!(publisher.publish_all().await.is_empty());
}

#[tokio::test]
async fn dropped_transaction_fails_and_changes_are_republished() {
    let h = Harness::new();
    h.issue(1);
    let publisher = h.publisher(0, Duration::from_millis(10));
    let first = publisher.publish_state(&h.issuer.id).await.unwrap();

    assert_eq!(h.chain.drop_pending(), 1);
    let report = publisher.check_transaction_status().await;
    assert_eq!(report.failed, vec![(h.issuer.id, first.seq)]);
    let failed = h.engine.state(&h.issuer.id, first.seq).unwrap();
    assert_eq!(failed.status, StateStatus::Failed);
    assert!(failed.failure.unwrap().contains("dropped"));

    assert_eq!(h.engine.unprocessed_identities(), vec![h.issuer.id]);
    let results = publisher.publish_all().await;
    assert_eq!(results.len(), 1);
    let retry = results[0].1.as_ref().unwrap();
    assert_ne!(retry.seq, first.seq);
    assert_eq!(retry.state, first.state);

    h.chain.mine();
    assert_eq!(publisher.check_transaction_status().await.confirmed.len(), 1);
    assert_eq!(h.chain.ledger().latest_state(&h.issuer.id), Some(first.state));
}

#[tokio::test]
async fn rejected_submission_fails_the_state() {
    let h = Harness::new();
    h.issue(1);
    let publisher = h.publisher(0, Duration::from_millis(10));

    h.chain.reject_submissions(true);
    let err = publisher.publish_state(&h.issuer.id).await.unwrap_err();
    assert!(matches!(err, PublishError::Chain(_)));
    assert!(err.is_retryable());
    assert!(h
        .engine
        .states_by_status(StateStatus::Failed)
        .iter()
        .any(|(id, _)| *id == h.issuer.id));

    h.chain.reject_submissions(false);
    let published = publisher.publish_state(&h.issuer.id).await.unwrap();
    assert_eq!(published.status, StateStatus::Transacted);
}

#[tokio::test]
async fn confirmed_nodes_reach_the_reverse_hash_service() {
    let h = Harness::new();
    h.issue(1);
    let rhs = Arc::new(MemoryRhs::new());
    let publisher = h.publisher(0, Duration::from_millis(10)).with_rhs(rhs.clone());

    let published = publisher.publish_state(&h.issuer.id).await.unwrap();
    assert!(rhs.is_empty());
    h.chain.mine();
    publisher.check_transaction_status().await;

    let roots = h.engine.latest_confirmed_state(&h.issuer.id).unwrap().roots;
    assert_eq!(
        rhs.node(&published.state),
        Some(vec![roots.claims_root, roots.revocation_root, roots.roots_root])
    );
    assert!(rhs.len() > 1);
}

#[tokio::test]
async fn anchored_states_resolve_for_verifiers() {
    let h = Harness::new();
    let genesis = h.engine.current_state(&h.issuer.id).unwrap().state;
    let resolver = ChainStateResolver::new(h.chain.clone());
    let publisher = h.publisher(0, Duration::from_millis(10));

    let unpublished_genesis = resolver.resolve(&h.issuer.id, &genesis).await.unwrap();
    assert!(unpublished_genesis.genesis);

    h.issue(1);
    let first = publisher.publish_state(&h.issuer.id).await.unwrap();
    h.chain.mine();
    publisher.check_transaction_status().await;

    h.issue(2);
    let second = publisher.publish_state(&h.issuer.id).await.unwrap();
    h.chain.mine();
    publisher.check_transaction_status().await;

    let old = resolver.resolve(&h.issuer.id, &first.state).await.unwrap();
    assert!(!old.latest);
    assert!(old.transition_timestamp > 0);
    let latest = resolver.resolve(&h.issuer.id, &second.state).await.unwrap();
    assert!(latest.latest);
    assert!(!latest.genesis);
    let replaced_genesis = resolver.resolve(&h.issuer.id, &genesis).await.unwrap();
    assert!(!replaced_genesis.latest);
}

#[tokio::test]
async fn chain_reverts_stale_and_unsigned_transitions() {
    let h = Harness::new();
    h.issue(1);
    let inputs = h.engine.begin_publish(&h.issuer.id).unwrap();
    let keys = h.engine.keys();
    let payload = TransitionPayload {
        id: inputs.id,
        old_state: inputs.old_state,
        new_state: inputs.new_state,
        is_old_state_genesis: inputs.is_old_state_genesis,
        auth_claim_mtp: inputs.auth_claim_mtp.clone(),
        public_key: keys.public_key(&inputs.auth_key).unwrap(),
        signature: keys.sign(&inputs.auth_key, &inputs.signing_message()).unwrap(),
        gas_price: 1,
        gas_limit: 1,
    };
    let mut forged = payload.clone();
    forged.new_state = Hash::from_u64(99);

    let ok = h.chain.submit_transition(&payload).await.unwrap();
    let replay = h.chain.submit_transition(&payload).await.unwrap();
    let bad_sig = h.chain.submit_transition(&forged).await.unwrap();
    h.chain.mine();

    let status = |tx: String| {
        let chain = h.chain.clone();
        async move {
            match chain.transaction_status(&tx).await.unwrap() {
                TxStatus::Mined(r) => r.status,
                other => panic!("not mined: {other:?}"),
            }
        }
    };
    assert_eq!(status(ok).await, ReceiptStatus::Success);
    assert_eq!(status(replay).await, ReceiptStatus::Reverted);
    assert_eq!(status(bad_sig).await, ReceiptStatus::Reverted);
    assert_eq!(h.chain.ledger().latest_state(&h.issuer.id), Some(inputs.new_state));
    assert!(h.chain.transaction_status("0xdead").await.is_err());
}

#[tokio::test]
async fn background_loop_publishes_and_confirms_until_cancelled() {
    let h = Harness::new();
    h.issue(1);
    let miner = h.auto_mine();
    let publisher = h.publisher(1, Duration::from_millis(5));
    let shutdown = CancellationToken::new();

    let handle = task::spawn(
        publisher,
        Schedule {
            check_interval: Duration::from_millis(5),
            publish_interval: Some(Duration::from_millis(5)),
        },
        shutdown.clone(),
    );

    let mut confirmed = false;
    for _ in 0..400 {
        tokio::time::sleep(Duration::from_millis(5)).await;
        if h.engine.latest_confirmed_state(&h.issuer.id).unwrap().seq > 0 {
            confirmed = true;
            break;
        }
    }
    shutdown.cancel();
    let stats = handle.await.unwrap();
    miner.abort();

    assert!(confirmed);
    assert!(stats.sweeps > 0);
    assert!(stats.publish_rounds > 0);
}
