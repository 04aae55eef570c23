//! Proof-carrying envelopes through the package manager.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use zkid_comm::{
    AuthV2InputsPreparer, BasicMessage, JwzHeader, MediaType, PackError, PackParams, PackageManager, Packer,
    PlainPacker, ProvingMethodAlg, ProvingMethodRegistry, ProvingParams, SnarkProvingMethod,
    StateVerifier, VerificationParams, ZkpPacker, AUTHORIZATION_RESPONSE,
};
use zkid_core::{Blockchain, Did, DidMethod, Hash, Id, Network};
use zkid_zkp::{CircuitId, CircuitInputs, MockProofSystem, ProofSystem};

struct AcceptStates;

#[async_trait]
impl StateVerifier for AcceptStates {
    async fn verify_state(&self, _circuit: CircuitId, _signals: &[String]) -> Result<(), PackError> {
        Ok(())
    }
}

struct RejectStates;

#[async_trait]
impl StateVerifier for RejectStates {
    async fn verify_state(&self, _circuit: CircuitId, _signals: &[String]) -> Result<(), PackError> {
        Err(PackError::ProofVerificationFailed("gist root not found".into()))
    }
}

fn method() -> ProvingMethodAlg {
    ProvingMethodAlg::new("groth16-mock", CircuitId::AuthV2)
}

fn sender() -> Did {
    let mut genesis = [0u8; 32];
    genesis[31] = 0x1a;
    genesis[10] = 0x77;
    Id::from_genesis(
        DidMethod::Iden3,
        Blockchain::Polygon,
        Network::Mumbai,
        &Hash::from_le_bytes(genesis).unwrap(),
    )
    .unwrap()
    .to_did()
    .unwrap()
}

fn packer(states: Arc<dyn StateVerifier>) -> ZkpPacker {
    packer_for(method(), states)
}

fn packer_for(method: ProvingMethodAlg, states: Arc<dyn StateVerifier>) -> ZkpPacker {
    let registry = Arc::new(ProvingMethodRegistry::new());
    registry.register(Arc::new(SnarkProvingMethod::new(method.clone(), Arc::new(MockProofSystem))));
    let mut proving = HashMap::new();
    proving.insert(
        method.clone(),
        ProvingParams {
            inputs: Arc::new(AuthV2InputsPreparer {
                gist_root: Hash::from_u64(1),
            }),
            proving_key: b"{}".to_vec(),
        },
    );
    let mut verification = HashMap::new();
    verification.insert(
        method,
        VerificationParams {
            verification_key: b"{}".to_vec(),
            state_verifier: states,
        },
    );
    ZkpPacker::new(registry, proving, verification)
}

fn payload(from: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "id": "f6d6f4d0-3d1c-4d1b-9e2a-0d5c9a3f4a11",
        "thid": "f6d6f4d0-3d1c-4d1b-9e2a-0d5c9a3f4a11",
        "type": AUTHORIZATION_RESPONSE,
        "from": from,
        "body": { "scope": [] }
    }))
    .unwrap()
}

fn params() -> PackParams {
    PackParams::Zkp {
        sender: sender(),
        method: method(),
    }
}

#[tokio::test]
async fn unpack_of_pack_returns_the_payload() {
    let packer = packer(Arc::new(AcceptStates));
    let original = payload(&sender().to_string());
    let token = packer.pack(&original, &params()).await.unwrap();
    assert_eq!(String::from_utf8(token.clone()).unwrap().split('.').count(), 3);

    let msg = packer.unpack(&token).await.unwrap();
    let expected: BasicMessage = serde_json::from_slice(&original).unwrap();
    assert_eq!(msg, expected);
}

#[tokio::test]
async fn manager_detects_zkp_envelopes() {
    let mut manager = PackageManager::new();
    manager
        .register(Arc::new(PlainPacker))
        .register(Arc::new(packer(Arc::new(AcceptStates))));
    let token = manager
        .pack(MediaType::Zkp, &payload(&sender().to_string()), &params())
        .await
        .unwrap();
    let (msg, media) = manager.unpack(&token).await.unwrap();
    assert_eq!(media, MediaType::Zkp);
    assert_eq!(msg.message_type, AUTHORIZATION_RESPONSE);
}

#[tokio::test]
async fn replaced_payload_breaks_the_proof() {
    let packer = packer(Arc::new(AcceptStates));
    let token = packer
        .pack(&payload(&sender().to_string()), &params())
        .await
        .unwrap();
    let token = String::from_utf8(token).unwrap();
    let parts: Vec<&str> = token.split('.').collect();
    let mut forged = payload(&sender().to_string());
    forged.push(b' ');
    let forged = format!("{}.{}.{}", parts[0], URL_SAFE_NO_PAD.encode(&forged), parts[2]);
    let err = packer.unpack(forged.as_bytes()).await.unwrap_err();
    assert!(matches!(err, PackError::ProofVerificationFailed(_)));
}

#[tokio::test]
async fn prover_must_be_the_sender() {
    let packer = packer(Arc::new(AcceptStates));
    let token = packer
        .pack(&payload("did:iden3:polygon:mumbai:x4jcHP4XHTK3vX58AHZPyHE8kYjneyE6FZRfz7K29"), &params())
        .await
        .unwrap();
    let err = packer.unpack(&token).await.unwrap_err();
    assert!(matches!(err, PackError::SenderMismatch { .. }));
}

#[tokio::test]
async fn rejected_state_fails_unpack() {
    let token = packer(Arc::new(AcceptStates))
        .pack(&payload(&sender().to_string()), &params())
        .await
        .unwrap();
    let err = packer(Arc::new(RejectStates)).unpack(&token).await.unwrap_err();
    assert!(matches!(err, PackError::ProofVerificationFailed(_)));
}

#[tokio::test]
async fn unknown_method_is_unsupported() {
    let token = packer(Arc::new(AcceptStates))
        .pack(&payload(&sender().to_string()), &params())
        .await
        .unwrap();
    let bare = ZkpPacker::new(Arc::new(ProvingMethodRegistry::new()), HashMap::new(), HashMap::new());
    let err = bare.unpack(&token).await.unwrap_err();
    assert!(matches!(err, PackError::UnsupportedMediaType(_)));
}

#[tokio::test]
async fn truncated_token_is_malformed() {
    let packer = packer(Arc::new(AcceptStates));
    let err = packer.unpack(b"abc.def").await.unwrap_err();
    assert!(matches!(err, PackError::TokenMalformed(_)));
}

#[tokio::test]
async fn query_circuit_tokens_are_refused_with_any_payload() {
    let query = ProvingMethodAlg::new("groth16-mock", CircuitId::AtomicQuerySigV2);
    let packer = packer_for(query.clone(), Arc::new(AcceptStates));

    let err = packer
        .pack(
            &payload(&sender().to_string()),
            &PackParams::Zkp {
                sender: sender(),
                method: query.clone(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PackError::UnsupportedMediaType(_)));

    // A well-formed query proof has no signal tying it to the payload, so
    // swapping the payload must not yield a message.
    let inputs = CircuitInputs {
        public: vec![Hash::from_u64(1); CircuitId::AtomicQuerySigV2.signal_count()],
        private: serde_json::Value::Null,
    };
    let proof = MockProofSystem
        .prove(CircuitId::AtomicQuerySigV2, b"{}", &inputs)
        .unwrap();
    let header = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&JwzHeader::new(&query)).unwrap());
    let proof = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&proof).unwrap());
    for from in [sender().to_string(), "did:forged".to_string()] {
        let token = format!("{header}.{}.{proof}", URL_SAFE_NO_PAD.encode(payload(&from)));
        let err = packer.unpack(token.as_bytes()).await.unwrap_err();
        assert!(matches!(err, PackError::UnsupportedMediaType(_)));
    }
}
