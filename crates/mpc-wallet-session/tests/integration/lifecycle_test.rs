//! Keygen, signing, and rotation against the mock co-signer

use super::test_service;
use crate::support::MockCoSigner;
use mpc_wallet_engine::{
    curve, Algorithm, Error, Finalized, KeygenEngine, MemoryShareStore, RoundEngine,
    SigningRequest,
};
use mpc_wallet_session::{
    CancelToken, CoSignerClient, EngineConfig, SessionManager, SessionState, WalletOperations,
    WalletService,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn generate_wallet_end_to_end() {
    let (service, cosigner) = test_service().await;

    let info = service.generate_wallet("profile-1").await.expect("keygen");
    assert!(info.address.starts_with("0x"), "default algorithm is ECDSA");
    assert_eq!(info.address.len(), 42);
    assert!(!info.public_key.is_empty());

    assert!(service.has_wallet("profile-1").await.expect("has_wallet"));
    let fetched = service.get_wallet_info("profile-1").await.expect("info");
    assert_eq!(fetched.address, info.address);
    assert_eq!(fetched.public_key, info.public_key);

    assert_eq!(cosigner.sessions_created(), 1);
}

#[tokio::test]
async fn session_completes_only_after_the_caller_commits() {
    crate::support::init_tracing();
    let cosigner = MockCoSigner::start().await;
    let config = EngineConfig::new(cosigner.base_url.clone())
        .with_poll_interval(Duration::from_millis(20))
        .with_max_poll_duration(Duration::from_secs(2));
    let client = CoSignerClient::new(&config).expect("client");

    let mut manager = SessionManager::new(&client, &config);
    let engine = RoundEngine::Keygen(KeygenEngine::new(Algorithm::Ecdsa).expect("engine"));
    let cancel = CancelToken::new();
    let finalized = manager
        .run("profile-1", engine, None, &cancel)
        .await
        .expect("keygen run");
    assert!(matches!(finalized, Finalized::KeyShare { .. }));

    // the result is in hand but not yet durable; the manager parks in
    // Finalizing until the owner commits
    assert_eq!(manager.state(), SessionState::Finalizing);
    manager.complete();
    assert_eq!(manager.state(), SessionState::Completed);
}

#[tokio::test]
async fn generate_is_refused_when_a_wallet_exists() {
    let (service, cosigner) = test_service().await;

    service.generate_wallet("profile-1").await.expect("keygen");
    let before = cosigner.sessions_created();

    let err = service.generate_wallet("profile-1").await.unwrap_err();
    assert!(matches!(err, Error::AlreadyExists(_)));
    // refused locally, no session was opened
    assert_eq!(cosigner.sessions_created(), before);
}

#[tokio::test]
async fn sign_produces_a_verifiable_signature() {
    let (service, _cosigner) = test_service().await;

    let info = service.generate_wallet("profile-1").await.expect("keygen");
    let request = SigningRequest::new(b"transfer 5 to bob".to_vec());
    let digest = request.digest();
    let signature = service.sign("profile-1", request).await.expect("sign");

    let public_key = hex::decode(&info.public_key).expect("hex pubkey");
    assert!(
        curve::verify_signature(Algorithm::Ecdsa, &public_key, &digest, &signature.bytes)
            .expect("verify"),
        "signature must verify against the joint public key"
    );
}

#[tokio::test]
async fn eddsa_wallet_generates_and_signs() {
    let cosigner = MockCoSigner::start().await;
    let config = EngineConfig::new(cosigner.base_url.clone())
        .with_algorithm(Algorithm::Eddsa)
        .with_poll_interval(Duration::from_millis(20))
        .with_max_poll_duration(Duration::from_millis(2_000));
    let service =
        WalletService::new(config, Arc::new(MemoryShareStore::new())).expect("build service");

    let info = service.generate_wallet("sol-1").await.expect("keygen");
    assert!(!info.address.starts_with("0x"), "base58, not hex");

    let request = SigningRequest::new(b"lamports".to_vec());
    let digest = request.digest();
    let signature = service.sign("sol-1", request).await.expect("sign");
    let public_key = hex::decode(&info.public_key).expect("hex pubkey");
    assert!(
        curve::verify_signature(Algorithm::Eddsa, &public_key, &digest, &signature.bytes)
            .expect("verify")
    );
}

#[tokio::test]
async fn rotation_keeps_the_address_and_refreshes_shares() {
    let (service, cosigner) = test_service().await;

    let info = service.generate_wallet("profile-1").await.expect("keygen");
    let share_before = cosigner
        .cosigner_public_share("profile-1")
        .expect("cosigner share");

    let rotated = service
        .rotate_key_share("profile-1")
        .await
        .expect("rotation");
    assert_eq!(rotated.address, info.address);
    assert_eq!(rotated.public_key, info.public_key);
    assert!(rotated.metadata.contains_key("rotated_at"));

    let share_after = cosigner
        .cosigner_public_share("profile-1")
        .expect("cosigner share");
    assert_ne!(share_before, share_after, "co-signer share must change");

    // the refreshed shares still sign correctly
    let request = SigningRequest::new(b"post-rotation".to_vec());
    let digest = request.digest();
    let signature = service.sign("profile-1", request).await.expect("sign");
    let public_key = hex::decode(&rotated.public_key).expect("hex pubkey");
    assert!(
        curve::verify_signature(Algorithm::Ecdsa, &public_key, &digest, &signature.bytes)
            .expect("verify")
    );
}

#[tokio::test]
async fn bearer_token_is_attached_to_requests() {
    let (service, cosigner) = test_service().await;
    service.generate_wallet("profile-1").await.expect("keygen");
    assert_eq!(
        cosigner.last_auth_header().as_deref(),
        Some("Bearer test-token")
    );
}

#[tokio::test]
async fn wallet_info_for_unknown_profile_is_no_wallet() {
    let (service, _cosigner) = test_service().await;
    let err = service.get_wallet_info("ghost").await.unwrap_err();
    assert!(matches!(err, Error::NoWallet(_)));
    assert!(!service.has_wallet("ghost").await.expect("has_wallet"));
}
