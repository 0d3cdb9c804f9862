//! Timeout, cancellation, and transport fault handling

use crate::support::{MockCoSigner, SimBehavior};
use mpc_wallet_engine::{Error, ErrorKind, MemoryShareStore};
use mpc_wallet_session::{EngineConfig, WalletOperations, WalletService};
use std::sync::Arc;
use std::time::{Duration, Instant};

async fn service_with(behavior: SimBehavior, deadline: Duration) -> (Arc<WalletService>, MockCoSigner) {
    crate::support::init_tracing();
    let cosigner = MockCoSigner::start().await;
    cosigner.set_behavior(behavior);
    let config = EngineConfig::new(cosigner.base_url.clone())
        .with_poll_interval(Duration::from_millis(20))
        .with_max_poll_duration(deadline);
    let service = Arc::new(
        WalletService::new(config, Arc::new(MemoryShareStore::new())).expect("build service"),
    );
    (service, cosigner)
}

#[tokio::test]
async fn silent_cosigner_times_out_at_the_deadline() {
    let behavior = SimBehavior {
        never_respond: true,
        ..Default::default()
    };
    let (service, cosigner) = service_with(behavior, Duration::from_millis(400)).await;

    let started = Instant::now();
    let err = service.generate_wallet("profile-1").await.unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, Error::TimedOut(_)));
    assert_eq!(err.kind(), ErrorKind::Session);
    assert!(err.is_retryable());
    // returned around the deadline, not after extra grace periods
    assert!(elapsed >= Duration::from_millis(380), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(1_500), "elapsed {elapsed:?}");

    // the abandoned session was torn down remotely
    cosigner.wait_for_deletes(1).await;
}

#[tokio::test]
async fn hung_teardown_does_not_delay_the_timeout_return() {
    let behavior = SimBehavior {
        never_respond: true,
        hang_delete: true,
        ..Default::default()
    };
    let (service, cosigner) = service_with(behavior, Duration::from_millis(300)).await;

    let started = Instant::now();
    let err = service.generate_wallet("profile-1").await.unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, Error::TimedOut(_)));
    // the DELETE runs detached; the caller gets its error at the
    // deadline even when the co-signer sits on the teardown request
    assert!(elapsed < Duration::from_millis(1_000), "elapsed {elapsed:?}");
    cosigner.wait_for_deletes(1).await;

    // the profile lock was released with the return, not the teardown
    cosigner.set_behavior(SimBehavior {
        hang_delete: true,
        ..Default::default()
    });
    service
        .generate_wallet("profile-1")
        .await
        .expect("retry while teardown hangs");
}

#[tokio::test]
async fn cosigner_reported_failure_surfaces_as_session_error() {
    let behavior = SimBehavior {
        fail_sessions: true,
        ..Default::default()
    };
    let (service, cosigner) = service_with(behavior, Duration::from_millis(2_000)).await;

    let err = service.generate_wallet("profile-1").await.unwrap_err();
    assert!(matches!(err, Error::SessionFailed(_)));
    assert!(err.is_retryable());
    cosigner.wait_for_deletes(1).await;
}

#[tokio::test]
async fn rejected_session_creation_aborts_before_any_rounds() {
    let behavior = SimBehavior {
        reject_create: true,
        ..Default::default()
    };
    let (service, cosigner) = service_with(behavior, Duration::from_millis(2_000)).await;

    let err = service.generate_wallet("profile-1").await.unwrap_err();
    assert!(matches!(err, Error::SessionCreateFailed(_)));
    assert_eq!(cosigner.sessions_created(), 1);
    // nothing to tear down, no session existed
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(cosigner.sessions_deleted(), 0);
}

#[tokio::test]
async fn unreachable_cosigner_fails_session_creation() {
    // nothing listens on this port
    let config = EngineConfig::new("http://127.0.0.1:9")
        .with_request_timeout(Duration::from_millis(500))
        .with_max_poll_duration(Duration::from_secs(2));
    let service =
        WalletService::new(config, Arc::new(MemoryShareStore::new())).expect("build service");

    let err = service.generate_wallet("profile-1").await.unwrap_err();
    // a connect failure while initiating is a create failure, same as
    // a 5xx from the co-signer
    assert!(matches!(err, Error::SessionCreateFailed(_)), "got {err:?}");
    assert!(err.is_retryable());
}

#[tokio::test]
async fn cancellation_interrupts_a_polling_session() {
    let behavior = SimBehavior {
        never_respond: true,
        ..Default::default()
    };
    let (service, cosigner) = service_with(behavior, Duration::from_secs(30)).await;

    let runner = service.clone();
    let running = tokio::spawn(async move { runner.generate_wallet("profile-1").await });
    tokio::time::sleep(Duration::from_millis(150)).await;

    let started = Instant::now();
    service.cancel_operation("profile-1");
    let result = running.await.expect("join");

    assert!(matches!(&result, Err(Error::Cancelled)));
    assert!(
        started.elapsed() < Duration::from_secs(5),
        "cancel must not wait out the deadline"
    );
    let err = result.unwrap_err();
    assert!(!err.is_retryable(), "cancellation is deliberate, not retryable");
    cosigner.wait_for_deletes(1).await;

    // no share was persisted for the cancelled keygen
    assert!(!service.has_wallet("profile-1").await.expect("has_wallet"));

    // and the lock is free again
    cosigner.set_behavior(SimBehavior::default());
    service
        .generate_wallet("profile-1")
        .await
        .expect("retry after cancel");
}

#[tokio::test]
async fn failed_keygen_leaves_no_partial_share() {
    let behavior = SimBehavior {
        fail_sessions: true,
        ..Default::default()
    };
    let (service, _cosigner) = service_with(behavior, Duration::from_millis(2_000)).await;

    let _ = service.generate_wallet("profile-1").await.unwrap_err();
    assert!(!service.has_wallet("profile-1").await.expect("has_wallet"));
}
