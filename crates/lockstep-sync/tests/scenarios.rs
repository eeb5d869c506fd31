//! End-to-end scenarios over the public client API, driven by the
//! deterministic in-memory store. Each connected client models one process.

use std::sync::Arc;
use std::time::Duration;

use lockstep_sync::ClientConfig;
use lockstep_sync::CoordinationClient;
use lockstep_sync::ElectionOptions;
use lockstep_sync::LockOptions;
use lockstep_sync::SyncError;
use lockstep_testing::DeterministicConnector;
use lockstep_testing::UnreachableConnector;
use tokio::time::timeout;

fn cluster() -> DeterministicConnector {
    let _ = tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).try_init();
    DeterministicConnector::new(lockstep_testing::DeterministicCoordinationStore::new())
}

async fn client(connector: &DeterministicConnector) -> CoordinationClient {
    CoordinationClient::connect(ClientConfig::default(), connector).await.expect("in-memory connect")
}

#[tokio::test]
async fn lock_is_mutually_exclusive_across_clients() {
    let connector = cluster();
    let holder = client(&connector).await;
    let contender = Arc::new(client(&connector).await);

    holder.lock("resource-A", LockOptions::default()).await.unwrap();

    let pending = {
        let contender = contender.clone();
        tokio::spawn(async move { contender.lock("resource-A", LockOptions::default()).await })
    };

    // The contender must still be blocked while the lock is held.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!pending.is_finished());

    holder.unlock("resource-A").await.unwrap();
    timeout(Duration::from_secs(1), pending).await.expect("grant after unlock").unwrap().unwrap();
    contender.unlock("resource-A").await.unwrap();
}

#[tokio::test]
async fn unrelated_locks_do_not_serialize() {
    let connector = cluster();
    let a = client(&connector).await;
    let b = client(&connector).await;

    a.lock("resource-A", LockOptions::default()).await.unwrap();
    // A different id is granted immediately even though resource-A is held.
    timeout(Duration::from_millis(500), b.lock("resource-B", LockOptions::default()))
        .await
        .expect("independent lock must not block")
        .unwrap();

    a.unlock("resource-A").await.unwrap();
    b.unlock("resource-B").await.unwrap();
}

#[tokio::test]
async fn crashed_holder_releases_its_lock_after_the_ttl() {
    let connector = cluster();
    let holder = client(&connector).await;
    let contender = client(&connector).await;

    holder.lock("resource-A", LockOptions::with_ttl(Duration::from_secs(1))).await.unwrap();
    // Simulate a crash: drop the client without unlocking. Its sessions stop
    // renewing and the store reclaims the lock once the TTL elapses.
    drop(holder);

    timeout(Duration::from_secs(3), contender.lock("resource-A", LockOptions::default()))
        .await
        .expect("lock must be reclaimed after lease expiry")
        .unwrap();
    contender.unlock("resource-A").await.unwrap();
}

#[tokio::test]
async fn unlock_of_a_lock_held_elsewhere_is_rejected_locally() {
    let connector = cluster();
    let holder = client(&connector).await;
    let other = client(&connector).await;

    holder.lock("resource-A", LockOptions::default()).await.unwrap();

    // The other process never acquired resource-A, so its unlock fails from
    // the local table alone and the real holder is untouched.
    let err = other.unlock("resource-A").await.unwrap_err();
    assert!(matches!(err, SyncError::LockNotFound { .. }));
    assert!(holder.locks().is_held("resource-A").await);

    holder.unlock("resource-A").await.unwrap();
}

#[tokio::test]
async fn campaign_blocks_until_the_leader_resigns() {
    let connector = cluster();
    let first = client(&connector).await;
    let second = Arc::new(client(&connector).await);

    let leader = first.campaign("group-1", ElectionOptions::with_candidate("first")).await.unwrap();

    let pending = {
        let second = second.clone();
        tokio::spawn(async move { second.campaign("group-1", ElectionOptions::with_candidate("second")).await })
    };

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!pending.is_finished());

    leader.resign().await.unwrap();
    let successor = timeout(Duration::from_secs(1), pending).await.expect("leadership must pass on").unwrap().unwrap();
    assert_eq!(successor.candidate(), "second");
    successor.resign().await.unwrap();
}

#[tokio::test]
async fn crashed_leader_is_superseded_after_the_ttl() {
    let connector = cluster();
    let first = client(&connector).await;
    let second = client(&connector).await;

    let leader = first
        .campaign(
            "group-1",
            ElectionOptions {
                ttl: Some(Duration::from_secs(1)),
                candidate: Some("first".to_string()),
            },
        )
        .await
        .unwrap();
    drop(leader);
    drop(first);

    let successor = timeout(
        Duration::from_secs(3),
        second.campaign("group-1", ElectionOptions::with_candidate("second")),
    )
    .await
    .expect("leadership must pass on after lease expiry")
    .unwrap();
    assert_eq!(successor.candidate(), "second");
    successor.resign().await.unwrap();
}

#[tokio::test]
async fn deposed_leader_observes_the_loss_exactly_once() {
    let connector = cluster();
    let first = client(&connector).await;
    let second = Arc::new(client(&connector).await);

    let leader = first
        .campaign(
            "group-1",
            ElectionOptions {
                ttl: Some(Duration::from_secs(1)),
                candidate: Some("first".to_string()),
            },
        )
        .await
        .unwrap();
    let mut status = leader.status().await.unwrap();

    let pending = {
        let second = second.clone();
        tokio::spawn(async move { second.campaign("group-1", ElectionOptions::with_candidate("second")).await })
    };

    // While the lease is alive the subscription stays silent.
    assert!(timeout(Duration::from_millis(300), status.recv()).await.is_err());

    // "Crash" the first leader by dropping its handle; the successor's value
    // appears at the election path and the subscription fires once.
    drop(leader);
    let lost = timeout(Duration::from_secs(3), status.recv()).await.expect("loss must be signalled");
    assert_eq!(lost, Some(true));
    assert_eq!(status.recv().await, None);

    let successor = pending.await.unwrap().unwrap();
    successor.resign().await.unwrap();
}

#[tokio::test]
async fn connect_failure_surfaces_as_a_connection_error() {
    let err = CoordinationClient::connect(ClientConfig::default(), &UnreachableConnector).await.unwrap_err();
    assert!(matches!(err, SyncError::Connection { .. }));
}

#[tokio::test]
async fn operations_fail_after_close_until_reconnect() {
    let connector = cluster();
    let mut client = client(&connector).await;

    client.close().await;
    assert!(client.lock("resource-A", LockOptions::default()).await.is_err());
    assert!(client.campaign("group-1", ElectionOptions::default()).await.is_err());

    client.reconnect(&connector).await.unwrap();
    client.lock("resource-A", LockOptions::default()).await.unwrap();
    client.unlock("resource-A").await.unwrap();
}
