use std::time::Duration;

use bytes::Bytes;
use d_store::Cas;
use tracing::info;
use tracing_test::traced_test;

use crate::commons::start_joiner;
use crate::commons::start_seed;
use crate::commons::wait_applied;
use crate::commons::WAIT_FOR_NODE_READY_IN_SEC;

/// Test 3-node cluster failover: stop the leader, verify re-election and data consistency
#[tokio::test]
#[traced_test]
async fn test_3_node_failover() {
    let seed = start_seed().await.expect("seed should start");
    let n2 = start_joiner(2, &seed).await.expect("node 2 should join");
    let n3 = start_joiner(3, &seed).await.expect("node 3 should join");

    let before = seed
        .client()
        .await
        .set("/before-failover", Cas::Missing, "initial-value")
        .await
        .unwrap();
    wait_applied(&n2, before.revision().unwrap()).await;
    wait_applied(&n3, before.revision().unwrap()).await;

    info!("Stopping node 1 (leader)");
    seed.shutdown();

    let status = tokio::time::timeout(
        Duration::from_secs(WAIT_FOR_NODE_READY_IN_SEC),
        n2.wait_for_status(|s| matches!(s.leader_id, Some(id) if id != 1)),
    )
    .await
    .expect("a new leader should be elected")
    .unwrap();
    info!(leader = ?status.leader_id, "re-election complete");

    // 2 of 3 members still form a majority
    let client = n2.client().await;
    let after = client
        .set("/after-failover", Cas::Missing, "still-works")
        .await
        .unwrap();
    assert!(after.revision().unwrap() > before.revision().unwrap());

    assert_eq!(
        client.get("/before-failover", 0).await.unwrap().body,
        Bytes::from_static(b"initial-value")
    );
    wait_applied(&n3, after.revision().unwrap()).await;
    assert_eq!(
        n3.client().await.get("/after-failover", 0).await.unwrap().cas,
        after
    );

    n2.shutdown();
    n3.shutdown();
}

/// Test minority: with two of three members gone, writes cannot commit
#[tokio::test]
#[traced_test]
async fn test_minority_cannot_write() {
    let seed = start_seed().await.expect("seed should start");
    let n2 = start_joiner(2, &seed).await.expect("node 2 should join");
    let n3 = start_joiner(3, &seed).await.expect("node 3 should join");
    let first = seed.client().await.set("/first", Cas::Missing, "1").await.unwrap();
    wait_applied(&n3, first.revision().unwrap()).await;

    seed.shutdown();
    n2.shutdown();

    let client = d_store::Client::builder(n3.client_addr())
        .request_timeout(Duration::from_secs(3))
        .build()
        .await
        .unwrap();
    let write = tokio::time::timeout(
        Duration::from_secs(5),
        client.set("/should-fail", Cas::Missing, "no-majority"),
    )
    .await;
    assert!(
        write.is_err() || write.unwrap().is_err(),
        "Write should fail without majority"
    );

    n3.shutdown();
}
