use bytes::Bytes;
use d_store::Cas;
use d_store::ClientError;
use d_store::Settings;
use tracing::info;
use tracing_test::traced_test;

use crate::commons::start_joiner;
use crate::commons::start_seed;
use crate::commons::wait_applied;

/// Writes over the size limits are refused and never reach the log;
/// the cluster keeps ordering writes afterwards
#[tokio::test]
#[traced_test]
async fn test_oversized_write_does_not_wedge_cluster() {
    let seed = start_seed().await.expect("seed should start");
    let n2 = start_joiner(2, &seed).await.expect("node 2 should join");
    let n3 = start_joiner(3, &seed).await.expect("node 3 should join");
    let client = n2.client().await;

    // let the three-member configuration govern
    for i in 0..8 {
        client.set("/warmup", Cas::Clobber, i.to_string()).await.unwrap();
    }

    let limits = Settings::default().network;
    let long = format!("/{}", "p".repeat(70_000));
    let err = client.set(&long, Cas::Missing, "x").await.unwrap_err();
    assert!(matches!(err, ClientError::InvalidPath { .. }));
    let err = client
        .set("/big", Cas::Missing, vec![0u8; limits.max_body_size + 1])
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::PayloadTooLarge { .. }));

    // the largest accepted write still crosses UDP to every member
    let widest = format!("/{}", "w".repeat(limits.max_path_size - 1));
    let cas = client
        .set(&widest, Cas::Missing, vec![7u8; limits.max_body_size])
        .await
        .unwrap();
    info!(revision = ?cas.revision(), "largest write committed");

    let after = client.set("/after", Cas::Missing, "ok").await.unwrap();
    for node in [&seed, &n3] {
        wait_applied(node, after.revision().unwrap()).await;
        let read = node.client().await.get(&widest, 0).await.unwrap();
        assert_eq!(read.body, Bytes::from(vec![7u8; limits.max_body_size]));
    }

    for node in [&n3, &n2, &seed] {
        node.shutdown();
    }
}
