use std::time::Duration;

use bytes::Bytes;
use d_store::Cas;
use d_store::ClientError;
use tracing::info;
use tracing_test::traced_test;

use crate::commons::start_seed;

/// Lock-style usage: only one of two competing creators wins
#[tokio::test]
#[traced_test]
async fn test_exclusive_create_over_real_sockets() {
    let seed = start_seed().await.expect("seed should start");
    let alice = seed.client().await;
    let bob = seed.client().await;

    let won = alice.set("/lock/leader", Cas::Missing, "alice").await.unwrap();
    let lost = bob.set("/lock/leader", Cas::Missing, "bob").await.unwrap_err();
    assert_eq!(lost, ClientError::PreconditionFailed { current: won });

    let owner = bob.get("/lock/leader", 0).await.unwrap();
    assert_eq!(owner.body, Bytes::from_static(b"alice"));

    alice.del("/lock/leader", won).await.unwrap();
    bob.set("/lock/leader", Cas::Missing, "bob").await.unwrap();
    info!("lock handed over");

    seed.shutdown();
}

#[tokio::test]
async fn test_snapshot_survives_later_writes() {
    let seed = start_seed().await.expect("seed should start");
    let client = seed.client().await;

    client.set("/conf/a", Cas::Missing, "1").await.unwrap();
    client.set("/conf/b", Cas::Missing, "2").await.unwrap();
    let (sid, rev) = client.snap().await.unwrap();

    client.set("/conf/a", Cas::Clobber, "changed").await.unwrap();
    let b = client.get("/conf/b", 0).await.unwrap().cas;
    client.del("/conf/b", b).await.unwrap();

    assert_eq!(client.get("/conf/a", sid).await.unwrap().body, Bytes::from_static(b"1"));
    assert_eq!(client.get("/conf/b", sid).await.unwrap().body, Bytes::from_static(b"2"));
    assert_eq!(client.get("/conf", sid).await.unwrap().body, Bytes::from_static(b"a\nb"));
    assert_eq!(client.get("/conf", 0).await.unwrap().body, Bytes::from_static(b"a"));
    assert!(client.noop().await.unwrap() > rev);

    client.del_snap(sid).await.unwrap();
    seed.shutdown();
}

#[tokio::test]
async fn test_watch_and_walk_over_real_sockets() {
    let seed = start_seed().await.expect("seed should start");
    let watcher = seed.client().await;
    let writer = seed.client().await;

    let mut changes = watcher.watch("/svc/*").await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    for name in ["b", "a", "c"] {
        writer
            .set(&format!("/svc/{name}"), Cas::Missing, name)
            .await
            .unwrap();
    }

    let mut seen = Vec::new();
    while seen.len() < 3 {
        let event = tokio::time::timeout(Duration::from_secs(5), changes.recv())
            .await
            .expect("watch should deliver")
            .unwrap()
            .unwrap();
        seen.push(event.path);
    }
    // commit order
    assert_eq!(seen, vec!["/svc/b", "/svc/a", "/svc/c"]);
    changes.cancel().await.unwrap();

    let walked: Vec<String> = writer
        .walk("/svc/*")
        .await
        .unwrap()
        .collect()
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.path)
        .collect();
    // tree order
    assert_eq!(walked, vec!["/svc/a", "/svc/b", "/svc/c"]);

    seed.shutdown();
}
