use bytes::Bytes;
use d_store::Cas;
use tracing::info;
use tracing_test::traced_test;

use crate::commons::start_joiner;
use crate::commons::start_seed;
use crate::commons::wait_applied;

/// Two nodes join a seed one after another; every node serves every write
#[tokio::test]
#[traced_test]
async fn test_three_nodes_join_and_share_state() {
    let seed = start_seed().await.expect("seed should start");
    let seed_client = seed.client().await;
    let before = seed_client.set("/before", Cas::Missing, "seeded").await.unwrap();

    let n2 = start_joiner(2, &seed).await.expect("node 2 should join");
    let n3 = start_joiner(3, &n2).await.expect("node 3 should join through node 2");
    info!("cluster of three formed");

    for node in [&n2, &n3] {
        wait_applied(node, before.revision().unwrap()).await;
        let client = node.client().await;
        assert_eq!(
            client.get("/before", 0).await.unwrap().body,
            Bytes::from_static(b"seeded")
        );
    }

    // writes through a follower are ordered by the leader
    let n3_client = n3.client().await;
    let cas = n3_client.set("/from-3", Cas::Missing, "x").await.unwrap();
    for node in [&seed, &n2] {
        wait_applied(node, cas.revision().unwrap()).await;
        assert_eq!(node.client().await.get("/from-3", 0).await.unwrap().cas, cas);
    }

    let ids: Vec<u32> = seed.members().iter().map(|m| m.node_id).collect();
    assert_eq!(ids, vec![1, 2, 3]);

    for node in [&n3, &n2, &seed] {
        node.shutdown();
    }
}
