use std::ops::Deref;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;

use super::fast_settings;
use super::MemNetwork;
use super::MemTypeConfig;
use crate::BackoffPolicy;
use crate::MemAcceptorStorage;
use crate::Node;
use crate::NodeBuilder;
use crate::Result;
use crate::Settings;

/// A node on an in-memory peer network, serving clients on a real local port
pub struct TestNode {
    pub node: Node,
    shutdown_tx: watch::Sender<()>,
}

impl TestNode {
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

impl Deref for TestNode {
    type Target = Node;

    fn deref(&self) -> &Node {
        &self.node
    }
}

pub async fn start_node(
    net: &MemNetwork,
    settings: Settings,
) -> Result<TestNode> {
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let node = NodeBuilder::<MemTypeConfig>::init(settings.clone(), shutdown_rx)
        .transport(net.transport(settings.cluster.peer_address))
        .acceptor_storage(MemAcceptorStorage::new())
        .client_listener(listener)
        .assemble()
        .await?;
    Ok(TestNode { node, shutdown_tx })
}

/// Seed node 1, already leading
pub async fn start_seed(net: &MemNetwork) -> TestNode {
    let seed = start_node(net, fast_settings(1)).await.unwrap();
    tokio::time::timeout(Duration::from_secs(10), seed.wait_for_status(|s| s.is_leader()))
        .await
        .expect("seed did not elect itself")
        .unwrap();
    seed
}

/// Node `node_id` joining through `through`
pub async fn start_joiner(
    net: &MemNetwork,
    node_id: u32,
    through: &Node,
) -> Result<TestNode> {
    let mut settings = fast_settings(node_id);
    settings.cluster.join_address = Some(through.client_addr());
    settings.retry.join = BackoffPolicy {
        max_retries: 5,
        timeout_ms: 5000,
        base_delay_ms: 50,
        max_delay_ms: 200,
    };
    start_node(net, settings).await
}
