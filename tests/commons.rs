use std::net::SocketAddr;
use std::ops::Deref;
use std::time::Duration;

use d_store::BackoffPolicy;
use d_store::Client;
use d_store::Node;
use d_store::NodeBuilder;
use d_store::Result;
use d_store::Settings;
use d_store::UdpTransport;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

pub const WAIT_FOR_NODE_READY_IN_SEC: u64 = 10;

/// Node on real sockets with its acceptor database in a temporary directory
pub struct TestNode {
    pub node: Node,
    shutdown_tx: watch::Sender<()>,
    _db: TempDir,
}

impl TestNode {
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    pub async fn client(&self) -> Client {
        Client::builder(self.client_addr())
            .request_timeout(Duration::from_secs(10))
            .build()
            .await
            .expect("Should connect to node")
    }
}

impl Deref for TestNode {
    type Target = Node;

    fn deref(&self) -> &Node {
        &self.node
    }
}

/// Settings with timers short enough for tests
pub fn node_settings(node_id: u32) -> Settings {
    let mut settings = Settings::default();
    settings.cluster.node_id = node_id;

    let consensus = &mut settings.consensus;
    consensus.alpha = 4;
    consensus.tick_interval_ms = 5;
    consensus.heartbeat_interval_ms = 30;
    consensus.election_timeout_min_ms = 150;
    consensus.election_timeout_max_ms = 300;
    consensus.accept_retry_ms = 50;
    consensus.fill_timeout_ms = 50;
    consensus.forward_retry_ms = 80;
    consensus.propose_timeout_ms = 8000;

    settings.retry.join = BackoffPolicy {
        max_retries: 5,
        timeout_ms: 8000,
        base_delay_ms: 100,
        max_delay_ms: 500,
    };
    settings
}

/// Starts a node on ephemeral UDP and TCP ports
pub async fn start_node(mut settings: Settings) -> Result<TestNode> {
    let db = tempfile::tempdir()?;
    settings.cluster.db_root_dir = Some(db.path().to_path_buf());

    let any: SocketAddr = "127.0.0.1:0".parse().expect("valid address");
    let transport = UdpTransport::bind(any, settings.network.max_datagram_size).await?;
    let listener = TcpListener::bind(any).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let node = NodeBuilder::from_settings(settings, shutdown_rx)
        .transport(transport)
        .client_listener(listener)
        .build()
        .await?;
    info!(node_id = node.node_id(), client_addr = %node.client_addr(), "test node started");

    Ok(TestNode {
        node,
        shutdown_tx,
        _db: db,
    })
}

/// Seeds a cluster and waits until node 1 leads it
pub async fn start_seed() -> Result<TestNode> {
    let seed = start_node(node_settings(1)).await?;
    tokio::time::timeout(
        Duration::from_secs(WAIT_FOR_NODE_READY_IN_SEC),
        seed.wait_for_status(|s| s.is_leader()),
    )
    .await
    .expect("seed should elect itself")?;
    Ok(seed)
}

pub async fn start_joiner(
    node_id: u32,
    through: &Node,
) -> Result<TestNode> {
    let mut settings = node_settings(node_id);
    settings.cluster.join_address = Some(through.client_addr());
    start_node(settings).await
}

/// Polls until `node` applied `revision`
pub async fn wait_applied(
    node: &Node,
    revision: u64,
) {
    tokio::time::timeout(Duration::from_secs(WAIT_FOR_NODE_READY_IN_SEC), async {
        while node.applied() < revision {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("node should catch up");
}
