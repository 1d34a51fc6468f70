//! A builder for assembling a store [`Node`].
//!
//! The [`NodeBuilder`] wires the peer transport, the acceptor storage, the
//! consensus task, the dispatcher and the client session server.
//!
//! ## Key Design Points
//! - **Default Components**: [`NodeBuilder::build`] binds a UDP transport, opens a sled acceptor
//!   database and binds the client listener from the configured addresses.
//! - **Customization**: any component can be supplied up front via setter methods (e.g.
//!   `transport()`, `acceptor_storage()`), which is how tests run nodes on an in-memory network.
//! - **Bootstrap**: a node without `cluster.join_address` seeds a fresh cluster. Otherwise it joins
//!   through the given member and starts from the returned [`JoinTicket`].
//!
//! ## Example
//! ```ignore
//! let (shutdown_tx, shutdown_rx) = watch::channel(());
//! let node = NodeBuilder::new(Some("config/n1.toml"), shutdown_rx)?
//!     .build()
//!     .await?;
//! node.wait().await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tracing::error;
use tracing::info;

use super::Node;
use super::Services;
use crate::alias::SOF;
use crate::alias::TROF;
use crate::utils::async_task::task_with_timeout_and_exponential_backoff;
use crate::Client;
use crate::ClusterMembership;
use crate::Consensus;
use crate::ConsensusChannels;
use crate::ConsensusHandle;
use crate::ConsensusStatus;
use crate::Dispatcher;
use crate::Error;
use crate::JoinTicket;
use crate::Member;
use crate::Result;
use crate::SessionServer;
use crate::Settings;
use crate::SledAcceptorStorage;
use crate::StoreTypeConfig;
use crate::SystemError;
use crate::TagSource;
use crate::Transport;
use crate::TypeConfig;
use crate::UdpTransport;
use crate::VersionedStore;
use crate::WatchRegistry;

pub struct NodeBuilder<T>
where T: TypeConfig
{
    pub(super) settings: Settings,
    pub(super) transport: Option<TROF<T>>,
    pub(super) acceptor_storage: Option<SOF<T>>,
    pub(super) client_listener: Option<TcpListener>,
    pub(super) shutdown_signal: watch::Receiver<()>,
}

impl<T> NodeBuilder<T>
where T: TypeConfig
{
    /// Core initialization logic shared by all construction paths
    pub fn init(
        settings: Settings,
        shutdown_signal: watch::Receiver<()>,
    ) -> Self {
        Self {
            settings,
            transport: None,
            acceptor_storage: None,
            client_listener: None,
            shutdown_signal,
        }
    }

    /// Sets a custom peer transport implementation
    pub fn transport(
        mut self,
        transport: TROF<T>,
    ) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets a custom acceptor storage implementation
    pub fn acceptor_storage(
        mut self,
        acceptor_storage: SOF<T>,
    ) -> Self {
        self.acceptor_storage = Some(acceptor_storage);
        self
    }

    /// Serves client sessions on an already bound listener
    pub fn client_listener(
        mut self,
        listener: TcpListener,
    ) -> Self {
        self.client_listener = Some(listener);
        self
    }

    /// Replaces the entire node configuration
    pub fn settings(
        mut self,
        settings: Settings,
    ) -> Self {
        self.settings = settings;
        self
    }

    pub fn node_settings(&self) -> &Settings {
        &self.settings
    }

    /// Starts every task of the node from the supplied components.
    ///
    /// # Errors
    /// `SystemError::NodeStartFailed` if a component is missing, and any
    /// error of joining the cluster.
    pub async fn assemble(self) -> Result<Node> {
        let missing = |what: &str| -> Error { SystemError::NodeStartFailed(format!("{what} not configured")).into() };
        let transport = Arc::new(self.transport.ok_or_else(|| missing("transport"))?);
        let storage = self.acceptor_storage.ok_or_else(|| missing("acceptor storage"))?;
        let listener = self.client_listener.ok_or_else(|| missing("client listener"))?;

        let settings = Arc::new(self.settings);
        let node_id = settings.cluster.node_id;
        let me = Member {
            node_id,
            peer_addr: transport.local_addr(),
            client_addr: listener.local_addr()?,
        };
        let seed = settings.cluster.is_seed();
        let alpha = settings.consensus.alpha;

        // 1. Membership: a seed owns a fresh cluster, a joiner learns it from the ticket
        let membership = Arc::new(if seed {
            ClusterMembership::bootstrap(me.clone(), alpha)
        } else {
            ClusterMembership::empty(alpha)
        });

        // 2. Peer channel
        let (peer_tx, peer_rx) = mpsc::channel(settings.consensus.event_channel_capacity);
        transport.listen(peer_tx, self.shutdown_signal.clone())?;

        // 3. Consensus task
        let (event_tx, event_rx) = mpsc::channel(settings.consensus.event_channel_capacity);
        let (committed_tx, committed_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ConsensusStatus::default());
        let tags = TagSource::new(node_id);
        let mut consensus = Consensus::<T>::new(
            node_id,
            settings.clone(),
            transport,
            storage,
            membership.clone(),
            seed,
            tags.clone(),
            ConsensusChannels {
                event_rx,
                peer_rx,
                committed_tx,
                status_tx,
                shutdown: self.shutdown_signal.clone(),
            },
        )?;
        let consensus_task = tokio::spawn(async move {
            let result = consensus.run().await;
            if let Err(e) = &result {
                error!("consensus stopped with unexpected error: {:?}", e);
            }
            result
        });
        let consensus_handle = ConsensusHandle::new(
            tags,
            event_tx,
            status_rx,
            Duration::from_millis(settings.consensus.propose_timeout_ms),
        );

        // 4. Dispatcher
        let store = Arc::new(VersionedStore::new(settings.store.history_window));
        let watches = Arc::new(WatchRegistry::new(settings.watch.clone()));
        let (mut dispatcher, dispatcher_handle) = Dispatcher::new(
            store,
            settings.store.dedupe_window,
            watches,
            committed_rx,
            self.shutdown_signal.clone(),
        );

        // 5. Joiner: fetch the ticket, then start both state machines from it
        if let Some(join_address) = settings.cluster.join_address {
            let ticket = join_cluster(&settings, join_address, me.clone()).await?;
            info!(node_id, revision = ticket.revision, "joined cluster through {}", join_address);
            let (revision, snapshot) = (ticket.revision, ticket.membership.clone());
            dispatcher.restore(ticket);
            consensus_handle.restore(revision, snapshot).await?;
        }
        let dispatcher_task = tokio::spawn(dispatcher.run());

        // 6. Client sessions
        let services = Services {
            consensus: consensus_handle,
            dispatcher: dispatcher_handle,
            membership,
            settings,
        };
        let server = SessionServer::new(listener, services.clone(), self.shutdown_signal.clone());
        let server_task = tokio::spawn(server.run());

        info!(node_id, peer_addr = %me.peer_addr, client_addr = %me.client_addr, seed, "node started");
        Ok(Node {
            me,
            services,
            tasks: vec![consensus_task, dispatcher_task, server_task],
        })
    }
}

impl NodeBuilder<StoreTypeConfig> {
    /// Creates a builder from layered configuration
    ///
    /// # Arguments
    /// * `config_path` - Optional node-specific configuration file applied on top of defaults,
    ///   `CONFIG_PATH` and environment variables
    /// * `shutdown_signal` - Watch channel for graceful shutdown signaling
    pub fn new(
        config_path: Option<&str>,
        shutdown_signal: watch::Receiver<()>,
    ) -> Result<Self> {
        let mut settings = Settings::new()?;
        if let Some(p) = config_path {
            info!("with_override_config from: {}", &p);
            settings = settings.with_override_config(p)?;
        }
        Ok(Self::init(settings.validate()?, shutdown_signal))
    }

    /// Constructs a builder from in-memory settings
    pub fn from_settings(
        settings: Settings,
        shutdown_signal: watch::Receiver<()>,
    ) -> Self {
        Self::init(settings, shutdown_signal)
    }

    /// Fills unconfigured components with the production defaults and starts the node.
    ///
    /// - binds the UDP transport on `cluster.peer_address`
    /// - opens the sled acceptor database (temporary without `cluster.db_root_dir`)
    /// - binds the client listener on `cluster.client_address`
    pub async fn build(mut self) -> Result<Node> {
        let cluster = self.settings.cluster.clone();
        if self.transport.is_none() {
            let transport = UdpTransport::bind(cluster.peer_address, self.settings.network.max_datagram_size).await?;
            self.transport = Some(transport);
        }
        if self.acceptor_storage.is_none() {
            let storage = SledAcceptorStorage::open(cluster.db_root_dir.as_deref(), cluster.node_id)?;
            self.acceptor_storage = Some(storage);
        }
        if self.client_listener.is_none() {
            self.client_listener = Some(TcpListener::bind(cluster.client_address).await?);
        }
        self.assemble().await
    }
}

/// Asks the member at `join_address` to admit `me`, retried per `retry.join`.
async fn join_cluster(
    settings: &Settings,
    join_address: std::net::SocketAddr,
    me: Member,
) -> Result<JoinTicket> {
    let max_frame_length = settings.network.max_frame_length;
    task_with_timeout_and_exponential_backoff(
        || {
            let me = me.clone();
            async move {
                let client = Client::builder(join_address)
                    .max_frame_length(max_frame_length)
                    .connect_retries(1)
                    .build()
                    .await?;
                Ok::<_, Error>(client.join(me).await?)
            }
        },
        settings.retry.join,
    )
    .await
}
