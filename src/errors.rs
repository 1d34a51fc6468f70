//! Coordination Store Error Hierarchy
//!
//! Defines the error types of the replicated store, categorized by protocol
//! layer and operational concerns. Client-visible failures live in
//! [`ClientError`]; everything else is infrastructure or consensus internals.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;
use tokio::task::JoinError;

use crate::Cas;
use crate::Round;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Infrastructure-level failures (network, storage, serialization)
    #[error(transparent)]
    System(#[from] SystemError),

    /// Cluster configuration validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Paxos protocol failures
    #[error(transparent)]
    Consensus(#[from] ConsensusError),

    /// Failures reported back to the client session
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

/// User-visible error taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// CAS mismatch: store unchanged
    #[error("Precondition failed (current cas: {current})")]
    PreconditionFailed { current: Cas },

    #[error("Path not found: {0}")]
    NotFound(String),

    /// Unknown or deleted snapshot id
    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(u32),

    #[error("Invalid glob pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: &'static str },

    #[error("Invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    /// `Cas::Dir` used as a write precondition
    #[error("Invalid cas token for write: {0}")]
    InvalidCas(Cas),

    #[error("Path is read-only: {0}")]
    ReadOnly(String),

    #[error("Path is a directory: {0}")]
    IsDirectory(String),

    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// No quorum reachable in time; the request may or may not have committed
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Join rejected: {0}")]
    JoinRejected(String),

    /// Server answered with an error the client cannot map
    #[error("Server error: {0}")]
    Internal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConsensusError {
    /// Another proposer's higher round won the slot
    #[error("Slot {slot} preempted by round {by}")]
    Preempted { slot: u64, by: Round },

    /// Operation requires the leader role
    #[error("Not leader (known leader: {leader_id:?})")]
    NotLeader { leader_id: Option<u32> },

    /// Cluster membership change failures
    #[error(transparent)]
    Membership(#[from] MembershipError),

    /// Consensus task is gone
    #[error("Consensus task stopped")]
    Stopped,
}

#[derive(Debug, thiserror::Error)]
pub enum MembershipError {
    #[error("Node {0} is already a member")]
    AlreadyMember(u32),

    #[error("Node {0} is not a member")]
    UnknownMember(u32),

    /// Removing the member would leave the cluster empty
    #[error("Cannot remove the last member {0}")]
    LastMember(u32),

    /// Connection establishment failure during join
    #[error("Cluster join failed: {0}")]
    JoinFailed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Peer communication timeout
    #[error("Request to {addr} timed out after {duration:?}")]
    Timeout { addr: SocketAddr, duration: Duration },

    /// Retry policy exhaustion
    #[error("Retry timeout after {0:?}")]
    RetryTimeoutError(Duration),

    #[error("{0}")]
    TaskBackoffFailed(String),

    #[error("Datagram of {size} bytes exceeds limit {max}")]
    DatagramTooLarge { size: usize, max: usize },

    /// The socket buffer was full; datagram dropped
    #[error("Datagram to {0} dropped")]
    DatagramDropped(SocketAddr),

    #[error("Connection closed by {0}")]
    ConnectionClosed(String),

    /// Malformed node addresses
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Background task failed: {0}")]
    TaskFailed(#[from] JoinError),

    #[error("{0}")]
    SignalSendFailed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Disk I/O failures
    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error("Error occurred at path: {path}")]
    PathError { path: PathBuf, source: std::io::Error },

    /// Serialization failures for persisted data
    #[error(transparent)]
    BincodeError(#[from] bincode::Error),

    /// Embedded database errors
    #[error("Embedded database error: {0}")]
    DbError(String),

    /// Entries must be applied at head + 1
    #[error("Out of order apply: expected revision {expected}, got {actual}")]
    OutOfOrder { expected: u64, actual: u64 },

    /// Revision no longer in the retained history window
    #[error("Revision {0} is no longer retained")]
    RevisionCompacted(u64),

    #[error("Revision {requested} not applied yet (head {head})")]
    RevisionNotApplied { requested: u64, head: u64 },
}

#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Storage operation failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Serialization error")]
    Serialization(#[from] SerializationError),

    #[error("Node failed to start: {0}")]
    NodeStartFailed(String),
}

// Serialization is classified separately (across protocol layers and system layers)
#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("Bincode serialization failed: {0}")]
    Bincode(#[from] bincode::Error),
}

/// Error codes carried over the client session protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    PreconditionFailed,
    NotFound,
    InvalidSnapshot,
    InvalidPattern,
    InvalidPath,
    InvalidCas,
    ReadOnly,
    IsDirectory,
    PayloadTooLarge,
    Unavailable,
    JoinRejected,
    UnknownVerb,
    Internal,
}

impl ClientError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ClientError::PreconditionFailed { .. } => ErrorCode::PreconditionFailed,
            ClientError::NotFound(_) => ErrorCode::NotFound,
            ClientError::InvalidSnapshot(_) => ErrorCode::InvalidSnapshot,
            ClientError::InvalidPattern { .. } => ErrorCode::InvalidPattern,
            ClientError::InvalidPath { .. } => ErrorCode::InvalidPath,
            ClientError::InvalidCas(_) => ErrorCode::InvalidCas,
            ClientError::ReadOnly(_) => ErrorCode::ReadOnly,
            ClientError::IsDirectory(_) => ErrorCode::IsDirectory,
            ClientError::PayloadTooLarge { .. } => ErrorCode::PayloadTooLarge,
            ClientError::Unavailable(_) => ErrorCode::Unavailable,
            ClientError::JoinRejected(_) => ErrorCode::JoinRejected,
            ClientError::Internal(_) => ErrorCode::Internal,
        }
    }
}

impl Error {
    /// Collapses any error into what a client session may observe.
    ///
    /// Consensus and infrastructure failures surface as `Unavailable`.
    pub fn into_client_error(self) -> ClientError {
        match self {
            Error::Client(e) => e,
            Error::Consensus(ConsensusError::Membership(e)) => ClientError::JoinRejected(e.to_string()),
            other => ClientError::Unavailable(other.to_string()),
        }
    }
}

// ============== Conversion Implementations ============== //
impl From<NetworkError> for Error {
    fn from(e: NetworkError) -> Self {
        Error::System(SystemError::Network(e))
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Error::System(SystemError::Storage(e))
    }
}

impl From<SerializationError> for Error {
    fn from(e: SerializationError) -> Self {
        Error::System(SystemError::Serialization(e))
    }
}

impl From<MembershipError> for Error {
    fn from(e: MembershipError) -> Self {
        Error::Consensus(ConsensusError::Membership(e))
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        SerializationError::Bincode(e).into()
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        NetworkError::Io(e).into()
    }
}

impl From<sled::Error> for Error {
    fn from(err: sled::Error) -> Self {
        StorageError::DbError(err.to_string()).into()
    }
}

impl From<JoinError> for Error {
    fn from(err: JoinError) -> Self {
        NetworkError::TaskFailed(err).into()
    }
}
