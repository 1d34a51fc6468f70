use std::fmt::Debug;

use crate::AcceptorStorage;
use crate::Transport;

/// **This coding style learned from OpenRaft project type config.**
///
/// Binds the pluggable pieces of a node: the peer transport and the
/// acceptor's durable storage.
pub trait TypeConfig:
    Sync + Send + Sized + Debug + Clone + Copy + Default + Eq + PartialEq + Ord + PartialOrd + 'static
{
    type TR: Transport;

    type S: AcceptorStorage;
}

pub mod alias {
    use super::TypeConfig;

    pub type TROF<T> = <T as TypeConfig>::TR;

    pub type SOF<T> = <T as TypeConfig>::S;
}

/// Production configuration: UDP peers and sled-backed acceptor state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct StoreTypeConfig;

impl TypeConfig for StoreTypeConfig {
    type TR = crate::UdpTransport;

    type S = crate::SledAcceptorStorage;
}
