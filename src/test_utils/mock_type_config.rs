use crate::MemAcceptorStorage;
use crate::MockTransport;
use crate::TypeConfig;

/// Consensus over a mocked transport, for asserting on outbound messages
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Ord, PartialOrd)]
pub struct MockTypeConfig;

impl TypeConfig for MockTypeConfig {
    type TR = MockTransport;

    type S = MemAcceptorStorage;
}
