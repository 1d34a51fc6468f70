//! the test_utils folder here will share utils or test components between unit
//! tests and integration tests
mod common;
mod mem_network;
mod mock_type_config;
mod node;

pub use common::*;
pub use mem_network::*;
pub use mock_type_config::*;
pub use node::*;
