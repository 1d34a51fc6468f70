mod acceptor_storage;
mod cas;
mod glob;
mod path;
mod snapshot;
mod state_machine;

pub use acceptor_storage::*;
pub use cas::*;
pub use glob::Glob;
pub use path::validate_path;
pub use path::PING_PATH;
pub use snapshot::*;
pub use state_machine::*;
