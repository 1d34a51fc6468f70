mod builder;
mod node;
mod session;

pub use builder::*;
pub use node::*;
pub use session::*;
