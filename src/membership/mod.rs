mod cluster_membership;
mod health_checker;
pub use cluster_membership::*;
pub(crate) use health_checker::*;
