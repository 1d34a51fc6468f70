//! Client of the coordination store
//!
//! Provides:
//! - [`Client`] - multiplexed session over one TCP connection
//! - [`ClientBuilder`] - configurable client construction
//! - [`EventStream`] - results of `watch` and `walk`
//!
//! # Basic Usage
//! ```ignore
//! use d_store::{Cas, Client};
//!
//! let client = Client::connect("127.0.0.1:8047".parse()?).await?;
//! let cas = client.set("/service/api", Cas::Missing, "10.0.0.1:80").await?;
//! let value = client.get("/service/api", 0).await?;
//!
//! let mut changes = client.watch("/service/**").await?;
//! while let Some(event) = changes.recv().await {
//!     println!("{:?}", event?);
//! }
//! ```

mod builder;
#[allow(clippy::module_inception)]
mod client;
mod config;
mod stream;

pub use builder::*;
pub use client::*;
pub use config::*;
pub use stream::*;
