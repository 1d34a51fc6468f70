//! Client session channel: length-delimited bincode frames over TCP.

pub mod protocol;
mod server;

pub(crate) use server::*;

#[cfg(test)]
mod protocol_test;
