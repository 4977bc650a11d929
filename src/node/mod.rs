//! Storage Node
//!
//! A node owns one [`StorageEngine`](crate::store::StorageEngine) and exposes it over RPC.
//!
//! ## Core Concepts
//! - **Service**: `NodeService` validates `Put`/`Get` requests and answers health probes.
//! - **Transport**: `NodeClient` / `Connector` are the seams the controller dials nodes through,
//!   with an HTTP implementation and an in-process one.
//! - **Registration**: a running node announces itself to the controller and keeps doing so
//!   periodically; it unregisters on graceful shutdown.

pub mod client;
pub mod handlers;
pub mod protocol;
pub mod register;
pub mod service;

pub use client::{Connector, HttpConnector, LocalConnector, NodeClient};
pub use register::NodeInfo;
pub use service::NodeService;

#[cfg(test)]
mod tests;
