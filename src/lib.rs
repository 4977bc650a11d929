//! Distributed Key-Value Store Library
//!
//! A small replicated key-value store: a controller fans every write out to all
//! healthy storage nodes and answers reads with the newest version any of them holds.
//! The binary (`main.rs`) runs either role.
//!
//! ## Architecture Modules
//!
//! - **`store`**: The node-local storage engine. A versioned map (last-writer-wins by
//!   version) optionally persisted as a JSON snapshot by a batching background worker.
//! - **`node`**: The storage node. Validates and serves `Put`/`Get`/`Healthz` over HTTP,
//!   defines the client seam the controller dials nodes through, and keeps the node
//!   registered with the controller.
//! - **`controller`**: The cluster front door. Node registry with per-node status, health
//!   monitor with per-node probe loops, and the replication logic for reads and writes.
//! - **`client`**: Client for the controller's public surface.
//! - **`bootstrap`**: Wires the components of each role together and serves them.
//!
//! Shared plumbing lives in `config`, `error` and `http`.

pub mod bootstrap;
pub mod client;
pub mod config;
pub mod controller;
pub mod error;
pub mod http;
pub mod node;
pub mod store;
