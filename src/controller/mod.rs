//! Cluster Controller
//!
//! Tracks the storage nodes, watches their health and fans client reads and writes
//! out to them.
//!
//! ## Core Concepts
//! - **Registry**: `NodeRegistry` holds one connection per registered node together with
//!   its status (`Pending` → `Ready` / `Error`). Only `Ready` nodes are selected for traffic.
//! - **Health**: `HealthMonitor` probes every node on a fixed interval with a per-probe
//!   timeout and publishes the outcomes on a bounded queue.
//! - **Reconciliation**: the `Controller` consumes health events; a successful probe makes a
//!   node `Ready`, a failed one marks it `Error` and stops probing it.
//! - **Replication**: a write goes to all `Ready` nodes sequentially and fails on the first
//!   error; a read queries all `Ready` nodes and keeps the highest version.

pub mod handlers;
pub mod healthz;
pub mod pool;
pub mod protocol;
pub mod service;
pub mod types;

pub use healthz::HealthMonitor;
pub use pool::NodeRegistry;
pub use service::Controller;
pub use types::{HealthCheckEvent, NewNodeEvent, NodeHandle, NodeStatus, Registration};
