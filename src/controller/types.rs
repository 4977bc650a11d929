use crate::error::Result;
use crate::node::NodeClient;
use crate::node::protocol::HealthzResponse;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Lifecycle of a registered node. Only `Ready` nodes receive traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeStatus {
    /// Registered, no successful probe yet.
    Pending,
    Ready,
    /// A probe failed. The node stays out of rotation until it registers again,
    /// and is evicted from the registry if it does not.
    Error,
}

/// The controller's view of one node: identity, connection and status.
#[derive(Clone)]
pub struct NodeHandle {
    pub id: String,
    pub address: String,
    pub status: NodeStatus,
    /// When the node last entered `Error`.
    pub(crate) failed_at: Option<Instant>,
    client: Arc<dyn NodeClient>,
}

impl NodeHandle {
    pub fn new(id: impl Into<String>, address: impl Into<String>, client: Arc<dyn NodeClient>) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            status: NodeStatus::Pending,
            failed_at: None,
            client,
        }
    }

    pub fn client(&self) -> &Arc<dyn NodeClient> {
        &self.client
    }

    pub fn is_ready(&self) -> bool {
        self.status == NodeStatus::Ready
    }
}

impl fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeHandle")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Emitted by the registry whenever a connection to a node is (re)established.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNodeEvent {
    pub id: String,
    pub address: String,
}

/// Outcome of one health probe.
#[derive(Debug)]
pub struct HealthCheckEvent {
    pub node_id: String,
    pub outcome: Result<HealthzResponse>,
}

/// What `NodeRegistry::add` did with a registration.
#[derive(Debug, Clone)]
pub enum Registration {
    /// First registration of this id.
    Added(NodeHandle),
    /// Same id, same address: the existing handle and its status are kept.
    Unchanged(NodeHandle),
    /// Same id, new address: a fresh `Pending` handle replaced the old one.
    Replaced(NodeHandle),
}

impl Registration {
    pub fn handle(&self) -> &NodeHandle {
        match self {
            Registration::Added(h) | Registration::Unchanged(h) | Registration::Replaced(h) => h,
        }
    }
}
