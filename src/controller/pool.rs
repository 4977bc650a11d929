use super::types::{NewNodeEvent, NodeHandle, NodeStatus, Registration};
use crate::error::{Error, Result};
use crate::node::Connector;

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

const NEW_NODE_BUFFER: usize = 100;

struct PoolState {
    nodes: HashMap<String, NodeHandle>,
    closed: bool,
}

/// Registered nodes keyed by id, with their connections and statuses.
///
/// Reads (`select`, `status`, `size`) share a read lock; membership and status
/// changes take the write lock. Dialing a node happens outside the lock.
pub struct NodeRegistry {
    connector: Arc<dyn Connector>,
    state: RwLock<PoolState>,
    new_nodes: Mutex<Option<mpsc::Sender<NewNodeEvent>>>,
}

impl NodeRegistry {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            state: RwLock::new(PoolState {
                nodes: HashMap::new(),
                closed: false,
            }),
            new_nodes: Mutex::new(None),
        }
    }

    /// Connects to `address` and tracks the node as `Pending`.
    ///
    /// Registering an id again with the same address is a no-op; with another
    /// address the old connection is closed and replaced.
    pub async fn add(&self, id: &str, address: &str) -> Result<Registration> {
        {
            let state = self.state.read();
            if state.closed {
                return Err(Error::PoolClosed);
            }
            if let Some(existing) = state.nodes.get(id)
                && existing.address == address
            {
                return Ok(Registration::Unchanged(existing.clone()));
            }
        }

        let client = self.connector.connect(address).await?;

        let (handle, previous) = {
            let mut state = self.state.write();
            if state.closed {
                client.close();
                return Err(Error::PoolClosed);
            }

            // A concurrent registration of the same node won the dial
            if let Some(existing) = state.nodes.get(id)
                && existing.address == address
            {
                client.close();
                return Ok(Registration::Unchanged(existing.clone()));
            }

            let handle = NodeHandle::new(id, address, client);
            let previous = state.nodes.insert(id.to_string(), handle.clone());
            (handle, previous)
        };

        self.emit_new_node(NewNodeEvent {
            id: id.to_string(),
            address: address.to_string(),
        });

        match previous {
            Some(old) => {
                old.client().close();
                tracing::info!("Node {} moved from {} to {}", id, old.address, address);
                Ok(Registration::Replaced(handle))
            }
            None => {
                tracing::info!("Node {} added at {}", id, address);
                Ok(Registration::Added(handle))
            }
        }
    }

    /// Forgets a node and closes its connection. Returns whether it was known.
    pub fn remove(&self, id: &str) -> bool {
        let removed = self.state.write().nodes.remove(id);

        match removed {
            Some(handle) => {
                handle.client().close();
                tracing::info!("Node {} removed", id);
                true
            }
            None => false,
        }
    }

    /// Snapshot of the `Ready` nodes, ordered by id.
    pub fn select(&self) -> Vec<NodeHandle> {
        let state = self.state.read();

        let mut ready: Vec<NodeHandle> = state
            .nodes
            .values()
            .filter(|handle| handle.is_ready())
            .cloned()
            .collect();
        ready.sort_by(|a, b| a.id.cmp(&b.id));
        ready
    }

    pub fn mark_ready(&self, id: &str) {
        self.set_status(id, NodeStatus::Ready);
    }

    pub fn mark_error(&self, id: &str) {
        self.set_status(id, NodeStatus::Error);
    }

    fn set_status(&self, id: &str, status: NodeStatus) {
        let mut state = self.state.write();

        let Some(handle) = state.nodes.get_mut(id) else {
            tracing::debug!("Status update for unknown node {} ignored", id);
            return;
        };

        if handle.status != status {
            tracing::info!("Node {} is now {:?} (was {:?})", id, status, handle.status);
            handle.status = status;
            handle.failed_at = (status == NodeStatus::Error).then(Instant::now);
        }
    }

    /// Drops nodes that have stayed `Error` for at least `horizon` and closes their
    /// connections. Returns the evicted ids.
    pub fn evict_failed(&self, horizon: Duration) -> Vec<String> {
        let evicted: Vec<NodeHandle> = {
            let mut state = self.state.write();

            let expired: Vec<String> = state
                .nodes
                .values()
                .filter(|handle| handle.failed_at.is_some_and(|at| at.elapsed() >= horizon))
                .map(|handle| handle.id.clone())
                .collect();

            expired
                .iter()
                .filter_map(|id| state.nodes.remove(id))
                .collect()
        };

        for handle in &evicted {
            handle.client().close();
            tracing::info!("Node {} evicted after failing for {:?}", handle.id, horizon);
        }

        evicted.into_iter().map(|handle| handle.id).collect()
    }

    pub fn status(&self, id: &str) -> Option<NodeStatus> {
        self.state.read().nodes.get(id).map(|handle| handle.status)
    }

    pub fn get(&self, id: &str) -> Option<NodeHandle> {
        self.state.read().nodes.get(id).cloned()
    }

    /// Number of registered nodes, whatever their status.
    pub fn size(&self) -> usize {
        self.state.read().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.state.read().closed
    }

    /// Stream of newly connected nodes. A new subscription replaces the previous one.
    pub fn subscribe(&self) -> mpsc::Receiver<NewNodeEvent> {
        let (tx, rx) = mpsc::channel(NEW_NODE_BUFFER);
        *self.new_nodes.lock() = Some(tx);
        rx
    }

    fn emit_new_node(&self, event: NewNodeEvent) {
        let mut slot = self.new_nodes.lock();

        let Some(tx) = slot.as_ref() else {
            return;
        };

        match tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                tracing::warn!("New node queue full, dropping event for {}", event.id);
            }
            Err(TrySendError::Closed(_)) => {
                *slot = None;
            }
        }
    }

    /// Closes every connection and refuses further registrations. Idempotent.
    pub fn close(&self) {
        let drained: Vec<NodeHandle> = {
            let mut state = self.state.write();
            if state.closed {
                return;
            }
            state.closed = true;
            state.nodes.drain().map(|(_, handle)| handle).collect()
        };

        for handle in &drained {
            handle.client().close();
        }
        self.new_nodes.lock().take();

        tracing::info!("Node pool closed ({} connections released)", drained.len());
    }
}
