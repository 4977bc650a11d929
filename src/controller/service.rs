use super::healthz::HealthMonitor;
use super::pool::NodeRegistry;
use super::types::{HealthCheckEvent, Registration};
use crate::error::{Error, Result};
use crate::node::protocol::{GetRequest, GetResponse, HealthzCode, PutRequest, PutResponse};

use crate::config::DEFAULT_FAILED_NODE_TTL;

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Front door of the cluster.
///
/// Writes are replicated to every `Ready` node in turn; reads ask every `Ready`
/// node and keep the highest version. Health events flow from the monitor into
/// the registry through a reconciliation task started by [`Controller::start`].
pub struct Controller {
    pool: Arc<NodeRegistry>,
    monitor: Arc<HealthMonitor>,
    shutdown: CancellationToken,
    failed_node_ttl: Duration,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Controller {
    pub fn new(
        pool: Arc<NodeRegistry>,
        monitor: Arc<HealthMonitor>,
        shutdown: &CancellationToken,
    ) -> Self {
        Self {
            pool,
            monitor,
            shutdown: shutdown.child_token(),
            failed_node_ttl: DEFAULT_FAILED_NODE_TTL,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// How long a node may sit in `Error` without re-registering before it is dropped.
    pub fn with_failed_node_ttl(mut self, ttl: Duration) -> Self {
        self.failed_node_ttl = ttl;
        self
    }

    pub fn pool(&self) -> &Arc<NodeRegistry> {
        &self.pool
    }

    pub fn monitor(&self) -> &Arc<HealthMonitor> {
        &self.monitor
    }

    /// Starts health monitoring, the task applying its events to the pool and the
    /// eviction of nodes that failed and never came back.
    pub fn start(&self) -> Result<()> {
        let dispatcher = self.monitor.start()?;
        let mut events = self
            .monitor
            .events()
            .ok_or_else(|| Error::Internal("health events already consumed".to_string()))?;

        let pool = self.pool.clone();
        let monitor = self.monitor.clone();
        let shutdown = self.shutdown.clone();

        let reconciler = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = events.recv() => match event {
                        Some(event) => reconcile(&pool, &monitor, event),
                        None => break,
                    },
                }
            }
            tracing::info!("Health reconciliation stopped");
        });

        let evictor = tokio::spawn(evict_loop(
            self.pool.clone(),
            self.monitor.clone(),
            self.failed_node_ttl,
            self.shutdown.clone(),
        ));

        self.tasks.lock().extend([dispatcher, reconciler, evictor]);
        tracing::info!("Controller started");
        Ok(())
    }

    /// Adds (or refreshes) a node and makes sure it is being probed.
    pub async fn register_node(&self, id: &str, address: &str) -> Result<()> {
        if id.is_empty() {
            return Err(Error::invalid("node id is missing"));
        }

        if address.is_empty() {
            return Err(Error::invalid("node address is missing"));
        }

        let registration = self.pool.add(id, address).await.map_err(|e| {
            tracing::warn!("Registration of node {} at {} failed: {}", id, address, e);
            e
        })?;

        // The old probe still targets the previous connection
        if let Registration::Replaced(_) = &registration {
            self.monitor.remove(id);
        }

        let client = registration.handle().client().clone();
        self.monitor.add(id, move || {
            let client = client.clone();
            async move { client.healthz().await }
        });

        Ok(())
    }

    pub async fn unregister_node(&self, id: &str) -> Result<()> {
        if id.is_empty() {
            return Err(Error::invalid("node id is missing"));
        }

        self.monitor.remove(id);
        if !self.pool.remove(id) {
            tracing::debug!("Unregister of unknown node {}", id);
        }

        Ok(())
    }

    /// Writes to every `Ready` node, in id order. The first failure aborts the
    /// write; nodes written before it keep the new entry.
    pub async fn put(&self, req: PutRequest) -> Result<PutResponse> {
        let nodes = self.pool.select();
        if nodes.is_empty() {
            return Err(Error::PoolEmpty);
        }

        let mut ack = None;
        for node in &nodes {
            match node.client().put(req.clone()).await {
                Ok(res) => ack = Some(res),
                Err(e) => {
                    tracing::warn!("Write of {:?} to node {} failed: {}", req.key, node.id, e);
                    return Err(e);
                }
            }
        }

        tracing::debug!("Replicated {:?} to {} nodes", req.key, nodes.len());
        ack.ok_or(Error::PoolEmpty)
    }

    /// Reads from every `Ready` node and returns the newest version seen.
    ///
    /// Replicas missing the key are skipped; the read is a miss only when all of
    /// them miss. Any other failure aborts the read.
    pub async fn get(&self, req: GetRequest) -> Result<GetResponse> {
        let nodes = self.pool.select();
        if nodes.is_empty() {
            return Err(Error::PoolEmpty);
        }

        let mut newest: Option<GetResponse> = None;
        let mut miss = None;

        for node in &nodes {
            match node.client().get(req.clone()).await {
                Ok(res) => {
                    if newest.as_ref().is_none_or(|cur| res.version >= cur.version) {
                        newest = Some(res);
                    }
                }
                Err(e) if e.is_not_found() => miss = Some(e),
                Err(e) => {
                    tracing::warn!("Read of {:?} from node {} failed: {}", req.key, node.id, e);
                    return Err(e);
                }
            }
        }

        newest.ok_or_else(|| miss.unwrap_or_else(|| Error::not_found(&req.key)))
    }

    /// Applies one probe outcome to the pool.
    pub fn apply_health_event(&self, event: HealthCheckEvent) {
        reconcile(&self.pool, &self.monitor, event);
    }

    /// Stops monitoring, closes every connection and waits for background tasks.
    pub async fn tear_down(&self) {
        self.monitor.stop();
        self.pool.close();
        self.shutdown.cancel();

        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!("Controller task ended abnormally: {}", e);
            }
        }

        tracing::info!("Controller stopped");
    }
}

/// A failed probe or an `ERROR` answer takes the node out of rotation and stops
/// probing it; it comes back only by registering again.
fn reconcile(pool: &NodeRegistry, monitor: &HealthMonitor, event: HealthCheckEvent) {
    match event.outcome {
        Ok(res) if res.code == HealthzCode::Ok => pool.mark_ready(&event.node_id),
        Ok(_) => {
            tracing::warn!("Node {} reported itself unhealthy", event.node_id);
            monitor.remove(&event.node_id);
            pool.mark_error(&event.node_id);
        }
        Err(e) => {
            tracing::warn!("Health probe of node {} failed: {}", event.node_id, e);
            monitor.remove(&event.node_id);
            pool.mark_error(&event.node_id);
        }
    }
}

async fn evict_loop(
    pool: Arc<NodeRegistry>,
    monitor: Arc<HealthMonitor>,
    ttl: Duration,
    shutdown: CancellationToken,
) {
    let period = (ttl / 2).max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                for id in pool.evict_failed(ttl) {
                    monitor.remove(&id);
                }
            }
        }
    }
    tracing::debug!("Failed node eviction stopped");
}
