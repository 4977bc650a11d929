//! Health Monitor
//!
//! Runs one periodic probe loop per registered node and reports every outcome as a
//! [`HealthCheckEvent`] on a bounded queue. The monitor never decides what a failure
//! means; the controller consumes the events and updates node statuses.
//!
//! Probes are stored type-erased, the same way handlers are kept in a registry:
//! any `Fn() -> impl Future<Output = Result<HealthzResponse>>` can be monitored.

use super::types::HealthCheckEvent;
use crate::config::MonitorConfig;
use crate::error::{Error, Result};
use crate::node::protocol::HealthzResponse;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub type ProbeFuture = Pin<Box<dyn Future<Output = Result<HealthzResponse>> + Send>>;

/// Type-erased health probe for one node.
pub type ProbeFn = Arc<dyn Fn() -> ProbeFuture + Send + Sync>;

const MIN_CHECK_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Clone)]
struct CheckItem {
    node_id: String,
    probe: ProbeFn,
    /// Stops this node's loop only.
    token: CancellationToken,
}

pub struct HealthMonitor {
    config: MonitorConfig,
    checks: DashMap<String, CheckItem>,
    intake_tx: Mutex<Option<mpsc::UnboundedSender<CheckItem>>>,
    intake_rx: Mutex<Option<mpsc::UnboundedReceiver<CheckItem>>>,
    events_tx: mpsc::Sender<HealthCheckEvent>,
    events_rx: Mutex<Option<mpsc::Receiver<HealthCheckEvent>>>,
    shutdown: CancellationToken,
}

impl HealthMonitor {
    /// The monitor stops with `shutdown`, or earlier through [`HealthMonitor::stop`].
    pub fn new(config: MonitorConfig, shutdown: &CancellationToken) -> Self {
        let (intake_tx, intake_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::channel(config.event_buffer.max(1));

        Self {
            config,
            checks: DashMap::new(),
            intake_tx: Mutex::new(Some(intake_tx)),
            intake_rx: Mutex::new(Some(intake_rx)),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            shutdown: shutdown.child_token(),
        }
    }

    /// Starts probing `node_id`. Returns `false` when the node is already monitored
    /// or the monitor was stopped.
    ///
    /// Checks added before [`HealthMonitor::start`] wait in the intake queue.
    pub fn add<F, Fut>(&self, node_id: &str, check: F) -> bool
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HealthzResponse>> + Send + 'static,
    {
        let probe: ProbeFn = Arc::new(move || Box::pin(check()) as ProbeFuture);

        let guard = self.intake_tx.lock();
        let Some(intake) = guard.as_ref() else {
            tracing::warn!("Health monitor stopped, not monitoring node {}", node_id);
            return false;
        };

        match self.checks.entry(node_id.to_string()) {
            Entry::Occupied(_) => {
                tracing::debug!("Node {} is already monitored", node_id);
                false
            }
            Entry::Vacant(slot) => {
                let item = CheckItem {
                    node_id: node_id.to_string(),
                    probe,
                    token: self.shutdown.child_token(),
                };
                slot.insert(item.clone());

                if intake.send(item).is_err() {
                    tracing::warn!("Health dispatcher gone, node {} will not be probed", node_id);
                }

                tracing::info!("Monitoring node {}", node_id);
                true
            }
        }
    }

    /// Stops probing `node_id`. Returns whether it was monitored.
    pub fn remove(&self, node_id: &str) -> bool {
        match self.checks.remove(node_id) {
            Some((_, item)) => {
                item.token.cancel();
                tracing::info!("Stopped monitoring node {}", node_id);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.checks.contains_key(node_id)
    }

    /// Number of monitored nodes.
    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// The event queue. Only one consumer exists: later calls return `None`.
    pub fn events(&self) -> Option<mpsc::Receiver<HealthCheckEvent>> {
        self.events_rx.lock().take()
    }

    /// Spawns the dispatcher, which starts one probe loop per added node.
    /// The returned handle completes once the monitor is stopped.
    pub fn start(&self) -> Result<JoinHandle<()>> {
        let Some(mut intake) = self.intake_rx.lock().take() else {
            return Err(Error::Internal("health monitor already started".to_string()));
        };

        let events = self.events_tx.clone();
        let interval = self.config.check_interval.max(MIN_CHECK_INTERVAL);
        let timeout = self.config.check_timeout;
        let shutdown = self.shutdown.clone();

        tracing::info!(
            "Health monitor started (interval {:?}, timeout {:?})",
            interval,
            timeout
        );

        Ok(tokio::spawn(async move {
            let mut loops = JoinSet::new();

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    item = intake.recv() => match item {
                        Some(item) if !item.token.is_cancelled() => {
                            loops.spawn(check_loop(item, events.clone(), interval, timeout));
                        }
                        Some(_) => {}
                        None => break,
                    },
                    Some(_) = loops.join_next(), if !loops.is_empty() => {}
                }
            }

            loops.shutdown().await;
            tracing::info!("Health monitor stopped");
        }))
    }

    /// Cancels every probe loop and refuses new nodes. Idempotent.
    pub fn stop(&self) {
        self.shutdown.cancel();
        self.intake_tx.lock().take();
        self.checks.clear();
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

async fn check_loop(
    item: CheckItem,
    events: mpsc::Sender<HealthCheckEvent>,
    interval: Duration,
    timeout: Duration,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = item.token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let outcome = match tokio::time::timeout(timeout, (item.probe)()).await {
            Ok(result) => result,
            Err(_) => Err(Error::ProbeTimeout(timeout)),
        };

        if let Err(e) = &outcome {
            tracing::debug!("Probe of node {} failed: {}", item.node_id, e);
        }

        let event = HealthCheckEvent {
            node_id: item.node_id.clone(),
            outcome,
        };

        // A full queue holds this loop until the consumer catches up
        tokio::select! {
            _ = item.token.cancelled() => break,
            sent = events.send(event) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }

    tracing::debug!("Probe loop for node {} exited", item.node_id);
}
