use crate::client::ControllerClient;

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Identity a node announces to the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    pub id: String,
    pub address: String,
}

impl NodeInfo {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            id: generate_id(),
            address: address.into(),
        }
    }
}

/// Fresh random node id; a restarted node registers as a new member.
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub async fn register(ctrl: &ControllerClient, info: &NodeInfo) -> anyhow::Result<()> {
    ctrl.register_node(&info.id, &info.address)
        .await
        .with_context(|| format!("failed to register node {} at {}", info.id, info.address))
}

pub async fn unregister(ctrl: &ControllerClient, info: &NodeInfo) -> anyhow::Result<()> {
    ctrl.unregister_node(&info.id)
        .await
        .with_context(|| format!("failed to unregister node {}", info.id))?;

    tracing::info!("Node {} unregistered from controller", info.id);
    Ok(())
}

/// Registers `info` and keeps re-registering every `interval` until `shutdown`.
///
/// Re-registration is idempotent on the controller, and it lets a node rejoin on
/// its own after the controller restarts or after it was marked failed.
pub async fn run_registration(
    ctrl: Arc<ControllerClient>,
    info: NodeInfo,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let mut registered = false;

    loop {
        match register(&ctrl, &info).await {
            Ok(()) => {
                if !registered {
                    tracing::info!("Node {} registered with controller at {}", info.id, info.address);
                }
                registered = true;
            }
            Err(e) => {
                tracing::error!("{:#}", e);
                registered = false;
            }
        }

        // Spread re-registrations of nodes started together
        let jitter = Duration::from_millis(rand::random::<u64>() % 250);

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(interval + jitter) => {}
        }
    }

    tracing::debug!("Registration loop for node {} stopped", info.id);
}
