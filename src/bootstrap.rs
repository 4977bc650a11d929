//! Process wiring for the two roles.
//!
//! `run_*` bind the configured address; `serve_*` take an already bound listener so
//! callers (tests included) can use ephemeral ports. Both return once `shutdown` is
//! cancelled and the role has released its resources.

use crate::client::ControllerClient;
use crate::config::{ControllerConfig, NodeConfig};
use crate::controller::{Controller, HealthMonitor, NodeRegistry};
use crate::node::register::{NodeInfo, run_registration, unregister};
use crate::node::{HttpConnector, NodeService};
use crate::store::StorageEngine;

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const STATS_INTERVAL: Duration = Duration::from_secs(30);

pub async fn run_controller(config: ControllerConfig, shutdown: CancellationToken) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind controller to {}", config.bind))?;

    serve_controller(listener, config, shutdown).await
}

pub async fn serve_controller(
    listener: TcpListener,
    config: ControllerConfig,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    // 1. Node pool and health monitoring:
    let connector = Arc::new(HttpConnector::new(config.connect_timeout, config.request_timeout));
    let pool = Arc::new(NodeRegistry::new(connector));
    let monitor = Arc::new(HealthMonitor::new(config.monitor.clone(), &shutdown));

    let controller = Arc::new(
        Controller::new(pool, monitor, &shutdown).with_failed_node_ttl(config.failed_node_ttl),
    );
    controller.start().context("failed to start controller")?;

    // 2. Stats reporter:
    let stats = spawn_stats_reporter(controller.clone(), shutdown.clone());

    // 3. HTTP server:
    let app = crate::controller::handlers::router(controller.clone(), config.request_timeout);

    tracing::info!("Controller listening on {}", listener.local_addr()?);

    let signal = shutdown.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move { signal.cancelled().await })
        .await;

    tracing::info!("Controller shutting down");
    shutdown.cancel();
    controller.tear_down().await;
    let _ = stats.await;

    served.context("controller server failed")
}

fn spawn_stats_reporter(controller: Arc<Controller>, shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(STATS_INTERVAL);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }

            let pool = controller.pool();
            let ready = pool.select();
            tracing::info!(
                "Cluster stats: {} registered, {} ready, {} monitored",
                pool.size(),
                ready.len(),
                controller.monitor().len()
            );
            for node in ready {
                tracing::debug!("  - {} at {}", node.id, node.address);
            }
        }
    })
}

pub async fn run_node(config: NodeConfig, shutdown: CancellationToken) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind node to {}", config.bind))?;

    serve_node(listener, config, shutdown).await
}

pub async fn serve_node(
    listener: TcpListener,
    config: NodeConfig,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let shutdown = shutdown.child_token();

    let address = match &config.advertise {
        Some(address) => address.clone(),
        None => listener.local_addr()?.to_string(),
    };
    let info = NodeInfo::new(address);

    // 1. Storage:
    let store = Arc::new(
        StorageEngine::open(config.store.clone(), &shutdown).context("failed to open store")?,
    );
    match &config.store.path {
        Some(path) => tracing::info!("Store loaded from {} ({} keys)", path.display(), store.len()),
        None => tracing::info!("Store is in memory only"),
    }

    // 2. RPC surface:
    let service = Arc::new(NodeService::new(info.id.clone(), store.clone()));
    let app = crate::node::handlers::router(service);

    // 3. Registration with the controller:
    let ctrl = Arc::new(ControllerClient::new(&config.controller));
    let registration = tokio::spawn(run_registration(
        ctrl.clone(),
        info.clone(),
        config.register_interval,
        shutdown.clone(),
    ));

    tracing::info!("Node {} listening on {}", info.id, info.address);

    let signal = shutdown.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move { signal.cancelled().await })
        .await;

    tracing::info!("Node {} shutting down", info.id);
    shutdown.cancel();
    let _ = registration.await;

    if let Err(e) = unregister(&ctrl, &info).await {
        tracing::warn!("{:#}", e);
    }
    ctrl.close();

    store.close().context("failed to close store")?;

    served.context("node server failed")
}
