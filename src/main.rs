use clap::{Args, Parser, Subcommand};
use distributed_kv::bootstrap;
use distributed_kv::config::{
    ControllerConfig, DEFAULT_CONNECT_TIMEOUT, MonitorConfig, NodeConfig, StoreConfig,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "distributed-kv", version, about = "Replicated versioned key-value store")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log filter, e.g. `info` or `distributed_kv=debug`
    #[arg(long, global = true, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the controller
    Controller(ControllerArgs),
    /// Run a storage node that registers with the controller
    Node(NodeArgs),
}

#[derive(Args, Debug)]
struct ControllerArgs {
    #[arg(long, env = "CTRL_ADDRESS", default_value = "127.0.0.1:7000")]
    bind: SocketAddr,

    #[arg(long, default_value_t = 10_000)]
    check_interval_ms: u64,

    #[arg(long, default_value_t = 2_000)]
    check_timeout_ms: u64,

    #[arg(long, default_value_t = 100)]
    event_buffer: usize,

    #[arg(long, default_value_t = 5_000)]
    request_timeout_ms: u64,

    /// Forget nodes that stay failed this long without registering again
    #[arg(long, default_value_t = 60_000)]
    failed_node_ttl_ms: u64,
}

#[derive(Args, Debug)]
struct NodeArgs {
    #[arg(long, env = "NODE_ADDRESS", default_value = "127.0.0.1:7100")]
    bind: SocketAddr,

    /// Address announced to the controller (defaults to the bound address)
    #[arg(long)]
    advertise: Option<String>,

    #[arg(long, env = "CTRL_ADDRESS", default_value = "127.0.0.1:7000")]
    controller: String,

    /// Snapshot file; without it the node keeps data in memory only
    #[arg(long, env = "STORE_PATH")]
    store_path: Option<PathBuf>,

    #[arg(long, default_value_t = 3_000)]
    flush_interval_ms: u64,

    #[arg(long, default_value_t = 5_000)]
    register_interval_ms: u64,
}

impl From<ControllerArgs> for ControllerConfig {
    fn from(args: ControllerArgs) -> Self {
        Self {
            bind: args.bind,
            monitor: MonitorConfig {
                check_interval: Duration::from_millis(args.check_interval_ms),
                check_timeout: Duration::from_millis(args.check_timeout_ms),
                event_buffer: args.event_buffer,
            },
            request_timeout: Duration::from_millis(args.request_timeout_ms),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            failed_node_ttl: Duration::from_millis(args.failed_node_ttl_ms),
        }
    }
}

impl From<NodeArgs> for NodeConfig {
    fn from(args: NodeArgs) -> Self {
        Self {
            bind: args.bind,
            advertise: args.advertise,
            controller: args.controller,
            store: StoreConfig {
                path: args.store_path,
                flush_interval: Duration::from_millis(args.flush_interval_ms),
            },
            register_interval: Duration::from_millis(args.register_interval_ms),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let shutdown = CancellationToken::new();

    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Interrupt received, shutting down");
                signal.cancel();
            }
            Err(e) => tracing::error!("Failed to listen for interrupt: {}", e),
        }
    });

    match cli.command {
        Command::Controller(args) => {
            tracing::info!("Starting controller on {}", args.bind);
            bootstrap::run_controller(args.into(), shutdown).await
        }
        Command::Node(args) => {
            tracing::info!("Starting node on {} (controller {})", args.bind, args.controller);
            bootstrap::run_node(args.into(), shutdown).await
        }
    }
}
