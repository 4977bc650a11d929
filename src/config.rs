//! Runtime configuration for the two process roles.
//!
//! The binary fills these from command-line flags (see `main.rs`); library
//! users and tests build them directly and override only what they need.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(3);
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_EVENT_BUFFER: usize = 100;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_REGISTER_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_FAILED_NODE_TTL: Duration = Duration::from_secs(60);

/// Storage engine settings. `path == None` keeps the store purely in memory.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub path: Option<PathBuf>,
    pub flush_interval: Duration,
}

impl StoreConfig {
    pub fn persistent(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Time between two probes of the same node.
    pub check_interval: Duration,
    /// Upper bound for a single probe; exceeding it counts as a failed probe.
    pub check_timeout: Duration,
    /// Capacity of the health event queue.
    pub event_buffer: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_interval: DEFAULT_CHECK_INTERVAL,
            check_timeout: DEFAULT_CHECK_TIMEOUT,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub bind: SocketAddr,
    pub monitor: MonitorConfig,
    /// Deadline applied to every data operation served over HTTP.
    pub request_timeout: Duration,
    /// Bound on establishing a connection to a registering node.
    pub connect_timeout: Duration,
    /// Failed nodes that do not re-register within this window are forgotten.
    pub failed_node_ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub bind: SocketAddr,
    /// Address other processes use to reach this node. Defaults to the bound address.
    pub advertise: Option<String>,
    pub controller: String,
    pub store: StoreConfig,
    pub register_interval: Duration,
}
