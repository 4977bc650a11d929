//! Node Transport
//!
//! The controller never talks to a node directly: it goes through a [`NodeClient`]
//! obtained from a [`Connector`]. Two transports are provided:
//! - **HTTP** ([`HttpConnector`]): JSON over HTTP against a node's router.
//! - **In-process** ([`LocalConnector`]): calls a [`NodeService`] living in the same
//!   process, used to embed a whole cluster in one binary and in tests.

use super::protocol::{
    ENDPOINT_GET, ENDPOINT_HEALTHZ, ENDPOINT_PUT, GetRequest, GetResponse, HealthzResponse,
    PutRequest, PutResponse,
};
use super::service::NodeService;
use crate::error::{Error, Result};
use crate::http::{base_url, get_json, host_port, post_json};

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;

/// Remote view of a node's RPC surface.
#[async_trait]
pub trait NodeClient: Send + Sync {
    async fn put(&self, req: PutRequest) -> Result<PutResponse>;

    async fn get(&self, req: GetRequest) -> Result<GetResponse>;

    async fn healthz(&self) -> Result<HealthzResponse>;

    /// Releases the connection. Calls made afterwards fail with [`Error::Unavailable`].
    fn close(&self);
}

/// Establishes connections to nodes by address.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, address: &str) -> Result<Arc<dyn NodeClient>>;
}

// ============================================================
// HTTP
// ============================================================

pub struct HttpConnector {
    http: reqwest::Client,
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl HttpConnector {
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            connect_timeout,
            request_timeout,
        }
    }
}

#[async_trait]
impl Connector for HttpConnector {
    /// Checks that something accepts TCP connections at `address` before handing
    /// out a client, so registration of an unreachable node fails up front.
    async fn connect(&self, address: &str) -> Result<Arc<dyn NodeClient>> {
        match tokio::time::timeout(self.connect_timeout, TcpStream::connect(host_port(address)))
            .await
        {
            Ok(Ok(_probe)) => {}
            Ok(Err(e)) => {
                return Err(Error::unavailable(
                    address,
                    format!("cannot connect to node: {}", e),
                ));
            }
            Err(_) => {
                return Err(Error::unavailable(
                    address,
                    format!("connect timed out after {:?}", self.connect_timeout),
                ));
            }
        }

        Ok(Arc::new(HttpNodeClient {
            address: address.to_string(),
            base_url: base_url(address),
            http: self.http.clone(),
            timeout: self.request_timeout,
            closed: AtomicBool::new(false),
        }))
    }
}

struct HttpNodeClient {
    address: String,
    base_url: String,
    http: reqwest::Client,
    timeout: Duration,
    closed: AtomicBool,
}

impl HttpNodeClient {
    fn url(&self, endpoint: &str) -> Result<String> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::unavailable(&self.address, "connection closed"));
        }

        Ok(format!("{}{}", self.base_url, endpoint))
    }
}

#[async_trait]
impl NodeClient for HttpNodeClient {
    async fn put(&self, req: PutRequest) -> Result<PutResponse> {
        let url = self.url(ENDPOINT_PUT)?;
        post_json(&self.http, &self.address, url, &req, self.timeout).await
    }

    async fn get(&self, req: GetRequest) -> Result<GetResponse> {
        let url = self.url(ENDPOINT_GET)?;
        post_json(&self.http, &self.address, url, &req, self.timeout).await
    }

    async fn healthz(&self) -> Result<HealthzResponse> {
        let url = self.url(ENDPOINT_HEALTHZ)?;
        get_json(&self.http, &self.address, url, self.timeout).await
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

// ============================================================
// IN-PROCESS
// ============================================================

/// Address table of node services running in this process.
///
/// Clients resolve their address on every call, so [`LocalConnector::shutdown`]
/// makes a node unreachable for clients that were handed out earlier.
#[derive(Clone, Default)]
pub struct LocalConnector {
    services: Arc<DashMap<String, Arc<NodeService>>>,
}

impl LocalConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, address: &str, service: Arc<NodeService>) {
        self.services.insert(address.to_string(), service);
    }

    pub fn shutdown(&self, address: &str) -> Option<Arc<NodeService>> {
        self.services.remove(address).map(|(_, service)| service)
    }
}

#[async_trait]
impl Connector for LocalConnector {
    async fn connect(&self, address: &str) -> Result<Arc<dyn NodeClient>> {
        if !self.services.contains_key(address) {
            return Err(Error::unavailable(address, "cannot connect to node"));
        }

        Ok(Arc::new(LocalNodeClient {
            address: address.to_string(),
            services: self.services.clone(),
            closed: AtomicBool::new(false),
        }))
    }
}

struct LocalNodeClient {
    address: String,
    services: Arc<DashMap<String, Arc<NodeService>>>,
    closed: AtomicBool,
}

impl LocalNodeClient {
    fn resolve(&self) -> Result<Arc<NodeService>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::unavailable(&self.address, "connection closed"));
        }

        self.services
            .get(&self.address)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::unavailable(&self.address, "node is not serving"))
    }
}

#[async_trait]
impl NodeClient for LocalNodeClient {
    async fn put(&self, req: PutRequest) -> Result<PutResponse> {
        self.resolve()?.put(req)
    }

    async fn get(&self, req: GetRequest) -> Result<GetResponse> {
        self.resolve()?.get(req)
    }

    async fn healthz(&self) -> Result<HealthzResponse> {
        Ok(self.resolve()?.healthz())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}
