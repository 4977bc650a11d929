//! Client for the controller's public surface.
//!
//! Used by applications to read and write data, and by nodes to (un)register.

use crate::controller::protocol::{
    ENDPOINT_REGISTER_NODE, ENDPOINT_UNREGISTER_NODE, RegisterNodeRequest, RegisterNodeResponse,
    UnregisterNodeRequest, UnregisterNodeResponse,
};
use crate::config::DEFAULT_REQUEST_TIMEOUT;
use crate::error::{Error, Result};
use crate::http::{base_url, post_json};
use crate::node::protocol::{
    ENDPOINT_GET, ENDPOINT_PUT, GetRequest, GetResponse, PutRequest, PutResponse,
};

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub struct ControllerClient {
    address: String,
    base_url: String,
    http: reqwest::Client,
    timeout: Duration,
    closed: AtomicBool,
}

impl ControllerClient {
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            base_url: base_url(address),
            http: reqwest::Client::new(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Writes `value` under `key`, versioned with the current wall-clock time in
    /// nanoseconds so later writes from any client win.
    pub async fn put(&self, key: &str, value: impl Into<Vec<u8>>) -> Result<()> {
        self.put_versioned(PutRequest::new(key, value, now_nanos()))
            .await
            .map(|_| ())
    }

    /// Writes with a caller-chosen version.
    pub async fn put_versioned(&self, req: PutRequest) -> Result<PutResponse> {
        self.call(ENDPOINT_PUT, &req).await
    }

    /// Value stored under `key`. A miss comes back as [`Error::NotFound`].
    pub async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.get_entry(key).await.map(|res| res.value)
    }

    pub async fn get_entry(&self, key: &str) -> Result<GetResponse> {
        self.call(ENDPOINT_GET, &GetRequest::new(key)).await
    }

    pub async fn register_node(&self, id: &str, address: &str) -> Result<()> {
        let req = RegisterNodeRequest {
            id: id.to_string(),
            address: address.to_string(),
        };

        let _: RegisterNodeResponse = self.call(ENDPOINT_REGISTER_NODE, &req).await?;
        Ok(())
    }

    pub async fn unregister_node(&self, id: &str) -> Result<()> {
        let req = UnregisterNodeRequest { id: id.to_string() };

        let _: UnregisterNodeResponse = self.call(ENDPOINT_UNREGISTER_NODE, &req).await?;
        Ok(())
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    async fn call<B: Serialize, T: DeserializeOwned>(&self, endpoint: &str, body: &B) -> Result<T> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::unavailable(&self.address, "client closed"));
        }

        let url = format!("{}{}", self.base_url, endpoint);
        post_json(&self.http, &self.address, url, body, self.timeout).await
    }
}

fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as i64
}
