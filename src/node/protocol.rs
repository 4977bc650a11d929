//! Node Network Protocol
//!
//! Endpoints and Data Transfer Objects for the node RPC surface. The controller
//! reuses the same `Put`/`Get` messages on its public surface, so a client can talk
//! to either process with identical payloads.

use serde::{Deserialize, Serialize};

// --- API Endpoints ---

/// Versioned write.
pub const ENDPOINT_PUT: &str = "/put";
/// Point read.
pub const ENDPOINT_GET: &str = "/get";
/// Liveness probe target used by the controller's health monitor.
pub const ENDPOINT_HEALTHZ: &str = "/healthz";

// --- Data Transfer Objects ---

/// Absent fields decode to their zero value so validation reports them as missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PutRequest {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub value: Vec<u8>,
    /// Logical write time; 0 is reserved as "missing".
    #[serde(default)]
    pub version: i64,
}

/// Acknowledgment for a write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PutResponse {
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetRequest {
    #[serde(default)]
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetResponse {
    pub value: Vec<u8>,
    pub version: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthzCode {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "ERROR")]
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthzResponse {
    pub code: HealthzCode,
    /// Id of the node that answered.
    pub id: String,
}

impl PutRequest {
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>, version: i64) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            version,
        }
    }
}

impl GetRequest {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}
