//! Controller Network Protocol
//!
//! Public endpoints of the controller. Data operations reuse the node's
//! `PutRequest`/`GetRequest` messages; membership endpoints are used by nodes.

use serde::{Deserialize, Serialize};

pub use crate::node::protocol::{ENDPOINT_GET, ENDPOINT_PUT};

pub const ENDPOINT_REGISTER_NODE: &str = "/nodes/register";
pub const ENDPOINT_UNREGISTER_NODE: &str = "/nodes/unregister";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterNodeRequest {
    #[serde(default)]
    pub id: String,
    /// `host:port` the controller dials to reach the node.
    #[serde(default)]
    pub address: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegisterNodeResponse {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnregisterNodeRequest {
    #[serde(default)]
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnregisterNodeResponse {}
