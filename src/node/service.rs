use super::protocol::{GetRequest, GetResponse, HealthzCode, HealthzResponse, PutRequest, PutResponse};
use crate::error::{Error, Result};
use crate::store::{Entry, StorageEngine};

use std::sync::Arc;

/// RPC-facing wrapper around a node's [`StorageEngine`].
///
/// Validates requests before they reach storage and translates storage results
/// into protocol responses. Missing keys surface as [`Error::NotFound`] so callers
/// can treat them as "absent" rather than as an outage.
pub struct NodeService {
    id: String,
    store: Arc<StorageEngine>,
}

impl NodeService {
    pub fn new(id: impl Into<String>, store: Arc<StorageEngine>) -> Self {
        Self {
            id: id.into(),
            store,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn store(&self) -> &Arc<StorageEngine> {
        &self.store
    }

    pub fn put(&self, req: PutRequest) -> Result<PutResponse> {
        if req.key.is_empty() {
            return Err(Error::invalid("key is missing"));
        }

        if req.version == 0 {
            return Err(Error::invalid("version is missing"));
        }

        self.store
            .put(Entry {
                key: req.key,
                value: req.value,
                version: req.version,
            })
            .map_err(|e| match e {
                Error::InvalidArgument(_) => e,
                other => Error::Internal(other.to_string()),
            })?;

        Ok(PutResponse { success: true })
    }

    pub fn get(&self, req: GetRequest) -> Result<GetResponse> {
        if req.key.is_empty() {
            return Err(Error::invalid("key is missing"));
        }

        let entry = self
            .store
            .get(&req.key)
            .ok_or_else(|| Error::not_found(&req.key))?;

        Ok(GetResponse {
            value: entry.value,
            version: entry.version,
        })
    }

    /// Liveness only: answers OK whenever the process can serve a request.
    pub fn healthz(&self) -> HealthzResponse {
        HealthzResponse {
            code: HealthzCode::Ok,
            id: self.id.clone(),
        }
    }
}
