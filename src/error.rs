//! Error types shared by the storage engine, the node service and the controller.
//!
//! Every failure that can cross a process boundary maps onto one [`ErrorCode`],
//! which is what travels on the wire. Clients rebuild the typed [`Error`] from
//! the code and message, so a caller on the far side of the controller can still
//! tell a bad request from a missing key from an outage.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// The request was rejected before reaching storage.
    #[error("{0}")]
    InvalidArgument(String),

    /// Read miss. Not an outage.
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),

    #[error("storage i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage encoding failed: {0}")]
    Codec(#[from] serde_json::Error),

    /// Dial or RPC failure towards a node or the controller.
    #[error("{0}")]
    Unavailable(String),

    #[error("health probe timed out after {0:?}")]
    ProbeTimeout(Duration),

    #[error("nodes pool is empty")]
    PoolEmpty,

    #[error("nodes pool is closed")]
    PoolClosed,
}

/// Wire-level classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidArgument,
    NotFound,
    Internal,
    Unavailable,
}

/// Body returned by every failed RPC.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
}

impl Error {
    pub fn not_found(key: &str) -> Self {
        Error::NotFound(format!("{key:?} not found"))
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Error::InvalidArgument(message.into())
    }

    pub fn unavailable(target: &str, reason: impl std::fmt::Display) -> Self {
        Error::Unavailable(format!("{target}: {reason}"))
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Error::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Error::NotFound(_) => ErrorCode::NotFound,
            Error::Internal(_) | Error::Io(_) | Error::Codec(_) => ErrorCode::Internal,
            Error::Unavailable(_)
            | Error::ProbeTimeout(_)
            | Error::PoolEmpty
            | Error::PoolClosed => ErrorCode::Unavailable,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Whether retrying the same request later can succeed.
    pub fn is_retryable(&self) -> bool {
        self.code() == ErrorCode::Unavailable
    }

    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            code: self.code(),
            message: self.to_string(),
        }
    }

    /// Rebuilds an error received from a remote peer.
    pub fn from_response(response: ErrorResponse) -> Self {
        match response.code {
            ErrorCode::InvalidArgument => Error::InvalidArgument(response.message),
            ErrorCode::NotFound => Error::NotFound(response.message),
            ErrorCode::Internal => Error::Internal(response.message),
            ErrorCode::Unavailable => Error::Unavailable(response.message),
        }
    }
}
