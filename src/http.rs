//! HTTP/JSON transport helpers shared by the node and controller surfaces.
//!
//! Server side: [`Error`] renders as `{code, message}` with a matching status, and
//! [`log_requests`] logs every RPC with its outcome and latency.
//! Client side: [`post_json`] / [`get_json`] turn any non-success answer back into
//! the typed [`Error`] the peer produced, and transport failures into
//! [`Error::Unavailable`].

use crate::error::{Error, ErrorCode, ErrorResponse, Result};

use axum::Json;
use axum::extract::Request;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};

pub fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorCode::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = status_for(self.code());

        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }

        (status, Json(self.to_response())).into_response()
    }
}

/// Undecodable request bodies are the caller's fault, never an outage.
pub fn rejected(rejection: JsonRejection) -> Error {
    Error::invalid(rejection.body_text())
}

/// Logs method, path, status and duration of every request.
pub async fn log_requests(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();

    tracing::debug!("RPC in - {} {}", method, path);

    let response = next.run(req).await;
    let status = response.status();
    let elapsed = start.elapsed();

    if status.is_server_error() {
        tracing::warn!("RPC out - {} {} -> {} in {:?}", method, path, status, elapsed);
    } else {
        tracing::info!("RPC out - {} {} -> {} in {:?}", method, path, status, elapsed);
    }

    response
}

/// `host:port` or a full URL, normalised to a URL without trailing slash.
pub fn base_url(address: &str) -> String {
    let trimmed = address.trim_end_matches('/');

    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    }
}

/// The `host:port` part of an address, for dialing.
pub fn host_port(address: &str) -> &str {
    address
        .trim_start_matches("http://")
        .trim_start_matches("https://")
        .trim_end_matches('/')
}

pub async fn post_json<B, T>(
    http: &reqwest::Client,
    target: &str,
    url: String,
    body: &B,
    timeout: Duration,
) -> Result<T>
where
    B: Serialize + ?Sized,
    T: DeserializeOwned,
{
    let response = http
        .post(url)
        .json(body)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| Error::unavailable(target, e))?;

    decode(target, response).await
}

pub async fn get_json<T: DeserializeOwned>(
    http: &reqwest::Client,
    target: &str,
    url: String,
    timeout: Duration,
) -> Result<T> {
    let response = http
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| Error::unavailable(target, e))?;

    decode(target, response).await
}

async fn decode<T: DeserializeOwned>(target: &str, response: reqwest::Response) -> Result<T> {
    let status = response.status();

    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|e| Error::Internal(format!("{}: malformed response: {}", target, e)));
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| Error::unavailable(target, e))?;

    match serde_json::from_slice::<ErrorResponse>(&body) {
        Ok(remote) => Err(Error::from_response(remote)),
        Err(_) if status.is_client_error() => Err(Error::InvalidArgument(format!(
            "{}: request rejected with {}: {}",
            target,
            status,
            String::from_utf8_lossy(&body).trim()
        ))),
        Err(_) => Err(Error::unavailable(
            target,
            format!("unexpected status {}", status),
        )),
    }
}
