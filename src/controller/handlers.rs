use axum::{
    Json, Router,
    extract::{Extension, rejection::JsonRejection},
    middleware,
    routing::post,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::protocol::{
    ENDPOINT_GET, ENDPOINT_PUT, ENDPOINT_REGISTER_NODE, ENDPOINT_UNREGISTER_NODE,
    RegisterNodeRequest, RegisterNodeResponse, UnregisterNodeRequest, UnregisterNodeResponse,
};
use super::service::Controller;
use crate::error::{Error, Result};
use crate::http::{log_requests, rejected};
use crate::node::protocol::{GetRequest, GetResponse, PutRequest, PutResponse};

/// Deadline for one data operation, across all replicas.
#[derive(Debug, Clone, Copy)]
pub struct RequestTimeout(pub Duration);

pub fn router(controller: Arc<Controller>, request_timeout: Duration) -> Router {
    Router::new()
        .route(ENDPOINT_PUT, post(handle_put))
        .route(ENDPOINT_GET, post(handle_get))
        .route(ENDPOINT_REGISTER_NODE, post(handle_register_node))
        .route(ENDPOINT_UNREGISTER_NODE, post(handle_unregister_node))
        .layer(middleware::from_fn(log_requests))
        .layer(Extension(controller))
        .layer(Extension(RequestTimeout(request_timeout)))
}

async fn with_deadline<T>(deadline: Duration, op: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::time::timeout(deadline, op)
        .await
        .map_err(|_| Error::Unavailable(format!("deadline of {:?} exceeded", deadline)))?
}

pub async fn handle_put(
    Extension(controller): Extension<Arc<Controller>>,
    Extension(RequestTimeout(deadline)): Extension<RequestTimeout>,
    payload: Result<Json<PutRequest>, JsonRejection>,
) -> Result<Json<PutResponse>, Error> {
    let Json(req) = payload.map_err(rejected)?;
    with_deadline(deadline, controller.put(req)).await.map(Json)
}

pub async fn handle_get(
    Extension(controller): Extension<Arc<Controller>>,
    Extension(RequestTimeout(deadline)): Extension<RequestTimeout>,
    payload: Result<Json<GetRequest>, JsonRejection>,
) -> Result<Json<GetResponse>, Error> {
    let Json(req) = payload.map_err(rejected)?;
    with_deadline(deadline, controller.get(req)).await.map(Json)
}

pub async fn handle_register_node(
    Extension(controller): Extension<Arc<Controller>>,
    payload: Result<Json<RegisterNodeRequest>, JsonRejection>,
) -> Result<Json<RegisterNodeResponse>, Error> {
    let Json(req) = payload.map_err(rejected)?;
    controller.register_node(&req.id, &req.address).await?;
    Ok(Json(RegisterNodeResponse {}))
}

pub async fn handle_unregister_node(
    Extension(controller): Extension<Arc<Controller>>,
    payload: Result<Json<UnregisterNodeRequest>, JsonRejection>,
) -> Result<Json<UnregisterNodeResponse>, Error> {
    let Json(req) = payload.map_err(rejected)?;
    controller.unregister_node(&req.id).await?;
    Ok(Json(UnregisterNodeResponse {}))
}
