use axum::{
    Json, Router,
    extract::{Extension, rejection::JsonRejection},
    middleware,
    routing::{get, post},
};
use std::sync::Arc;

use super::protocol::{
    ENDPOINT_GET, ENDPOINT_HEALTHZ, ENDPOINT_PUT, GetRequest, GetResponse, HealthzResponse,
    PutRequest, PutResponse,
};
use super::service::NodeService;
use crate::error::Error;
use crate::http::{log_requests, rejected};

pub fn router(service: Arc<NodeService>) -> Router {
    Router::new()
        .route(ENDPOINT_PUT, post(handle_put))
        .route(ENDPOINT_GET, post(handle_get))
        .route(ENDPOINT_HEALTHZ, get(handle_healthz))
        .layer(middleware::from_fn(log_requests))
        .layer(Extension(service))
}

pub async fn handle_put(
    Extension(service): Extension<Arc<NodeService>>,
    payload: Result<Json<PutRequest>, JsonRejection>,
) -> Result<Json<PutResponse>, Error> {
    let Json(req) = payload.map_err(rejected)?;
    service.put(req).map(Json)
}

pub async fn handle_get(
    Extension(service): Extension<Arc<NodeService>>,
    payload: Result<Json<GetRequest>, JsonRejection>,
) -> Result<Json<GetResponse>, Error> {
    let Json(req) = payload.map_err(rejected)?;
    service.get(req).map(Json)
}

pub async fn handle_healthz(
    Extension(service): Extension<Arc<NodeService>>,
) -> Json<HealthzResponse> {
    Json(service.healthz())
}
