//! Node Tests
//!
//! ## Test Scopes
//! - **Service**: request validation and error classification of `NodeService`.
//! - **In-process transport**: `LocalConnector` clients, closing and node shutdown.
//! - **HTTP transport**: the node router served on an ephemeral port, dialed with `HttpConnector`.

#[cfg(test)]
mod tests {
    use crate::config::DEFAULT_REQUEST_TIMEOUT;
    use crate::error::{Error, ErrorCode, ErrorResponse};
    use crate::http::post_json;
    use crate::node::handlers::router;
    use crate::node::protocol::{
        GetRequest, GetResponse, HealthzCode, PutRequest, PutResponse,
    };
    use crate::node::register::generate_id;
    use crate::node::{Connector, HttpConnector, LocalConnector, NodeService};
    use crate::store::StorageEngine;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio_util::sync::CancellationToken;

    fn new_service(id: &str) -> Arc<NodeService> {
        Arc::new(NodeService::new(id, Arc::new(StorageEngine::in_memory())))
    }

    async fn serve(service: Arc<NodeService>) -> (SocketAddr, CancellationToken) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let token = CancellationToken::new();
        let stop = token.clone();

        tokio::spawn(async move {
            axum::serve(listener, router(service))
                .with_graceful_shutdown(async move { stop.cancelled().await })
                .await
                .unwrap();
        });

        (addr, token)
    }

    fn http_connector() -> HttpConnector {
        HttpConnector::new(Duration::from_secs(1), DEFAULT_REQUEST_TIMEOUT)
    }

    // ============================================================
    // SERVICE
    // ============================================================

    #[test]
    fn test_service_put_get() {
        let service = new_service("node-1");

        let ack = service.put(PutRequest::new("a", "1", 5)).unwrap();
        assert!(ack.success);

        let res = service.get(GetRequest::new("a")).unwrap();
        assert_eq!(res.value, b"1".to_vec());
        assert_eq!(res.version, 5);
    }

    #[test]
    fn test_service_rejects_missing_key() {
        let service = new_service("node-1");

        let err = service.put(PutRequest::new("", "1", 5)).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(ref m) if m == "key is missing"));

        let err = service.get(GetRequest::new("")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
    }

    #[test]
    fn test_service_rejects_missing_version() {
        let service = new_service("node-1");

        let err = service.put(PutRequest::new("a", "1", 0)).unwrap_err();

        assert!(matches!(err, Error::InvalidArgument(ref m) if m == "version is missing"));
        assert!(service.store().is_empty());
    }

    #[test]
    fn test_service_get_missing_is_not_found() {
        let service = new_service("node-1");

        let err = service.get(GetRequest::new("nope")).unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "\"nope\" not found");
    }

    #[test]
    fn test_service_stale_write_is_acknowledged() {
        let service = new_service("node-1");

        service.put(PutRequest::new("a", "new", 10)).unwrap();
        let ack = service.put(PutRequest::new("a", "old", 3)).unwrap();

        assert!(ack.success);
        assert_eq!(service.get(GetRequest::new("a")).unwrap().value, b"new".to_vec());
    }

    #[test]
    fn test_healthz_reports_id() {
        let service = new_service("node-7");

        let res = service.healthz();

        assert_eq!(res.code, HealthzCode::Ok);
        assert_eq!(res.id, "node-7");
    }

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(generate_id(), generate_id());
    }

    // ============================================================
    // IN-PROCESS TRANSPORT
    // ============================================================

    #[tokio::test]
    async fn test_local_client_roundtrip() {
        let connector = LocalConnector::new();
        connector.serve("node-a", new_service("a"));

        let client = connector.connect("node-a").await.unwrap();
        client.put(PutRequest::new("k", "v", 1)).await.unwrap();

        let res = client.get(GetRequest::new("k")).await.unwrap();
        assert_eq!(res.value, b"v".to_vec());
        assert_eq!(client.healthz().await.unwrap().id, "a");
    }

    #[tokio::test]
    async fn test_local_connect_unknown_address() {
        let connector = LocalConnector::new();

        let err = connector.connect("nowhere").await.err().unwrap();

        assert!(matches!(err, Error::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_local_client_after_node_shutdown() {
        let connector = LocalConnector::new();
        connector.serve("node-a", new_service("a"));
        let client = connector.connect("node-a").await.unwrap();

        connector.shutdown("node-a");

        let err = client.healthz().await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_closed_client_fails() {
        let connector = LocalConnector::new();
        connector.serve("node-a", new_service("a"));
        let client = connector.connect("node-a").await.unwrap();

        client.close();

        let err = client.get(GetRequest::new("k")).await.unwrap_err();
        assert!(matches!(err, Error::Unavailable(_)));
    }

    // ============================================================
    // HTTP TRANSPORT
    // ============================================================

    #[tokio::test]
    async fn test_http_roundtrip() {
        let (addr, stop) = serve(new_service("http-node")).await;
        let client = http_connector().connect(&addr.to_string()).await.unwrap();

        let ack = client
            .put(PutRequest::new("a", vec![0u8, 1, 2], 3))
            .await
            .unwrap();
        assert!(ack.success);

        let res = client.get(GetRequest::new("a")).await.unwrap();
        assert_eq!(res.value, vec![0u8, 1, 2]);
        assert_eq!(res.version, 3);

        let health = client.healthz().await.unwrap();
        assert_eq!(health.code, HealthzCode::Ok);
        assert_eq!(health.id, "http-node");

        stop.cancel();
    }

    #[tokio::test]
    async fn test_http_errors_keep_their_code() {
        let (addr, stop) = serve(new_service("http-node")).await;
        let client = http_connector().connect(&addr.to_string()).await.unwrap();

        let err = client.get(GetRequest::new("missing")).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "\"missing\" not found");

        let err = client.put(PutRequest::new("a", "1", 0)).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(ref m) if m == "version is missing"));

        stop.cancel();
    }

    #[tokio::test]
    async fn test_http_error_body() {
        let (addr, stop) = serve(new_service("http-node")).await;

        let response = reqwest::Client::new()
            .post(format!("http://{}/get", addr))
            .json(&GetRequest::new("missing"))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
        let body: ErrorResponse = response.json().await.unwrap();
        assert_eq!(body.code, ErrorCode::NotFound);

        stop.cancel();
    }

    #[tokio::test]
    async fn test_http_put_without_version_is_invalid() {
        let (addr, stop) = serve(new_service("http-node")).await;
        let http = reqwest::Client::new();
        let body = serde_json::json!({"key": "a", "value": [1]});

        let response = http
            .post(format!("http://{}/put", addr))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
        let remote: ErrorResponse = response.json().await.unwrap();
        assert_eq!(remote.code, ErrorCode::InvalidArgument);
        assert_eq!(remote.message, "version is missing");

        let err = post_json::<_, PutResponse>(
            &http,
            "http-node",
            format!("http://{}/put", addr),
            &body,
            DEFAULT_REQUEST_TIMEOUT,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(!err.is_retryable());

        stop.cancel();
    }

    #[tokio::test]
    async fn test_http_get_without_key_is_invalid() {
        let (addr, stop) = serve(new_service("http-node")).await;

        let err = post_json::<_, GetResponse>(
            &reqwest::Client::new(),
            "http-node",
            format!("http://{}/get", addr),
            &serde_json::json!({}),
            DEFAULT_REQUEST_TIMEOUT,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::InvalidArgument(ref m) if m == "key is missing"));
        stop.cancel();
    }

    #[tokio::test]
    async fn test_http_malformed_body_is_invalid() {
        let (addr, stop) = serve(new_service("http-node")).await;

        let response = reqwest::Client::new()
            .post(format!("http://{}/put", addr))
            .header("content-type", "application/json")
            .body("{not json")
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
        let remote: ErrorResponse = response.json().await.unwrap();
        assert_eq!(remote.code, ErrorCode::InvalidArgument);

        stop.cancel();
    }

    #[tokio::test]
    async fn test_bare_client_error_status_is_invalid() {
        // A 4xx without an error body still means the request was refused
        let app = axum::Router::new().route(
            "/reject",
            axum::routing::post(|| async {
                (axum::http::StatusCode::UNPROCESSABLE_ENTITY, "refused")
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let err = post_json::<_, PutResponse>(
            &reqwest::Client::new(),
            "peer",
            format!("http://{}/reject", addr),
            &PutRequest::new("a", "1", 1),
            DEFAULT_REQUEST_TIMEOUT,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_http_connect_refused() {
        // Reserve a port, then release it so nothing listens there
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = http_connector().connect(&addr.to_string()).await.err().unwrap();

        assert!(matches!(err, Error::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_http_closed_client_fails() {
        let (addr, stop) = serve(new_service("http-node")).await;
        let client = http_connector().connect(&addr.to_string()).await.unwrap();

        client.close();

        assert!(client.healthz().await.unwrap_err().is_retryable());
        stop.cancel();
    }
}
