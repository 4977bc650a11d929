//! End-to-end: a controller and a persistent node talking HTTP on ephemeral ports.

use distributed_kv::bootstrap::{serve_controller, serve_node};
use distributed_kv::client::ControllerClient;
use distributed_kv::config::{ControllerConfig, MonitorConfig, NodeConfig, StoreConfig};
use distributed_kv::error::Error;
use distributed_kv::store::Entry;
use std::collections::HashMap;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Retries `put` until a node became `Ready` behind the controller.
async fn put_when_ready(client: &ControllerClient, key: &str, value: &str) {
    for _ in 0..200 {
        match client.put(key, value).await {
            Ok(()) => return,
            Err(e) if e.is_retryable() => tokio::time::sleep(Duration::from_millis(25)).await,
            Err(e) => panic!("unexpected put failure: {}", e),
        }
    }
    panic!("no node became ready");
}

#[tokio::test]
async fn test_cluster_roundtrip_over_http() {
    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("node.json");

    // Controller
    let ctrl_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let ctrl_addr = ctrl_listener.local_addr().unwrap();
    let ctrl_token = CancellationToken::new();
    let ctrl_config = ControllerConfig {
        bind: ctrl_addr,
        monitor: MonitorConfig {
            check_interval: Duration::from_millis(50),
            check_timeout: Duration::from_secs(1),
            event_buffer: 100,
        },
        request_timeout: Duration::from_secs(5),
        connect_timeout: Duration::from_secs(1),
        failed_node_ttl: Duration::from_secs(60),
    };
    let ctrl_task = tokio::spawn(serve_controller(ctrl_listener, ctrl_config, ctrl_token.clone()));

    // Node
    let node_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let node_token = CancellationToken::new();
    let node_config = NodeConfig {
        bind: node_listener.local_addr().unwrap(),
        advertise: None,
        controller: ctrl_addr.to_string(),
        store: StoreConfig::persistent(&store_path).with_flush_interval(Duration::from_millis(50)),
        register_interval: Duration::from_millis(100),
    };
    let node_task = tokio::spawn(serve_node(node_listener, node_config, node_token.clone()));

    let client = ControllerClient::new(&ctrl_addr.to_string());

    put_when_ready(&client, "greeting", "hello").await;
    assert_eq!(client.get("greeting").await.unwrap(), b"hello".to_vec());

    // Later writes carry later versions
    client.put("greeting", "bye").await.unwrap();
    assert_eq!(client.get("greeting").await.unwrap(), b"bye".to_vec());

    let err = client.get("missing").await.unwrap_err();
    assert!(err.is_not_found());

    let err = client.put("", "x").await.unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));

    // Graceful node stop flushes the store and unregisters
    node_token.cancel();
    node_task.await.unwrap().unwrap();

    let raw = std::fs::read_to_string(&store_path).unwrap();
    let snapshot: HashMap<String, Entry> = serde_json::from_str(&raw).unwrap();
    assert_eq!(snapshot["greeting"].value, b"bye".to_vec());

    let err = client.put("greeting", "again").await.unwrap_err();
    assert!(err.is_retryable());

    ctrl_token.cancel();
    ctrl_task.await.unwrap().unwrap();
}
