//! XClient Integration Tests
//!
//! This test suite runs several real servers on loopback ports and verifies
//! selection, broadcast and registry-backed discovery end to end.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tinyrpc_common::{Context, RpcError, DEFAULT_REGISTRY_PATH};
use tinyrpc_registry::{heartbeat, Registry, RegistryServer};
use tinyrpc_server::{Server, Service};
use tinyrpc_xclient::{Discovery, MultiServersDiscovery, RegistryDiscovery, SelectMode, XClient};
use tokio::net::TcpListener;

// ============================================================================
// Test Servers
// ============================================================================

/// Starts a server whose methods answer with `name`. `Node.Check` answers at
/// once when `healthy`, otherwise fails after the given delay. Served over
/// HTTP when `http` is set.
async fn start_node(name: &'static str, healthy: bool, http: bool) -> String {
    start_node_with_reply_delay(name, healthy, http, 0).await
}

/// Like [`start_node`], but a healthy `Node.Check` answers after `reply_delay_ms`.
async fn start_node_with_reply_delay(name: &'static str, healthy: bool, http: bool, reply_delay_ms: u64) -> String {
    let mut server = Server::new();
    server
        .register(
            Service::new("Node")
                .register_method("Name", move |_: ()| async move { Ok::<_, String>(name.to_string()) })
                .register_method("Check", move |delay_ms: u64| async move {
                    if healthy {
                        tokio::time::sleep(Duration::from_millis(reply_delay_ms)).await;
                        return Ok(name.to_string());
                    }
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    Err(format!("{} is unhealthy", name))
                })
                .register_method("Sleep", move |delay_ms: u64| async move {
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    Ok::<_, String>(name.to_string())
                }),
        )
        .unwrap();
    let server = Arc::new(server);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    if http {
        tokio::spawn(server.serve_http(listener));
        format!("http@{}", addr)
    } else {
        tokio::spawn(server.accept(listener));
        format!("tcp@{}", addr)
    }
}

async fn start_registry() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}{}", listener.local_addr().unwrap(), DEFAULT_REGISTRY_PATH);
    tokio::spawn(RegistryServer::new(Arc::new(Registry::default())).run(listener));
    url
}

// ============================================================================
// Selection Tests
// ============================================================================

#[tokio::test]
async fn test_round_robin_spreads_calls_evenly() {
    let servers = vec![
        start_node("a", true, false).await,
        start_node("b", true, true).await,
        start_node("c", true, false).await,
    ];
    let xclient = XClient::new(MultiServersDiscovery::new(servers), SelectMode::RoundRobin, None);

    let mut counts: HashMap<String, usize> = HashMap::new();
    for _ in 0..9 {
        let name: String = xclient.call(&Context::background(), "Node.Name", &()).await.unwrap();
        *counts.entry(name).or_default() += 1;
    }

    assert_eq!(counts.len(), 3);
    assert!(counts.values().all(|&count| count == 3));
    xclient.close().await;
}

#[tokio::test]
async fn test_random_only_picks_known_servers() {
    let servers = vec![start_node("a", true, false).await, start_node("b", true, false).await];
    let xclient = XClient::new(MultiServersDiscovery::new(servers), SelectMode::Random, None);

    for _ in 0..10 {
        let name: String = xclient.call(&Context::background(), "Node.Name", &()).await.unwrap();
        assert!(name == "a" || name == "b");
    }
}

// ============================================================================
// Broadcast Tests
// ============================================================================

#[tokio::test]
async fn test_broadcast_succeeds_on_all_servers() {
    let servers = vec![start_node("a", true, false).await, start_node("b", true, true).await];
    let xclient = XClient::new(MultiServersDiscovery::new(servers), SelectMode::Random, None);

    let mut reply = String::new();
    xclient
        .broadcast(&Context::background(), "Node.Check", &0u64, Some(&mut reply))
        .await
        .unwrap();
    assert!(reply == "a" || reply == "b");
}

#[tokio::test]
async fn test_broadcast_returns_error_and_keeps_successful_reply() {
    let servers = vec![
        start_node("fast", true, false).await,
        start_node("broken", false, false).await,
    ];
    let xclient = XClient::new(MultiServersDiscovery::new(servers), SelectMode::Random, None);

    // "fast" replies immediately; "broken" fails after a short delay
    let mut reply = String::new();
    let ctx = Context::background();
    let first = xclient.broadcast(&ctx, "Node.Name", &(), Some(&mut reply)).await;
    assert!(first.is_ok());

    let err = xclient
        .broadcast(&ctx, "Node.Check", &50u64, Some(&mut reply))
        .await
        .unwrap_err();
    assert_eq!(err, RpcError::Remote("broken is unhealthy".into()));
    assert_eq!(reply, "fast");

    // The caller's context is not cancelled by a broadcast failure
    assert!(ctx.err().is_none());
}

#[tokio::test]
async fn test_broadcast_writes_first_reply_once_and_returns_error() {
    let servers = vec![
        start_node("first", true, false).await,
        start_node_with_reply_delay("second", true, true, 100).await,
        start_node("broken", false, false).await,
    ];
    let xclient = XClient::new(MultiServersDiscovery::new(servers), SelectMode::Random, None);

    // "first" answers at once, "second" after 100ms, "broken" fails after 300ms
    let mut reply = String::new();
    let err = xclient
        .broadcast(&Context::background(), "Node.Check", &300u64, Some(&mut reply))
        .await
        .unwrap_err();

    assert_eq!(err, RpcError::Remote("broken is unhealthy".into()));
    assert_eq!(reply, "first");
}

#[tokio::test]
async fn test_broadcast_without_reply() {
    let servers = vec![start_node("a", true, false).await];
    let xclient = XClient::new(MultiServersDiscovery::new(servers), SelectMode::Random, None);

    xclient
        .broadcast::<_, String>(&Context::background(), "Node.Check", &0u64, None)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_broadcast_honours_deadline() {
    let servers = vec![start_node("a", true, false).await, start_node("b", true, false).await];
    let xclient = XClient::new(MultiServersDiscovery::new(servers), SelectMode::Random, None);

    let ctx = Context::with_timeout(Duration::from_millis(100));
    let err = xclient
        .broadcast::<_, String>(&ctx, "Node.Sleep", &2000u64, None)
        .await
        .unwrap_err();
    assert_eq!(err, RpcError::Cancelled("context deadline exceeded".into()));
}

// ============================================================================
// Registry Discovery Tests
// ============================================================================

#[tokio::test]
async fn test_registry_discovery_end_to_end() {
    let registry_url = start_registry().await;
    let a = start_node("a", true, false).await;
    let b = start_node("b", true, true).await;

    let _beat_a = heartbeat(&registry_url, &a, Duration::ZERO).await.unwrap();
    let _beat_b = heartbeat(&registry_url, &b, Duration::ZERO).await.unwrap();

    let discovery = RegistryDiscovery::new(registry_url);
    let mut all = discovery.get_all().await.unwrap();
    all.sort();
    let mut expected = vec![a, b];
    expected.sort();
    assert_eq!(all, expected);

    let xclient = XClient::new(discovery, SelectMode::RoundRobin, None);
    let mut names = Vec::new();
    for _ in 0..2 {
        let name: String = xclient.call(&Context::background(), "Node.Name", &()).await.unwrap();
        names.push(name);
    }
    names.sort();
    assert_eq!(names, vec!["a", "b"]);
}

#[tokio::test]
async fn test_registry_discovery_throttles_refresh() {
    let registry_url = start_registry().await;
    let a = start_node("a", true, false).await;
    heartbeat(&registry_url, &a, Duration::ZERO).await.unwrap();

    let discovery = RegistryDiscovery::new(registry_url.clone()).with_refresh_interval(Duration::from_secs(60));
    assert_eq!(discovery.get_all().await.unwrap(), vec![a.clone()]);

    // A new server is not seen until the interval passes
    let b = start_node("b", true, false).await;
    heartbeat(&registry_url, &b, Duration::ZERO).await.unwrap();
    assert_eq!(discovery.get_all().await.unwrap(), vec![a]);
}
