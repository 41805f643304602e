//! Pool routing and host-set reconciliation behaviour.

mod support;

use std::{collections::HashSet, sync::Arc, time::Duration};

use tokio::net::TcpListener;

use velostream::{
    HostDescription, Method, Request, TransportConfig, TransportError,
    connection::ConnectionFactory,
    pool::ConnectionPool,
};

use support::{MockVstServer, wait_until};

fn pool_for(config: TransportConfig) -> ConnectionPool {
    let connections = config.connections_per_host();
    ConnectionPool::new(ConnectionFactory::new(Arc::new(config)), connections)
}

fn version_request() -> Request {
    Request::builder("_system", Method::Get, "/_api/version").build()
}

#[tokio::test]
async fn reconciliation_is_idempotent() {
    let server = MockVstServer::spawn_identity("alpha").await;
    let host = server.host();
    let pool = pool_for(TransportConfig::new(vec![host.clone()]).with_connections_per_host(2));

    pool.update_connections(&[host.clone()]).await.expect("first update");
    assert_eq!(pool.connection_count(&host), 2);

    // A second pass over the same target must not stack extra connections.
    pool.update_connections(&[host.clone()]).await.expect("second update");
    assert_eq!(pool.connection_count(&host), 2);
    pool.close().await;
}

#[tokio::test]
async fn concurrent_reconciliations_are_mutually_exclusive() {
    // A listener that accepts but never answers the handshake keeps the
    // first reconciliation busy until the connection timeout fires.
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let host = HostDescription::new("127.0.0.1", addr.port());

    let config = TransportConfig::new(vec![host.clone()])
        .with_connections_per_host(1)
        .with_connection_retries(1)
        .with_timeout(Duration::from_millis(500));
    let pool = Arc::new(pool_for(config));

    let slow_pool = Arc::clone(&pool);
    let slow_host = host.clone();
    let slow = tokio::spawn(async move { slow_pool.update_connections(&[slow_host]).await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    let err = pool
        .update_connections(&[host])
        .await
        .expect_err("gate is held");
    assert!(matches!(err, TransportError::ReconciliationInProgress));

    // The slow pass completes (the host stays unreachable) and releases the
    // gate for later updates.
    slow.await.expect("task completes").expect("update finishes");
    assert!(pool.is_empty());
    pool.update_connections(&[]).await.expect("gate released");
    drop(listener);
}

#[tokio::test]
async fn random_routing_reaches_every_host() {
    let alpha = MockVstServer::spawn_identity("alpha").await;
    let beta = MockVstServer::spawn_identity("beta").await;
    let gamma = MockVstServer::spawn_identity("gamma").await;
    let hosts = vec![alpha.host(), beta.host(), gamma.host()];
    let pool = pool_for(TransportConfig::new(hosts.clone()).with_connections_per_host(1));
    pool.update_connections(&hosts).await.expect("update");

    let mut seen = HashSet::new();
    for _ in 0..60 {
        let response = pool.execute(version_request()).await.expect("request");
        seen.insert(response.into_body());
    }
    assert_eq!(seen.len(), 3, "every host should serve some requests");
    pool.close().await;
}

#[tokio::test]
async fn removed_hosts_have_their_connections_closed() {
    let alpha = MockVstServer::spawn_identity("alpha").await;
    let beta = MockVstServer::spawn_identity("beta").await;
    let pool = pool_for(
        TransportConfig::new(vec![alpha.host(), beta.host()]).with_connections_per_host(1),
    );
    pool.update_connections(&[alpha.host(), beta.host()])
        .await
        .expect("grow");
    assert_eq!(pool.host_snapshot().len(), 2);

    pool.update_connections(&[alpha.host()]).await.expect("shrink");
    assert_eq!(pool.host_snapshot(), vec![alpha.host()]);
    assert_eq!(pool.connection_count(&beta.host()), 0);
    wait_until(|| beta.active_connections() == 0, "beta connections closed").await;

    let err = pool
        .execute_on(version_request(), &beta.host())
        .await
        .expect_err("beta is gone");
    assert!(matches!(err, TransportError::HostNotAvailable { .. }));
    pool.close().await;
}

#[tokio::test]
async fn empty_pool_reports_no_hosts() {
    let pool = pool_for(TransportConfig::new(Vec::new()));
    let err = pool.execute(version_request()).await.expect_err("empty pool");
    assert!(matches!(err, TransportError::NoHostsAvailable));
}
