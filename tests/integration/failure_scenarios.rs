//! Backend outages, rejected batches and the rewrite path

use std::time::Duration;

use assert_matches::assert_matches;
use influx_proxy::backend::{BackendError, HttpBackend, QueryRequest, QueryResponse, compress};
use pretty_assertions::assert_eq;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer};

use crate::helpers::*;

#[tokio::test]
async fn test_ping_unreachable_backend() {
    let backend = HttpBackend::spawn(create_unreachable_backend_config()).unwrap();

    let result = tokio::time::timeout(Duration::from_secs(2), backend.ping())
        .await
        .expect("ping should give up within the client timeout");
    assert_matches!(result, Err(e) if e.is_transport());

    backend.close().await.unwrap();
}

#[tokio::test]
async fn test_write_to_unreachable_backend_is_queued() {
    let mut config = create_unreachable_backend_config();
    config.flush_time = 60_000;
    let backend = HttpBackend::spawn(config).unwrap();

    backend.write(b"cpu value=1 1434055562000000000").await.unwrap();
    assert_matches!(
        backend.flush().await,
        Err(BackendError::Undelivered { batches: 1, bytes }) if bytes > 0
    );

    let stats = backend.stats().await;
    assert!(!stats.active);
    assert_eq!(stats.buffered_bytes, 0);
    assert_eq!(stats.retry_batches, 1);
    assert!(stats.retry_bytes > 0);

    assert_matches!(
        backend.close().await,
        Err(BackendError::Undelivered { batches: 1, .. })
    );
}

/// A backend whose health check fails but which still accepts writes
async fn start_unhealthy_backend() -> MockServer {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(mock_ok(503))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/write"))
        .respond_with(mock_ok(204))
        .mount(&mock_server)
        .await;
    mock_server
}

async fn wait_until_inactive(backend: &HttpBackend) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while backend.is_active() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("health check should mark the backend inactive");
}

#[tokio::test]
async fn test_close_delivers_to_inactive_backend() {
    let mock_server = start_unhealthy_backend().await;
    let mut config = create_test_backend_config(&mock_server.uri());
    config.flush_time = 60_000;
    config.check_interval = 50;
    let backend = HttpBackend::spawn(config).unwrap();
    wait_until_inactive(&backend).await;

    backend.write(b"cpu value=1 1").await.unwrap();
    backend.close().await.unwrap();

    assert_eq!(
        received_writes(&mock_server).await,
        vec!["cpu value=1 1\n".to_string()]
    );
    let stats = backend.stats().await;
    assert_eq!(stats.retry_batches, 0);
    assert_eq!(stats.flush_count, 1);
}

#[tokio::test]
async fn test_flush_delivers_to_inactive_backend() {
    let mock_server = start_unhealthy_backend().await;
    let mut config = create_test_backend_config(&mock_server.uri());
    config.flush_time = 60_000;
    config.check_interval = 50;
    let backend = HttpBackend::spawn(config).unwrap();
    wait_until_inactive(&backend).await;

    // the size trigger only queues while inactive
    backend.write(&b"cpu value=1 1\n".repeat(100)).await.unwrap();
    backend.write(b"mem value=2 2").await.unwrap();
    assert!(received_writes(&mock_server).await.is_empty());
    assert_eq!(backend.stats().await.retry_batches, 1);

    backend.flush().await.unwrap();

    let writes = received_writes(&mock_server).await;
    assert_eq!(writes.len(), 2);
    assert_eq!(writes[0].lines().count(), 100);
    assert_eq!(writes[1], "mem value=2 2\n");
    assert_eq!(backend.stats().await.retry_batches, 0);

    backend.close().await.unwrap();
}

#[tokio::test]
async fn test_zero_interval_is_rejected() {
    let mut config = create_test_backend_config("http://127.0.0.1:8086");
    config.flush_time = 0;
    assert_matches!(
        HttpBackend::spawn(config),
        Err(BackendError::InvalidConfig(reason)) if reason.contains("flush_time")
    );

    let mut config = create_test_backend_config("http://127.0.0.1:8086");
    config.check_interval = 0;
    assert_matches!(HttpBackend::spawn(config), Err(BackendError::InvalidConfig(_)));
}

#[tokio::test]
async fn test_failed_batch_is_rewritten_after_recovery() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/write"))
        .respond_with(mock_ok(500).set_body_string("engine: cache maximum memory size exceeded"))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/write"))
        .respond_with(mock_ok(204))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(mock_ok(204))
        .mount(&mock_server)
        .await;

    let mut config = create_test_backend_config(&mock_server.uri());
    config.flush_time = 60_000;
    config.check_interval = 100;
    config.rewrite_interval = 200;
    let backend = HttpBackend::spawn(config).unwrap();

    backend.write(b"cpu value=1 1434055562000000000").await.unwrap();
    assert_matches!(backend.flush().await, Err(BackendError::Undelivered { batches: 1, .. }));

    let stats = backend.stats().await;
    assert!(!stats.active);
    assert_eq!(stats.retry_batches, 1);
    assert_eq!(stats.failed_flushes, 1);

    tokio::time::sleep(Duration::from_millis(700)).await;

    let stats = backend.stats().await;
    assert!(stats.active);
    assert_eq!(stats.retry_batches, 0);
    assert_eq!(stats.flush_count, 1);

    let writes = received_writes(&mock_server).await;
    assert_eq!(writes.len(), 2);
    assert_eq!(writes[0], writes[1]);
    assert_eq!(writes[1], "cpu value=1 1434055562000000000\n");

    backend.close().await.unwrap();
}

#[tokio::test]
async fn test_rejected_batch_is_dropped() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/write"))
        .respond_with(mock_ok(400).set_body_string(r#"{"error":"unable to parse 'cpu value='"}"#))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(mock_ok(204))
        .mount(&mock_server)
        .await;

    let backend = HttpBackend::spawn(create_test_backend_config(&mock_server.uri())).unwrap();

    let payload = compress(b"cpu value=").unwrap();
    assert_matches!(
        backend.write_compressed(&payload).await,
        Err(BackendError::BadRequest(body)) if body.contains("unable to parse")
    );

    let stats = backend.stats().await;
    assert!(stats.active);
    assert_eq!(stats.retry_batches, 0);

    backend.close().await.unwrap();
}

#[tokio::test]
async fn test_query_unreachable_backend() {
    let backend = HttpBackend::spawn(create_unreachable_backend_config()).unwrap();

    let mut response = QueryResponse::new();
    let result = backend
        .query(&mut response, &QueryRequest::new("test", "show measurements"))
        .await;

    assert_matches!(result, Err(e) if e.is_transport());
    assert_eq!(response.status(), None);

    backend.close().await.unwrap();
}

#[tokio::test]
async fn test_slow_query_times_out() {
    let mock_server = MockServer::start().await;
    Mock::given(path("/query"))
        .respond_with(mock_ok(200).set_delay(Duration::from_secs(2)))
        .mount(&mock_server)
        .await;

    let mut config = create_test_backend_config(&mock_server.uri());
    config.timeout = 200;
    let backend = HttpBackend::spawn(config).unwrap();

    let mut response = QueryResponse::new();
    let result = backend
        .query(&mut response, &QueryRequest::new("test", "select * from cpu"))
        .await;
    assert_matches!(result, Err(BackendError::Timeout));

    backend.close().await.unwrap();
}

#[tokio::test]
async fn test_retry_queue_drops_oldest_batches() {
    let mut config = create_unreachable_backend_config();
    config.retry_max_bytes = 100;
    let backend = HttpBackend::spawn(config).unwrap();

    for fill in [1u8, 2, 3] {
        backend.write_compressed(&[fill; 60]).await.unwrap();
    }

    let stats = backend.stats().await;
    assert_eq!(stats.retry_batches, 1);
    assert_eq!(stats.retry_bytes, 60);

    assert_matches!(
        backend.close().await,
        Err(BackendError::Undelivered { batches: 1, bytes: 60 })
    );
}

#[tokio::test]
async fn test_writes_after_close_are_refused() {
    let mock_server = start_mock_backend().await;
    let backend = HttpBackend::spawn(create_test_backend_config(&mock_server.uri())).unwrap();

    backend.close().await.unwrap();

    assert_matches!(backend.write(b"cpu value=1").await, Err(BackendError::Closed));
    assert_matches!(
        backend.write_compressed(&compress(b"cpu value=1").unwrap()).await,
        Err(BackendError::Closed)
    );
    assert!(received_writes(&mock_server).await.is_empty());
}
