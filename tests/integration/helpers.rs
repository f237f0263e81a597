//! Helper functions for integration tests

use std::io::Read;

use flate2::read::GzDecoder;
use influx_proxy::backend::VERSION_HEADER;
use influx_proxy::config::BackendConfig;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TEST_VERSION: &str = "1.8.10";

pub fn create_test_backend_config(url: &str) -> BackendConfig {
    BackendConfig {
        name: Some("test-backend".to_string()),
        flush_size: 1000,
        flush_time: 200,
        timeout: 4000,
        check_interval: 1000,
        rewrite_interval: 1000,
        ..BackendConfig::new(url, "test")
    }
}

/// Config pointing at a port nothing listens on
pub fn create_unreachable_backend_config() -> BackendConfig {
    BackendConfig {
        timeout: 500,
        ..create_test_backend_config("http://127.0.0.1:9")
    }
}

pub fn mock_ok(status: u16) -> ResponseTemplate {
    ResponseTemplate::new(status).insert_header(VERSION_HEADER, TEST_VERSION)
}

/// A backend accepting writes and pings and answering every query
pub async fn start_mock_backend() -> MockServer {
    let mock_server = MockServer::start().await;

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

    Mock::given(path("/query"))
        .respond_with(mock_ok(200).set_body_json(serde_json::json!({
            "results": [{
                "statement_id": 0,
                "series": [{ "name": "test", "columns": ["name"], "values": [["value"]] }]
            }]
        })))
        .mount(&mock_server)
        .await;

    mock_server
}

pub fn gunzip(payload: &[u8]) -> Vec<u8> {
    let mut decoded = Vec::new();
    GzDecoder::new(payload).read_to_end(&mut decoded).unwrap();
    decoded
}

/// Decompressed bodies of every `/write` request the mock received
pub async fn received_writes(mock_server: &MockServer) -> Vec<String> {
    mock_server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == "/write")
        .map(|r| String::from_utf8(gunzip(&r.body)).unwrap())
        .collect()
}
