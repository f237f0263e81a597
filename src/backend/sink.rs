//! Destinations for proxied query responses

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::StatusCode;
use reqwest::header::HeaderMap;

use super::VERSION_HEADER;

/// Receiver of a backend's query response, passed through unmodified
///
/// `write_head` is called exactly once, before any body chunk.
#[async_trait]
pub trait ResponseSink: Send {
    async fn write_head(&mut self, status: StatusCode, headers: &HeaderMap) -> std::io::Result<()>;

    async fn write_body(&mut self, chunk: Bytes) -> std::io::Result<()>;
}

/// Sink collecting the whole response in memory
#[derive(Debug, Default)]
pub struct QueryResponse {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: BytesMut,
}

impl QueryResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Version reported by the backend
    pub fn version(&self) -> Option<&str> {
        self.header(VERSION_HEADER)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

#[async_trait]
impl ResponseSink for QueryResponse {
    async fn write_head(&mut self, status: StatusCode, headers: &HeaderMap) -> std::io::Result<()> {
        self.status = Some(status);
        self.headers = headers.clone();
        Ok(())
    }

    async fn write_body(&mut self, chunk: Bytes) -> std::io::Result<()> {
        self.body.extend_from_slice(&chunk);
        Ok(())
    }
}
