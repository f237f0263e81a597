//! Transport to InfluxDB backends
//!
//! Each configured backend gets one [`HttpBackend`]: a buffered write path
//! with size and time flush triggers, gzip compression, periodic health checks,
//! re-sending of failed batches and query passthrough.
//!
//! ## Usage
//!
//! ```no_run
//! use influx_proxy::backend::{HttpBackend, QueryRequest, QueryResponse};
//! use influx_proxy::config::BackendConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let backend = HttpBackend::spawn(BackendConfig::new("http://127.0.0.1:8086", "telegraf"))?;
//!     backend.write(b"cpu,host=a value=1 1434055562000000000").await?;
//!
//!     let mut response = QueryResponse::new();
//!     backend
//!         .query(&mut response, &QueryRequest::new("telegraf", "select * from cpu"))
//!         .await?;
//!
//!     backend.close().await?;
//!     Ok(())
//! }
//! ```

pub mod compress;
pub mod error;
pub mod messages;
pub mod retry;
pub mod sink;
pub mod transport;

/// Header carrying the backend's version on every response
pub const VERSION_HEADER: &str = "X-Influxdb-Version";

pub use compress::compress;
pub use error::{BackendError, BackendResult};
pub use messages::BackendStats;
pub use sink::{QueryResponse, ResponseSink};
pub use transport::{HttpBackend, QueryRequest};
