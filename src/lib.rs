//! Routing and transport core of an InfluxDB proxy
//!
//! - [`influxql`]: tokenizes and classifies InfluxQL statements for routing
//! - [`line_protocol`]: normalizes write timestamps to nanoseconds
//! - [`backend`]: buffered, compressed, health-checked HTTP transport
//! - [`config`]: backend configuration

pub mod backend;
pub mod config;
pub mod influxql;
pub mod line_protocol;
