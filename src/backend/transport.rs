//! HttpBackend - Buffered, health-checked HTTP transport to one InfluxDB
//!
//! ## Write Path
//!
//! ```text
//! write() → buffer (BytesMut behind a mutex)
//!              │  size trigger (foreground) / flush timer (actor)
//!              ▼
//!           split buffer under the lock → gzip → POST /write
//!                                                  │ failure
//!                                                  ▼
//!                                        RetryQueue ← rewrite timer re-sends
//! ```
//!
//! ## Timers
//!
//! A background actor owns three tickers:
//! - **flush** (`flush_time`): sends whatever the buffer holds
//! - **check** (`check_interval`): pings the backend and flips the active flag
//! - **rewrite** (`rewrite_interval`): re-sends queued batches while active
//!
//! Queries and pings never touch the buffer and run fully concurrently.
//!
//! ## Draining
//!
//! [`HttpBackend::flush`] and [`HttpBackend::close`] send the buffer and the
//! retry queue even while the backend is marked inactive, and report whatever
//! could not be delivered as [`BackendError::Undelivered`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use bytes::{Bytes, BytesMut};
use reqwest::header::CONTENT_ENCODING;
use reqwest::{Method, StatusCode};
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::time::{MissedTickBehavior, interval, interval_at};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::config::BackendConfig;

use super::VERSION_HEADER;
use super::compress::compress;
use super::error::{BackendError, BackendResult};
use super::messages::{BackendCommand, BackendStats};
use super::retry::RetryQueue;
use super::sink::ResponseSink;

/// A query to forward to the backend's `/query` endpoint
#[derive(Debug, Clone)]
pub struct QueryRequest {
    method: Method,
    params: Vec<(String, String)>,
}

impl QueryRequest {
    /// `GET /query?db=<db>&q=<query>`
    pub fn new(db: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            params: vec![("db".to_string(), db.into()), ("q".to_string(), query.into())],
        }
    }

    /// Send the parameters as a form body instead of the query string
    pub fn post(mut self) -> Self {
        self.method = Method::POST;
        self
    }

    /// Extra parameters passed through as-is (`epoch`, `chunked`, ...)
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    fn has_param(&self, key: &str) -> bool {
        self.params.iter().any(|(k, _)| k == key)
    }
}

/// State shared between the handle and its background actor
#[derive(Debug)]
struct Shared {
    config: BackendConfig,
    client: reqwest::Client,
    write_url: String,
    query_url: String,
    ping_url: String,
    buffer: Mutex<BytesMut>,
    retry: Mutex<RetryQueue>,
    active: AtomicBool,
    closed: AtomicBool,
    flush_count: AtomicU64,
    failed_flushes: AtomicU64,
}

impl Shared {
    fn new(config: BackendConfig) -> BackendResult<Self> {
        if let Some(field) = config.zero_interval() {
            return Err(BackendError::InvalidConfig(format!("{field} must be non-zero")));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;

        let base = config.url.trim_end_matches('/').to_string();
        let retry = RetryQueue::new(config.retry_max_bytes, config.retry_max_age());

        Ok(Self {
            write_url: format!("{base}/write"),
            query_url: format!("{base}/query"),
            ping_url: format!("{base}/ping"),
            buffer: Mutex::new(BytesMut::with_capacity(config.flush_size)),
            retry: Mutex::new(retry),
            active: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            flush_count: AtomicU64::new(0),
            failed_flushes: AtomicU64::new(0),
            client,
            config,
        })
    }

    fn name(&self) -> &str {
        self.config.display_name()
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn credentials(&self) -> Vec<(&str, &str)> {
        match (&self.config.username, &self.config.password) {
            (Some(u), Some(p)) => vec![("u", u.as_str()), ("p", p.as_str())],
            _ => Vec::new(),
        }
    }

    /// Claim the current buffer contents and deliver them
    async fn flush(&self) -> BackendResult<()> {
        let batch = {
            let mut buffer = self.buffer.lock().await;
            if buffer.is_empty() {
                return Ok(());
            }
            buffer.split().freeze()
        };

        trace!("flushing {} bytes", batch.len());
        let payload = Bytes::from(compress(&batch)?);
        self.deliver(payload).await
    }

    /// Deliver a gzip payload, queueing it for rewrite on transport failure
    async fn deliver(&self, payload: Bytes) -> BackendResult<()> {
        if !self.is_active() {
            debug!("backend inactive, queueing {} bytes", payload.len());
            self.retry.lock().await.push(payload);
            return Ok(());
        }

        match self.post_write(payload.clone()).await {
            Ok(()) => {
                self.flush_count.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e @ BackendError::BadRequest(_)) => {
                error!("dropping rejected write batch: {e}");
                Err(e)
            }
            Err(e) => {
                warn!("write failed, queueing {} bytes for rewrite: {e}", payload.len());
                self.active.store(false, Ordering::SeqCst);
                self.failed_flushes.fetch_add(1, Ordering::Relaxed);
                self.retry.lock().await.push(payload);
                Err(e)
            }
        }
    }

    #[instrument(skip_all, fields(backend = %self.name(), bytes = payload.len()))]
    async fn post_write(&self, payload: Bytes) -> BackendResult<()> {
        let response = self
            .client
            .post(&self.write_url)
            .query(&[("db", self.config.db.as_str())])
            .query(&self.credentials())
            .header(CONTENT_ENCODING, "gzip")
            .body(payload)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT || status == StatusCode::OK {
            trace!("write accepted ({status})");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::BAD_REQUEST {
            return Err(BackendError::BadRequest(body));
        }
        Err(BackendError::Status {
            code: status.as_u16(),
            body,
        })
    }

    #[instrument(skip(self), fields(backend = %self.name()))]
    async fn ping(&self) -> BackendResult<String> {
        let response = self.client.get(&self.ping_url).send().await?;

        let status = response.status();
        if status != StatusCode::NO_CONTENT && status != StatusCode::OK {
            return Err(BackendError::Status {
                code: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let version = response
            .headers()
            .get(VERSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        trace!("pong, version {version:?}");
        Ok(version)
    }

    async fn check_health(&self) {
        match self.ping().await {
            Ok(version) => {
                if !self.active.swap(true, Ordering::SeqCst) {
                    info!("backend {} is back (version {version})", self.name());
                }
            }
            Err(e) => {
                if self.active.swap(false, Ordering::SeqCst) {
                    warn!("backend {} became inactive: {e}", self.name());
                }
            }
        }
    }

    /// Periodic re-send of queued batches, skipped while inactive
    async fn rewrite(&self) {
        if !self.is_active() {
            return;
        }

        if let Err(e) = self.send_queued().await {
            debug!("rewrite incomplete: {e}");
        }
    }

    /// Move the buffer to the back of the retry queue and send everything
    /// queued, whatever the active flag says
    ///
    /// Fails with [`BackendError::Undelivered`] when batches are left over.
    async fn drain(&self) -> BackendResult<()> {
        let batch = {
            let mut buffer = self.buffer.lock().await;
            (!buffer.is_empty()).then(|| buffer.split().freeze())
        };

        if let Some(batch) = batch {
            trace!("draining {} buffered bytes", batch.len());
            let payload = Bytes::from(compress(&batch)?);
            self.retry.lock().await.push(payload);
        }
        self.send_queued().await
    }

    /// Send queued batches oldest-first, stopping at the first failure
    async fn send_queued(&self) -> BackendResult<()> {
        self.retry.lock().await.expire(Instant::now());

        let mut rejected = None;
        loop {
            let Some(batch) = self.retry.lock().await.pop() else {
                break;
            };

            match self.post_write(batch.payload.clone()).await {
                Ok(()) => {
                    self.flush_count.fetch_add(1, Ordering::Relaxed);
                    if !self.active.swap(true, Ordering::SeqCst) {
                        info!("backend {} accepted a write, marking active", self.name());
                    }
                    trace!("sent queued batch of {} bytes", batch.payload.len());
                }
                Err(e @ BackendError::BadRequest(_)) => {
                    error!("dropping rejected queued batch: {e}");
                    rejected = Some(e);
                }
                Err(e) => {
                    warn!("sending queued batch failed: {e}");
                    self.active.store(false, Ordering::SeqCst);
                    self.failed_flushes.fetch_add(1, Ordering::Relaxed);
                    self.retry.lock().await.requeue(batch);
                    break;
                }
            }
        }

        let retry = self.retry.lock().await;
        if !retry.is_empty() {
            return Err(BackendError::Undelivered {
                batches: retry.len(),
                bytes: retry.bytes(),
            });
        }
        rejected.map_or(Ok(()), Err)
    }
}

/// Background task owning the flush, health check and rewrite timers
struct BackendActor {
    shared: Arc<Shared>,
    command_rx: mpsc::Receiver<BackendCommand>,
    // dropped when the actor ends, however it ends
    _stopped: watch::Sender<()>,
}

impl BackendActor {
    #[instrument(skip(self), fields(backend = %self.shared.name()))]
    async fn run(mut self) {
        debug!("starting backend actor");

        let config = &self.shared.config;
        let start = tokio::time::Instant::now();
        // the health check fires right away, the write timers only after a full period
        let mut check_ticker = interval(config.check_interval());
        let mut flush_ticker = interval_at(start + config.flush_time(), config.flush_time());
        let mut rewrite_ticker =
            interval_at(start + config.rewrite_interval(), config.rewrite_interval());
        for ticker in [&mut flush_ticker, &mut check_ticker, &mut rewrite_ticker] {
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        }

        loop {
            tokio::select! {
                _ = flush_ticker.tick() => {
                    if let Err(e) = self.shared.flush().await {
                        debug!("timed flush failed: {e}");
                    }
                }

                _ = check_ticker.tick() => {
                    self.shared.check_health().await;
                }

                _ = rewrite_ticker.tick() => {
                    self.shared.rewrite().await;
                }

                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(BackendCommand::Flush { respond_to }) => {
                            let _ = respond_to.send(self.shared.drain().await);
                        }

                        Some(BackendCommand::Shutdown { respond_to }) => {
                            debug!("received shutdown command");
                            let _ = respond_to.send(self.shutdown().await);
                            break;
                        }

                        None => {
                            warn!("handle dropped without close, shutting down");
                            let _ = self.shutdown().await;
                            break;
                        }
                    }
                }
            }
        }

        debug!("backend actor stopped");
    }

    async fn shutdown(&self) -> BackendResult<()> {
        self.shared
            .drain()
            .await
            .inspect_err(|e| error!("final flush failed: {e}"))
    }
}

/// Handle to one backend
///
/// Created with [`HttpBackend::spawn`], which starts the background actor on
/// the current tokio runtime. Call [`HttpBackend::close`] to flush and stop it.
#[derive(Debug)]
pub struct HttpBackend {
    shared: Arc<Shared>,
    command_tx: mpsc::Sender<BackendCommand>,
    stopped: watch::Receiver<()>,
}

impl HttpBackend {
    pub fn spawn(config: BackendConfig) -> BackendResult<Self> {
        let shared = Arc::new(Shared::new(config)?);

        let (command_tx, command_rx) = mpsc::channel(32);
        let (stopped_tx, stopped) = watch::channel(());
        let actor = BackendActor {
            shared: shared.clone(),
            command_rx,
            _stopped: stopped_tx,
        };
        tokio::spawn(actor.run());

        Ok(Self {
            shared,
            command_tx,
            stopped,
        })
    }

    pub fn name(&self) -> &str {
        self.shared.name()
    }

    pub fn url(&self) -> &str {
        &self.shared.config.url
    }

    pub fn config(&self) -> &BackendConfig {
        &self.shared.config
    }

    /// Result of the last health check (or failed write)
    pub fn is_active(&self) -> bool {
        self.shared.is_active()
    }

    pub fn is_write_only(&self) -> bool {
        self.shared.config.write_only
    }

    /// Append raw line protocol to the write buffer
    ///
    /// Flushes before returning once the buffer reaches `flush_size`. A
    /// failed flush does not fail the write: the batch is queued for rewrite.
    pub async fn write(&self, points: &[u8]) -> BackendResult<()> {
        if points.is_empty() {
            return Ok(());
        }

        let should_flush = {
            let mut buffer = self.shared.buffer.lock().await;
            // checked under the lock so the final flush of close() sees every accepted write
            if self.shared.closed.load(Ordering::SeqCst) {
                return Err(BackendError::Closed);
            }
            buffer.extend_from_slice(points);
            if !points.ends_with(b"\n") {
                buffer.extend_from_slice(b"\n");
            }
            buffer.len() >= self.shared.config.flush_size
        };

        if should_flush {
            trace!("size-based flush triggered");
            match self.shared.flush().await {
                Ok(()) | Err(BackendError::BadRequest(_)) => {}
                Err(e) if e.is_transport() => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Normalize every line of `body` to nanosecond timestamps, then buffer it
    pub async fn write_with_precision(&self, body: &[u8], precision: &str) -> BackendResult<()> {
        let normalized = crate::line_protocol::normalize_body(body, precision);
        self.write(&normalized).await
    }

    /// Send an already gzip-compressed payload, bypassing the buffer
    ///
    /// Transport failures queue the payload for rewrite and are not
    /// returned; only a payload the backend rejects fails the call.
    pub async fn write_compressed(&self, payload: &[u8]) -> BackendResult<()> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(BackendError::Closed);
        }

        match self.shared.deliver(Bytes::copy_from_slice(payload)).await {
            Err(e) if e.is_transport() => Ok(()),
            other => other,
        }
    }

    /// Liveness probe, returning the version the backend reports
    pub async fn ping(&self) -> BackendResult<String> {
        self.shared.ping().await
    }

    /// Forward a query and stream the backend's response into `sink`
    ///
    /// Backend-reported query errors are relayed through the sink like any
    /// other response; only transport failures are returned.
    #[instrument(skip_all, fields(backend = %self.name()))]
    pub async fn query<S>(&self, sink: &mut S, request: &QueryRequest) -> BackendResult<()>
    where
        S: ResponseSink + ?Sized,
    {
        if self.shared.config.write_only {
            return Err(BackendError::WriteOnly);
        }

        let credentials = if request.has_param("u") {
            Vec::new()
        } else {
            self.shared.credentials()
        };

        let builder = self
            .shared
            .client
            .request(request.method.clone(), &self.shared.query_url);
        let builder = if request.method == Method::POST {
            let mut form: Vec<(&str, &str)> = request
                .params
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect();
            form.extend(credentials);
            builder.form(&form)
        } else {
            builder.query(&request.params).query(&credentials)
        };

        let mut response = builder.send().await?;
        trace!("query answered with {}", response.status());

        sink.write_head(response.status(), response.headers()).await?;
        while let Some(chunk) = response.chunk().await? {
            sink.write_body(chunk).await?;
        }
        Ok(())
    }

    /// Send the write buffer and every queued batch now
    ///
    /// Unlike the flush timer this always contacts the backend, even while it
    /// is marked inactive. Fails with [`BackendError::Undelivered`] if
    /// anything is still queued afterwards.
    pub async fn flush(&self) -> BackendResult<()> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(BackendCommand::Flush { respond_to: tx })
            .await
            .map_err(|_| self.gone())?;
        rx.await.map_err(|_| self.gone())?
    }

    fn gone(&self) -> BackendError {
        if self.shared.closed.load(Ordering::SeqCst) {
            BackendError::Closed
        } else {
            BackendError::Stopped
        }
    }

    pub async fn stats(&self) -> BackendStats {
        let buffered_bytes = self.shared.buffer.lock().await.len();
        let retry = self.shared.retry.lock().await;
        BackendStats {
            active: self.is_active(),
            buffered_bytes,
            retry_batches: retry.len(),
            retry_bytes: retry.bytes(),
            flush_count: self.shared.flush_count.load(Ordering::Relaxed),
            failed_flushes: self.shared.failed_flushes.load(Ordering::Relaxed),
        }
    }

    /// Stop the timers after one final flush
    ///
    /// The final flush contacts the backend even if it is marked inactive and
    /// its result is returned. Later calls wait until the first one has
    /// finished and return `Ok`.
    pub async fn close(&self) -> BackendResult<()> {
        let already_closed = {
            let _buffer = self.shared.buffer.lock().await;
            self.shared.closed.swap(true, Ordering::SeqCst)
        };

        if already_closed {
            let mut stopped = self.stopped.clone();
            // resolves with an error once the actor has dropped its sender
            while stopped.changed().await.is_ok() {}
            return Ok(());
        }

        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(BackendCommand::Shutdown { respond_to: tx })
            .await
            .map_err(|_| BackendError::Stopped)?;
        rx.await.map_err(|_| BackendError::Stopped)?
    }
}
