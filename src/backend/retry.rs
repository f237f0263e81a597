//! Bounded queue of write batches waiting to be re-sent
//!
//! Batches land here when a flush fails. The rewrite timer drains the queue
//! oldest-first while the backend is active. Retention is bounded both by
//! total size and by age; whatever falls outside the bounds is dropped.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::warn;

/// A compressed batch that failed to reach the backend
#[derive(Debug, Clone)]
pub struct PendingBatch {
    pub payload: Bytes,
    pub queued_at: Instant,
}

#[derive(Debug)]
pub struct RetryQueue {
    batches: VecDeque<PendingBatch>,
    bytes: usize,
    max_bytes: usize,
    max_age: Duration,
}

impl RetryQueue {
    pub fn new(max_bytes: usize, max_age: Duration) -> Self {
        Self {
            batches: VecDeque::new(),
            bytes: 0,
            max_bytes,
            max_age,
        }
    }

    /// Queue a payload, dropping the oldest batches if the size bound is
    /// exceeded
    ///
    /// Returns the number of batches dropped.
    pub fn push(&mut self, payload: Bytes) -> usize {
        self.bytes += payload.len();
        self.batches.push_back(PendingBatch {
            payload,
            queued_at: Instant::now(),
        });

        let mut dropped = 0;
        while self.bytes > self.max_bytes {
            let Some(oldest) = self.batches.pop_front() else {
                break;
            };
            self.bytes -= oldest.payload.len();
            dropped += 1;
        }

        if dropped > 0 {
            warn!("retry queue over {} bytes, dropped {dropped} batches", self.max_bytes);
        }
        dropped
    }

    /// Drop every batch queued longer than the maximum age before `now`
    pub fn expire(&mut self, now: Instant) -> usize {
        let mut dropped = 0;
        while let Some(oldest) = self.batches.front() {
            if now.saturating_duration_since(oldest.queued_at) <= self.max_age {
                break;
            }
            if let Some(batch) = self.batches.pop_front() {
                self.bytes -= batch.payload.len();
                dropped += 1;
            }
        }

        if dropped > 0 {
            warn!("dropped {dropped} batches older than {:?}", self.max_age);
        }
        dropped
    }

    pub fn pop(&mut self) -> Option<PendingBatch> {
        let batch = self.batches.pop_front()?;
        self.bytes -= batch.payload.len();
        Some(batch)
    }

    /// Put a batch back at the front after a failed re-send
    pub fn requeue(&mut self, batch: PendingBatch) {
        self.bytes += batch.payload.len();
        self.batches.push_front(batch);
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }
}
