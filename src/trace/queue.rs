//! Bounded span buffer shared between request handlers and the export worker.
//!
//! # Design Decisions
//! - `push` never waits: a full buffer drops the span and counts it
//! - One short mutex critical section per push; export work happens outside it
//! - The worker is woken through `Notify` once a full batch is waiting

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::futures::Notified;
use tokio::sync::Notify;

use super::span::SpanData;

/// Export counters since startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExportStats {
    pub enqueued: u64,
    pub exported: u64,
    pub dropped_queue_full: u64,
    pub dropped_export_failed: u64,
    pub queued: usize,
}

#[derive(Debug)]
pub struct SpanQueue {
    buffer: Mutex<VecDeque<SpanData>>,
    capacity: usize,
    batch_size: usize,
    batch_ready: Notify,
    enqueued: AtomicU64,
    exported: AtomicU64,
    dropped_queue_full: AtomicU64,
    dropped_export_failed: AtomicU64,
}

impl SpanQueue {
    pub fn new(capacity: usize, batch_size: usize) -> Self {
        Self {
            buffer: Mutex::new(VecDeque::with_capacity(capacity.min(4096))),
            capacity,
            batch_size: batch_size.max(1),
            batch_ready: Notify::new(),
            enqueued: AtomicU64::new(0),
            exported: AtomicU64::new(0),
            dropped_queue_full: AtomicU64::new(0),
            dropped_export_failed: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<SpanData>> {
        // A panic while holding the lock cannot leave the deque inconsistent.
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a closed span. Returns `false` if the buffer was full.
    pub fn push(&self, span: SpanData) -> bool {
        let len = {
            let mut buffer = self.lock();
            if buffer.len() >= self.capacity {
                drop(buffer);
                self.dropped_queue_full.fetch_add(1, Ordering::Relaxed);
                return false;
            }
            buffer.push_back(span);
            buffer.len()
        };

        self.enqueued.fetch_add(1, Ordering::Relaxed);
        if len >= self.batch_size {
            self.batch_ready.notify_one();
        }
        true
    }

    /// Take up to `max` spans from the front.
    pub fn drain_batch(&self, max: usize) -> Vec<SpanData> {
        let mut buffer = self.lock();
        let n = buffer.len().min(max);
        buffer.drain(..n).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Resolves after a push filled a batch.
    pub fn batch_ready(&self) -> Notified<'_> {
        self.batch_ready.notified()
    }

    pub fn record_exported(&self, n: usize) {
        self.exported.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn record_export_failed(&self, n: usize) {
        self.dropped_export_failed.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn stats(&self) -> ExportStats {
        ExportStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            exported: self.exported.load(Ordering::Relaxed),
            dropped_queue_full: self.dropped_queue_full.load(Ordering::Relaxed),
            dropped_export_failed: self.dropped_export_failed.load(Ordering::Relaxed),
            queued: self.len(),
        }
    }
}
