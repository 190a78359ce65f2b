//! Pipeline counters for observability
//!
//! Every recoverable failure is silent at the display surface, so these are
//! the only record that anything was skipped.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::protocol::DropCounts;

#[derive(Debug, Default)]
pub struct PipelineMetrics {
    // Frames
    /// Text frames read from the socket
    pub frames_received: AtomicU64,
    /// Frames the dispatcher rejected
    pub frames_undecodable: AtomicU64,

    // Records
    /// Records normalized and handed to the display buffer
    pub records_accepted: AtomicU64,
    /// Records dropped for a non-text type code
    pub records_filtered: AtomicU64,
    /// Records dropped for hidden status
    pub records_hidden: AtomicU64,
    /// Records that failed to decode or normalize
    pub records_failed: AtomicU64,

    // Connection
    pub connections_started: AtomicU64,
    pub reconnects_scheduled: AtomicU64,
    /// Client-originated keepalive pings
    pub pings_sent: AtomicU64,
    pub liveness_timeouts: AtomicU64,

    start_time: Option<Instant>,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    pub fn frame_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_undecodable(&self) {
        self.frames_undecodable.fetch_add(1, Ordering::Relaxed);
    }

    /// Fold a batch's filter results into the counters.
    pub fn record_drops(&self, dropped: &DropCounts) {
        self.records_filtered
            .fetch_add(dropped.not_text as u64, Ordering::Relaxed);
        self.records_hidden
            .fetch_add(dropped.hidden as u64, Ordering::Relaxed);
        self.records_failed
            .fetch_add(dropped.malformed as u64, Ordering::Relaxed);
    }

    pub fn accept_records(&self, count: usize) {
        self.records_accepted
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.records_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_started(&self) {
        self.connections_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reconnect_scheduled(&self) {
        self.reconnects_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn ping_sent(&self) {
        self.pings_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn liveness_timeout(&self) {
        self.liveness_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.uptime_secs(),
            frames: FrameMetrics {
                received: self.frames_received.load(Ordering::Relaxed),
                undecodable: self.frames_undecodable.load(Ordering::Relaxed),
            },
            records: RecordMetrics {
                accepted: self.records_accepted.load(Ordering::Relaxed),
                filtered: self.records_filtered.load(Ordering::Relaxed),
                hidden: self.records_hidden.load(Ordering::Relaxed),
                failed: self.records_failed.load(Ordering::Relaxed),
            },
            connection: ConnectionMetrics {
                started: self.connections_started.load(Ordering::Relaxed),
                reconnects_scheduled: self.reconnects_scheduled.load(Ordering::Relaxed),
                pings_sent: self.pings_sent.load(Ordering::Relaxed),
                liveness_timeouts: self.liveness_timeouts.load(Ordering::Relaxed),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub frames: FrameMetrics,
    pub records: RecordMetrics,
    pub connection: ConnectionMetrics,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameMetrics {
    pub received: u64,
    pub undecodable: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetrics {
    pub accepted: u64,
    pub filtered: u64,
    pub hidden: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionMetrics {
    pub started: u64,
    pub reconnects_scheduled: u64,
    pub pings_sent: u64,
    pub liveness_timeouts: u64,
}
