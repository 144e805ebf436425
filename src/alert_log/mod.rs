//! AlertLog - Firing History (Ring Buffer)
//!
//! ## Responsibilities
//!
//! - Keep the most recent firing records in memory
//! - Provide lookups for diagnostics

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use tokio::sync::RwLock;

/// Outcome of one firing
#[derive(Debug, Clone, Serialize)]
pub struct FiringRecord {
    /// Firing identity, monotonic for the process lifetime
    pub firing_seq: u64,
    pub fired_at: DateTime<Utc>,
    /// Tracked persons at the moment of the firing
    pub count: usize,
    /// Snapshots that made it into the batch
    pub attached: usize,
    /// Per-item crop/write failures (degraded attachment set)
    pub write_failures: usize,
    /// Whether the notification was delivered
    pub sent: bool,
    /// Entries removed by the post-send clear; None when cleanup was skipped
    pub cleared: Option<usize>,
}

/// Ring buffer for firing records
struct FiringRingBuffer {
    records: VecDeque<FiringRecord>,
    capacity: usize,
}

impl FiringRingBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, record: FiringRecord) {
        if self.records.len() >= self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    fn latest(&self, count: usize) -> Vec<FiringRecord> {
        self.records.iter().rev().take(count).cloned().collect()
    }
}

/// AlertLogService instance
pub struct AlertLogService {
    buffer: RwLock<FiringRingBuffer>,
}

impl AlertLogService {
    /// Create a new log with the given capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: RwLock::new(FiringRingBuffer::new(capacity)),
        }
    }

    /// Record a firing
    pub async fn record(&self, record: FiringRecord) {
        let mut buffer = self.buffer.write().await;
        tracing::debug!(firing_seq = record.firing_seq, "Firing recorded");
        buffer.push(record);
    }

    /// Most recent firings, newest first
    pub async fn latest(&self, count: usize) -> Vec<FiringRecord> {
        let buffer = self.buffer.read().await;
        buffer.latest(count)
    }

    /// Number of retained records
    pub async fn count(&self) -> usize {
        let buffer = self.buffer.read().await;
        buffer.records.len()
    }
}

impl Default for AlertLogService {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(firing_seq: u64) -> FiringRecord {
        FiringRecord {
            firing_seq,
            fired_at: Utc::now(),
            count: 1,
            attached: 1,
            write_failures: 0,
            sent: true,
            cleared: Some(1),
        }
    }

    #[tokio::test]
    async fn test_latest_is_newest_first() {
        let log = AlertLogService::new(8);
        log.record(record(1)).await;
        log.record(record(2)).await;
        log.record(record(3)).await;

        let latest = log.latest(2).await;
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].firing_seq, 3);
        assert_eq!(latest[1].firing_seq, 2);
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let log = AlertLogService::new(2);
        log.record(record(1)).await;
        log.record(record(2)).await;
        log.record(record(3)).await;

        assert_eq!(log.count().await, 2);
        let latest = log.latest(8).await;
        assert_eq!(latest[1].firing_seq, 2);
    }
}
