//! In-memory debug log and request statistics.
//!
//! [`DebugLog`] is the gateway's [`OutcomeSink`]: it keeps the newest
//! outcome records in a bounded ring buffer and folds every record into
//! cumulative [`Stats`]. `GET /debug` serves both.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::gateway::outcome::{OutcomeKind, OutcomeRecord, OutcomeSink};
use crate::server::AppState;

pub const DEFAULT_DEBUG_ENTRIES: usize = 100;
pub const MAX_DEBUG_ENTRIES: usize = 1000;

#[derive(Debug, Default)]
pub struct Stats {
    pub received: AtomicU64,
    pub forwarded: AtomicU64,
    pub failed: AtomicU64,
    pub unmatched: AtomicU64,
    pub rejected: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub received: u64,
    pub forwarded: u64,
    pub failed: u64,
    pub unmatched: u64,
    pub rejected: u64,
}

impl Stats {
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            unmatched: self.unmatched.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }

    fn observe(&self, record: &OutcomeRecord) {
        if record.kind == OutcomeKind::DryRun {
            return;
        }
        self.received.fetch_add(1, Ordering::Relaxed);
        self.forwarded
            .fetch_add(record.succeeded() as u64, Ordering::Relaxed);
        self.failed.fetch_add(record.failed() as u64, Ordering::Relaxed);
        match record.kind {
            OutcomeKind::Unmatched => {
                self.unmatched.fetch_add(1, Ordering::Relaxed);
            }
            OutcomeKind::ValidationError | OutcomeKind::MethodNotAllowed => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }
}

#[derive(Debug)]
pub struct DebugLog {
    capacity: usize,
    entries: Mutex<VecDeque<OutcomeRecord>>,
    stats: Stats,
}

impl DebugLog {
    /// `capacity` is clamped to [`MAX_DEBUG_ENTRIES`]; zero keeps only stats.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.min(MAX_DEBUG_ENTRIES);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            stats: Stats::default(),
        }
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub const fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Retained records, oldest first.
    #[must_use]
    pub fn entries(&self) -> Vec<OutcomeRecord> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

impl Default for DebugLog {
    fn default() -> Self {
        Self::new(DEFAULT_DEBUG_ENTRIES)
    }
}

impl OutcomeSink for DebugLog {
    fn record(&self, record: OutcomeRecord) {
        self.stats.observe(&record);
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(record);
    }
}

#[derive(Serialize, Deserialize)]
pub struct DebugResponse {
    pub capacity: usize,
    pub stats: StatsSnapshot,
    pub entries: Vec<OutcomeRecord>,
}

pub async fn debug_handler(State(state): State<Arc<AppState>>) -> Json<DebugResponse> {
    let log = &state.debug_log;
    Json(DebugResponse {
        capacity: log.capacity(),
        stats: log.stats().snapshot(),
        entries: log.entries(),
    })
}
