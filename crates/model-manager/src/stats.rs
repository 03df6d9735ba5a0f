//! Per-key run statistics
//!
//! A stats entry is created when a model is registered under a key and is
//! updated by the run queue after every dispatched batch. Models hold only a
//! weak reference to their entry.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use common::types::BackendKind;

/// Run statistics of one model key
#[derive(Debug)]
pub struct RunStats {
    /// Key the model is registered under
    key: String,

    /// Backend kind of the registered model
    backend: BackendKind,

    /// Device of the registered model
    device: String,

    /// Tag of the registered model
    tag: String,

    /// Number of batches dispatched
    calls: AtomicU64,

    /// Number of requests served
    samples: AtomicU64,

    /// Number of failed batches
    errors: AtomicU64,

    /// Cumulative execution time in microseconds
    duration_us: AtomicU64,

    /// Time of the last dispatched batch
    last_run: Mutex<Option<DateTime<Utc>>>,
}

/// Point-in-time copy of a stats entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub key: String,
    pub backend: BackendKind,
    pub device: String,
    pub tag: String,
    pub calls: u64,
    pub samples: u64,
    pub errors: u64,
    pub duration_us: u64,
    pub last_run: Option<DateTime<Utc>>,
}

impl RunStats {
    /// Creates an empty entry
    pub fn new(key: &str, backend: BackendKind, device: &str, tag: &str) -> Self {
        Self {
            key: key.to_string(),
            backend,
            device: device.to_string(),
            tag: tag.to_string(),
            calls: AtomicU64::new(0),
            samples: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            duration_us: AtomicU64::new(0),
            last_run: Mutex::new(None),
        }
    }

    /// Records a successful batch of `samples` requests
    pub fn record_success(&self, samples: usize, duration: Duration) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.samples.fetch_add(samples as u64, Ordering::Relaxed);
        self.duration_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        *self.last_run.lock() = Some(Utc::now());
    }

    /// Records a failed batch
    pub fn record_error(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.errors.fetch_add(1, Ordering::Relaxed);
        *self.last_run.lock() = Some(Utc::now());
    }

    /// Takes a snapshot
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            key: self.key.clone(),
            backend: self.backend,
            device: self.device.clone(),
            tag: self.tag.clone(),
            calls: self.calls.load(Ordering::Relaxed),
            samples: self.samples.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            duration_us: self.duration_us.load(Ordering::Relaxed),
            last_run: *self.last_run.lock(),
        }
    }
}

/// Stats entries by key
#[derive(Debug, Default)]
pub struct StatsRegistry {
    /// Entries (key -> stats)
    entries: DashMap<String, Arc<RunStats>>,
}

impl StatsRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the entry for a key, replacing (and so resetting) any previous one
    pub fn create(&self, key: &str, backend: BackendKind, device: &str, tag: &str) -> Arc<RunStats> {
        let stats = Arc::new(RunStats::new(key, backend, device, tag));
        self.insert(stats.clone());
        stats
    }

    /// Installs an entry under its own key, replacing any previous one
    pub fn insert(&self, stats: Arc<RunStats>) {
        debug!("Stats entry created for {}", stats.key);
        self.entries.insert(stats.key.clone(), stats);
    }

    /// Gets the entry of a key
    pub fn get(&self, key: &str) -> Option<Arc<RunStats>> {
        self.entries.get(key).map(|entry| entry.clone())
    }

    /// Removes the entry of a key
    pub fn remove(&self, key: &str) -> Option<Arc<RunStats>> {
        self.entries.remove(key).map(|(_, stats)| stats)
    }

    /// Returns the number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
