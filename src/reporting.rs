//! Error reporting handed to the core components at construction time.

use chrono::{DateTime, Duration, Utc};
use log::Level;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::clock::{Clock, SystemClock};

/// Default number of reports kept in memory
pub const RECENT_ERRORS_CAPACITY: usize = 100;

/// Sink for problems the core recovers from or surfaces as failures
pub trait ErrorReporter: Send + Sync {
    fn report(&self, level: Level, source: &str, message: &str);
}

/// Forwards every report to the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, level: Level, source: &str, message: &str) {
        log::log!(target: "reftrak", level, "[{}] {}", source, message);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub source: String,
    pub message: String,
}

/// Counts over the kept reports
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErrorStats {
    pub total: usize,
    pub by_level: BTreeMap<String, usize>,
    pub by_source: BTreeMap<String, usize>,
    /// Reports from the last 24 hours
    pub recent_24h: usize,
}

/// Logs like [`LogReporter`] and keeps the most recent warnings and errors
/// for operators to inspect
pub struct RecentErrors {
    records: Mutex<VecDeque<ErrorRecord>>,
    capacity: usize,
    clock: Arc<dyn Clock>,
}

impl RecentErrors {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            clock: Arc::new(SystemClock),
        }
    }

    /// Timestamps reports with `clock`
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Newest first
    pub fn recent(&self) -> Vec<ErrorRecord> {
        self.query(usize::MAX, None)
    }

    /// At most `limit` records, newest first, optionally only those at `level`
    pub fn query(&self, limit: usize, level: Option<Level>) -> Vec<ErrorRecord> {
        let wanted = level.map(level_name);
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records
            .iter()
            .rev()
            .filter(|r| wanted.as_deref().map_or(true, |l| r.level == l))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> ErrorStats {
        let day_ago = self.clock.now() - Duration::hours(24);
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());

        let mut stats = ErrorStats {
            total: records.len(),
            ..Default::default()
        };
        for record in records.iter() {
            *stats.by_level.entry(record.level.clone()).or_default() += 1;
            *stats.by_source.entry(record.source.clone()).or_default() += 1;
            if record.timestamp > day_ago {
                stats.recent_24h += 1;
            }
        }
        stats
    }

    /// Returns how many records were dropped
    pub fn clear(&self) -> usize {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let count = records.len();
        records.clear();
        count
    }
}

fn level_name(level: Level) -> String {
    level.as_str().to_lowercase()
}

impl Default for RecentErrors {
    fn default() -> Self {
        Self::new(RECENT_ERRORS_CAPACITY)
    }
}

impl ErrorReporter for RecentErrors {
    fn report(&self, level: Level, source: &str, message: &str) {
        LogReporter.report(level, source, message);

        // info/debug chatter is not worth keeping
        if level > Level::Warn || self.capacity == 0 {
            return;
        }

        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(ErrorRecord {
            timestamp: self.clock.now(),
            level: level_name(level),
            source: source.to_string(),
            message: message.to_string(),
        });
    }
}
