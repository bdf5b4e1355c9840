//! Memory: test double for the search backend.
//!
//! [`MemorySink`] keeps every delivered record in memory and can be
//! switched into a failing mode to exercise delivery-failure paths.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use super::{Delivery, RecordSink, SinkError, SinkFuture};
use crate::record::LogRecord;
use crate::route::RoutedRecord;

/// A record as the backend would have stored it.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub index: String,
    pub record: LogRecord,
}

pub struct MemorySink {
    default_index: String,
    stored: Mutex<Vec<StoredRecord>>,
    failing: AtomicBool,
}

impl MemorySink {
    pub fn new(default_index: impl Into<String>) -> Self {
        Self {
            default_index: default_index.into(),
            stored: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
        }
    }

    /// Make every following write fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    pub fn stored(&self) -> Vec<StoredRecord> {
        self.stored.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.stored.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.stored.lock().is_empty()
    }

    /// Stored records for one index, in write order.
    pub fn in_index(&self, index: &str) -> Vec<LogRecord> {
        self.stored
            .lock()
            .iter()
            .filter(|s| s.index == index)
            .map(|s| s.record.clone())
            .collect()
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new("logstash")
    }
}

impl RecordSink for MemorySink {
    fn write<'a>(&'a self, routed: &'a RoutedRecord) -> SinkFuture<'a> {
        Box::pin(async move {
            let index = routed
                .index
                .clone()
                .unwrap_or_else(|| self.default_index.clone());

            if self.failing.load(Ordering::Relaxed) {
                return Err(SinkError::Unavailable(format!("memory sink failing ({})", index)));
            }

            self.stored.lock().push(StoredRecord {
                index: index.clone(),
                record: routed.record.clone(),
            });
            Ok(Delivery { index, retries: 0 })
        })
    }

    fn name(&self) -> &'static str {
        "memory"
    }

    fn destination(&self) -> String {
        "memory".to_string()
    }
}
