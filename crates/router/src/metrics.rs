use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use serde::Serialize;

use crate::route::{RoutedRecord, TimeSource};

/// Forces the wrapped group onto its own cache line so counters bumped by
/// different connection tasks don't contend.
#[repr(align(64))]
#[derive(Debug, Default)]
pub struct CacheAligned<T>(pub T);

/// Listener-side counters
#[derive(Debug, Default)]
pub struct ConnectionMetrics {
    pub accepted: AtomicU64,
    /// Closed immediately because `max_connections` was reached
    pub rejected: AtomicU64,
    pub active: AtomicI64,
}

/// Per-record counters (hottest path - updated per line)
#[derive(Debug, Default)]
pub struct RecordMetrics {
    pub received: AtomicU64,
    /// Sentinel-typed records given a dated index
    pub routed: AtomicU64,
    pub passthrough: AtomicU64,
    /// Routed records that fell back to receipt time
    pub time_fallbacks: AtomicU64,
    /// Routed records whose timestamp was present but unparsable
    pub date_parse_failures: AtomicU64,
}

/// Dropped input
#[derive(Debug, Default)]
pub struct DecodeMetrics {
    pub invalid: AtomicU64,
    pub oversized: AtomicU64,
}

/// Sink outcomes
#[derive(Debug, Default)]
pub struct DeliveryMetrics {
    pub delivered: AtomicU64,
    pub failed: AtomicU64,
    pub retries: AtomicU64,
}

/// Pipeline metrics shared by every connection task.
///
/// All operations use `Ordering::Relaxed`; `snapshot()` is not atomic
/// across fields.
#[derive(Debug, Default)]
pub struct RouterMetrics {
    pub connections: CacheAligned<ConnectionMetrics>,
    pub records: CacheAligned<RecordMetrics>,
    pub decode: CacheAligned<DecodeMetrics>,
    pub delivery: CacheAligned<DeliveryMetrics>,
}

impl RouterMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    // --- Connections ---

    #[inline]
    pub fn connection_opened(&self) {
        self.connections.0.accepted.fetch_add(1, Ordering::Relaxed);
        self.connections.0.active.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn connection_closed(&self) {
        self.connections.0.active.fetch_sub(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn connection_rejected(&self) {
        self.connections.0.rejected.fetch_add(1, Ordering::Relaxed);
    }

    // --- Records ---

    /// Record the routing outcome of one decoded record.
    #[inline]
    pub fn record_routed(&self, routed: &RoutedRecord) {
        self.records.0.received.fetch_add(1, Ordering::Relaxed);
        match routed.time_source {
            None => {
                self.records.0.passthrough.fetch_add(1, Ordering::Relaxed);
            }
            Some(source) => {
                self.records.0.routed.fetch_add(1, Ordering::Relaxed);
                if source.is_fallback() {
                    self.records.0.time_fallbacks.fetch_add(1, Ordering::Relaxed);
                }
                if source == TimeSource::Unparsable {
                    self.records.0.date_parse_failures.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    #[inline]
    pub fn record_invalid(&self) {
        self.decode.0.invalid.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_oversized(&self) {
        self.decode.0.oversized.fetch_add(1, Ordering::Relaxed);
    }

    // --- Delivery ---

    #[inline]
    pub fn record_delivered(&self, retries: u32) {
        self.delivery.0.delivered.fetch_add(1, Ordering::Relaxed);
        if retries > 0 {
            self.delivery.0.retries.fetch_add(retries as u64, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_delivery_failed(&self, retries: u32) {
        self.delivery.0.failed.fetch_add(1, Ordering::Relaxed);
        if retries > 0 {
            self.delivery.0.retries.fetch_add(retries as u64, Ordering::Relaxed);
        }
    }

    pub fn active_connections(&self) -> i64 {
        self.connections.0.active.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let c = &self.connections.0;
        let r = &self.records.0;
        let d = &self.decode.0;
        let s = &self.delivery.0;
        MetricsSnapshot {
            connections: ConnectionSnapshot {
                accepted: c.accepted.load(Ordering::Relaxed),
                rejected: c.rejected.load(Ordering::Relaxed),
                active: c.active.load(Ordering::Relaxed),
            },
            records: RecordSnapshot {
                received: r.received.load(Ordering::Relaxed),
                routed: r.routed.load(Ordering::Relaxed),
                passthrough: r.passthrough.load(Ordering::Relaxed),
                time_fallbacks: r.time_fallbacks.load(Ordering::Relaxed),
                date_parse_failures: r.date_parse_failures.load(Ordering::Relaxed),
            },
            decode: DecodeSnapshot {
                invalid: d.invalid.load(Ordering::Relaxed),
                oversized: d.oversized.load(Ordering::Relaxed),
            },
            delivery: DeliverySnapshot {
                delivered: s.delivered.load(Ordering::Relaxed),
                failed: s.failed.load(Ordering::Relaxed),
                retries: s.retries.load(Ordering::Relaxed),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub connections: ConnectionSnapshot,
    pub records: RecordSnapshot,
    pub decode: DecodeSnapshot,
    pub delivery: DeliverySnapshot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionSnapshot {
    pub accepted: u64,
    pub rejected: u64,
    pub active: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordSnapshot {
    pub received: u64,
    pub routed: u64,
    pub passthrough: u64,
    pub time_fallbacks: u64,
    pub date_parse_failures: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodeSnapshot {
    pub invalid: u64,
    pub oversized: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliverySnapshot {
    pub delivered: u64,
    pub failed: u64,
    pub retries: u64,
}
