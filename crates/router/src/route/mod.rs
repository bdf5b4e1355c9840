//! Per-record routing: pick the destination index for sentinel-typed records.
//!
//! Records whose type field equals the sentinel get a canonical event time
//! (parsed from their timestamp, or the time of receipt) and a day-bucketed
//! index name. Everything else passes through untouched and lands in the
//! sink's default index.

pub mod timestamp;

use chrono::{DateTime, Utc};

use crate::conf::RoutingConfig;
use crate::record::LogRecord;

pub use timestamp::{format_event_time, index_date, parse_iso8601};

/// Where the event time of a routed record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeSource {
    /// Parsed from the record's timestamp field
    Parsed,
    /// No timestamp field; receipt time used
    MissingField,
    /// Timestamp present but not ISO-8601; receipt time used
    Unparsable,
}

impl TimeSource {
    pub fn is_fallback(&self) -> bool {
        !matches!(self, TimeSource::Parsed)
    }
}

/// A record plus its ephemeral routing metadata.
///
/// `index` is never written into the record itself.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedRecord {
    pub record: LogRecord,
    /// Destination override; `None` means the sink's default index
    pub index: Option<String>,
    /// Set only for sentinel-typed records
    pub time_source: Option<TimeSource>,
}

impl RoutedRecord {
    pub fn passthrough(record: LogRecord) -> Self {
        Self {
            record,
            index: None,
            time_source: None,
        }
    }

    pub fn is_routed(&self) -> bool {
        self.index.is_some()
    }
}

/// Stateless record transform built from [`RoutingConfig`].
#[derive(Debug, Clone)]
pub struct RecordRouter {
    config: RoutingConfig,
}

impl RecordRouter {
    pub fn new(config: RoutingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    /// True when the record's type field is the sentinel string.
    pub fn matches(&self, record: &LogRecord) -> bool {
        record.get_str(&self.config.type_field) == Some(self.config.sentinel_type.as_str())
    }

    /// Route one record received at `received_at`.
    ///
    /// Never fails: a missing or malformed timestamp falls back to the
    /// receipt time.
    pub fn route(&self, mut record: LogRecord, received_at: DateTime<Utc>) -> RoutedRecord {
        if !self.matches(&record) {
            return RoutedRecord::passthrough(record);
        }

        let (event_time, source) = match record.get(&self.config.timestamp_field) {
            None => (received_at, TimeSource::MissingField),
            Some(value) => match value.as_str().and_then(parse_iso8601) {
                Some(parsed) => (parsed, TimeSource::Parsed),
                None => (received_at, TimeSource::Unparsable),
            },
        };

        record.insert(self.config.target_field.clone(), format_event_time(&event_time));
        if source == TimeSource::Unparsable && !self.config.failure_tag.is_empty() {
            record.add_tag(&self.config.failure_tag);
        }

        RoutedRecord {
            record,
            index: Some(self.index_for(&event_time)),
            time_source: Some(source),
        }
    }

    /// Index prefix concatenated with the `YYYY.MM.dd` day of `event_time`.
    pub fn index_for(&self, event_time: &DateTime<Utc>) -> String {
        format!("{}{}", self.config.index_prefix, index_date(event_time))
    }
}

impl Default for RecordRouter {
    fn default() -> Self {
        Self::new(RoutingConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::{json, Value};

    fn record(value: Value) -> LogRecord {
        LogRecord::from_slice(value.to_string().as_bytes()).unwrap()
    }

    fn received() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 30, 0).unwrap()
    }

    // ── Sentinel records ─────────────────────────────────────────

    #[test]
    fn test_sentinel_with_valid_timestamp() {
        let router = RecordRouter::default();
        let routed = router.route(
            record(json!({"type":"travel_agent","timestamp":"2024-03-15T10:00:00Z","msg":"hello"})),
            received(),
        );
        assert_eq!(routed.index.as_deref(), Some("travel_agent-2024.03.15"));
        assert_eq!(routed.time_source, Some(TimeSource::Parsed));
        assert_eq!(routed.record.get_str("@timestamp"), Some("2024-03-15T10:00:00.000Z"));
        assert_eq!(routed.record.get_str("msg"), Some("hello"));
        assert_eq!(routed.record.get_str("timestamp"), Some("2024-03-15T10:00:00Z"));
        assert!(routed.record.get("tags").is_none());
    }

    #[test]
    fn test_sentinel_with_unparsable_timestamp_uses_receipt_date() {
        let router = RecordRouter::default();
        let routed = router.route(
            record(json!({"type":"travel_agent","timestamp":"not-a-date"})),
            received(),
        );
        assert_eq!(routed.index.as_deref(), Some("travel_agent-2024.01.01"));
        assert_eq!(routed.time_source, Some(TimeSource::Unparsable));
        assert_eq!(routed.record.get_str("@timestamp"), Some("2024-01-01T12:30:00.000Z"));
        assert_eq!(routed.record.get("tags"), Some(&json!(["_dateparsefailure"])));
    }

    #[test]
    fn test_sentinel_with_missing_timestamp_uses_receipt_date() {
        let router = RecordRouter::default();
        let routed = router.route(record(json!({"type":"travel_agent"})), received());
        assert_eq!(routed.index.as_deref(), Some("travel_agent-2024.01.01"));
        assert_eq!(routed.time_source, Some(TimeSource::MissingField));
        assert!(routed.record.get("tags").is_none(), "Missing timestamp is not a parse failure");
    }

    #[test]
    fn test_sentinel_with_numeric_timestamp_falls_back() {
        let router = RecordRouter::default();
        let routed = router.route(
            record(json!({"type":"travel_agent","timestamp":1710496800})),
            received(),
        );
        assert_eq!(routed.index.as_deref(), Some("travel_agent-2024.01.01"));
        assert_eq!(routed.time_source, Some(TimeSource::Unparsable));
    }

    #[test]
    fn test_sentinel_uses_utc_day_of_offset_timestamp() {
        let router = RecordRouter::default();
        let routed = router.route(
            record(json!({"type":"travel_agent","timestamp":"2024-03-15T01:00:00+03:00"})),
            received(),
        );
        assert_eq!(routed.index.as_deref(), Some("travel_agent-2024.03.14"));
    }

    #[test]
    fn test_failure_tag_can_be_disabled() {
        let router = RecordRouter::new(RoutingConfig {
            failure_tag: String::new(),
            ..Default::default()
        });
        let routed = router.route(
            record(json!({"type":"travel_agent","timestamp":"nope"})),
            received(),
        );
        assert!(routed.record.get("tags").is_none());
    }

    // ── Pass-through records ─────────────────────────────────────

    #[test]
    fn test_other_type_passes_through_unchanged() {
        let router = RecordRouter::default();
        let input = record(json!({"type":"other","timestamp":"2024-03-15T10:00:00Z"}));
        let routed = router.route(input.clone(), received());
        assert_eq!(routed.index, None);
        assert_eq!(routed.time_source, None);
        assert_eq!(routed.record, input);
        assert!(!routed.is_routed());
    }

    #[test]
    fn test_missing_type_passes_through() {
        let router = RecordRouter::default();
        let input = record(json!({"timestamp":"2024-03-15T10:00:00Z","msg":"x"}));
        let routed = router.route(input.clone(), received());
        assert_eq!(routed, RoutedRecord::passthrough(input));
    }

    #[test]
    fn test_non_string_type_passes_through() {
        let router = RecordRouter::default();
        let routed = router.route(record(json!({"type":["travel_agent"]})), received());
        assert_eq!(routed.index, None);
    }

    #[test]
    fn test_type_match_is_case_sensitive() {
        let router = RecordRouter::default();
        let routed = router.route(record(json!({"type":"Travel_Agent"})), received());
        assert_eq!(routed.index, None);
    }

    // ── Configuration ────────────────────────────────────────────

    #[test]
    fn test_custom_fields_and_prefix() {
        let router = RecordRouter::new(RoutingConfig {
            type_field: "kind".to_string(),
            sentinel_type: "planner".to_string(),
            timestamp_field: "ts".to_string(),
            target_field: "event_time".to_string(),
            index_prefix: "plans_".to_string(),
            ..Default::default()
        });
        let routed = router.route(
            record(json!({"kind":"planner","ts":"2023-12-31T23:59:59Z"})),
            received(),
        );
        assert_eq!(routed.index.as_deref(), Some("plans_2023.12.31"));
        assert_eq!(routed.record.get_str("event_time"), Some("2023-12-31T23:59:59.000Z"));
        assert!(routed.record.get("@timestamp").is_none());
    }

    // ── Idempotence ──────────────────────────────────────────────

    #[test]
    fn test_routing_twice_gives_same_destination() {
        let router = RecordRouter::default();
        let inputs = [
            json!({"type":"travel_agent","timestamp":"2024-03-15T10:00:00Z"}),
            json!({"type":"travel_agent","timestamp":"garbage"}),
            json!({"type":"travel_agent"}),
            json!({"type":"other"}),
        ];
        for input in inputs {
            let first = router.route(record(input.clone()), received());
            let second = router.route(record(input), received());
            assert_eq!(first, second);

            let rerouted = router.route(first.record.clone(), received());
            assert_eq!(rerouted.index, first.index);
            assert_eq!(rerouted.record, first.record);
        }
    }
}
