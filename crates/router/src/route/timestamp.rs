//! ISO-8601 event-time parsing.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};

/// Offset-carrying shapes not covered by RFC 3339 (offset without a colon).
const OFFSET_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"];

/// Local date-times without an offset, read as UTC.
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

/// Parse an ISO-8601 date-time into UTC.
///
/// Accepts RFC 3339 (`Z` or `±hh:mm`, optional fraction, `T` or space),
/// `±hhmm` offsets, offset-less date-times (UTC), a comma as the fraction
/// separator, and a bare date (midnight UTC).
pub fn parse_iso8601(input: &str) -> Option<DateTime<Utc>> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    let normalized = trimmed.replacen(',', ".", 1);
    let s = normalized.as_str();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Canonical rendering of the event time: RFC 3339, UTC, milliseconds.
pub fn format_event_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Day bucket used in index names, `YYYY.MM.dd`.
pub fn index_date(time: &DateTime<Utc>) -> String {
    time.format("%Y.%m.%d").to_string()
}
