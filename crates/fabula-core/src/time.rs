//! Timestamp helpers
//!
//! Timestamps are persisted as RFC 3339 strings with second resolution and a
//! `Z` suffix, so the lexicographic order of the stored text matches the
//! chronological order.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};

/// Current time truncated to whole seconds
#[must_use]
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

/// Format a timestamp in the persisted representation
#[must_use]
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse a persisted timestamp (any RFC 3339 offset is accepted)
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_is_second_resolution() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(format_timestamp(&ts), "2024-03-09T07:05:01Z");
    }

    #[test]
    fn test_parse_normalises_offset() {
        let parsed = parse_timestamp("2024-03-09T09:05:01+02:00").unwrap();
        assert_eq!(format_timestamp(&parsed), "2024-03-09T07:05:01Z");
    }

    #[test]
    fn test_now_has_no_subseconds() {
        assert_eq!(now().timestamp_subsec_nanos(), 0);
    }
}
