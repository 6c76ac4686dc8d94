//! Observation timestamp normalization.
//!
//! Reader SDKs disagree on how a "seen at" time is reported: some hand over a
//! wall-clock value, others a microsecond counter since the epoch (signed or
//! unsigned), and some builds only fill alternate millisecond/microsecond fields.
//! [`normalize`] walks those representations in a fixed order and falls back to
//! the host clock, so a missing or malformed field never stops the pipeline.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Value carried by the reader's primary `utc` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UtcValue {
    /// Structured wall-clock time. Any offset information is discarded and the
    /// value is read as UTC.
    WallClock(NaiveDateTime),
    /// Wall-clock time as text (RFC 3339, or ISO-8601 without offset).
    Text(String),
    /// Microseconds since the Unix epoch, unsigned counter.
    UnsignedMicros(u64),
    /// Microseconds since the Unix epoch, signed counter.
    SignedMicros(i64),
}

/// Timestamp exactly as delivered with a tag report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTimestamp {
    /// Primary field.
    pub utc: Option<UtcValue>,
    /// Alternate milliseconds-since-epoch field.
    pub milliseconds: Option<i64>,
    /// Alternate microseconds-since-epoch field.
    pub microseconds: Option<i64>,
}

impl RawTimestamp {
    /// Timestamp carrying only a structured wall-clock value.
    pub fn wall_clock(value: NaiveDateTime) -> Self {
        Self {
            utc: Some(UtcValue::WallClock(value)),
            ..Default::default()
        }
    }

    /// Timestamp carrying only an unsigned microsecond counter.
    pub fn unsigned_micros(us: u64) -> Self {
        Self {
            utc: Some(UtcValue::UnsignedMicros(us)),
            ..Default::default()
        }
    }

    /// Timestamp carrying only a signed microsecond counter.
    pub fn signed_micros(us: i64) -> Self {
        Self {
            utc: Some(UtcValue::SignedMicros(us)),
            ..Default::default()
        }
    }

    /// Microsecond counter for the current host time.
    pub fn now() -> Self {
        Self::signed_micros(Utc::now().timestamp_micros())
    }
}

/// Current host time in epoch milliseconds.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Convert a reader timestamp into epoch milliseconds.
///
/// Representations are tried in priority order: wall clock, unsigned
/// microseconds, signed microseconds, alternate milliseconds, alternate
/// microseconds. The first one that can be interpreted wins; if none can (or
/// there is no timestamp at all) the current host time is returned.
pub fn normalize(raw: Option<&RawTimestamp>) -> i64 {
    raw.and_then(interpret).unwrap_or_else(now_ms)
}

fn interpret(raw: &RawTimestamp) -> Option<i64> {
    const ATTEMPTS: [fn(&RawTimestamp) -> Option<i64>; 5] = [
        from_wall_clock,
        from_unsigned_micros,
        from_signed_micros,
        from_alternate_millis,
        from_alternate_micros,
    ];
    ATTEMPTS.iter().find_map(|attempt| attempt(raw))
}

fn from_alternate_millis(raw: &RawTimestamp) -> Option<i64> {
    raw.milliseconds
}

fn from_alternate_micros(raw: &RawTimestamp) -> Option<i64> {
    raw.microseconds.map(|us| us / 1000)
}

fn from_wall_clock(raw: &RawTimestamp) -> Option<i64> {
    match raw.utc.as_ref()? {
        UtcValue::WallClock(naive) => Some(naive.and_utc().timestamp_millis()),
        UtcValue::Text(text) => parse_wall_clock_text(text),
        _ => None,
    }
}

fn from_unsigned_micros(raw: &RawTimestamp) -> Option<i64> {
    match raw.utc.as_ref()? {
        UtcValue::UnsignedMicros(us) => i64::try_from(us / 1000).ok(),
        _ => None,
    }
}

fn from_signed_micros(raw: &RawTimestamp) -> Option<i64> {
    match raw.utc.as_ref()? {
        // Integer division truncates toward zero, keeping the sign.
        UtcValue::SignedMicros(us) => Some(us / 1000),
        _ => None,
    }
}

fn parse_wall_clock_text(text: &str) -> Option<i64> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc).timestamp_millis());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|naive| naive.and_utc().timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    // 2025-03-14T15:09:26.535Z
    const EXPECTED_MS: i64 = 1_741_964_966_535;

    fn wall() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 14)
            .unwrap()
            .and_hms_milli_opt(15, 9, 26, 535)
            .unwrap()
    }

    #[test]
    fn wall_clock_is_read_as_utc() {
        assert_eq!(normalize(Some(&RawTimestamp::wall_clock(wall()))), EXPECTED_MS);
    }

    #[test]
    fn text_wall_clock_with_and_without_offset() {
        let with_offset = RawTimestamp {
            utc: Some(UtcValue::Text("2025-03-14T16:09:26.535+01:00".into())),
            ..Default::default()
        };
        let naive = RawTimestamp {
            utc: Some(UtcValue::Text("2025-03-14 15:09:26.535".into())),
            ..Default::default()
        };
        assert_eq!(normalize(Some(&with_offset)), EXPECTED_MS);
        assert_eq!(normalize(Some(&naive)), EXPECTED_MS);
    }

    #[test]
    fn microsecond_counters_truncate() {
        let us = EXPECTED_MS * 1000 + 999;
        assert_eq!(
            normalize(Some(&RawTimestamp::unsigned_micros(us as u64))),
            EXPECTED_MS
        );
        assert_eq!(normalize(Some(&RawTimestamp::signed_micros(us))), EXPECTED_MS);
    }

    #[test]
    fn negative_signed_micros_keep_their_sign() {
        assert_eq!(normalize(Some(&RawTimestamp::signed_micros(-1_500))), -1);
    }

    #[test]
    fn malformed_primary_falls_through_to_alternates() {
        let raw = RawTimestamp {
            utc: Some(UtcValue::Text("not a date".into())),
            milliseconds: Some(EXPECTED_MS),
            microseconds: Some(1),
        };
        assert_eq!(normalize(Some(&raw)), EXPECTED_MS);

        let micros_only = RawTimestamp {
            microseconds: Some(EXPECTED_MS * 1000),
            ..Default::default()
        };
        assert_eq!(normalize(Some(&micros_only)), EXPECTED_MS);
    }

    #[test]
    fn primary_field_wins_over_alternates() {
        let raw = RawTimestamp {
            utc: Some(UtcValue::WallClock(wall())),
            milliseconds: Some(0),
            microseconds: Some(0),
        };
        assert_eq!(normalize(Some(&raw)), EXPECTED_MS);
    }

    #[test]
    fn absent_timestamp_uses_host_clock() {
        let before = now_ms();
        let first = normalize(None);
        let second = normalize(Some(&RawTimestamp::default()));
        let after = now_ms();
        assert!(before <= first && first <= second && second <= after);
    }
}
