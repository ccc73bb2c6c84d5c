use chrono::{DateTime, FixedOffset, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Offset used for inputs that carry no zone of their own (Asia/Tokyo, no DST).
pub const DEFAULT_REFERENCE_ZONE: &str = "+09:00";

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"];

#[derive(Debug, Error)]
pub enum WindowError {
    #[error("'{0}' is not an RFC 3339 timestamp or a local YYYY-MM-DDTHH:MM:SS time")]
    Unparseable(String),

    #[error("'{0}' does not exist in the reference zone")]
    NonexistentLocalTime(String),

    #[error("invalid reference zone '{0}', expected an offset such as +09:00")]
    InvalidZone(String),

    #[error("window start {from} is after window end {until}")]
    Inverted {
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    },
}

/// Closed UTC interval `[from, until]` every remote query is bounded by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    from: DateTime<Utc>,
    until: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(from: DateTime<Utc>, until: DateTime<Utc>) -> Result<Self, WindowError> {
        if from > until {
            return Err(WindowError::Inverted { from, until });
        }
        Ok(Self { from, until })
    }

    pub fn from(&self) -> DateTime<Utc> {
        self.from
    }

    pub fn until(&self) -> DateTime<Utc> {
        self.until
    }

    /// `from` as sent on the wire: RFC 3339, UTC, second precision.
    pub fn from_param(&self) -> String {
        self.from.to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    /// `until` as sent on the wire.
    pub fn until_param(&self) -> String {
        self.until.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

/// Parse a reference zone: `Z`, `UTC`, or a `±HH:MM` offset.
pub fn parse_reference_zone(value: &str) -> Result<FixedOffset, WindowError> {
    let trimmed = value.trim();
    if trimmed.eq_ignore_ascii_case("z") || trimmed.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0).ok_or_else(|| WindowError::InvalidZone(value.to_string()));
    }
    trimmed
        .parse::<FixedOffset>()
        .map_err(|_| WindowError::InvalidZone(value.to_string()))
}

/// Parse one window bound and normalise it to UTC.
///
/// An explicit offset in the input wins; naive local times are read in `zone`.
pub fn parse_instant(value: &str, zone: &FixedOffset) -> Result<DateTime<Utc>, WindowError> {
    let trimmed = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return zone
                .from_local_datetime(&naive)
                .single()
                .map(|dt| dt.with_timezone(&Utc))
                .ok_or_else(|| WindowError::NonexistentLocalTime(value.to_string()));
        }
    }

    Err(WindowError::Unparseable(value.to_string()))
}
