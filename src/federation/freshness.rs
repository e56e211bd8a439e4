//! Activity timestamp validation
//!
//! Signatures are not verified by this layer, so the only replay bound on a
//! forwarded activity is how recent its declared timestamp is.

use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use thiserror::Error;

/// Wire format of activity timestamps, e.g. `2024-05-01T12:30:00.000Z`
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Default acceptance window
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TimestampError {
    #[error("Invalid creation time")]
    Invalid,

    /// Outside the window, in either direction
    #[error("Invalid timestamp: expired or in the future")]
    Expired,
}

/// Parses activity timestamps and rejects ones outside the freshness window
#[derive(Debug, Clone, Copy)]
pub struct FreshnessValidator {
    window: chrono::Duration,
}

impl Default for FreshnessValidator {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl FreshnessValidator {
    pub fn new(window: Duration) -> Self {
        Self {
            window: chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX),
        }
    }

    /// Parse `text` and check it against the current time.
    pub fn parse_and_validate(&self, text: &str) -> Result<DateTime<Utc>, TimestampError> {
        self.validate_at(text, Utc::now())
    }

    /// Parse `text` and check it against `now`.
    ///
    /// Succeeds when `0 <= now - t < window`.
    pub fn validate_at(
        &self,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, TimestampError> {
        let parsed = parse_timestamp(text)?;
        let delta = now.signed_duration_since(parsed);

        if delta < chrono::Duration::zero() || delta >= self.window {
            tracing::debug!(
                timestamp = %text,
                delta_ms = delta.num_milliseconds(),
                "Rejected activity timestamp outside freshness window"
            );
            return Err(TimestampError::Expired);
        }

        Ok(parsed)
    }
}

/// Parse a timestamp in the fixed wire format.
pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, TimestampError> {
    if !has_wire_shape(text) {
        return Err(TimestampError::Invalid);
    }

    NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| TimestampError::Invalid)
}

/// Exactly three fractional digits and a literal `Z`; chrono alone is
/// lenient about the fraction when parsing.
fn has_wire_shape(text: &str) -> bool {
    let bytes = text.as_bytes();
    bytes.len() == 24
        && bytes[19] == b'.'
        && bytes[23] == b'Z'
        && bytes[20..23].iter().all(u8::is_ascii_digit)
}

/// Format an instant in the wire format.
pub fn format_timestamp(instant: DateTime<Utc>) -> String {
    instant.format(TIMESTAMP_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn ago(duration: chrono::Duration) -> String {
        format_timestamp(now() - duration)
    }

    #[test]
    fn parses_wire_format() {
        let parsed = parse_timestamp("2024-05-01T11:59:50.250Z").unwrap();
        assert_eq!(
            parsed,
            Utc.with_ymd_and_hms(2024, 5, 1, 11, 59, 50).unwrap()
                + chrono::Duration::milliseconds(250)
        );
        assert_eq!(format_timestamp(parsed), "2024-05-01T11:59:50.250Z");
    }

    #[test]
    fn rejects_other_formats() {
        for text in [
            "",
            "yesterday",
            "2024-05-01T11:59:50Z",
            "2024-05-01T11:59:50.250+00:00",
            "2024-05-01 11:59:50.250Z",
        ] {
            assert_eq!(parse_timestamp(text), Err(TimestampError::Invalid), "{text:?}");
        }
    }

    #[test]
    fn accepts_inside_window() {
        let validator = FreshnessValidator::default();

        for age in [
            chrono::Duration::zero(),
            chrono::Duration::seconds(10),
            chrono::Duration::minutes(5) - chrono::Duration::milliseconds(1),
        ] {
            assert!(validator.validate_at(&ago(age), now()).is_ok(), "age {age}");
        }
    }

    #[test]
    fn rejects_old_and_future_with_same_error() {
        let validator = FreshnessValidator::default();

        assert_eq!(
            validator.validate_at(&ago(chrono::Duration::minutes(5)), now()),
            Err(TimestampError::Expired)
        );
        assert_eq!(
            validator.validate_at(&ago(chrono::Duration::minutes(10)), now()),
            Err(TimestampError::Expired)
        );
        assert_eq!(
            validator.validate_at(&ago(-chrono::Duration::milliseconds(1)), now()),
            Err(TimestampError::Expired)
        );
        assert_eq!(
            validator.validate_at(&ago(-chrono::Duration::hours(1)), now()),
            Err(TimestampError::Expired)
        );
    }

    #[test]
    fn unparsable_text_is_invalid_not_expired() {
        let validator = FreshnessValidator::default();
        assert_eq!(
            validator.validate_at("not a time", now()),
            Err(TimestampError::Invalid)
        );
    }

    #[test]
    fn custom_window() {
        let validator = FreshnessValidator::new(Duration::from_secs(30));
        assert!(
            validator
                .validate_at(&ago(chrono::Duration::seconds(29)), now())
                .is_ok()
        );
        assert!(
            validator
                .validate_at(&ago(chrono::Duration::seconds(30)), now())
                .is_err()
        );
    }

    #[test]
    fn validates_against_wall_clock() {
        let validator = FreshnessValidator::default();
        let recent = format_timestamp(Utc::now() - chrono::Duration::seconds(10));
        assert!(validator.parse_and_validate(&recent).is_ok());
    }
}
