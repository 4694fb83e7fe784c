//! Freshness horizon parsing.
//!
//! The horizon is written as an ISO-8601 duration limited to days, hours,
//! minutes and (fractional) seconds, e.g. `PT1H`, `P1DT30M`, `-PT15M`,
//! `PT0.5S`. Years, months and weeks are not accepted because they have no
//! fixed length.

use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, TimeDelta, Utc};
use regex::{Captures, Regex};

use crate::error::{Result, WaitError};

static DURATION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^([-+]?)P(?:([-+]?[0-9]+)D)?(T(?:([-+]?[0-9]+)H)?(?:([-+]?[0-9]+)M)?(?:([-+]?[0-9]+)(?:[.,]([0-9]{0,9}))?S)?)?$",
    )
    .expect("DURATION_REGEX must compile")
});

const NANOS_PER_SECOND: i128 = 1_000_000_000;

/// Signed duration the resource must have been modified after, relative to
/// the session's reference instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessHorizon {
    duration: TimeDelta,
}

impl FreshnessHorizon {
    pub fn new(duration: TimeDelta) -> Self {
        Self { duration }
    }

    /// Parse an ISO-8601 duration string.
    ///
    /// # Errors
    ///
    /// Returns [`WaitError::InvalidInput`] for anything that is not a
    /// well-formed day/time duration or that overflows.
    pub fn parse(text: &str) -> Result<Self> {
        let caps = DURATION_REGEX.captures(text).ok_or_else(|| invalid(text))?;

        let has_section = (2..=6).any(|i| caps.get(i).is_some());
        let bare_t = caps
            .get(3)
            .is_some_and(|t| t.as_str().eq_ignore_ascii_case("T"));
        if !has_section || bare_t {
            return Err(invalid(text));
        }

        let mut nanos = section(&caps, 2, 86_400).ok_or_else(|| invalid(text))?;
        for (group, unit) in [(4, 3_600), (5, 60), (6, 1)] {
            nanos += section(&caps, group, unit).ok_or_else(|| invalid(text))?;
        }
        nanos += fraction(&caps).ok_or_else(|| invalid(text))?;

        if &caps[1] == "-" {
            nanos = -nanos;
        }

        let seconds = i64::try_from(nanos.div_euclid(NANOS_PER_SECOND)).map_err(|_| invalid(text))?;
        let subsec = nanos.rem_euclid(NANOS_PER_SECOND) as u32;
        let duration = TimeDelta::new(seconds, subsec).ok_or_else(|| invalid(text))?;

        Ok(Self { duration })
    }

    pub fn duration(&self) -> TimeDelta {
        self.duration
    }

    /// `reference + horizon`: the instant the resource must not be older than.
    pub fn threshold(&self, reference: DateTime<Utc>) -> Result<DateTime<Utc>> {
        reference.checked_add_signed(self.duration).ok_or_else(|| {
            WaitError::invalid_input(format!(
                "updated_after {} overflows when added to {}",
                self, reference
            ))
        })
    }
}

fn invalid(text: &str) -> WaitError {
    WaitError::invalid_input(format!(
        "updated_after must be ISO-8601 duration (got '{}')",
        text
    ))
}

/// Nanoseconds contributed by one integer section, `Some(0)` when absent.
fn section(caps: &Captures<'_>, group: usize, unit_secs: i128) -> Option<i128> {
    match caps.get(group) {
        None => Some(0),
        Some(m) => {
            let value: i64 = m.as_str().parse().ok()?;
            (value as i128)
                .checked_mul(unit_secs)?
                .checked_mul(NANOS_PER_SECOND)
        }
    }
}

/// Fractional seconds carry the sign of the seconds section.
fn fraction(caps: &Captures<'_>) -> Option<i128> {
    let Some(digits) = caps.get(7).map(|m| m.as_str()) else {
        return Some(0);
    };
    if digits.is_empty() {
        return Some(0);
    }
    let value: i128 = format!("{:0<9}", digits).parse().ok()?;
    let negative = caps.get(6).is_some_and(|s| s.as_str().starts_with('-'));
    Some(if negative { -value } else { value })
}

impl fmt::Display for FreshnessHorizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(text: &str) -> i64 {
        FreshnessHorizon::parse(text).unwrap().duration().num_seconds()
    }

    #[test]
    fn parses_time_sections() {
        assert_eq!(secs("PT1H"), 3_600);
        assert_eq!(secs("PT15M"), 900);
        assert_eq!(secs("PT20S"), 20);
        assert_eq!(secs("PT1H30M"), 5_400);
    }

    #[test]
    fn parses_days_with_and_without_time() {
        assert_eq!(secs("P2D"), 172_800);
        assert_eq!(secs("P1DT2H"), 93_600);
    }

    #[test]
    fn accepts_lowercase() {
        assert_eq!(secs("pt1h"), 3_600);
    }

    #[test]
    fn parses_negative_durations() {
        assert_eq!(secs("-PT1H"), -3_600);
        assert_eq!(secs("PT-30M"), -1_800);
        assert_eq!(secs("-PT-6H3M"), 21_420);
    }

    #[test]
    fn parses_fractional_seconds() {
        let d = FreshnessHorizon::parse("PT0.5S").unwrap().duration();
        assert_eq!(d.num_milliseconds(), 500);

        let d = FreshnessHorizon::parse("PT-1,25S").unwrap().duration();
        assert_eq!(d.num_milliseconds(), -1_250);
    }

    #[test]
    fn rejects_malformed_text() {
        for text in ["", "P", "PT", "1H", "PT1X", "P1Y", "P1W", "P1M", "PT1H ", "PT1.0000000001S", "garbage"] {
            let err = FreshnessHorizon::parse(text).unwrap_err();
            assert!(matches!(err, WaitError::InvalidInput { .. }), "{:?}", text);
        }
    }

    #[test]
    fn rejects_overflow() {
        assert!(FreshnessHorizon::parse("PT9223372036854775807H").is_err());
    }

    #[test]
    fn threshold_adds_to_reference() {
        let reference = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let horizon = FreshnessHorizon::parse("PT1H").unwrap();
        assert_eq!(
            horizon.threshold(reference).unwrap(),
            reference + TimeDelta::hours(1)
        );

        let earlier = FreshnessHorizon::parse("-P1D").unwrap();
        assert_eq!(
            earlier.threshold(reference).unwrap(),
            reference - TimeDelta::days(1)
        );
    }
}
