//! Attribute value formats shared by configuration elements

use serde::de::{self, Deserializer, Visitor};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// Numeric value meaning "no upper bound"
pub const INFINITE: i32 = i32::MAX;

const INFINITE_KEYWORD: &str = "Infinite";

/// Integer attribute that also accepts `"Infinite"`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IntOrInfinite(pub i64);

impl IntOrInfinite {
    pub const INFINITE: IntOrInfinite = IntOrInfinite(INFINITE as i64);

    pub fn is_infinite(self) -> bool {
        self.0 >= INFINITE as i64
    }

    /// Value clamped into the `i32` range used at run time
    pub fn to_i32(self) -> i32 {
        self.0.clamp(i32::MIN as i64, INFINITE as i64) as i32
    }
}

impl From<i32> for IntOrInfinite {
    fn from(value: i32) -> Self {
        IntOrInfinite(value as i64)
    }
}

impl fmt::Display for IntOrInfinite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_infinite() { f.write_str(INFINITE_KEYWORD) } else { write!(f, "{}", self.0) }
    }
}

impl<'de> Deserialize<'de> for IntOrInfinite {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct IntOrInfiniteVisitor;

        impl Visitor<'_> for IntOrInfiniteVisitor {
            type Value = IntOrInfinite;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an integer or \"Infinite\"")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                Ok(IntOrInfinite(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(IntOrInfinite(i64::try_from(v).unwrap_or(i64::MAX)))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                parse_int_or_infinite(v).ok_or_else(|| E::invalid_value(de::Unexpected::Str(v), &self))
            }
        }

        deserializer.deserialize_any(IntOrInfiniteVisitor)
    }
}

fn parse_int_or_infinite(text: &str) -> Option<IntOrInfinite> {
    let text = text.trim();
    if text.eq_ignore_ascii_case(INFINITE_KEYWORD) {
        return Some(IntOrInfinite::INFINITE);
    }
    text.parse::<i64>().ok().map(IntOrInfinite)
}

/// Time interval attribute.
///
/// Accepts `[-][d.]hh:mm:ss[.fff]`, `"Infinite"`, or an integer number of
/// seconds. Negative values parse so validation can report them with a
/// location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Interval {
    millis: i64,
}

impl Interval {
    pub const ZERO: Interval = Interval { millis: 0 };
    pub const INFINITE: Interval = Interval { millis: i64::MAX };

    pub fn from_secs(secs: i64) -> Self {
        Self { millis: secs.saturating_mul(1000) }
    }

    pub fn from_millis(millis: i64) -> Self {
        Self { millis }
    }

    pub fn as_millis(self) -> i64 {
        self.millis
    }

    pub fn is_negative(self) -> bool {
        self.millis < 0
    }

    pub fn is_zero(self) -> bool {
        self.millis == 0
    }

    /// Non-negative duration; negative intervals map to zero
    pub fn to_duration(self) -> Duration {
        Duration::from_millis(self.millis.max(0) as u64)
    }

    /// Parse the textual interval format
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.eq_ignore_ascii_case(INFINITE_KEYWORD) {
            return Some(Self::INFINITE);
        }
        if let Ok(secs) = text.parse::<i64>() {
            return Some(Self::from_secs(secs));
        }

        let (negative, body) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text),
        };

        let mut parts = body.split(':');
        let first = parts.next()?;
        let (days, hours) = match first.split_once('.') {
            Some((days, hours)) => (days.parse::<i64>().ok()?, hours.parse::<i64>().ok()?),
            None => (0, first.parse::<i64>().ok()?),
        };
        let minutes = parts.next()?.parse::<i64>().ok()?;
        let seconds_part = parts.next()?;
        if parts.next().is_some() || hours > 23 || minutes > 59 {
            return None;
        }

        let (seconds, fraction_millis) = match seconds_part.split_once('.') {
            Some((secs, fraction)) => (secs.parse::<i64>().ok()?, fraction_to_millis(fraction)?),
            None => (seconds_part.parse::<i64>().ok()?, 0),
        };
        if seconds > 59 {
            return None;
        }

        // Out-of-range day counts are rejected rather than wrapped
        let total = days
            .checked_mul(24)?
            .checked_add(hours)?
            .checked_mul(60)?
            .checked_add(minutes)?
            .checked_mul(60)?
            .checked_add(seconds)?
            .checked_mul(1000)?
            .checked_add(fraction_millis)?;
        Some(Self { millis: if negative { -total } else { total } })
    }
}

fn fraction_to_millis(fraction: &str) -> Option<i64> {
    if fraction.is_empty() || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let padded: String = fraction.chars().chain("000".chars()).take(3).collect();
    padded.parse::<i64>().ok()
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INFINITE {
            return f.write_str(INFINITE_KEYWORD);
        }
        let sign = if self.millis < 0 { "-" } else { "" };
        let total = self.millis.unsigned_abs();
        let secs = total / 1000;
        let (hours, minutes, seconds) = (secs / 3600, (secs / 60) % 60, secs % 60);
        let millis = total % 1000;
        if millis == 0 {
            write!(f, "{sign}{hours:02}:{minutes:02}:{seconds:02}")
        } else {
            write!(f, "{sign}{hours:02}:{minutes:02}:{seconds:02}.{millis:03}")
        }
    }
}

impl From<Duration> for Interval {
    fn from(duration: Duration) -> Self {
        Self { millis: i64::try_from(duration.as_millis()).unwrap_or(i64::MAX) }
    }
}

impl<'de> Deserialize<'de> for Interval {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct IntervalVisitor;

        impl Visitor<'_> for IntervalVisitor {
            type Value = Interval;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a time interval such as \"00:01:00\", \"Infinite\" or whole seconds")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                Ok(Interval::from_secs(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(Interval::from_secs(i64::try_from(v).unwrap_or(i64::MAX)))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                Interval::parse(v).ok_or_else(|| E::invalid_value(de::Unexpected::Str(v), &self))
            }
        }

        deserializer.deserialize_any(IntervalVisitor)
    }
}

/// Provider parameter as written in configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Text(text) => f.write_str(text),
            ParameterValue::Integer(value) => write!(f, "{value}"),
            ParameterValue::Float(value) => write!(f, "{value}"),
            ParameterValue::Bool(value) => write!(f, "{value}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_timespan_forms() {
        assert_eq!(Interval::parse("00:01:00"), Some(Interval::from_secs(60)));
        assert_eq!(Interval::parse("1.00:00:00"), Some(Interval::from_secs(86_400)));
        assert_eq!(Interval::parse("00:00:01.5"), Some(Interval::from_millis(1500)));
        assert_eq!(Interval::parse("-00:00:05"), Some(Interval::from_secs(-5)));
        assert_eq!(Interval::parse("30"), Some(Interval::from_secs(30)));
        assert_eq!(Interval::parse("infinite"), Some(Interval::INFINITE));
    }

    #[test]
    fn rejects_malformed_timespans() {
        assert_eq!(Interval::parse("00:60:00"), None);
        assert_eq!(Interval::parse("1:2"), None);
        assert_eq!(Interval::parse("00:00:00:00"), None);
        assert_eq!(Interval::parse("soon"), None);
        assert_eq!(Interval::parse("00:00:01.x"), None);
    }

    #[test]
    fn rejects_intervals_past_the_representable_range() {
        assert_eq!(Interval::parse("99999999999999.00:00:00"), None);
        assert_eq!(Interval::parse("-99999999999999.23:59:59"), None);
        assert_eq!(Interval::parse("106751991168.00:00:00"), None);
        assert_eq!(Interval::parse("10000.00:00:00"), Some(Interval::from_secs(10_000 * 86_400)));
    }

    #[test]
    fn interval_display_round_trips_through_parse() {
        let interval = Interval::from_millis(3_723_250);
        assert_eq!(interval.to_string(), "01:02:03.250");
        assert_eq!(Interval::parse(&interval.to_string()), Some(interval));
    }

    #[test]
    fn int_or_infinite_parses_keyword() {
        assert_eq!(parse_int_or_infinite("Infinite"), Some(IntOrInfinite::INFINITE));
        assert_eq!(parse_int_or_infinite(" 42 "), Some(IntOrInfinite(42)));
        assert_eq!(parse_int_or_infinite("lots"), None);
        assert!(IntOrInfinite::INFINITE.is_infinite());
        assert_eq!(IntOrInfinite(i64::MAX).to_i32(), INFINITE);
        assert_eq!(IntOrInfinite::INFINITE.to_string(), "Infinite");
    }

    #[test]
    fn negative_interval_maps_to_zero_duration() {
        assert_eq!(Interval::from_secs(-3).to_duration(), Duration::ZERO);
        assert_eq!(Interval::from_secs(2).to_duration(), Duration::from_secs(2));
    }
}
