//! 12-hour wall-clock times.
//!
//! Everything compares on minute-of-day; the `"H:MM AM|PM"` string is only
//! the input and display form.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use super::error::SchedulingError;

pub const MINUTES_PER_DAY: u16 = 24 * 60;

/// A wall-clock time stored as minutes since midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClockTime(u16);

impl ClockTime {
    pub fn from_minutes(minutes: u16) -> Self {
        Self(minutes % MINUTES_PER_DAY)
    }

    /// Shorthand for tests and defaults: `hm(13, 30)` is 1:30 PM.
    pub fn hm(hour: u16, minute: u16) -> Self {
        Self::from_minutes(hour * 60 + minute)
    }

    #[inline]
    pub fn minutes(self) -> u16 {
        self.0
    }
}

/// Parses `"H:MM AM"` / `"H:MM PM"` into minute-of-day.
///
/// Hours run 1..=12, minutes are exactly two digits in 0..=59, and the
/// period is exactly `AM` or `PM`. Anything else is an `InvalidTimeFormat`,
/// never coerced.
pub fn parse_clock(s: &str) -> Result<u16, SchedulingError> {
    let bad = || SchedulingError::InvalidTimeFormat {
        input: s.to_string(),
    };

    let mut parts = s.split_whitespace();
    let (Some(time), Some(period), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(bad());
    };
    let (h, m) = time.split_once(':').ok_or_else(bad)?;
    let digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
    if !digits(h) || h.len() > 2 || !digits(m) || m.len() != 2 {
        return Err(bad());
    }
    let h: u16 = h.parse().map_err(|_| bad())?;
    let m: u16 = m.parse().map_err(|_| bad())?;
    if !(1..=12).contains(&h) || m > 59 {
        return Err(bad());
    }

    let base = h * 60 + m;
    match period {
        "AM" if h == 12 => Ok(base - 720),
        "AM" => Ok(base),
        "PM" if h == 12 => Ok(base),
        "PM" => Ok(base + 720),
        _ => Err(bad()),
    }
}

/// Formats minute-of-day as `"H:MM AM|PM"`. Midnight and noon print as 12.
pub fn format_clock(minutes: u16) -> String {
    let minutes = minutes % MINUTES_PER_DAY;
    let h24 = minutes / 60;
    let m = minutes % 60;
    let period = if h24 >= 12 { "PM" } else { "AM" };
    let h12 = match h24 % 12 {
        0 => 12,
        h => h,
    };
    format!("{}:{:02} {}", h12, m, period)
}

/// Half-open interval overlap: `[start_a, end_a)` against `[start_b, end_b)`.
#[inline]
pub fn overlaps(start_a: u16, end_a: u16, start_b: u16, end_b: u16) -> bool {
    start_a < end_b && start_b < end_a
}

impl FromStr for ClockTime {
    type Err = SchedulingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_clock(s.trim()).map(ClockTime)
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_clock(self.0))
    }
}

impl Serialize for ClockTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ClockTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A `[start, end)` window on a single day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRange {
    pub start_time: ClockTime,
    pub end_time: ClockTime,
}

impl TimeRange {
    pub fn new(start_time: ClockTime, end_time: ClockTime) -> Self {
        Self {
            start_time,
            end_time,
        }
    }

    pub fn overlaps(&self, other: &Self) -> bool {
        overlaps(
            self.start_time.minutes(),
            self.end_time.minutes(),
            other.start_time.minutes(),
            other.end_time.minutes(),
        )
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.start_time, self.end_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_morning_afternoon_and_noon() {
        assert_eq!(parse_clock("7:00 AM").unwrap(), 420);
        assert_eq!(parse_clock("12:00 PM").unwrap(), 720);
        assert_eq!(parse_clock("12:15 AM").unwrap(), 15);
        assert_eq!(parse_clock("1:45 PM").unwrap(), 825);
        assert_eq!(parse_clock("6:00 PM").unwrap(), 1080);
    }

    #[test]
    fn rejects_malformed_strings() {
        for s in [
            "", "7:00", "700 AM", "7:0 AM", "x:00 AM", "7:xx AM", "7:00 XM", "13:00 PM",
            "0:30 AM", "7:60 AM", "7:00 AM extra", "7:+5 AM", "+7:00 AM", "7:-0 AM",
            "007:00 AM", "6:00 pm", "8:00 am", "8:00 Am",
        ] {
            let e = parse_clock(s).unwrap_err();
            assert_eq!(e.code(), "invalid_time_format", "input {:?}", s);
        }
    }

    #[test]
    fn format_normalizes_midnight_and_noon() {
        assert_eq!(format_clock(0), "12:00 AM");
        assert_eq!(format_clock(720), "12:00 PM");
        assert_eq!(format_clock(MINUTES_PER_DAY), "12:00 AM");
        assert_eq!(format_clock(495), "8:15 AM");
    }

    #[test]
    fn touching_ranges_do_not_overlap() {
        let a = TimeRange::new(ClockTime::hm(8, 0), ClockTime::hm(9, 0));
        let b = TimeRange::new(ClockTime::hm(9, 0), ClockTime::hm(10, 0));
        let c = TimeRange::new(ClockTime::hm(8, 30), ClockTime::hm(9, 30));
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
        assert!(c.overlaps(&b));
    }

    #[test]
    fn clock_time_serializes_as_label() {
        let t = ClockTime::hm(14, 30);
        assert_eq!(serde_json::to_string(&t).unwrap(), "\"2:30 PM\"");
        let back: ClockTime = serde_json::from_str("\"2:30 PM\"").unwrap();
        assert_eq!(back, t);
        assert!(serde_json::from_str::<ClockTime>("\"14:30\"").is_err());
    }

    proptest! {
        #[test]
        fn grid_labels_round_trip(slot in 0u16..=44) {
            let minutes = 7 * 60 + slot * 15;
            let label = format_clock(minutes);
            prop_assert_eq!(parse_clock(&label).unwrap(), minutes);
            prop_assert_eq!(format_clock(parse_clock(&label).unwrap()), label);
        }

        #[test]
        fn overlap_is_symmetric(a in 0u16..1440, b in 0u16..1440, c in 0u16..1440, d in 0u16..1440) {
            prop_assert_eq!(overlaps(a, b, c, d), overlaps(c, d, a, b));
        }
    }
}
