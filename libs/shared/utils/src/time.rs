use std::fmt;

use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

pub const MINUTES_PER_DAY: u16 = 24 * 60;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unparseable time string: {0:?}")]
pub struct TimeParseError(pub String);

/// Time of day as minutes since midnight.
///
/// The store holds time values as strings in two historical formats,
/// 24-hour `"HH:mm"` and 12-hour `"hh:mm a"`. Both parse here, once, at the
/// serde boundary; everything downstream works in minutes and only the
/// canonical 24-hour form is ever written back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClockTime(u16);

impl ClockTime {
    pub fn new(hour: u16, minute: u16) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(Self(hour * 60 + minute))
        } else {
            None
        }
    }

    pub fn from_minutes(minutes: u16) -> Option<Self> {
        if minutes < MINUTES_PER_DAY {
            Some(Self(minutes))
        } else {
            None
        }
    }

    pub fn minutes(&self) -> u16 {
        self.0
    }

    pub fn hour(&self) -> u16 {
        self.0 / 60
    }

    pub fn minute(&self) -> u16 {
        self.0 % 60
    }

    /// Accepts `"HH:mm"`, `"hh:mm a"` and the space-less `"hh:mma"` variant,
    /// case-insensitive on the meridiem.
    pub fn parse(input: &str) -> Result<Self, TimeParseError> {
        let trimmed = input.trim();

        let parsed = NaiveTime::parse_from_str(trimmed, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(trimmed, "%I:%M %p"))
            .or_else(|_| NaiveTime::parse_from_str(trimmed, "%I:%M%p"))
            .map_err(|_| TimeParseError(input.to_string()))?;

        Ok(Self((parsed.hour() * 60 + parsed.minute()) as u16))
    }

    pub fn from_naive(time: NaiveTime) -> Self {
        Self((time.hour() * 60 + time.minute()) as u16)
    }

    /// Shift by a signed minute count, clamped to the same day.
    pub fn plus_minutes(self, minutes: i64) -> Self {
        let shifted = (self.0 as i64 + minutes).clamp(0, MINUTES_PER_DAY as i64 - 1);
        Self(shifted as u16)
    }

    /// Signed distance in minutes from `self` to `later`.
    pub fn minutes_until(self, later: ClockTime) -> i64 {
        later.0 as i64 - self.0 as i64
    }

    /// Canonical 24-hour wire form, e.g. `"09:05"`.
    pub fn to_wire(&self) -> String {
        format!("{:02}:{:02}", self.hour(), self.minute())
    }

    /// Patient-facing 12-hour form, e.g. `"09:05 AM"`.
    pub fn to_display(&self) -> String {
        let meridiem = if self.hour() < 12 { "AM" } else { "PM" };
        let hour_12 = match self.hour() % 12 {
            0 => 12,
            h => h,
        };
        format!("{:02}:{:02} {}", hour_12, self.minute(), meridiem)
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_wire())
    }
}

impl Serialize for ClockTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_wire())
    }
}

impl<'de> Deserialize<'de> for ClockTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        ClockTime::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Half-open interval `[start, end)` within one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: ClockTime,
    pub end: ClockTime,
}

impl TimeRange {
    pub fn new(start: ClockTime, end: ClockTime) -> Option<Self> {
        if start < end {
            Some(Self { start, end })
        } else {
            None
        }
    }

    pub fn contains(&self, time: ClockTime) -> bool {
        self.start <= time && time < self.end
    }

    pub fn intersects(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn duration_minutes(&self) -> u16 {
        self.end.minutes() - self.start.minutes()
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.start, self.end)
    }
}
