use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{de::Visitor, Deserialize, Serialize, Serializer};
use std::{
    fmt::Display,
    str::FromStr,
    time::{Duration, Instant},
};
use thiserror::Error;

/// Raised when a configured time of day or calendar date is not in
/// the expected `HH:MM` or `YYYY/MM/DD` layout.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimeFormatError {
    #[error("Expected a time of day as HH:MM, found {0:?}")]
    TimeOfDay(String),
    #[error("Expected a calendar date as YYYY/MM/DD, found {0:?}")]
    CalendarDate(String),
}

/// Hour and minute of the day as written in the chamber configuration,
/// e.g. the manual sunrise `"06:30"` or the daily report time `"09:00"`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay(NaiveTime);

impl TimeOfDay {
    /// Create a time of day, `None` when the hour or minute is out of range.
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(Self)
    }

    pub fn hour(&self) -> u32 {
        self.0.hour()
    }

    pub fn minute(&self) -> u32 {
        self.0.minute()
    }

    pub fn as_naive_time(&self) -> NaiveTime {
        self.0
    }
}

impl FromStr for TimeOfDay {
    type Err = TimeFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let error = || TimeFormatError::TimeOfDay(s.to_string());
        let (hour, minute) = s.trim().split_once(':').ok_or_else(error)?;
        let hour = hour.parse::<u32>().map_err(|_| error())?;
        let minute = minute.parse::<u32>().map_err(|_| error())?;
        Self::new(hour, minute).ok_or_else(error)
    }
}

impl Display for TimeOfDay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_str(TimeOfDayVisitor {})
    }
}

/// Visitor used to read `HH:MM` strings from the configuration.
struct TimeOfDayVisitor {}

impl<'de> Visitor<'de> for TimeOfDayVisitor {
    type Value = TimeOfDay;

    fn expecting(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str("a time of day formatted as HH:MM")
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        v.parse::<TimeOfDay>().map_err(serde::de::Error::custom)
    }
}

/// Fixed calendar date, written `YYYY/MM/DD`, used to compute the same
/// sun times every day of a run.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StableDate(NaiveDate);

impl StableDate {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn as_naive_date(&self) -> NaiveDate {
        self.0
    }

    /// The date without separators, safe to embed in a file name.
    pub fn compact(&self) -> String {
        self.0.format("%Y%m%d").to_string()
    }
}

impl FromStr for StableDate {
    type Err = TimeFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let error = || TimeFormatError::CalendarDate(s.to_string());
        let parts = s
            .trim()
            .split('/')
            .map(|part| part.parse::<u32>().map_err(|_| error()))
            .collect::<Result<Vec<_>, _>>()?;
        match parts.as_slice() {
            [year, month, day] => {
                let year = i32::try_from(*year).map_err(|_| error())?;
                NaiveDate::from_ymd_opt(year, *month, *day)
                    .map(Self)
                    .ok_or_else(error)
            }
            _ => Err(error()),
        }
    }
}

impl Display for StableDate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y/%m/%d"))
    }
}

impl Serialize for StableDate {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for StableDate {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_str(StableDateVisitor {})
    }
}

/// Visitor used to read `YYYY/MM/DD` strings from the configuration.
struct StableDateVisitor {}

impl<'de> Visitor<'de> for StableDateVisitor {
    type Value = StableDate;

    fn expecting(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str("a calendar date formatted as YYYY/MM/DD")
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        v.parse::<StableDate>().map_err(serde::de::Error::custom)
    }
}

/// Clock used by the control loop. Production code reads the local time of
/// the host, tests drive a manual clock so the minute window and daily
/// schedule can be stepped deterministically.
pub trait Clock {
    /// Current local date and time, only used to stamp and schedule. It can
    /// jump, e.g. backwards by an hour when daylight saving time ends.
    fn now(&self) -> NaiveDateTime;
    /// Monotonic instant, used to measure how long something has run.
    fn instant(&self) -> Instant;
    /// Suspend the caller for `duration`.
    fn sleep(&self, duration: Duration);

    /// Time passed since `since` on the monotonic clock.
    fn elapsed(&self, since: Instant) -> Duration {
        self.instant().saturating_duration_since(since)
    }
}

/// Clock backed by the host local time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }

    fn instant(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[cfg(test)]
pub use manual::ManualClock;


#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("06:00", 6, 0)]
    #[case("18:45", 18, 45)]
    #[case("7:5", 7, 5)]
    #[case(" 23:59 ", 23, 59)]
    fn test_parse_time_of_day(#[case] raw: &str, #[case] hour: u32, #[case] minute: u32) {
        let parsed: TimeOfDay = raw.parse().unwrap();
        assert_eq!((parsed.hour(), parsed.minute()), (hour, minute));
    }

    #[rstest]
    #[case("")]
    #[case("0600")]
    #[case("24:00")]
    #[case("12:60")]
    #[case("ab:cd")]
    #[case("06:00:00")]
    fn test_reject_malformed_time_of_day(#[case] raw: &str) {
        assert_eq!(
            raw.parse::<TimeOfDay>(),
            Err(TimeFormatError::TimeOfDay(raw.to_string()))
        );
    }

    #[rstest]
    #[case("2024/03/21", 2024, 3, 21)]
    #[case("2023/12/1", 2023, 12, 1)]
    fn test_parse_stable_date(
        #[case] raw: &str,
        #[case] year: i32,
        #[case] month: u32,
        #[case] day: u32,
    ) {
        let parsed: StableDate = raw.parse().unwrap();
        assert_eq!(
            parsed.as_naive_date(),
            NaiveDate::from_ymd_opt(year, month, day).unwrap()
        );
    }

    #[rstest]
    #[case("2024-03-21")]
    #[case("2024/02/30")]
    #[case("2024/03")]
    #[case("yesterday")]
    fn test_reject_malformed_stable_date(#[case] raw: &str) {
        assert!(raw.parse::<StableDate>().is_err());
    }

    #[test]
    fn test_stable_date_compact_form() {
        let date: StableDate = "2024/03/07".parse().unwrap();
        assert_eq!(date.compact(), "20240307");
        assert_eq!(date.to_string(), "2024/03/07");
    }

    #[test]
    fn test_time_of_day_yaml_round_trip() {
        let time = TimeOfDay::new(9, 5).unwrap();
        let yaml = serde_yaml::to_string(&time).unwrap();
        assert_eq!(serde_yaml::from_str::<TimeOfDay>(&yaml).unwrap(), time);
        assert!(serde_yaml::from_str::<TimeOfDay>("\"9h05\"").is_err());
    }

    #[test]
    fn test_manual_clock_sleep_advances_shared_time() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        let clock = ManualClock::starting_at(start);
        let shared = clock.clone();
        clock.sleep(Duration::from_secs(1));
        assert_eq!(shared.now(), start + chrono::Duration::seconds(1));
    }

    #[test]
    fn test_manual_clock_jump_keeps_monotonic_time() {
        let start = NaiveDate::from_ymd_opt(2024, 10, 27)
            .unwrap()
            .and_hms_opt(1, 59, 58)
            .unwrap();
        let clock = ManualClock::starting_at(start);
        let origin = clock.instant();
        clock.sleep(Duration::from_secs(2));
        clock.jump(chrono::Duration::hours(-1));
        assert_eq!(clock.now(), start - chrono::Duration::seconds(3598));
        assert_eq!(clock.elapsed(origin), Duration::from_secs(2));
    }
}
