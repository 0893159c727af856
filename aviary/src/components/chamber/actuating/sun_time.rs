use crate::{
    devices::software::solar::{EphemerisError, SolarEphemeris},
    utils::time::{StableDate, TimeOfDay},
};
use chrono::{Duration, NaiveDate, NaiveTime};
use std::fmt::Display;
use thiserror::Error;

/// Failures resolving today's sunrise and sunset. None of these fall back to
/// a previous value, the light is left alone until resolution succeeds.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SunTimeError {
    #[error("No sun time mode configured, set sunrise and sunset, a stable date or a day offset")]
    Unconfigured,
    #[error("Manual override needs both sunrise and sunset")]
    IncompleteManualOverride,
    #[error("Day offset {0} moves the date out of range")]
    OffsetOutOfRange(i64),
    #[error(transparent)]
    Ephemeris(#[from] EphemerisError),
}

/// How sunrise and sunset are chosen. The configuration may carry several
/// of these fields at once, [`SunTimeMode::select`] applies the precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SunTimeMode {
    /// Explicit sunrise and sunset from the configuration.
    Manual { sunrise: TimeOfDay, sunset: TimeOfDay },
    /// True sun times of a fixed date, reused every day of the run.
    StableDate(StableDate),
    /// True sun times of today shifted by a number of days.
    DayOffset(i64),
}

impl SunTimeMode {
    /// Pick the authoritative mode, highest precedence first: manual
    /// override, stable date, day offset.
    ///
    /// * `sunrise`, `sunset`: manual override, both or neither.
    /// * `stable_date`: fixed calendar date.
    /// * `days_offset`: days added to today.
    pub fn select(
        sunrise: Option<TimeOfDay>,
        sunset: Option<TimeOfDay>,
        stable_date: Option<StableDate>,
        days_offset: Option<i64>,
    ) -> Result<Self, SunTimeError> {
        match (sunrise, sunset, stable_date, days_offset) {
            (Some(sunrise), Some(sunset), _, _) => Ok(Self::Manual { sunrise, sunset }),
            (Some(_), None, _, _) | (None, Some(_), _, _) => {
                Err(SunTimeError::IncompleteManualOverride)
            }
            (None, None, Some(date), _) => Ok(Self::StableDate(date)),
            (None, None, None, Some(days)) => Ok(Self::DayOffset(days)),
            (None, None, None, None) => Err(SunTimeError::Unconfigured),
        }
    }
}

/// Label used in report file names so a report can be traced back to the
/// mode that drove the lights while it was recorded.
impl Display for SunTimeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SunTimeMode::Manual { .. } => write!(f, "manually_set"),
            SunTimeMode::StableDate(date) => write!(f, "stable_date_{}", date.compact()),
            SunTimeMode::DayOffset(days) => write!(f, "Days_offset_{days}"),
        }
    }
}

/// Resolved sunrise and sunset as times of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SunTimes {
    pub sunrise: NaiveTime,
    pub sunset: NaiveTime,
}

impl SunTimes {
    /// True when `now` falls strictly between sunrise and sunset. A window
    /// that wraps past midnight (sunset earlier than sunrise) is compared
    /// across the day rollover, an empty window is never daytime.
    pub fn is_daytime(&self, now: NaiveTime) -> bool {
        if self.sunrise < self.sunset {
            self.sunrise < now && now < self.sunset
        } else if self.sunset < self.sunrise {
            now > self.sunrise || now < self.sunset
        } else {
            false
        }
    }

    /// Shift both times by `hours`, wrapping around midnight.
    pub fn shifted(&self, hours: i64) -> Self {
        let offset = Duration::hours(hours.rem_euclid(24));
        Self {
            sunrise: self.sunrise.overflowing_add_signed(offset).0,
            sunset: self.sunset.overflowing_add_signed(offset).0,
        }
    }
}

/// Computes today's sun times from the configured mode. Nothing is cached,
/// every call goes back to the ephemeris.
pub struct SunTimeResolver<E> {
    mode: SunTimeMode,
    hours_offset: i64,
    ephemeris: E,
}

impl<E: SolarEphemeris> SunTimeResolver<E> {
    /// * `mode`: selected sun time mode.
    /// * `hours_offset`: signed hours added to both sunrise and sunset.
    /// * `ephemeris`: solar collaborator for the stable date and day offset modes.
    pub fn new(mode: SunTimeMode, hours_offset: i64, ephemeris: E) -> Self {
        Self {
            mode,
            hours_offset,
            ephemeris,
        }
    }

    pub fn mode(&self) -> &SunTimeMode {
        &self.mode
    }

    /// Resolve sunrise and sunset for `today`.
    pub fn resolve(&self, today: NaiveDate) -> Result<SunTimes, SunTimeError> {
        let base = match self.mode {
            SunTimeMode::Manual { sunrise, sunset } => SunTimes {
                sunrise: sunrise.as_naive_time(),
                sunset: sunset.as_naive_time(),
            },
            SunTimeMode::StableDate(date) => self.from_ephemeris(date.as_naive_date())?,
            SunTimeMode::DayOffset(days) => {
                let date = Duration::try_days(days)
                    .and_then(|offset| today.checked_add_signed(offset))
                    .ok_or(SunTimeError::OffsetOutOfRange(days))?;
                self.from_ephemeris(date)?
            }
        };
        Ok(base.shifted(self.hours_offset))
    }

    fn from_ephemeris(&self, date: NaiveDate) -> Result<SunTimes, SunTimeError> {
        let (sunrise, sunset) = self.ephemeris.sun_times(date)?;
        Ok(SunTimes { sunrise, sunset })
    }
}

#[cfg(test)]
pub use fixed::FixedEphemeris;

#[cfg(test)]
mod fixed {
    use crate::devices::software::solar::{EphemerisError, SolarEphemeris};
    use chrono::{Datelike, NaiveDate, NaiveTime};
    use std::cell::RefCell;

    /// Ephemeris double: sunrise at 05:00 plus one minute per day of the
    /// month, sunset at 19:00. Records every date it was asked about.
    #[derive(Default)]
    pub struct FixedEphemeris {
        pub requested: RefCell<Vec<NaiveDate>>,
    }

    impl SolarEphemeris for FixedEphemeris {
        fn sun_times(&self, date: NaiveDate) -> Result<(NaiveTime, NaiveTime), EphemerisError> {
            self.requested.borrow_mut().push(date);
            Ok((
                NaiveTime::from_hms_opt(5, date.day(), 0).unwrap(),
                NaiveTime::from_hms_opt(19, 0, 0).unwrap(),
            ))
        }
    }
}
