use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Latitude of the Weizmann Institute campus in Rehovot.
pub const REHOVOT_LATITUDE: f64 = 31.905111;
/// Longitude of the Weizmann Institute campus in Rehovot.
pub const REHOVOT_LONGITUDE: f64 = 34.808349;

/// The ephemeris could not produce sun times for a date.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EphemerisError {
    #[error("No sunrise and sunset on {date} at ({latitude}, {longitude})")]
    NoSunEvents {
        date: NaiveDate,
        latitude: f64,
        longitude: f64,
    },
}

/// Source of sunrise and sunset for a calendar date. Treated as a pure
/// function, callers may ask for the same date as often as they like.
pub trait SolarEphemeris {
    /// Sunrise and sunset of `date` as local time of day.
    fn sun_times(&self, date: NaiveDate) -> Result<(NaiveTime, NaiveTime), EphemerisError>;
}

/// Geographic position of the rig.
#[derive(Deserialize, Serialize, PartialEq, Debug, Clone, Copy)]
pub struct SiteLocation {
    /// Degrees north.
    pub latitude: f64,
    /// Degrees east.
    pub longitude: f64,
}

impl Default for SiteLocation {
    fn default() -> Self {
        Self {
            latitude: REHOVOT_LATITUDE,
            longitude: REHOVOT_LONGITUDE,
        }
    }
}

/// Ephemeris for a fixed observer, backed by the `sunrise` crate.
/// Instants are converted to the local timezone of the host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observer {
    location: SiteLocation,
}

impl Observer {
    pub fn new(location: SiteLocation) -> Self {
        Self { location }
    }

    /// Sunrise and sunset of `date` as UTC instants.
    pub fn sun_instants(
        &self,
        date: NaiveDate,
    ) -> Result<(DateTime<Utc>, DateTime<Utc>), EphemerisError> {
        let no_events = || EphemerisError::NoSunEvents {
            date,
            latitude: self.location.latitude,
            longitude: self.location.longitude,
        };
        let (sunrise, sunset) = sunrise::sunrise_sunset(
            self.location.latitude,
            self.location.longitude,
            date.year(),
            date.month(),
            date.day(),
        );
        let sunrise = DateTime::from_timestamp(sunrise, 0).ok_or_else(no_events)?;
        let sunset = DateTime::from_timestamp(sunset, 0).ok_or_else(no_events)?;

        // Polar day and night come back as instants nowhere near the date.
        let near_date = |instant: &DateTime<Utc>| {
            (instant.date_naive() - date).num_days().abs() <= 1
        };
        if sunrise >= sunset || !near_date(&sunrise) || !near_date(&sunset) {
            return Err(no_events());
        }
        Ok((sunrise, sunset))
    }
}

impl SolarEphemeris for Observer {
    fn sun_times(&self, date: NaiveDate) -> Result<(NaiveTime, NaiveTime), EphemerisError> {
        let (sunrise, sunset) = self.sun_instants(date)?;
        Ok((
            sunrise.with_timezone(&Local).time(),
            sunset.with_timezone(&Local).time(),
        ))
    }
}
