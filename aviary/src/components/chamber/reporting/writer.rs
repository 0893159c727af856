use crate::{
    components::chamber::{
        actuating::sun_time::SunTimeMode,
        sensing::acquisition::{AggregatedSensorRecord, ScaleSample},
    },
    messages::sensor::frame::SCALE_CHANNELS,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, OpenOptions},
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, error, info};

/// Directory under the sensor base path holding the daily sensor reports.
pub const SENSOR_REPORT_DIR: &str = "sensor_data";
/// Directory under the scale base path holding one directory per subject.
pub const WEIGHT_REPORT_DIR: &str = "weight_reports";
/// Timestamp layout of the sensor report rows.
pub const SENSOR_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";
/// Timestamp layout of the weight report rows.
pub const WEIGHT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to access report {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to write report {path:?}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("No report found in {0:?}")]
    NoReport(PathBuf),
    #[error("Expected a single report in {dir:?}, found {found}")]
    MultipleReports { dir: PathBuf, found: usize },
}

impl ReportError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn csv(path: &Path, source: csv::Error) -> Self {
        Self::Csv {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Invalid channel to subject assignments.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Channel {0} does not exist, scales are numbered 0 to 7")]
    ChannelOutOfRange(u8),
    #[error("Channel {0} is assigned more than once")]
    DuplicateChannel(u8),
    #[error("Subject {0:?} cannot be used as a report directory name")]
    InvalidSubject(String),
}

/// True when `name` can be used as a directory name or inside a file name
/// without leaving the report directory.
pub fn is_file_name_part(name: &str) -> bool {
    !(name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']))
}

/// One scale channel assignment as written in the configuration.
#[derive(Deserialize, Serialize, PartialEq, Eq, Debug, Clone)]
pub struct SubjectChannel {
    /// Scale channel, the position in the frame.
    pub channel: u8,
    /// Subject identifier, also the name of its report directory.
    pub subject: String,
}

/// Channel index to subject mapping, static for a run. Channels without a
/// subject are skipped by the weight reports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubjectRegistry {
    channels: [Option<String>; SCALE_CHANNELS],
}

impl SubjectRegistry {
    /// Build the registry from the configured assignments.
    pub fn from_entries(entries: &[SubjectChannel]) -> Result<Self, RegistryError> {
        let mut registry = Self::default();
        for entry in entries {
            let slot = registry
                .channels
                .get_mut(usize::from(entry.channel))
                .ok_or(RegistryError::ChannelOutOfRange(entry.channel))?;
            if slot.is_some() {
                return Err(RegistryError::DuplicateChannel(entry.channel));
            }
            let subject = entry.subject.trim();
            if !is_file_name_part(subject) {
                return Err(RegistryError::InvalidSubject(entry.subject.clone()));
            }
            *slot = Some(subject.to_string());
        }
        Ok(registry)
    }

    /// Subject on `channel`, if any.
    pub fn subject(&self, channel: usize) -> Option<&str> {
        self.channels.get(channel)?.as_deref()
    }

    /// Assigned channels with their subject, in channel order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.channels
            .iter()
            .enumerate()
            .filter_map(|(channel, subject)| Some((channel, subject.as_deref()?)))
    }

    pub fn is_empty(&self) -> bool {
        self.channels.iter().all(Option::is_none)
    }
}

/// Row layout of the sensor report.
#[derive(Serialize, Debug)]
struct SensorRow {
    #[serde(rename = "dateTime")]
    date_time: String,
    #[serde(rename = "humidity(%)_min")]
    humidity_min: f64,
    #[serde(rename = "humidity(%)_max")]
    humidity_max: f64,
    #[serde(rename = "humidity(%)_median")]
    humidity_median: f64,
    #[serde(rename = "temperature(deg celsius)_min")]
    temperature_min: f64,
    #[serde(rename = "temperature(deg celsius)_max")]
    temperature_max: f64,
    #[serde(rename = "temperature(deg celsius)_median")]
    temperature_median: f64,
    #[serde(rename = "photoresistor(millivolt)_min")]
    light_level_min: f64,
    #[serde(rename = "photoresistor(millivolt)_max")]
    light_level_max: f64,
    #[serde(rename = "photoresistor(millivolt)_median")]
    light_level_median: f64,
}

impl From<&AggregatedSensorRecord> for SensorRow {
    fn from(record: &AggregatedSensorRecord) -> Self {
        Self {
            date_time: record.timestamp.format(SENSOR_TIME_FORMAT).to_string(),
            humidity_min: record.humidity.min,
            humidity_max: record.humidity.max,
            humidity_median: record.humidity.median,
            temperature_min: record.temperature.min,
            temperature_max: record.temperature.max,
            temperature_median: record.temperature.median,
            light_level_min: record.light_level.min,
            light_level_max: record.light_level.max,
            light_level_median: record.light_level.median,
        }
    }
}

/// Row layout of a subject weight report.
#[derive(Serialize, Debug)]
struct WeightRow {
    #[serde(rename = "Time")]
    time: String,
    #[serde(rename = "Weight")]
    weight: f64,
}

/// Append `rows` to the report at `path`, creating it and its directory when
/// needed. The header goes in only when the file is absent or empty, a file
/// that cannot be inspected for any other reason is an error rather than
/// something to overwrite. Returns the number of rows written.
fn append_rows<R, I>(path: &Path, rows: I) -> Result<usize, ReportError>
where
    R: Serialize,
    I: IntoIterator<Item = R>,
{
    let mut rows = rows.into_iter().peekable();
    if rows.peek().is_none() {
        return Ok(0);
    }
    let needs_header = match fs::metadata(path) {
        Ok(metadata) => metadata.len() == 0,
        Err(e) if e.kind() == ErrorKind::NotFound => true,
        Err(e) => return Err(ReportError::io(path, e)),
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| ReportError::io(parent, e))?;
    }
    let file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .map_err(|e| ReportError::io(path, e))?;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(needs_header)
        .from_writer(file);
    let mut written = 0;
    for row in rows {
        writer
            .serialize(row)
            .map_err(|e| ReportError::csv(path, e))?;
        written += 1;
    }
    writer.flush().map_err(|e| ReportError::io(path, e))?;
    Ok(written)
}

/// Daily sensor report of one environmental system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorReport {
    path: PathBuf,
}

impl SensorReport {
    /// Report for `date`. The file name carries the room, system, date and
    /// sun time mode, e.g. `roomA_env_system_3_2024_05_01_manually_set.csv`.
    ///
    /// * `base`: configured sensor output directory.
    /// * `room`: room name.
    /// * `system`: environmental system id.
    /// * `date`: day of the rows going in.
    /// * `mode`: sun time mode driving the lights.
    pub fn for_day(
        base: &Path,
        room: &str,
        system: u32,
        date: NaiveDate,
        mode: &SunTimeMode,
    ) -> Self {
        let file_name = format!(
            "{room}_env_system_{system}_{}_{mode}.csv",
            date.format("%Y_%m_%d")
        );
        Self {
            path: base.join(SENSOR_REPORT_DIR).join(file_name),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append aggregated rows in the order given.
    pub fn append(&self, records: &[AggregatedSensorRecord]) -> Result<usize, ReportError> {
        let written = append_rows(&self.path, records.iter().map(SensorRow::from))?;
        debug!("Appended {written} rows to {:?}", self.path);
        Ok(written)
    }
}

/// Continuous weight report of one subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaleReport {
    path: PathBuf,
}

impl ScaleReport {
    /// Directory holding the reports of `subject`.
    pub fn directory(base: &Path, subject: &str) -> PathBuf {
        base.join(WEIGHT_REPORT_DIR).join(subject)
    }

    /// * `base`: configured scale output directory.
    /// * `subject`: subject identifier.
    pub fn for_subject(base: &Path, subject: &str) -> Self {
        Self {
            path: Self::directory(base, subject).join(format!("{subject}_weight_report.csv")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append the weight seen on `channel` for every sample.
    pub fn append(&self, samples: &[ScaleSample], channel: usize) -> Result<usize, ReportError> {
        let rows = samples.iter().filter_map(|sample| {
            Some(WeightRow {
                time: sample.captured_at.format(WEIGHT_TIME_FORMAT).to_string(),
                weight: *sample.weights.get(channel)?,
            })
        });
        append_rows(&self.path, rows)
    }
}

/// Route the samples of a window into the report of every assigned subject.
/// A subject whose report fails is logged and the others still go through.
/// Returns the number of subjects whose report was updated.
///
/// * `base`: configured scale output directory.
/// * `registry`: channel assignments.
/// * `samples`: scale samples of the window.
pub fn write_subject_reports(
    base: &Path,
    registry: &SubjectRegistry,
    samples: &[ScaleSample],
) -> usize {
    let mut updated = 0;
    for (channel, subject) in registry.iter() {
        let report = ScaleReport::for_subject(base, subject);
        match report.append(samples, channel) {
            Ok(rows) => {
                debug!("Added {rows} weight rows for subject {subject} on channel {channel}");
                updated += 1;
            }
            Err(e) => error!("Failed to update the weight report of subject {subject}: {e}"),
        }
    }
    info!("Updated {updated} weight reports");
    updated
}

/// The single `.csv` report in `dir`. No report, or more than one, is an
/// error since it is not obvious which one should be sent.
pub fn find_single_report(dir: &Path) -> Result<PathBuf, ReportError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(ReportError::NoReport(dir.to_path_buf()))
        }
        Err(e) => return Err(ReportError::io(dir, e)),
    };
    let mut reports = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| ReportError::io(dir, e))?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "csv") {
            reports.push(path);
        }
    }
    match reports.len() {
        0 => Err(ReportError::NoReport(dir.to_path_buf())),
        1 => Ok(reports.remove(0)),
        found => Err(ReportError::MultipleReports {
            dir: dir.to_path_buf(),
            found,
        }),
    }
}
