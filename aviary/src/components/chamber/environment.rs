use crate::{
    components::chamber::{
        actuating::{
            lighting::{ChamberLighting, LightState},
            sun_time::{SunTimeError, SunTimeMode, SunTimeResolver},
        },
        reporting::{
            daily::DailyReportScheduler,
            writer::{
                is_file_name_part, write_subject_reports, RegistryError, SensorReport, SubjectChannel,
                SubjectRegistry,
            },
        },
        sensing::acquisition::{MinuteAcquisition, SAMPLE_PAUSE, WINDOW_LENGTH},
    },
    devices::{
        hardware::controller::{ChamberDevice, ControllerConfig},
        software::{
            slack::{Notifier, SlackConfig},
            solar::{SiteLocation, SolarEphemeris},
        },
    },
    error::AviaryResult,
    utils::time::{Clock, StableDate, TimeOfDay},
};
use serde::{Deserialize, Serialize};
use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, Ordering},
};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Prefix of the environment variables overriding the configuration file,
/// e.g. `AVIARY_NOTIFICATION__TOKEN`.
pub const ENV_PREFIX: &str = "AVIARY";

/// The configuration could not be used to start the chamber.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not locate the config file {0:?}")]
    MissingFile(PathBuf),
    #[error("Failed to read config: {0}")]
    Read(#[from] config::ConfigError),
    #[error("Invalid sun time settings: {0}")]
    SunTime(#[from] SunTimeError),
    #[error("Invalid subject settings: {0}")]
    Registry(#[from] RegistryError),
    #[error("No serial device path configured")]
    NoDevicePaths,
    #[error("Room name {0:?} cannot be used in a report file name")]
    InvalidRoomName(String),
}

/// Configuration of one environmental system of a chamber.
#[derive(Deserialize, Serialize, PartialEq, Debug, Clone)]
pub struct EnvironmentConfig {
    /// Room the chamber stands in, used in report names.
    pub room_name: String,
    /// Environmental system id, used in report names and notifications.
    pub env_system: u32,
    /// Collect and save the aggregated sensor readings.
    pub sensor_data_reading_and_saving: bool,
    /// Collect and save the per subject scale readings.
    pub scale_data_reading_and_saving: bool,
    /// Directory the `sensor_data` reports go under.
    pub sensor_output_base_path: PathBuf,
    /// Directory the `weight_reports` go under.
    pub scale_output_base_path: PathBuf,
    /// Manual sunrise, needs `sunset` as well.
    #[serde(default)]
    pub sunrise: Option<TimeOfDay>,
    /// Manual sunset, needs `sunrise` as well.
    #[serde(default)]
    pub sunset: Option<TimeOfDay>,
    /// Use the sun times of this date every day.
    #[serde(default)]
    pub stable_date: Option<StableDate>,
    /// Use the sun times of today shifted by this many days.
    #[serde(default)]
    pub days_offset: Option<i64>,
    /// Hours added to both sunrise and sunset.
    #[serde(default)]
    pub hours_offset: i64,
    /// Time of day the weight reports are sent, never when unset.
    #[serde(default)]
    pub daily_report_time: Option<TimeOfDay>,
    /// Subjects sitting on the scale channels.
    #[serde(default)]
    pub subjects: Vec<SubjectChannel>,
    /// Where the chamber is, for the true sun times.
    #[serde(default)]
    pub location: SiteLocation,
    /// Serial connection to the microcontroller.
    pub device: ControllerConfig,
    /// Channel for light alerts and daily reports.
    pub notification: SlackConfig,
}

impl EnvironmentConfig {
    /// Environment configuration with data collection off and no sun time
    /// mode selected.
    ///
    /// * `room_name`: room the chamber stands in.
    /// * `env_system`: environmental system id.
    /// * `device`: serial settings.
    /// * `notification`: notification channel.
    pub fn new(
        room_name: String,
        env_system: u32,
        device: ControllerConfig,
        notification: SlackConfig,
    ) -> Self {
        Self {
            room_name,
            env_system,
            sensor_data_reading_and_saving: false,
            scale_data_reading_and_saving: false,
            sensor_output_base_path: PathBuf::from("."),
            scale_output_base_path: PathBuf::from("."),
            sunrise: None,
            sunset: None,
            stable_date: None,
            days_offset: None,
            hours_offset: 0,
            daily_report_time: None,
            subjects: Vec::new(),
            location: SiteLocation::default(),
            device,
            notification,
        }
    }

    /// Turn on the sensor reports, written under `base`.
    pub fn with_sensor_output<P: Into<PathBuf>>(mut self, base: P) -> Self {
        self.sensor_data_reading_and_saving = true;
        self.sensor_output_base_path = base.into();
        self
    }

    /// Turn on the weight reports, written under `base`.
    pub fn with_scale_output<P: Into<PathBuf>>(mut self, base: P) -> Self {
        self.scale_data_reading_and_saving = true;
        self.scale_output_base_path = base.into();
        self
    }

    /// Set a manual sunrise and sunset.
    pub fn with_manual_sun_times(mut self, sunrise: TimeOfDay, sunset: TimeOfDay) -> Self {
        self.sunrise = Some(sunrise);
        self.sunset = Some(sunset);
        self
    }

    /// Send the weight reports daily at `time`.
    pub fn with_daily_report_time(mut self, time: TimeOfDay) -> Self {
        self.daily_report_time = Some(time);
        self
    }

    /// Put `subject` on scale `channel`.
    ///
    /// * `channel`: scale channel [0 - 7].
    /// * `subject`: subject identifier.
    pub fn add_subject(mut self, channel: u8, subject: &str) -> Self {
        self.subjects.push(SubjectChannel {
            channel,
            subject: subject.to_string(),
        });
        self
    }

    /// Build the config by reading a yaml file, environment variables with
    /// the `AVIARY_` prefix take precedence over the file. The result is
    /// validated before it is returned.
    ///
    /// * `filepath`: path to config.
    pub fn from_file<F: AsRef<OsStr>>(filepath: F) -> Result<Self, ConfigError> {
        let file = Path::new(&filepath);
        if !file.is_file() {
            return Err(ConfigError::MissingFile(file.to_path_buf()));
        }
        let config: Self = config::Config::builder()
            .add_source(config::File::new(
                &file.to_string_lossy(),
                config::FileFormat::Yaml,
            ))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check everything that would otherwise only fail once the loop runs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.sun_time_mode()?;
        self.subject_registry()?;
        if !is_file_name_part(&self.room_name) {
            return Err(ConfigError::InvalidRoomName(self.room_name.clone()));
        }
        if self.device.paths.is_empty() {
            return Err(ConfigError::NoDevicePaths);
        }
        Ok(())
    }

    /// The sun time mode selected by the configured fields.
    pub fn sun_time_mode(&self) -> Result<SunTimeMode, SunTimeError> {
        SunTimeMode::select(self.sunrise, self.sunset, self.stable_date, self.days_offset)
    }

    /// The channel to subject registry.
    pub fn subject_registry(&self) -> Result<SubjectRegistry, RegistryError> {
        SubjectRegistry::from_entries(&self.subjects)
    }

    /// True when either kind of data is collected.
    pub fn collects_data(&self) -> bool {
        self.sensor_data_reading_and_saving || self.scale_data_reading_and_saving
    }
}

/// Component grouping the microcontroller, the notification channel and the
/// sun for one environmental system. Holds the state carried from one
/// iteration of the control loop to the next.
pub struct Environment<D, N, E> {
    /// Unique id of the component.
    uuid: Uuid,
    config: EnvironmentConfig,
    device: D,
    notifier: N,
    lighting: ChamberLighting<E>,
    acquisition: MinuteAcquisition,
    registry: SubjectRegistry,
    scheduler: Option<DailyReportScheduler>,
    light_state: LightState,
}

impl<D, N, E> Environment<D, N, E>
where
    D: ChamberDevice,
    N: Notifier,
    E: SolarEphemeris,
{
    /// Generate a new component by consuming a config.
    ///
    /// * `config`: environment configuration.
    /// * `device`: opened microcontroller.
    /// * `notifier`: notification channel.
    /// * `ephemeris`: sun times for the configured location.
    /// * `clock`: wall clock, its current time is the process start.
    pub fn new<C: Clock>(
        config: EnvironmentConfig,
        device: D,
        notifier: N,
        ephemeris: E,
        clock: &C,
    ) -> AviaryResult<Self> {
        config.validate()?;
        let mode = config.sun_time_mode()?;
        let registry = config.subject_registry()?;
        if config.scale_data_reading_and_saving {
            for (channel, subject) in registry.iter() {
                info!("Subject connected to channel {channel}: {subject}");
            }
        }
        info!(
            "Environmental system {} in room {}, sun times {mode}",
            config.env_system, config.room_name
        );
        let scheduler = config
            .daily_report_time
            .map(|target| DailyReportScheduler::new(target, clock.now()));

        Ok(Self {
            uuid: Uuid::new_v4(),
            lighting: ChamberLighting::new(
                config.env_system,
                SunTimeResolver::new(mode, config.hours_offset, ephemeris),
            ),
            acquisition: MinuteAcquisition::new(config.scale_data_reading_and_saving),
            registry,
            scheduler,
            light_state: LightState::default(),
            config,
            device,
            notifier,
        })
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn config(&self) -> &EnvironmentConfig {
        &self.config
    }

    /// Light state after the last iteration.
    pub fn light_state(&self) -> LightState {
        self.light_state
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }
}

/// Unit struct for running the environment component.
pub struct EnvironmentController;

impl EnvironmentController {
    /// Run iterations until `stop` is set.
    ///
    /// * `environment`: component to drive.
    /// * `clock`: wall clock.
    /// * `stop`: cooperative shutdown signal.
    pub fn run<D, N, E, C>(environment: &mut Environment<D, N, E>, clock: &C, stop: &AtomicBool)
    where
        D: ChamberDevice,
        N: Notifier,
        E: SolarEphemeris,
        C: Clock,
    {
        info!("Starting environment {}", environment.uuid);
        while !stop.load(Ordering::Relaxed) {
            Self::run_iteration(environment, clock, stop);
        }
        info!("Environment {} stopped", environment.uuid);
    }

    /// One pass of the control loop: drive the light, collect and save a
    /// minute of data (or wait a minute when nothing is collected), then
    /// send the daily reports if they are due.
    pub fn run_iteration<D, N, E, C>(
        environment: &mut Environment<D, N, E>,
        clock: &C,
        stop: &AtomicBool,
    ) where
        D: ChamberDevice,
        N: Notifier,
        E: SolarEphemeris,
        C: Clock,
    {
        environment.light_state = environment.lighting.handle_lights(
            &mut environment.device,
            &environment.notifier,
            environment.light_state,
            clock.now(),
        );

        if environment.config.collects_data() {
            Self::collect_minute(environment, clock, stop);
        } else {
            info!("Data collection is off, waiting a minute");
            Self::pause(clock, stop);
        }

        if let Some(scheduler) = environment.scheduler.as_mut() {
            scheduler.run(
                clock.now(),
                &environment.registry,
                &environment.config.scale_output_base_path,
                &environment.notifier,
            );
        }
    }

    fn collect_minute<D, N, E, C>(
        environment: &mut Environment<D, N, E>,
        clock: &C,
        stop: &AtomicBool,
    ) where
        D: ChamberDevice,
        N: Notifier,
        E: SolarEphemeris,
        C: Clock,
    {
        let window = environment
            .acquisition
            .acquire(&mut environment.device, clock, stop);
        let now = clock.now();
        let config = &environment.config;

        if config.sensor_data_reading_and_saving {
            match window.aggregate(now) {
                Ok(record) => {
                    let report = SensorReport::for_day(
                        &config.sensor_output_base_path,
                        &config.room_name,
                        config.env_system,
                        now.date(),
                        environment.lighting.resolver().mode(),
                    );
                    match report.append(&[record]) {
                        Ok(_) => info!("Added sensor data to {:?}", report.path()),
                        Err(e) => error!("Failed to save sensor data: {e}"),
                    }
                }
                Err(e) => warn!("No sensor record this minute: {e}"),
            }
        }

        if config.scale_data_reading_and_saving {
            write_subject_reports(
                &config.scale_output_base_path,
                &environment.registry,
                window.scale_samples(),
            );
        }
    }

    /// Wait one window length in short slices so a stop is not held up.
    fn pause<C: Clock>(clock: &C, stop: &AtomicBool) {
        let started = clock.instant();
        while !stop.load(Ordering::Relaxed) && clock.elapsed(started) < WINDOW_LENGTH {
            clock.sleep(SAMPLE_PAUSE);
        }
    }
}
