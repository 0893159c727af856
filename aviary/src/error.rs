use crate::{
    components::chamber::{
        actuating::sun_time::SunTimeError,
        environment::ConfigError,
        reporting::writer::{RegistryError, ReportError},
        sensing::acquisition::AcquisitionError,
    },
    devices::{
        hardware::controller::DeviceError,
        software::{slack::NotifyError, solar::EphemerisError},
    },
    messages::sensor::frame::FrameError,
    utils::time::TimeFormatError,
};
use thiserror::Error;

/// Any failure raised by the crate.
#[derive(Error, Debug)]
pub enum AviaryError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error(transparent)]
    Notify(#[from] NotifyError),
    #[error(transparent)]
    Ephemeris(#[from] EphemerisError),
    #[error(transparent)]
    SunTime(#[from] SunTimeError),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),
    #[error(transparent)]
    Report(#[from] ReportError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    TimeFormat(#[from] TimeFormatError),
}

pub type AviaryResult<T> = Result<T, AviaryError>;
