use crate::messages::control::light::LightCommand;
use serde::{Deserialize, Serialize};
use serialport::SerialPort;
use std::{
    io::{self, BufRead, BufReader, Write},
    time::Duration,
};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

/// Failures talking to the microcontroller.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("No valid serial port could be found, tried {tried:?}")]
    NotFound { tried: Vec<String> },
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
    #[error("Serial I/O error: {0}")]
    Io(#[from] io::Error),
}

/// The chamber microcontroller as seen by the control loop: it produces one
/// line of readings per read and accepts a single byte light command.
pub trait ChamberDevice {
    /// Block until a full line arrives or the read timeout expires. On a
    /// timeout the bytes received so far are returned, possibly none.
    fn read_line(&mut self) -> Result<Vec<u8>, DeviceError>;
    /// Drive the light circuit. Writing the same command twice is harmless.
    fn write_light(&mut self, command: LightCommand) -> Result<(), DeviceError>;
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_timeout_ms() -> u64 {
    1000
}

/// Serial settings for the microcontroller. The device path differs between
/// the rig (`/dev/ttyACM*`) and development machines, so a list of
/// candidates is tried in order.
#[derive(Deserialize, Serialize, PartialEq, Eq, Debug, Clone)]
pub struct ControllerConfig {
    /// Candidate device paths, first one that opens wins.
    pub paths: Vec<String>,
    /// Baud rate the firmware was flashed with.
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Read timeout in milliseconds, bounds every blocking read.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl ControllerConfig {
    /// Controller configuration with the firmware defaults.
    ///
    /// * `paths`: candidate serial device paths.
    pub fn new(paths: Vec<String>) -> Self {
        Self {
            paths,
            baud_rate: default_baud_rate(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Serial connection to the chamber microcontroller. The port is cloned so
/// that reads can be buffered line by line while writes go straight out.
pub struct SerialController {
    /// Unique identifier, helpful for trouble shooting and logging.
    uuid: Uuid,
    /// Path of the port that was opened.
    path: String,
    /// Buffered read half.
    reader: BufReader<Box<dyn SerialPort>>,
    /// Write half used for the light tokens.
    writer: Box<dyn SerialPort>,
}

impl SerialController {
    /// Open the first candidate path that accepts a connection.
    ///
    /// * `config`: serial settings.
    pub fn open(config: &ControllerConfig) -> Result<Self, DeviceError> {
        let timeout = Duration::from_millis(config.timeout_ms);
        for path in &config.paths {
            match serialport::new(path, config.baud_rate).timeout(timeout).open() {
                Ok(port) => {
                    let writer = port.try_clone()?;
                    let controller = Self {
                        uuid: Uuid::new_v4(),
                        path: path.clone(),
                        reader: BufReader::new(port),
                        writer,
                    };
                    info!(
                        device = %controller.uuid,
                        "Successfully opened serial port {} at {} baud",
                        controller.path,
                        config.baud_rate
                    );
                    return Ok(controller);
                }
                Err(e) => debug!("Could not open serial port {path}: {e}"),
            }
        }
        Err(DeviceError::NotFound {
            tried: config.paths.clone(),
        })
    }

    /// Path of the opened port.
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl ChamberDevice for SerialController {
    fn read_line(&mut self) -> Result<Vec<u8>, DeviceError> {
        let mut line = Vec::new();
        match self.reader.read_until(b'\n', &mut line) {
            Ok(_) => Ok(line),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(line),
            Err(e) => Err(e.into()),
        }
    }

    fn write_light(&mut self, command: LightCommand) -> Result<(), DeviceError> {
        self.writer.write_all(&[command.token()])?;
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
pub use scripted::ScriptedDevice;
