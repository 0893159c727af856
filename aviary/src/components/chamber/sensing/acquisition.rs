use crate::{
    devices::hardware::controller::ChamberDevice,
    messages::sensor::frame::{Frame, SCALE_CHANNELS},
    utils::time::Clock,
};
use chrono::NaiveDateTime;
use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Length of one acquisition window, measured on the monotonic clock.
pub const WINDOW_LENGTH: Duration = Duration::from_secs(60);
/// Pause between two successful reads, paces the serial link at about one
/// frame per second.
pub const SAMPLE_PAUSE: Duration = Duration::from_secs(1);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AcquisitionError {
    #[error("No frame could be parsed during the window starting at {0}")]
    EmptyWindow(NaiveDateTime),
}

/// Raw weights of every scale channel captured from one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleSample {
    pub captured_at: NaiveDateTime,
    pub weights: [f64; SCALE_CHANNELS],
}

/// Minimum, maximum and median of one sensor channel over a window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelSummary {
    pub min: f64,
    pub max: f64,
    pub median: f64,
}

impl ChannelSummary {
    /// Summarise `values`, `None` when there are none. An even number of
    /// values takes the midpoint of the two central values as median.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        let (first, last) = (sorted.first()?, sorted.last()?);
        let middle = sorted.len() / 2;
        let median = if sorted.len() % 2 == 0 {
            (sorted[middle - 1] + sorted[middle]) / 2.0
        } else {
            sorted[middle]
        };
        Some(Self {
            min: *first,
            max: *last,
            median,
        })
    }
}

/// One row of the sensor report, a minute of readings folded together.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedSensorRecord {
    /// Time the aggregation completed.
    pub timestamp: NaiveDateTime,
    pub humidity: ChannelSummary,
    pub temperature: ChannelSummary,
    pub light_level: ChannelSummary,
}

/// Frames collected during one acquisition window. Created at the start of
/// the window and dropped once it has been aggregated and written.
#[derive(Debug, Clone)]
pub struct MinuteWindow {
    started_at: NaiveDateTime,
    record_scales: bool,
    frames: Vec<Frame>,
    scale_samples: Vec<ScaleSample>,
}

impl MinuteWindow {
    /// * `started_at`: local time the window opened.
    /// * `record_scales`: keep a scale sample per frame.
    pub fn new(started_at: NaiveDateTime, record_scales: bool) -> Self {
        Self {
            started_at,
            record_scales,
            frames: Vec::with_capacity(64),
            scale_samples: Vec::new(),
        }
    }

    pub fn started_at(&self) -> NaiveDateTime {
        self.started_at
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Fold a frame into the window.
    pub fn push(&mut self, frame: Frame) {
        if self.record_scales {
            self.scale_samples.push(ScaleSample {
                captured_at: frame.captured_at,
                weights: frame.scales,
            });
        }
        self.frames.push(frame);
    }

    /// Scale samples in capture order.
    pub fn scale_samples(&self) -> &[ScaleSample] {
        &self.scale_samples
    }

    /// Aggregate the sensor channels.
    ///
    /// * `at`: completion time stamped on the record.
    pub fn aggregate(&self, at: NaiveDateTime) -> Result<AggregatedSensorRecord, AcquisitionError> {
        let channel = |value: fn(&Frame) -> f64| {
            let values: Vec<f64> = self.frames.iter().map(value).collect();
            ChannelSummary::from_values(&values)
                .ok_or(AcquisitionError::EmptyWindow(self.started_at))
        };
        Ok(AggregatedSensorRecord {
            timestamp: at,
            humidity: channel(|f| f.humidity)?,
            temperature: channel(|f| f.temperature)?,
            light_level: channel(|f| f.light_level)?,
        })
    }
}

/// Runs the minute long read loop against the microcontroller.
#[derive(Debug, Clone)]
pub struct MinuteAcquisition {
    record_scales: bool,
    window_length: Duration,
    sample_pause: Duration,
}

impl MinuteAcquisition {
    /// Acquisition with the standard sixty second window.
    ///
    /// * `record_scales`: buffer scale samples as well as the sensors.
    pub fn new(record_scales: bool) -> Self {
        Self {
            record_scales,
            window_length: WINDOW_LENGTH,
            sample_pause: SAMPLE_PAUSE,
        }
    }

    /// Read frames until the window length has elapsed on the monotonic
    /// clock, a jump of the local time does not stretch or cut the window.
    /// The number of frames is whatever fitted, malformed lines are dropped
    /// and the next read happens straight away. Device errors are retried
    /// after the usual pause. The stop signal is checked before every read,
    /// a stopped window is returned with what it holds.
    ///
    /// * `device`: microcontroller to read from.
    /// * `clock`: host clock.
    /// * `stop`: cooperative shutdown signal.
    pub fn acquire<D, C>(&self, device: &mut D, clock: &C, stop: &AtomicBool) -> MinuteWindow
    where
        D: ChamberDevice,
        C: Clock,
    {
        let mut window = MinuteWindow::new(clock.now(), self.record_scales);
        let started = clock.instant();
        let elapsed = |clock: &C| clock.elapsed(started);

        loop {
            if stop.load(Ordering::Relaxed) {
                info!("Stop requested, closing the window early");
                break;
            }
            match device.read_line() {
                Ok(raw) => match Frame::parse(&raw, clock.now()) {
                    Ok(frame) => {
                        debug!("Received frame {:?}", frame);
                        window.push(frame);
                        if elapsed(clock) >= self.window_length {
                            break;
                        }
                        clock.sleep(self.sample_pause);
                    }
                    Err(e) => {
                        warn!(
                            "Failed parsing data, ignoring this record ({e}), raw data was {:?}",
                            String::from_utf8_lossy(&raw)
                        );
                        if elapsed(clock) >= self.window_length {
                            break;
                        }
                    }
                },
                Err(e) => {
                    warn!("Failed reading data from the device: {e}");
                    if elapsed(clock) >= self.window_length {
                        break;
                    }
                    clock.sleep(self.sample_pause);
                }
            }
        }
        info!(
            "Finished collecting data, {} frames in the window",
            window.len()
        );
        window
    }
}
