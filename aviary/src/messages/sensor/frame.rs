use chrono::NaiveDateTime;
use thiserror::Error;

/// Number of environmental sensor fields leading every line:
/// humidity, temperature and light level.
pub const SENSOR_FIELDS: usize = 3;
/// Number of scale channels multiplexed behind the sensor fields.
pub const SCALE_CHANNELS: usize = 8;
/// Total number of numeric fields in a well formed line.
pub const FRAME_FIELDS: usize = SENSOR_FIELDS + SCALE_CHANNELS;

/// Reasons a serial line is discarded. None of these stop the acquisition
/// loop, the caller logs them and reads the next line straight away.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FrameError {
    #[error("Empty line, the serial read most likely timed out")]
    Empty,
    #[error("Line is not valid UTF-8")]
    Encoding,
    #[error("Expected {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },
    #[error("Field {index} is not a number: {field:?}")]
    NonNumeric { index: usize, field: String },
}

/// One decoded line from the microcontroller. The line looks like
/// `50;300;14.6;0.00;20.1;19.6;0.00;0.00;2.22;0.00;0.00;` where the first
/// three values are the sensors and the remaining eight the scales, the
/// scale index in the array is the channel on the scale multiplexer.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// When the line was read on the host.
    pub captured_at: NaiveDateTime,
    /// Relative humidity in percent.
    pub humidity: f64,
    /// Temperature in degrees celsius.
    pub temperature: f64,
    /// Photoresistor reading in millivolt.
    pub light_level: f64,
    /// Raw weight in grams per scale channel.
    pub scales: [f64; SCALE_CHANNELS],
}

impl Frame {
    /// Decode one raw serial line.
    ///
    /// * `raw`: bytes as read from the port, CR/LF included.
    /// * `captured_at`: host time of the read.
    pub fn parse(raw: &[u8], captured_at: NaiveDateTime) -> Result<Self, FrameError> {
        let line = std::str::from_utf8(raw).map_err(|_| FrameError::Encoding)?;
        let line = line.trim_end_matches(['\r', '\n']).trim();
        if line.is_empty() {
            return Err(FrameError::Empty);
        }
        // The firmware terminates every value with a separator, including the last.
        let line = line.strip_suffix(';').unwrap_or(line);

        let fields: Vec<&str> = line.split(';').collect();
        if fields.len() != FRAME_FIELDS {
            return Err(FrameError::FieldCount {
                expected: FRAME_FIELDS,
                found: fields.len(),
            });
        }

        let mut values = [0.0_f64; FRAME_FIELDS];
        for (index, (field, value)) in fields.iter().zip(values.iter_mut()).enumerate() {
            *value = match field.trim().parse::<f64>() {
                Ok(parsed) if parsed.is_finite() => parsed,
                _ => {
                    return Err(FrameError::NonNumeric {
                        index,
                        field: (*field).to_string(),
                    })
                }
            };
        }

        let mut scales = [0.0_f64; SCALE_CHANNELS];
        scales.copy_from_slice(&values[SENSOR_FIELDS..]);

        Ok(Self {
            captured_at,
            humidity: values[0],
            temperature: values[1],
            light_level: values[2],
            scales,
        })
    }
}
