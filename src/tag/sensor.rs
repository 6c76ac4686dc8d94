//! Decoders for sensor tags.
//!
//! - EM4152: sensor value and error flag live in the second XPC word.
//! - Humidity tags: USER memory starts with a `0xAA` header once the tag has
//!   harvested enough RF energy to complete a measurement; the next byte is
//!   relative humidity in percent.
//! - Magnus-S3: the sensor code is one reserved-bank word.

use super::epc::Epc;
use super::observation::TagObservation;
use serde::{Deserialize, Serialize};

/// Header byte a humidity tag writes once its measurement is ready.
pub const HUMIDITY_HEADER: u8 = 0xAA;

/// EM4152 measurement status from XPC bits 10-11.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensorStatus {
    /// Bits `00`: the chip flagged an error.
    Error,
    /// Bits `11`: the measurement is valid.
    Valid,
    /// Any other pattern.
    Unknown,
}

impl SensorStatus {
    /// Column value in result logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorStatus::Error => "error",
            SensorStatus::Valid => "valid",
            SensorStatus::Unknown => "unknown",
        }
    }
}

/// Decoded EM4152 XPC word.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Em4152Reading {
    /// Status bits.
    pub status: SensorStatus,
    /// Signed 10-bit sensor value.
    pub raw: i16,
    /// Sensed capacitance, `(raw - 128) * 0.15`.
    pub c_sense: f64,
}

impl Em4152Reading {
    /// Decode the second XPC word.
    pub fn decode(xpc_w2: u16) -> Self {
        let status = match (xpc_w2 >> 10) & 0x3 {
            0x0 => SensorStatus::Error,
            0x3 => SensorStatus::Valid,
            _ => SensorStatus::Unknown,
        };
        let mut raw = (xpc_w2 & 0x3FF) as i16;
        if raw & 0x200 != 0 {
            raw |= !0x3FF;
        }
        Self {
            status,
            raw,
            c_sense: f64::from(raw - 128) * 0.15,
        }
    }
}

/// Observation with its second XPC word decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XpcObservation {
    /// The accepted observation.
    pub observation: TagObservation,
    /// Decoded XPC word, when the reader forwarded one.
    pub sensor: Option<Em4152Reading>,
}

impl From<&TagObservation> for XpcObservation {
    fn from(observation: &TagObservation) -> Self {
        Self {
            observation: observation.clone(),
            sensor: observation.xpc_w2.map(Em4152Reading::decode),
        }
    }
}

/// Humidity tag USER-memory reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HumidityReading {
    /// Relative humidity, percent.
    pub humidity_percent: u8,
}

impl HumidityReading {
    /// Decode a USER read payload. `None` until the header is present.
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        match payload {
            [HUMIDITY_HEADER, humidity, ..] => Some(Self {
                humidity_percent: *humidity,
            }),
            _ => None,
        }
    }
}

/// Whether a USER read payload carries the ready header.
pub fn header_ready(payload: &[u8]) -> bool {
    payload.first() == Some(&HUMIDITY_HEADER)
}

/// Magnus-S3 sensor code: first big-endian word of a read payload.
pub fn sensor_code(payload: &[u8]) -> Option<u16> {
    match payload {
        [hi, lo, ..] => Some(u16::from_be_bytes([*hi, *lo])),
        _ => None,
    }
}

/// One Magnus-S3 sensor-code sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorCodeReading {
    /// 1-based sample counter within the run.
    pub count: u64,
    /// Tag the sample came from.
    pub epc: Epc,
    /// Channel the tag answered on.
    pub frequency_mhz: Option<f64>,
    /// Decimal sensor code.
    pub sensor_code: u16,
    /// Epoch milliseconds at which the result arrived.
    pub timestamp_ms: i64,
}
