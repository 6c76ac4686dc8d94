//! Column layouts for every record kind the procedures log.

use super::result_log::CsvRecord;
use crate::experiment::retry::RetrySession;
use crate::experiment::sweep::SweepPoint;
use crate::hardware::OpResult;
use crate::tag::sensor::{SensorCodeReading, XpcObservation};
use crate::tag::TagObservation;

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

impl CsvRecord for TagObservation {
    const HEADER: &'static [&'static str] =
        &["epc", "antenna_id", "rssi_dbm", "timestamp_ms", "channel_mhz"];

    fn fields(&self) -> Vec<String> {
        vec![
            self.epc.to_string(),
            self.antenna_id.to_string(),
            self.rssi_dbm.to_string(),
            self.timestamp_ms.to_string(),
            optional(self.channel_mhz),
        ]
    }
}

impl CsvRecord for XpcObservation {
    const HEADER: &'static [&'static str] = &[
        "epc",
        "antenna_id",
        "rssi_dbm",
        "timestamp_ms",
        "channel_mhz",
        "xpc_w2",
        "sensor_status",
        "c_sense",
    ];

    fn fields(&self) -> Vec<String> {
        let mut fields = self.observation.fields();
        fields.push(optional(self.observation.xpc_w2));
        fields.push(optional(self.sensor.map(|s| s.status.as_str())));
        fields.push(optional(self.sensor.map(|s| format!("{:.2}", s.c_sense))));
        fields
    }
}

impl CsvRecord for SweepPoint {
    const HEADER: &'static [&'static str] = &["frequency_mhz", "power_dbm", "detected"];

    fn fields(&self) -> Vec<String> {
        vec![
            self.frequency_mhz.to_string(),
            self.power_dbm.to_string(),
            self.detected.to_string(),
        ]
    }
}

impl CsvRecord for RetrySession {
    const HEADER: &'static [&'static str] =
        &["attempt_index", "window_duration_ms", "succeeded"];

    fn fields(&self) -> Vec<String> {
        vec![
            self.attempt_index.to_string(),
            self.window_duration_ms.to_string(),
            self.succeeded.to_string(),
        ]
    }
}

impl CsvRecord for OpResult {
    const HEADER: &'static [&'static str] = &["op_id", "epc", "kind", "success", "payload"];

    fn fields(&self) -> Vec<String> {
        vec![
            self.op_id.to_string(),
            self.epc.to_string(),
            self.kind.to_string(),
            self.success.to_string(),
            self.payload_text(),
        ]
    }
}

impl CsvRecord for SensorCodeReading {
    const HEADER: &'static [&'static str] =
        &["count", "epc", "frequency_mhz", "sensor_code", "timestamp_ms"];

    fn fields(&self) -> Vec<String> {
        vec![
            self.count.to_string(),
            self.epc.to_string(),
            optional(self.frequency_mhz),
            self.sensor_code.to_string(),
            self.timestamp_ms.to_string(),
        ]
    }
}
