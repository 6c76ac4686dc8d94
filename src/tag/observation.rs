//! Tag reports as delivered by a reader, and the normalized observation the
//! rest of the crate works with.

use super::epc::Epc;
use super::timestamp::{self, RawTimestamp};
use serde::{Deserialize, Serialize};

/// A tag-seen event exactly as the reader produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagReport {
    /// EPC in whatever format the SDK printed it.
    pub epc: String,
    /// Antenna port the tag was seen on.
    pub antenna_id: u16,
    /// Peak RSSI in dBm.
    pub peak_rssi_dbm: f64,
    /// Seen-at time, if the report carried one.
    pub timestamp: Option<RawTimestamp>,
    /// Channel the tag answered on, if reported.
    pub channel_mhz: Option<f64>,
    /// Second XPC word, if the reader forwards it.
    pub xpc_w2: Option<u16>,
}

/// Normalized, immutable tag observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagObservation {
    /// Canonical EPC.
    pub epc: Epc,
    /// Antenna port.
    pub antenna_id: u16,
    /// Peak RSSI in dBm.
    pub rssi_dbm: f64,
    /// Epoch milliseconds.
    pub timestamp_ms: i64,
    /// Channel frequency in MHz.
    pub channel_mhz: Option<f64>,
    /// Second XPC word, carried for sensor chips that encode readings there.
    pub xpc_w2: Option<u16>,
}

impl TagObservation {
    /// Normalize a raw report.
    ///
    /// Returns `None` when the EPC is empty or not hexadecimal; such reports
    /// cannot match any target. The timestamp never causes a rejection.
    pub fn from_report(report: &TagReport) -> Option<Self> {
        let epc = match Epc::parse(&report.epc) {
            Ok(epc) => epc,
            Err(e) => {
                tracing::debug!(raw = %report.epc, "Dropping tag report: {}", e);
                return None;
            }
        };

        Some(Self {
            epc,
            antenna_id: report.antenna_id,
            rssi_dbm: report.peak_rssi_dbm,
            timestamp_ms: timestamp::normalize(report.timestamp.as_ref()),
            channel_mhz: report.channel_mhz,
            xpc_w2: report.xpc_w2,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(epc: &str) -> TagReport {
        TagReport {
            epc: epc.to_string(),
            antenna_id: 1,
            peak_rssi_dbm: -54.5,
            timestamp: Some(RawTimestamp {
                milliseconds: Some(1_700_000_000_000),
                ..Default::default()
            }),
            channel_mhz: Some(915.25),
            xpc_w2: None,
        }
    }

    #[test]
    fn normalizes_epc_and_timestamp() {
        let obs = TagObservation::from_report(&report("e280 b120 0001")).unwrap();
        assert_eq!(obs.epc.as_str(), "E280B1200001");
        assert_eq!(obs.timestamp_ms, 1_700_000_000_000);
        assert_eq!(obs.channel_mhz, Some(915.25));
    }

    #[test]
    fn drops_unparseable_epc() {
        assert!(TagObservation::from_report(&report("")).is_none());
        assert!(TagObservation::from_report(&report("not-an-epc")).is_none());
    }
}
