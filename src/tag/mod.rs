//! Tag-level data: identifiers, timestamps, observations, filtering and sensor
//! payload decoding.

pub mod epc;
pub mod filter;
pub mod observation;
pub mod sensor;
pub mod timestamp;

pub use epc::{Epc, TargetSpec};
pub use filter::{accept, TagFilter};
pub use observation::{TagObservation, TagReport};
pub use timestamp::{normalize, RawTimestamp, UtcValue};
