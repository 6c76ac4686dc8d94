//! # RFID Probe Library
//!
//! Tag-event processing for UHF RFID readers: normalize and filter the
//! asynchronous stream of tag reports, submit an operation sequence exactly
//! once when a target tag shows up, retry sensor reads with escalating RF
//! exposure, and search for a tag's turn-on power across frequencies.
//!
//! ## Crate Structure
//!
//! - **`tag`**: EPC canonicalization, target matching, timestamp normalization,
//!   tag observations and sensor payload decoders.
//! - **`hardware`**: The `ReaderDevice` capability trait, tag memory operations
//!   and a simulated reader.
//! - **`experiment`**: Exposure windows, the event pump, the trigger-once
//!   dispatcher, the retry controller and the threshold sweep, all driven by a
//!   shared `ShutdownSignal`.
//! - **`data`**: Append-only result logs and their CSV persistence.
//! - **`procedures`**: Complete runs (inventory, trigger, humidity retry,
//!   turn-on sweep, sensor monitor) built from the pieces above.
//! - **`config`**: Layered `figment` configuration.
//! - **`logging`**: `tracing` subscriber setup.
//! - **`error`**: The crate-wide `ProbeError`.

pub mod config;
pub mod data;
pub mod error;
pub mod experiment;
pub mod hardware;
pub mod logging;
pub mod procedures;
pub mod tag;

pub use error::{ProbeError, ProbeResult};
