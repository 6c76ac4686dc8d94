//! Reader capability trait.
//!
//! The engine only needs a narrow slice of a reader SDK: switch RF on and off,
//! hand over an operation sequence, tune frequency/power for a trial, and listen
//! to two asynchronous notification channels (tag reports and operation
//! results). Connection lifecycle is included so sessions can fail fast; antenna
//! layout, report modes and every other vendor setting stay behind the
//! implementation.
//!
//! # Design Philosophy
//!
//! Following the capability-trait layout used for instruments:
//! - Async (uses #[async_trait])
//! - Thread-safe (requires Send + Sync)
//! - Uses anyhow::Result for errors; callers classify them
//! - `&self` everywhere, implementations use interior mutability
//!
//! # Example
//!
//! ```rust,ignore
//! async fn single_window(reader: &dyn ReaderDevice) -> Result<()> {
//!     let mut events = reader.subscribe();
//!     reader.start_exposure().await?;
//!     tokio::time::sleep(Duration::from_millis(400)).await;
//!     reader.stop_exposure().await?;
//!     while let Ok(event) = events.try_recv() {
//!         println!("{event:?}");
//!     }
//!     Ok(())
//! }
//! ```

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::operations::{OpResult, OperationSequence};
use crate::tag::TagReport;

/// RF settings for a single trial.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RfSettings {
    /// Transmit frequency in MHz.
    pub frequency_mhz: f64,
    /// Transmit power in dBm.
    pub power_dbm: f64,
}

/// Notification delivered by a reader, possibly from another thread.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    /// A tag answered an inventory round.
    TagObserved(TagReport),
    /// An operation from a submitted sequence completed.
    OperationCompleted(OpResult),
}

/// Capability: UHF RFID Reader
///
/// # Contract
/// - `connect` must succeed before any other call; its failure is fatal for the session
/// - `start_exposure` / `stop_exposure` bracket an RF-on window
/// - `submit_operation_sequence` returns once the reader accepted the sequence;
///   results arrive later through [`DeviceEvent::OperationCompleted`]
/// - `subscribe` may be called any number of times; each receiver sees every
///   event published after it subscribed
#[async_trait]
pub trait ReaderDevice: Send + Sync {
    /// Open the connection.
    async fn connect(&self) -> Result<()>;

    /// Close the connection. Stops RF first if it is still on.
    async fn disconnect(&self) -> Result<()>;

    /// Start emitting and inventorying.
    async fn start_exposure(&self) -> Result<()>;

    /// Stop emitting.
    async fn stop_exposure(&self) -> Result<()>;

    /// Apply transmit frequency and power for subsequent windows.
    async fn configure(&self, settings: RfSettings) -> Result<()>;

    /// Register an operation sequence with the reader.
    async fn submit_operation_sequence(&self, sequence: OperationSequence) -> Result<()>;

    /// Transmit frequencies the reader supports, in its preferred order.
    ///
    /// # Default Implementation
    /// Returns an error indicating the query is not supported.
    async fn tx_frequencies(&self) -> Result<Vec<f64>> {
        anyhow::bail!("Frequency query not supported by this reader")
    }

    /// Receiver for tag and operation-result notifications.
    fn subscribe(&self) -> broadcast::Receiver<DeviceEvent>;
}
