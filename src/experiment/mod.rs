//! Control loops and the session state they share with the event pump.
//!
//! - `shutdown`: run-wide cancellation
//! - `exposure`: start/sleep/stop/settle exposure windows
//! - `session`: event pump, detection latch and operation-result board
//! - `trigger`: exactly-once operation dispatch
//! - `retry`: escalating-window retry loop
//! - `sweep`: frequency x power turn-on threshold search

pub mod exposure;
pub mod retry;
pub mod session;
pub mod shutdown;
pub mod sweep;
pub mod trigger;

pub use exposure::{ExposureCycle, WindowOutcome};
pub use retry::{RetryEscalationController, RetryOutcome, RetryPolicy, RetrySession};
pub use session::{DetectionLatch, OpResultBoard, SessionHandle, TagSession};
pub use shutdown::ShutdownSignal;
pub use sweep::{
    DetectionCheck, PowerRange, SweepOutcome, SweepPoint, SweepPolicy, ThresholdSweep,
};
pub use trigger::{DispatchState, TriggerOnceDispatcher};
