//! Exactly-once operation dispatch.
//!
//! [`TriggerOnceDispatcher`] holds one operation sequence and submits it the
//! first time an accepted observation reaches it. The `Armed -> Fired`
//! transition is a single compare-and-swap, so concurrent deliveries race for
//! it and exactly one wins. There is no way back to `Armed`; a new session
//! builds a new dispatcher.

use crate::error::{ProbeError, ProbeResult};
use crate::hardware::{OperationSequence, ReaderDevice};
use crate::tag::TagObservation;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Dispatcher state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    /// Waiting for the first accepted observation.
    Armed,
    /// Sequence submitted (or submission attempted).
    Fired,
}

/// Submits a sequence to the reader at most once per session.
pub struct TriggerOnceDispatcher {
    reader: Arc<dyn ReaderDevice>,
    sequence: Mutex<Option<OperationSequence>>,
    fired: AtomicBool,
}

impl TriggerOnceDispatcher {
    /// Armed dispatcher for `sequence`.
    pub fn new(reader: Arc<dyn ReaderDevice>, sequence: OperationSequence) -> Self {
        Self {
            reader,
            sequence: Mutex::new(Some(sequence)),
            fired: AtomicBool::new(false),
        }
    }

    /// `Fired` once a winner has claimed the sequence.
    pub fn state(&self) -> DispatchState {
        if self.fired.load(Ordering::SeqCst) {
            DispatchState::Fired
        } else {
            DispatchState::Armed
        }
    }

    /// Handle one accepted observation.
    ///
    /// Returns `Ok(true)` if this call submitted the sequence and `Ok(false)` if
    /// the dispatcher had already fired. An untargeted sequence is bound to the
    /// EPC of the observation that fired it. A failed submission still leaves
    /// the dispatcher `Fired`; the error is returned for logging.
    pub async fn on_accepted(&self, observation: &TagObservation) -> ProbeResult<bool> {
        if self
            .fired
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::trace!(epc = %observation.epc, "Dispatcher already fired");
            return Ok(false);
        }

        let sequence = self
            .sequence
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        let Some(mut sequence) = sequence else {
            return Ok(false);
        };
        if sequence.target.is_none() {
            sequence.target = Some(observation.epc.clone());
        }

        let ops = sequence.ops.len();
        tracing::info!(
            epc = %observation.epc,
            sequence_id = sequence.id,
            ops,
            "Target seen, submitting operation sequence"
        );
        self.reader
            .submit_operation_sequence(sequence)
            .await
            .map_err(ProbeError::device)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{MemoryBank, SimulatedReader, SimulationConfig, TagOperation};
    use crate::tag::Epc;

    fn observation(epc: &str) -> TagObservation {
        TagObservation {
            epc: Epc::parse(epc).unwrap(),
            antenna_id: 1,
            rssi_dbm: -50.0,
            timestamp_ms: 0,
            channel_mhz: None,
            xpc_w2: None,
        }
    }

    fn sequence() -> OperationSequence {
        OperationSequence::new(None).with_op(TagOperation::read(MemoryBank::User, 0x10, 2))
    }

    #[tokio::test]
    async fn fires_on_first_observation_only() {
        let reader = Arc::new(SimulatedReader::new(SimulationConfig::default()));
        reader.connect().await.unwrap();
        let dispatcher = TriggerOnceDispatcher::new(reader.clone(), sequence());
        assert_eq!(dispatcher.state(), DispatchState::Armed);

        assert!(dispatcher.on_accepted(&observation("AB12")).await.unwrap());
        for _ in 0..10 {
            assert!(!dispatcher.on_accepted(&observation("AB12")).await.unwrap());
        }
        assert_eq!(dispatcher.state(), DispatchState::Fired);
        assert_eq!(reader.submitted_sequences(), 1);
    }

    #[tokio::test]
    async fn failed_submission_does_not_rearm() {
        // Never connected, so submission fails
        let reader = Arc::new(SimulatedReader::new(SimulationConfig::default()));
        let dispatcher = TriggerOnceDispatcher::new(reader.clone(), sequence());

        let err = dispatcher.on_accepted(&observation("AB12")).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(dispatcher.state(), DispatchState::Fired);
        assert!(!dispatcher.on_accepted(&observation("AB12")).await.unwrap());
        assert_eq!(reader.submitted_sequences(), 0);
    }
}
