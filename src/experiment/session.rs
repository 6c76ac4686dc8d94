//! Per-session event pump.
//!
//! A [`TagSession`] owns the state that the notification path shares with the
//! control loop: the target filter, the detection latch, the latest operation
//! results, the trigger dispatcher and the result logs. [`TagSession::spawn`]
//! moves it onto a task that consumes the reader's event channel; the control
//! loop keeps an `Arc` to read the latch and the result board between windows.
//!
//! Locks are only held for the duration of a single update and never across an
//! `.await`.

use super::trigger::TriggerOnceDispatcher;
use crate::data::ResultLog;
use crate::hardware::{DeviceEvent, OpId, OpResult};
use crate::tag::{TagFilter, TagObservation, TargetSpec};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

/// Set when an accepted observation arrives; cleared by the control loop.
#[derive(Debug, Default)]
pub struct DetectionLatch {
    seen: AtomicBool,
    count: AtomicU64,
}

impl DetectionLatch {
    /// Record an accepted observation.
    pub fn set(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.seen.store(true, Ordering::SeqCst);
    }

    /// Clear before the next window; the running total is kept.
    pub fn reset(&self) {
        self.seen.store(false, Ordering::SeqCst);
    }

    /// Whether an observation arrived since the last reset.
    pub fn is_set(&self) -> bool {
        self.seen.load(Ordering::SeqCst)
    }

    /// Accepted observations over the whole session.
    pub fn total(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }
}

/// Latest operation results, keyed by operation.
#[derive(Debug, Default)]
pub struct OpResultBoard {
    inner: Mutex<BoardState>,
}

#[derive(Debug, Default)]
struct BoardState {
    by_op: HashMap<OpId, OpResult>,
    succeeded: HashMap<OpId, OpResult>,
    latest_read: Option<OpResult>,
    received: u64,
}

impl OpResultBoard {
    /// Store `result` as the latest for its operation.
    pub fn record(&self, result: OpResult) {
        let mut state = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        state.received += 1;
        if result.read_data().is_some() {
            state.latest_read = Some(result.clone());
        }
        if result.success {
            state.succeeded.insert(result.op_id, result.clone());
        }
        state.by_op.insert(result.op_id, result);
    }

    /// Most recent successful read result.
    pub fn latest_read(&self) -> Option<OpResult> {
        self.inner
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .latest_read
            .clone()
    }

    /// Most recent result for `op_id`.
    pub fn latest_for(&self, op_id: OpId) -> Option<OpResult> {
        self.inner
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .by_op
            .get(&op_id)
            .cloned()
    }

    /// Most recent successful result for `op_id`; later failures do not
    /// replace it.
    pub fn latest_success_for(&self, op_id: OpId) -> Option<OpResult> {
        self.inner
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .succeeded
            .get(&op_id)
            .cloned()
    }

    /// Number of results received.
    pub fn received(&self) -> u64 {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).received
    }
}

/// Callback run on the pump task for every accepted observation.
pub type ObservationHook = Box<dyn Fn(&TagObservation) + Send + Sync>;

/// Callback run on the pump task for every operation result.
pub type OpResultHook = Box<dyn Fn(&OpResult) + Send + Sync>;

/// Session state shared between the event pump and the control loop.
pub struct TagSession {
    run_id: Uuid,
    filter: TagFilter,
    latch: DetectionLatch,
    board: OpResultBoard,
    dispatcher: Option<TriggerOnceDispatcher>,
    observations: Option<Arc<ResultLog<TagObservation>>>,
    op_results: Option<Arc<ResultLog<OpResult>>>,
    observation_hook: Option<ObservationHook>,
    op_result_hook: Option<OpResultHook>,
}

impl TagSession {
    /// Session accepting observations that match `target`.
    pub fn new(target: TargetSpec) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            filter: TagFilter::new(target),
            latch: DetectionLatch::default(),
            board: OpResultBoard::default(),
            dispatcher: None,
            observations: None,
            op_results: None,
            observation_hook: None,
            op_result_hook: None,
        }
    }

    /// Use `run_id` in the pump span instead of a fresh id.
    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = run_id;
        self
    }

    /// Fire `dispatcher` on accepted observations.
    pub fn with_dispatcher(mut self, dispatcher: TriggerOnceDispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Log accepted observations.
    pub fn with_observation_log(mut self, log: Arc<ResultLog<TagObservation>>) -> Self {
        self.observations = Some(log);
        self
    }

    /// Log every operation result.
    pub fn with_op_result_log(mut self, log: Arc<ResultLog<OpResult>>) -> Self {
        self.op_results = Some(log);
        self
    }

    /// Run `hook` for every accepted observation.
    pub fn with_observation_hook(mut self, hook: ObservationHook) -> Self {
        self.observation_hook = Some(hook);
        self
    }

    /// Run `hook` for every operation result.
    pub fn with_op_result_hook(mut self, hook: OpResultHook) -> Self {
        self.op_result_hook = Some(hook);
        self
    }

    /// Id the pump logs under.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Target filter.
    pub fn target(&self) -> &TargetSpec {
        self.filter.target()
    }

    /// Detection latch.
    pub fn latch(&self) -> &DetectionLatch {
        &self.latch
    }

    /// Latest operation results.
    pub fn board(&self) -> &OpResultBoard {
        &self.board
    }

    /// Trigger dispatcher, if one was attached.
    pub fn dispatcher(&self) -> Option<&TriggerOnceDispatcher> {
        self.dispatcher.as_ref()
    }

    /// Process one device event.
    pub async fn handle(&self, event: DeviceEvent) {
        match event {
            DeviceEvent::TagObserved(report) => {
                let Some(observation) = TagObservation::from_report(&report) else {
                    return;
                };
                if !self.filter.accept(&observation) {
                    return;
                }
                tracing::debug!(
                    epc = %observation.epc,
                    antenna = observation.antenna_id,
                    rssi_dbm = observation.rssi_dbm,
                    "Tag observed"
                );
                self.latch.set();
                if let Some(hook) = &self.observation_hook {
                    hook(&observation);
                }
                if let Some(dispatcher) = &self.dispatcher {
                    if let Err(e) = dispatcher.on_accepted(&observation).await {
                        tracing::warn!("Operation sequence submission failed: {}", e);
                    }
                }
                if let Some(log) = &self.observations {
                    log.append(observation);
                }
            }
            DeviceEvent::OperationCompleted(result) => {
                tracing::debug!(
                    op_id = %result.op_id,
                    epc = %result.epc,
                    kind = %result.kind,
                    success = result.success,
                    payload = %result.payload_text(),
                    "Operation result"
                );
                if let Some(hook) = &self.op_result_hook {
                    hook(&result);
                }
                if let Some(log) = &self.op_results {
                    log.append(result.clone());
                }
                self.board.record(result);
            }
        }
    }

    /// Start the event pump on `events`.
    pub fn spawn(self: Arc<Self>, mut events: broadcast::Receiver<DeviceEvent>) -> SessionHandle {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let session = Arc::clone(&self);

        let span = tracing::info_span!("session", run_id = %self.run_id);

        let task = tokio::spawn(
            async move {
                loop {
                    tokio::select! {
                        biased;
                        received = events.recv() => match received {
                            Ok(event) => session.handle(event).await,
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                tracing::warn!(skipped, "Event pump lagged, events dropped");
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        },
                        _ = &mut stop_rx => {
                            // Drain whatever the reader already published
                            while let Ok(event) = events.try_recv() {
                                session.handle(event).await;
                            }
                            break;
                        }
                    }
                }
                tracing::debug!("Event pump stopped");
            }
            .instrument(span),
        );

        SessionHandle {
            session: self,
            stop: Some(stop_tx),
            task,
        }
    }
}

/// Running event pump.
pub struct SessionHandle {
    session: Arc<TagSession>,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Session the pump feeds.
    pub fn session(&self) -> &Arc<TagSession> {
        &self.session
    }

    /// Drain pending events and stop the pump.
    pub async fn finish(mut self) -> Arc<TagSession> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Err(e) = (&mut self.task).await {
            tracing::error!("Event pump task failed: {}", e);
        }
        Arc::clone(&self.session)
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if self.stop.is_some() {
            self.task.abort();
        }
    }
}
