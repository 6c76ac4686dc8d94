//! Simulated Reader
//!
//! Provides a software UHF reader for testing and demonstration without a
//! physical device. All timing uses tokio time (tokio::time::interval, not
//! std::thread::sleep), so tests can run exposure windows on paused time.
//!
//! # Behavior
//!
//! - While RF is on, every tag whose turn-on power at the current frequency is
//!   at or below the transmit power is reported every `report_interval_ms`
//! - Registered operation sequences execute against the simulated tag memory
//!   on each report round
//! - Humidity sensors become "ready" (header `0xAA`) after a configurable
//!   amount of cumulative powered exposure
//! - Window start failures and connection refusal can be injected

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, MissedTickBehavior};

use super::capabilities::{DeviceEvent, ReaderDevice, RfSettings};
use super::operations::{
    Execution, MemoryBank, OpPayload, OpResult, OperationSequence, TagOperation,
};
use crate::tag::{Epc, RawTimestamp, TagReport};

/// Event channel depth. Tag reports are small; a deep buffer keeps a slow
/// consumer from lagging during long windows.
const EVENT_CAPACITY: usize = 4096;

// =============================================================================
// Configuration
// =============================================================================

/// Turn-on power override for one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelThreshold {
    /// Channel in MHz.
    pub frequency_mhz: f64,
    /// Turn-on power in dBm; absent means the tag never answers on this channel.
    #[serde(default)]
    pub turn_on_dbm: Option<f64>,
}

/// Humidity sensor model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HumiditySensor {
    /// USER word holding `header << 8 | humidity`.
    pub word_pointer: u16,
    /// Cumulative powered exposure needed before the header reads `0xAA`.
    pub warmup_ms: u64,
    /// Reported relative humidity.
    pub humidity_percent: u8,
}

/// One simulated tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedTag {
    /// EPC (any case, spaces allowed).
    pub epc: String,
    /// Antenna port it is seen on.
    pub antenna_id: u16,
    /// Nominal RSSI; reports jitter around it.
    pub rssi_dbm: f64,
    /// Turn-on power on channels without an override; absent means never.
    pub turn_on_dbm: Option<f64>,
    /// Per-channel overrides.
    pub thresholds: Vec<ChannelThreshold>,
    /// Second XPC word forwarded with every report.
    pub xpc_w2: Option<u16>,
    /// Initial USER memory.
    pub user_memory: Vec<u16>,
    /// Initial reserved memory.
    pub reserved_memory: Vec<u16>,
    /// Optional humidity sensor.
    pub humidity: Option<HumiditySensor>,
}

impl Default for SimulatedTag {
    fn default() -> Self {
        let mut reserved_memory = vec![0u16; 16];
        reserved_memory[0xC] = 300;
        Self {
            epc: "E282403D000203DB0478B057".to_string(),
            antenna_id: 1,
            rssi_dbm: -55.0,
            turn_on_dbm: Some(15.0),
            thresholds: Vec::new(),
            xpc_w2: None,
            user_memory: vec![0u16; 0x100],
            reserved_memory,
            humidity: None,
        }
    }
}

impl SimulatedTag {
    /// Tag with the given EPC and defaults for everything else.
    pub fn with_epc(epc: &str) -> Self {
        Self {
            epc: epc.to_string(),
            ..Default::default()
        }
    }

    /// Turn-on power in dBm on `frequency_mhz`, or `None` if the tag never answers there.
    pub fn turn_on_at(&self, frequency_mhz: f64) -> Option<f64> {
        self.thresholds
            .iter()
            .find(|t| (t.frequency_mhz - frequency_mhz).abs() < 1e-6)
            .map_or(self.turn_on_dbm, |t| t.turn_on_dbm)
    }
}

/// Simulation scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Tags in the field.
    pub tags: Vec<SimulatedTag>,
    /// Report round interval while RF is on.
    pub report_interval_ms: u64,
    /// Frequencies the reader advertises.
    pub tx_frequencies: Vec<f64>,
    /// 1-based window numbers whose start fails.
    pub failing_windows: Vec<usize>,
    /// Refuse every connection attempt.
    pub refuse_connection: bool,
    /// 1-based `submit_operation_sequence` calls that are rejected.
    pub failing_submissions: Vec<usize>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tags: vec![SimulatedTag::default()],
            report_interval_ms: 25,
            tx_frequencies: vec![902.75, 915.25, 927.25],
            failing_windows: Vec::new(),
            refuse_connection: false,
            failing_submissions: Vec::new(),
        }
    }
}

// =============================================================================
// SimulatedReader
// =============================================================================

struct SimTagState {
    epc: Epc,
    model: SimulatedTag,
    user: Vec<u16>,
    reserved: Vec<u16>,
    powered_for: Duration,
}

impl SimTagState {
    fn read_word(&self, bank: MemoryBank, address: u16) -> Option<u16> {
        if bank == MemoryBank::User {
            if let Some(sensor) = &self.model.humidity {
                if sensor.word_pointer == address {
                    let ready = self.powered_for >= Duration::from_millis(sensor.warmup_ms);
                    let header: u16 = if ready { 0xAA } else { 0x00 };
                    return Some((header << 8) | u16::from(sensor.humidity_percent));
                }
            }
        }
        let memory = match bank {
            MemoryBank::User => &self.user,
            MemoryBank::Reserved => &self.reserved,
            MemoryBank::Epc | MemoryBank::Tid => return None,
        };
        memory.get(usize::from(address)).copied()
    }

    fn execute(&mut self, op: &TagOperation, channel_mhz: f64) -> OpResult {
        let (success, payload) = match op {
            TagOperation::Read {
                bank,
                word_pointer,
                word_count,
                ..
            } => {
                let words: Option<Vec<u16>> = (0..*word_count)
                    .map(|i| self.read_word(*bank, word_pointer.checked_add(i)?))
                    .collect();
                match words {
                    Some(words) => (
                        true,
                        OpPayload::Read(words.iter().flat_map(|w| w.to_be_bytes()).collect()),
                    ),
                    None => (false, OpPayload::Read(Vec::new())),
                }
            }
            TagOperation::Write {
                bank,
                word_pointer,
                data,
                ..
            } => {
                let memory = match bank {
                    MemoryBank::User => Some(&mut self.user),
                    MemoryBank::Reserved => Some(&mut self.reserved),
                    MemoryBank::Epc | MemoryBank::Tid => None,
                };
                let start = usize::from(*word_pointer);
                match memory {
                    Some(memory) if start + data.len() <= memory.len() => {
                        memory[start..start + data.len()].copy_from_slice(data);
                        (true, OpPayload::Written(data.len() as u16))
                    }
                    _ => (false, OpPayload::Written(0)),
                }
            }
        };

        OpResult {
            op_id: op.id(),
            epc: self.epc.clone(),
            channel_mhz: Some(channel_mhz),
            kind: op.kind(),
            success,
            payload,
        }
    }
}

struct SimState {
    connected: bool,
    rf: RfSettings,
    tags: Vec<SimTagState>,
    sequences: Vec<OperationSequence>,
    windows_opened: usize,
    emitter: Option<JoinHandle<()>>,
    configure_history: Vec<RfSettings>,
}

impl SimState {
    /// One inventory round: report powered tags, then run matching sequences.
    fn inventory_round(&mut self, elapsed: Duration) -> Vec<DeviceEvent> {
        let rf = self.rf;
        let mut events = Vec::new();
        let mut rng = rand::thread_rng();

        for tag in &mut self.tags {
            let powered = tag
                .model
                .turn_on_at(rf.frequency_mhz)
                .is_some_and(|threshold| rf.power_dbm >= threshold);
            if !powered {
                continue;
            }
            tag.powered_for += elapsed;

            events.push(DeviceEvent::TagObserved(TagReport {
                epc: tag.epc.to_string(),
                antenna_id: tag.model.antenna_id,
                peak_rssi_dbm: tag.model.rssi_dbm + rng.gen_range(-1.5..1.5),
                timestamp: Some(RawTimestamp::now()),
                channel_mhz: Some(rf.frequency_mhz),
                xpc_w2: tag.model.xpc_w2,
            }));

            let tag_epc = tag.epc.clone();
            let mut executed_once = Vec::new();
            for sequence in self.sequences.iter().filter(|s| s.applies_to(&tag_epc)) {
                for op in &sequence.ops {
                    events.push(DeviceEvent::OperationCompleted(
                        tag.execute(op, rf.frequency_mhz),
                    ));
                }
                if sequence.execution == Execution::Once {
                    executed_once.push(sequence.id);
                }
            }
            self.sequences.retain(|s| !executed_once.contains(&s.id));
        }

        events
    }

    fn stop_emitter(&mut self) -> bool {
        match self.emitter.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }
}

/// Software reader driven by a [`SimulationConfig`].
///
/// # Example
///
/// ```rust,ignore
/// let reader = SimulatedReader::new(SimulationConfig::default());
/// reader.connect().await?;
/// reader.start_exposure().await?; // tags start reporting
/// ```
pub struct SimulatedReader {
    state: Arc<Mutex<SimState>>,
    events: broadcast::Sender<DeviceEvent>,
    report_interval: Duration,
    tx_frequencies: Vec<f64>,
    failing_windows: BTreeSet<usize>,
    refuse_connection: bool,
    failing_submissions: BTreeSet<usize>,
    submit_calls: AtomicUsize,
    submitted: AtomicUsize,
}

impl SimulatedReader {
    /// Create a disconnected reader. Tags with an unparseable EPC are skipped.
    pub fn new(config: SimulationConfig) -> Self {
        let tags = config
            .tags
            .into_iter()
            .filter_map(|model| match Epc::parse(&model.epc) {
                Ok(epc) => Some(SimTagState {
                    epc,
                    user: model.user_memory.clone(),
                    reserved: model.reserved_memory.clone(),
                    model,
                    powered_for: Duration::ZERO,
                }),
                Err(e) => {
                    tracing::warn!("Skipping simulated tag: {}", e);
                    None
                }
            })
            .collect();

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let default_frequency = config.tx_frequencies.first().copied().unwrap_or(915.25);

        Self {
            state: Arc::new(Mutex::new(SimState {
                connected: false,
                rf: RfSettings {
                    frequency_mhz: default_frequency,
                    power_dbm: 30.0,
                },
                tags,
                sequences: Vec::new(),
                windows_opened: 0,
                emitter: None,
                configure_history: Vec::new(),
            })),
            events,
            report_interval: Duration::from_millis(config.report_interval_ms.max(1)),
            tx_frequencies: config.tx_frequencies,
            failing_windows: config.failing_windows.into_iter().collect(),
            refuse_connection: config.refuse_connection,
            failing_submissions: config.failing_submissions.into_iter().collect(),
            submit_calls: AtomicUsize::new(0),
            submitted: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ensure_connected(state: &SimState) -> Result<()> {
        if state.connected {
            Ok(())
        } else {
            Err(anyhow!("SimulatedReader: not connected"))
        }
    }

    /// Number of sequences accepted by `submit_operation_sequence`.
    pub fn submitted_sequences(&self) -> usize {
        self.submitted.load(Ordering::SeqCst)
    }

    /// Number of `start_exposure` calls, including failed ones.
    pub fn windows_opened(&self) -> usize {
        self.lock().windows_opened
    }

    /// Whether RF is currently on.
    pub fn is_exposing(&self) -> bool {
        self.lock().emitter.is_some()
    }

    /// Whether the reader is connected.
    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    /// Every RF setting applied, in order.
    pub fn configure_history(&self) -> Vec<RfSettings> {
        self.lock().configure_history.clone()
    }

    /// Current USER memory of a tag.
    pub fn user_memory(&self, epc: &Epc) -> Option<Vec<u16>> {
        self.lock()
            .tags
            .iter()
            .find(|t| &t.epc == epc)
            .map(|t| t.user.clone())
    }

    /// Publish an event as if the reader had produced it.
    pub fn inject(&self, event: DeviceEvent) {
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl ReaderDevice for SimulatedReader {
    async fn connect(&self) -> Result<()> {
        if self.refuse_connection {
            bail!("SimulatedReader: connection refused");
        }
        self.lock().connected = true;
        tracing::debug!("SimulatedReader: connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let mut state = self.lock();
        state.stop_emitter();
        state.connected = false;
        tracing::debug!("SimulatedReader: disconnected");
        Ok(())
    }

    async fn start_exposure(&self) -> Result<()> {
        let mut state = self.lock();
        Self::ensure_connected(&state)?;
        state.windows_opened += 1;
        let window = state.windows_opened;
        if self.failing_windows.contains(&window) {
            bail!("SimulatedReader: RF fault opening window {}", window);
        }
        if state.emitter.is_some() {
            return Ok(());
        }

        let shared = Arc::clone(&self.state);
        let events = self.events.clone();
        let interval = self.report_interval;

        state.emitter = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last = Instant::now();
            loop {
                ticker.tick().await;
                let now = Instant::now();
                let batch = {
                    let mut state = shared.lock().unwrap_or_else(|p| p.into_inner());
                    state.inventory_round(now - last)
                };
                last = now;
                for event in batch {
                    // No receivers is fine
                    let _ = events.send(event);
                }
            }
        }));
        Ok(())
    }

    async fn stop_exposure(&self) -> Result<()> {
        let mut state = self.lock();
        Self::ensure_connected(&state)?;
        state.stop_emitter();
        Ok(())
    }

    async fn configure(&self, settings: RfSettings) -> Result<()> {
        let mut state = self.lock();
        Self::ensure_connected(&state)?;
        if !(0.0..=33.0).contains(&settings.power_dbm) {
            bail!(
                "SimulatedReader: power {:.1} dBm outside 0-33 dBm",
                settings.power_dbm
            );
        }
        state.rf = settings;
        state.configure_history.push(settings);
        Ok(())
    }

    async fn submit_operation_sequence(&self, sequence: OperationSequence) -> Result<()> {
        let mut state = self.lock();
        Self::ensure_connected(&state)?;
        let call = self.submit_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.failing_submissions.contains(&call) {
            bail!("SimulatedReader: operation sequence {} rejected", call);
        }
        state.sequences.push(sequence);
        self.submitted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn tx_frequencies(&self) -> Result<Vec<f64>> {
        Ok(self.tx_frequencies.clone())
    }

    fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.events.subscribe()
    }
}

impl Drop for SimulatedReader {
    fn drop(&mut self) {
        self.lock().stop_emitter();
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
