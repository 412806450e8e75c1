use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use bsn_core::{MovementState, NodeId, PeripheralOutcome, RoundOutcome};
use serde::Serialize;

use crate::alarm::CrisisAlert;

/// A resolved coordinator round and when it resolved.
#[derive(Debug, Clone, Serialize)]
pub struct RoundSummary {
    #[serde(flatten)]
    pub outcome: RoundOutcome,
    pub resolved_at: jiff::Timestamp,
}

/// Radio counters for the whole network.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FrameStats {
    /// Frames handed to the radio by any node
    pub sent: u64,
    /// Deliveries dropped by simulated link loss
    pub lost: u64,
    /// Deliveries dropped because the receiver's queue was full
    pub overflow: u64,
    /// Frames a receiver could not decode
    pub malformed: u64,
}

/// Round counters for one peripheral.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PeripheralStats {
    pub reported: u64,
    pub dropped: u64,
    pub last_state: Option<MovementState>,
}

/// Snapshot of everything the network has done so far.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NetworkReport {
    pub rounds: Vec<RoundSummary>,
    pub alerts: Vec<CrisisAlert>,
    pub frames: FrameStats,
    pub peripherals: BTreeMap<NodeId, PeripheralStats>,
}

impl NetworkReport {
    pub fn crisis_rounds(&self) -> usize {
        self.count(|o| matches!(o, RoundOutcome::Crisis { .. }))
    }

    pub fn complete_rounds(&self) -> usize {
        self.count(|o| matches!(o, RoundOutcome::Complete { .. }))
    }

    pub fn timed_out_rounds(&self) -> usize {
        self.count(|o| matches!(o, RoundOutcome::Timeout { .. }))
    }

    fn count(&self, pred: impl Fn(&RoundOutcome) -> bool) -> usize {
        self.rounds.iter().filter(|r| pred(&r.outcome)).count()
    }
}

/// Shared record of rounds, alerts and traffic, written by every node task.
///
/// Node collaborators are synchronous, so this uses a blocking mutex that is
/// never held across an await.
#[derive(Clone, Default)]
pub struct NetworkState {
    inner: Arc<Mutex<NetworkReport>>,
}

impl NetworkState {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, NetworkReport> {
        // a panicked writer leaves counters that are still usable
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn record_round(&self, outcome: RoundOutcome) {
        self.lock().rounds.push(RoundSummary {
            outcome,
            resolved_at: jiff::Timestamp::now(),
        });
    }

    pub fn record_alert(&self, alert: CrisisAlert) {
        self.lock().alerts.push(alert);
    }

    pub fn record_peripheral(&self, node: NodeId, outcome: PeripheralOutcome) {
        let mut inner = self.lock();
        let stats = inner.peripherals.entry(node).or_default();

        match outcome {
            PeripheralOutcome::Reported { state, .. } => {
                stats.reported += 1;
                stats.last_state = Some(state);
            }
            PeripheralOutcome::Classified { state } => stats.last_state = Some(state),
            PeripheralOutcome::Dropped { .. } => stats.dropped += 1,
        }
    }

    pub fn frame_sent(&self) {
        self.lock().frames.sent += 1;
    }

    pub fn frame_lost(&self) {
        self.lock().frames.lost += 1;
    }

    pub fn frame_overflow(&self) {
        self.lock().frames.overflow += 1;
    }

    pub fn frame_malformed(&self) {
        self.lock().frames.malformed += 1;
    }

    pub fn rounds_resolved(&self) -> usize {
        self.lock().rounds.len()
    }

    pub fn report(&self) -> NetworkReport {
        self.lock().clone()
    }
}
