use std::collections::VecDeque;
use std::time::Duration;

use crate::{Alarm, Destination, Message, NodeId, RoundId, Sensor, TimerHandle, Timers, Transport};

#[derive(Debug, Clone)]
pub(crate) struct ArmedTimer {
    pub handle: TimerHandle,
    pub duration: Duration,
    pub periodic: bool,
    pub cancelled: bool,
}

/// Collaborator double recording every side effect a node asks for.
#[derive(Debug, Default)]
pub(crate) struct Recorder {
    pub sent: Vec<(Destination, Message)>,
    pub timers: Vec<ArmedTimer>,
    pub alerts: Vec<(NodeId, RoundId)>,
    /// Samples handed out in order; once drained, `fallback` is used.
    pub samples: VecDeque<Option<f64>>,
    pub fallback: Option<f64>,
    next_handle: u32,
}

impl Recorder {
    pub fn with_fallback(sample: Option<f64>) -> Self {
        Self {
            fallback: sample,
            ..Default::default()
        }
    }

    /// Most recently armed, still active timer with the given duration.
    pub fn active(&self, duration: Duration) -> Option<TimerHandle> {
        self.timers
            .iter()
            .rev()
            .find(|t| t.duration == duration && !t.cancelled)
            .map(|t| t.handle)
    }

    pub fn is_active(&self, handle: TimerHandle) -> bool {
        self.timers
            .iter()
            .any(|t| t.handle == handle && !t.cancelled)
    }

    pub fn active_count(&self) -> usize {
        self.timers.iter().filter(|t| !t.cancelled).count()
    }
}

impl Transport for Recorder {
    fn send(&mut self, destination: Destination, message: Message) {
        self.sent.push((destination, message));
    }
}

impl Timers for Recorder {
    fn start_timer(&mut self, duration: Duration, periodic: bool) -> TimerHandle {
        self.next_handle += 1;
        let handle = TimerHandle(self.next_handle);
        self.timers.push(ArmedTimer {
            handle,
            duration,
            periodic,
            cancelled: false,
        });
        handle
    }

    fn cancel_timer(&mut self, handle: TimerHandle) {
        if let Some(timer) = self.timers.iter_mut().find(|t| t.handle == handle) {
            timer.cancelled = true;
        }
    }
}

impl Sensor for Recorder {
    fn read_sample(&mut self) -> Option<f64> {
        self.samples.pop_front().unwrap_or(self.fallback)
    }
}

impl Alarm for Recorder {
    fn raise_crisis_alert(&mut self, source: NodeId, msg_id: RoundId) {
        self.alerts.push((source, msg_id));
    }
}
