use std::time::Duration;

use bsn_core::{
    Alarm, CoordinatorNode, Destination, Frame, Message, NodeId, PeripheralNode, RoundId,
    RoundOutcome, Sensor, TimerHandle, Timers, Transport,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use crate::alarm::AlertLog;
use crate::radio::RadioTransport;
use crate::sensor::MockSensor;
use crate::state::NetworkState;
use crate::timer::TokioTimers;

/// Something a node task has to react to.
#[derive(Debug)]
pub enum NodeEvent {
    /// Raw bytes received from the radio.
    Frame(Vec<u8>),
    /// One of the node's timers fired.
    TimerFired(TimerHandle),
}

/// Collaborators of a peripheral node.
pub struct PeripheralContext {
    pub transport: RadioTransport,
    pub timers: TokioTimers,
    pub sensor: MockSensor,
}

impl Transport for PeripheralContext {
    fn send(&mut self, destination: Destination, message: Message) {
        self.transport.send(destination, message);
    }
}

impl Timers for PeripheralContext {
    fn start_timer(&mut self, duration: Duration, periodic: bool) -> TimerHandle {
        self.timers.start_timer(duration, periodic)
    }

    fn cancel_timer(&mut self, handle: TimerHandle) {
        self.timers.cancel_timer(handle);
    }
}

impl Sensor for PeripheralContext {
    fn read_sample(&mut self) -> Option<f64> {
        self.sensor.read_sample()
    }
}

/// Collaborators of the coordinator node.
pub struct CoordinatorContext {
    pub transport: RadioTransport,
    pub timers: TokioTimers,
    pub alarm: AlertLog,
}

impl Transport for CoordinatorContext {
    fn send(&mut self, destination: Destination, message: Message) {
        self.transport.send(destination, message);
    }
}

impl Timers for CoordinatorContext {
    fn start_timer(&mut self, duration: Duration, periodic: bool) -> TimerHandle {
        self.timers.start_timer(duration, periodic)
    }

    fn cancel_timer(&mut self, handle: TimerHandle) {
        self.timers.cancel_timer(handle);
    }
}

impl Alarm for CoordinatorContext {
    fn raise_crisis_alert(&mut self, source: NodeId, msg_id: RoundId) {
        self.alarm.raise_crisis_alert(source, msg_id);
    }
}

/// When the coordinator opens rounds.
///
/// A new round is requested `round_interval` after the previous one
/// resolves. A round that nobody answers within `silent_round` is
/// abandoned, since the coordinator watchdog only starts on the first
/// response.
pub struct RoundSchedule {
    round_interval: Duration,
    silent_round: Duration,
    next_round: Option<TimerHandle>,
    silence: Option<TimerHandle>,
}

impl RoundSchedule {
    pub fn new(round_interval: Duration, silent_round: Duration) -> Self {
        Self {
            round_interval,
            silent_round,
            next_round: None,
            silence: None,
        }
    }

    fn round_started<C: Timers>(&mut self, ctx: &mut C) {
        self.silence = Some(ctx.start_timer(self.silent_round, false));
    }

    fn round_answered<C: Timers>(&mut self, ctx: &mut C) {
        if let Some(handle) = self.silence.take() {
            ctx.cancel_timer(handle);
        }
    }

    fn round_resolved<C: Timers>(&mut self, ctx: &mut C) {
        self.round_answered(ctx);
        self.next_round = Some(ctx.start_timer(self.round_interval, false));
    }
}

/// Drive a peripheral until `cancel` fires or its queue closes.
#[instrument(name = "peripheral", skip_all, fields(node = %node.id()))]
pub async fn run_peripheral(
    mut node: PeripheralNode,
    mut ctx: PeripheralContext,
    mut events: mpsc::Receiver<NodeEvent>,
    state: NetworkState,
    cancel: CancellationToken,
) {
    info!(profile = ?ctx.sensor.profile(), "Peripheral started");
    node.on_boot(&mut ctx);

    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        match event {
            NodeEvent::Frame(bytes) => {
                let Some(frame) = decode(&bytes, &state) else {
                    continue;
                };
                if !frame.destination.includes(node.id()) {
                    continue;
                }
                if let Err(reason) = node.on_message(&mut ctx, frame.source, frame.message) {
                    debug!(?reason, from = %frame.source, "Message discarded");
                }
            }
            NodeEvent::TimerFired(handle) => {
                ctx.timers.acknowledge(handle);
                match node.on_timer(&mut ctx, handle) {
                    Ok(Some(outcome)) => {
                        debug!(?outcome, "Peripheral round finished");
                        state.record_peripheral(node.id(), outcome);
                    }
                    Ok(None) => {}
                    Err(reason) => trace!(?reason, handle = handle.0, "Timer discarded"),
                }
            }
        }
    }

    info!(
        samples_produced = ctx.sensor.produced(),
        last_classification = ?node.last_classification(),
        "Peripheral shutting down"
    );
}

/// Drive the coordinator until `cancel` fires or its queue closes.
///
/// The first round is requested immediately.
#[instrument(name = "coordinator", skip_all, fields(node = %node.id()))]
pub async fn run_coordinator(
    mut node: CoordinatorNode,
    mut ctx: CoordinatorContext,
    mut schedule: RoundSchedule,
    mut events: mpsc::Receiver<NodeEvent>,
    state: NetworkState,
    cancel: CancellationToken,
) {
    info!(peripherals = ?node.peripherals().collect::<Vec<_>>(), "Coordinator started");
    start_round(&mut node, &mut ctx, &mut schedule);

    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        let resolved = match event {
            NodeEvent::Frame(bytes) => {
                let Some(frame) = decode(&bytes, &state) else {
                    continue;
                };
                if !frame.destination.includes(node.id()) {
                    continue;
                }

                match node.on_message(&mut ctx, frame.source, frame.message) {
                    Ok(outcome) => {
                        schedule.round_answered(&mut ctx);
                        outcome
                    }
                    Err(reason) => {
                        debug!(?reason, from = %frame.source, "Message discarded");
                        None
                    }
                }
            }
            NodeEvent::TimerFired(handle) => {
                ctx.timers.acknowledge(handle);

                if schedule.next_round == Some(handle) {
                    schedule.next_round = None;
                    start_round(&mut node, &mut ctx, &mut schedule);
                    None
                } else if schedule.silence == Some(handle) {
                    schedule.silence = None;
                    node.abandon_round().ok()
                } else {
                    match node.on_timer(&mut ctx, handle) {
                        Ok(outcome) => outcome,
                        Err(reason) => {
                            trace!(?reason, handle = handle.0, "Timer discarded");
                            None
                        }
                    }
                }
            }
        };

        if let Some(outcome) = resolved {
            finish_round(outcome, &mut ctx, &mut schedule, &state);
        }
    }

    info!(rounds = state.rounds_resolved(), "Coordinator shutting down");
}

fn start_round(node: &mut CoordinatorNode, ctx: &mut CoordinatorContext, schedule: &mut RoundSchedule) {
    match node.start_round(ctx) {
        Ok(_) => schedule.round_started(ctx),
        Err(reason) => warn!(?reason, "Could not start round"),
    }
}

fn finish_round(
    outcome: RoundOutcome,
    ctx: &mut CoordinatorContext,
    schedule: &mut RoundSchedule,
    state: &NetworkState,
) {
    match &outcome {
        RoundOutcome::Crisis { msg_id, source, .. } => {
            warn!(msg_id, %source, "Round ended in crisis");
        }
        RoundOutcome::Complete {
            msg_id,
            state: movement,
            ..
        } => {
            info!(msg_id, state = ?movement, "Round complete");
        }
        RoundOutcome::Timeout {
            msg_id, missing, ..
        } => {
            warn!(msg_id, ?missing, "Round timed out");
        }
    }

    state.record_round(outcome);
    schedule.round_resolved(ctx);
}

fn decode(bytes: &[u8], state: &NetworkState) -> Option<Frame> {
    match Frame::from_bytes(bytes) {
        Ok(frame) => Some(frame),
        Err(e) => {
            warn!(error = %e, len = bytes.len(), "Malformed frame dropped");
            state.frame_malformed();
            None
        }
    }
}
