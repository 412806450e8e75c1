use tracing::{debug, info, warn};

use crate::{
    AcquisitionWindow, BsnConfig, Classifier, Destination, Discard, Message, MovementState,
    MsgType, MsgValue, NodeId, PartialWindowPolicy, RoundId, Sensor, TimerHandle, Timers,
    Transport, WindowError,
};

/// Round state of a peripheral node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeripheralState {
    Idle,
    Acquiring,
    /// Held only while the RES is being handed to the transport.
    Reported,
}

/// How a peripheral round ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeripheralOutcome {
    /// A RES was sent to the coordinator.
    Reported {
        msg_id: RoundId,
        state: MovementState,
        samples: usize,
    },
    /// The boot round finished; nothing is transmitted for it.
    Classified { state: MovementState },
    /// The watchdog fired and the round was abandoned silently.
    Dropped {
        msg_id: Option<RoundId>,
        samples: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoundOrigin {
    Boot,
    Request { msg_id: RoundId, coordinator: NodeId },
}

impl RoundOrigin {
    fn msg_id(&self) -> Option<RoundId> {
        match self {
            RoundOrigin::Boot => None,
            RoundOrigin::Request { msg_id, .. } => Some(*msg_id),
        }
    }
}

#[derive(Debug)]
struct ActiveRound {
    origin: RoundOrigin,
    tick: TimerHandle,
    watchdog: TimerHandle,
}

/// Acquisition and classification state machine run by every peripheral.
pub struct PeripheralNode {
    id: NodeId,
    config: BsnConfig,
    classifier: Classifier,
    window: AcquisitionWindow,
    state: PeripheralState,
    round: Option<ActiveRound>,
    last_classification: Option<MovementState>,
}

impl PeripheralNode {
    pub fn new(id: NodeId, config: &BsnConfig) -> Self {
        Self {
            id,
            config: config.clone(),
            classifier: Classifier::from_config(config),
            window: AcquisitionWindow::new(config.buf_size),
            state: PeripheralState::Idle,
            round: None,
            last_classification: None,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn state(&self) -> PeripheralState {
        self.state
    }

    /// Round currently being acquired, if it was requested by a coordinator.
    pub fn current_round(&self) -> Option<RoundId> {
        self.round.as_ref().and_then(|r| r.origin.msg_id())
    }

    pub fn samples_collected(&self) -> usize {
        self.window.len()
    }

    pub fn last_classification(&self) -> Option<MovementState> {
        self.last_classification
    }

    /// Called once when the node comes up.
    pub fn on_boot<C: Timers>(&mut self, ctx: &mut C) {
        if self.config.acquire_on_boot {
            info!(node = %self.id, "Starting boot acquisition");
            self.begin(ctx, RoundOrigin::Boot);
        }
    }

    /// Handle a message addressed to this node.
    ///
    /// Only a REQ carrying `START` opens a round, and only from `Idle`.
    pub fn on_message<C: Timers>(
        &mut self,
        ctx: &mut C,
        from: NodeId,
        message: Message,
    ) -> Result<(), Discard> {
        if message.msg_type != MsgType::Req || message.value != MsgValue::Start {
            debug!(node = %self.id, %from, ?message, "Ignoring non-request message");
            return Err(Discard::Malformed);
        }

        if self.state != PeripheralState::Idle {
            debug!(
                node = %self.id,
                msg_id = message.msg_id,
                current = ?self.current_round(),
                "Request while acquiring, ignored"
            );
            return Err(Discard::Busy);
        }

        info!(node = %self.id, msg_id = message.msg_id, coordinator = %from, "Request accepted");
        self.begin(
            ctx,
            RoundOrigin::Request {
                msg_id: message.msg_id,
                coordinator: from,
            },
        );
        Ok(())
    }

    /// Handle a fired timer.
    pub fn on_timer<C>(
        &mut self,
        ctx: &mut C,
        handle: TimerHandle,
    ) -> Result<Option<PeripheralOutcome>, Discard>
    where
        C: Transport + Timers + Sensor,
    {
        let (tick, watchdog) = match &self.round {
            Some(round) => (round.tick, round.watchdog),
            None => return Err(Discard::StaleTimer),
        };

        if handle == tick {
            Ok(self.on_tick(ctx))
        } else if handle == watchdog {
            match self.round.take() {
                Some(round) => Ok(Some(self.on_watchdog(ctx, round))),
                None => Err(Discard::StaleTimer),
            }
        } else {
            Err(Discard::StaleTimer)
        }
    }

    fn begin<C: Timers>(&mut self, ctx: &mut C, origin: RoundOrigin) {
        self.window.clear();

        let tick = ctx.start_timer(self.config.acq_period(), true);
        let watchdog = ctx.start_timer(self.config.pn_timeout(), false);

        self.round = Some(ActiveRound {
            origin,
            tick,
            watchdog,
        });
        self.transition(PeripheralState::Acquiring);
    }

    fn on_tick<C>(&mut self, ctx: &mut C) -> Option<PeripheralOutcome>
    where
        C: Transport + Timers + Sensor,
    {
        let Some(value) = ctx.read_sample() else {
            debug!(node = %self.id, "No sample available on tick");
            return None;
        };

        match self.window.push(value) {
            Ok(()) => {}
            Err(WindowError::NonFinite(v)) => {
                warn!(node = %self.id, sample = v, "Discarding non-finite sample");
                return None;
            }
            Err(WindowError::Full { .. }) => {}
        }

        if !self.window.is_full() {
            return None;
        }

        let round = self.round.take()?;
        ctx.cancel_timer(round.tick);
        ctx.cancel_timer(round.watchdog);

        Some(self.report(ctx, round.origin))
    }

    fn on_watchdog<C>(&mut self, ctx: &mut C, round: ActiveRound) -> PeripheralOutcome
    where
        C: Transport + Timers + Sensor,
    {
        ctx.cancel_timer(round.tick);

        let samples = self.window.len();
        warn!(
            node = %self.id,
            msg_id = ?round.origin.msg_id(),
            samples,
            needed = self.window.capacity(),
            "Acquisition watchdog expired"
        );

        if let PartialWindowPolicy::Classify { min_samples } = self.config.partial_window {
            if samples >= min_samples {
                return self.report(ctx, round.origin);
            }
        }

        self.window.clear();
        self.transition(PeripheralState::Idle);
        PeripheralOutcome::Dropped {
            msg_id: round.origin.msg_id(),
            samples,
        }
    }

    fn report<C: Transport>(&mut self, ctx: &mut C, origin: RoundOrigin) -> PeripheralOutcome {
        let samples = self.window.len();
        let state = self.classifier.classify(self.window.samples());
        self.last_classification = Some(state);
        self.window.clear();

        let outcome = match origin {
            RoundOrigin::Boot => {
                info!(node = %self.id, ?state, samples, "Boot acquisition classified");
                PeripheralOutcome::Classified { state }
            }
            RoundOrigin::Request {
                msg_id,
                coordinator,
            } => {
                ctx.send(
                    Destination::Node(coordinator),
                    Message::response(msg_id, state.into()),
                );
                self.transition(PeripheralState::Reported);
                info!(node = %self.id, msg_id, ?state, samples, "Classification reported");
                PeripheralOutcome::Reported {
                    msg_id,
                    state,
                    samples,
                }
            }
        };

        self.transition(PeripheralState::Idle);
        outcome
    }

    fn transition(&mut self, next: PeripheralState) {
        debug!(node = %self.id, from = ?self.state, to = ?next, "Peripheral state change");
        self.state = next;
    }
}
