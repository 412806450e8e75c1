use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    AggregationPolicy, BsnConfig, ConfigError, Destination, Discard, Message, MovementState,
    MsgType, NodeId, RoundId, TimerHandle, Timers, Transport,
};

/// Escalation sink for crisis reports.
pub trait Alarm {
    fn raise_crisis_alert(&mut self, source: NodeId, msg_id: RoundId);
}

/// Round state of the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinatorState {
    Idle,
    Waiting,
    CrisisAlert,
    RoundComplete,
    RoundTimeout,
}

impl CoordinatorState {
    /// Whether the current round has been resolved.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CoordinatorState::CrisisAlert
                | CoordinatorState::RoundComplete
                | CoordinatorState::RoundTimeout
        )
    }
}

/// Classifications received during one round, keyed by sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoundRecord {
    msg_id: RoundId,
    reports: BTreeMap<NodeId, MovementState>,
}

impl RoundRecord {
    pub fn new(msg_id: RoundId) -> Self {
        Self {
            msg_id,
            reports: BTreeMap::new(),
        }
    }

    pub fn msg_id(&self) -> RoundId {
        self.msg_id
    }

    pub fn get(&self, node: NodeId) -> Option<MovementState> {
        self.reports.get(&node).copied()
    }

    pub fn has_reported(&self, node: NodeId) -> bool {
        self.reports.contains_key(&node)
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    pub fn reports(&self) -> impl Iterator<Item = (NodeId, MovementState)> + '_ {
        self.reports.iter().map(|(node, state)| (*node, *state))
    }

    fn insert(&mut self, node: NodeId, state: MovementState) {
        self.reports.insert(node, state);
    }

    fn count(&self, state: MovementState) -> usize {
        self.reports.values().filter(|s| **s == state).count()
    }
}

/// Resolution of one polling round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RoundOutcome {
    /// A peripheral reported a crisis. Resolved the moment it arrived.
    Crisis {
        msg_id: RoundId,
        source: NodeId,
        record: RoundRecord,
    },
    /// Every peripheral reported and none reported a crisis.
    Complete {
        msg_id: RoundId,
        state: MovementState,
        record: RoundRecord,
    },
    /// The coordinator watchdog fired first. `missing` peripherals are
    /// unknown, not calm.
    Timeout {
        msg_id: RoundId,
        record: RoundRecord,
        missing: Vec<NodeId>,
    },
}

impl RoundOutcome {
    pub fn msg_id(&self) -> RoundId {
        match self {
            RoundOutcome::Crisis { msg_id, .. }
            | RoundOutcome::Complete { msg_id, .. }
            | RoundOutcome::Timeout { msg_id, .. } => *msg_id,
        }
    }

    pub fn record(&self) -> &RoundRecord {
        match self {
            RoundOutcome::Crisis { record, .. }
            | RoundOutcome::Complete { record, .. }
            | RoundOutcome::Timeout { record, .. } => record,
        }
    }

    /// The terminal coordinator state this outcome corresponds to.
    pub fn state(&self) -> CoordinatorState {
        match self {
            RoundOutcome::Crisis { .. } => CoordinatorState::CrisisAlert,
            RoundOutcome::Complete { .. } => CoordinatorState::RoundComplete,
            RoundOutcome::Timeout { .. } => CoordinatorState::RoundTimeout,
        }
    }
}

/// Polling, aggregation and escalation state machine.
pub struct CoordinatorNode {
    id: NodeId,
    peripherals: BTreeSet<NodeId>,
    cn_timeout: Duration,
    aggregation: AggregationPolicy,
    next_msg_id: RoundId,
    state: CoordinatorState,
    record: Option<RoundRecord>,
    watchdog: Option<TimerHandle>,
    last_outcome: Option<RoundOutcome>,
}

impl CoordinatorNode {
    /// `peripherals` must name exactly `config.n_pns` distinct nodes.
    pub fn new(
        id: NodeId,
        peripherals: impl IntoIterator<Item = NodeId>,
        config: &BsnConfig,
    ) -> Result<Self, ConfigError> {
        let peripherals: BTreeSet<NodeId> = peripherals.into_iter().collect();

        if peripherals.len() != config.n_pns {
            return Err(ConfigError::PeripheralCount {
                expected: config.n_pns,
                actual: peripherals.len(),
            });
        }

        Ok(Self {
            id,
            peripherals,
            cn_timeout: config.cn_timeout(),
            aggregation: config.aggregation,
            next_msg_id: 0,
            state: CoordinatorState::Idle,
            record: None,
            watchdog: None,
            last_outcome: None,
        })
    }

    /// Set the id the next round will use.
    pub fn with_next_round_id(mut self, msg_id: RoundId) -> Self {
        self.next_msg_id = msg_id;
        self
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    pub fn peripherals(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.peripherals.iter().copied()
    }

    /// Id of the round in flight or most recently resolved.
    pub fn current_round(&self) -> Option<RoundId> {
        self.record.as_ref().map(RoundRecord::msg_id)
    }

    pub fn record(&self) -> Option<&RoundRecord> {
        self.record.as_ref()
    }

    pub fn last_outcome(&self) -> Option<&RoundOutcome> {
        self.last_outcome.as_ref()
    }

    /// Whether the coordinator watchdog is currently armed.
    pub fn watchdog_armed(&self) -> bool {
        self.watchdog.is_some()
    }

    /// Open a new round and broadcast its REQ.
    ///
    /// Allowed from `Idle` or from any resolved state; a round still
    /// `Waiting` must resolve first.
    pub fn start_round<C: Transport>(&mut self, ctx: &mut C) -> Result<RoundId, Discard> {
        if self.state == CoordinatorState::Waiting {
            debug!(current = ?self.current_round(), "Round already in flight");
            return Err(Discard::Busy);
        }

        if self.state.is_terminal() {
            self.transition(CoordinatorState::Idle);
        }

        let msg_id = self.next_msg_id;
        self.next_msg_id = self.next_msg_id.wrapping_add(1);

        self.record = Some(RoundRecord::new(msg_id));
        ctx.send(Destination::Broadcast, Message::request(msg_id));
        self.transition(CoordinatorState::Waiting);

        info!(msg_id, peripherals = self.peripherals.len(), "Round started");
        Ok(msg_id)
    }

    /// Handle a message addressed to the coordinator.
    ///
    /// Returns the round outcome if this message resolved the round.
    pub fn on_message<C: Timers + Alarm>(
        &mut self,
        ctx: &mut C,
        from: NodeId,
        message: Message,
    ) -> Result<Option<RoundOutcome>, Discard> {
        if message.msg_type != MsgType::Res {
            debug!(%from, ?message, "Coordinator ignores requests");
            return Err(Discard::Malformed);
        }

        let Ok(value) = MovementState::try_from(message.value) else {
            warn!(%from, msg_id = message.msg_id, "Response carries no classification");
            return Err(Discard::Malformed);
        };

        let Some(record) = self.record.as_mut() else {
            debug!(%from, msg_id = message.msg_id, "Response with no round open");
            return Err(Discard::Stale);
        };

        if message.msg_id != record.msg_id() {
            debug!(
                %from,
                msg_id = message.msg_id,
                current = record.msg_id(),
                "Response for another round"
            );
            return Err(Discard::Stale);
        }

        if !self.peripherals.contains(&from) {
            debug!(%from, msg_id = message.msg_id, "Response from unknown node");
            return Err(Discard::Stale);
        }

        if record.has_reported(from) {
            debug!(%from, msg_id = message.msg_id, "Duplicate response");
            return Err(Discard::Stale);
        }

        match self.state {
            CoordinatorState::Waiting => {}
            CoordinatorState::CrisisAlert => {
                // the round is already escalated; keep the late report for context
                record.insert(from, value);
                debug!(%from, msg_id = message.msg_id, ?value, "Late response after crisis");
                return Ok(None);
            }
            _ => {
                debug!(%from, msg_id = message.msg_id, state = ?self.state, "Response after round resolved");
                return Err(Discard::Stale);
            }
        }

        record.insert(from, value);
        let msg_id = record.msg_id();
        let reported = record.len();
        info!(%from, msg_id, ?value, reported, "Classification received");

        if reported == 1 {
            self.watchdog = Some(ctx.start_timer(self.cn_timeout, false));
        }

        if value == MovementState::Crisis {
            self.disarm(ctx);
            ctx.raise_crisis_alert(from, msg_id);
            warn!(source = %from, msg_id, "Crisis reported, raising alert");
            return Ok(Some(self.resolve(CoordinatorState::CrisisAlert, |record| {
                RoundOutcome::Crisis {
                    msg_id,
                    source: from,
                    record,
                }
            })));
        }

        if reported == self.peripherals.len() {
            self.disarm(ctx);
            let aggregation = self.aggregation;
            return Ok(Some(self.resolve(CoordinatorState::RoundComplete, |record| {
                RoundOutcome::Complete {
                    msg_id,
                    state: aggregate(aggregation, &record),
                    record,
                }
            })));
        }

        Ok(None)
    }

    /// Handle a fired timer.
    pub fn on_timer<C: Timers>(
        &mut self,
        _ctx: &mut C,
        handle: TimerHandle,
    ) -> Result<Option<RoundOutcome>, Discard> {
        if self.watchdog != Some(handle) || self.state != CoordinatorState::Waiting {
            return Err(Discard::StaleTimer);
        }
        self.watchdog = None;

        let peripherals = &self.peripherals;
        let missing: Vec<NodeId> = match self.record.as_ref() {
            Some(record) => peripherals
                .iter()
                .filter(|node| !record.has_reported(**node))
                .copied()
                .collect(),
            None => return Err(Discard::StaleTimer),
        };

        warn!(
            msg_id = ?self.current_round(),
            missing = ?missing,
            "Round timed out waiting for classifications"
        );

        Ok(Some(self.resolve(CoordinatorState::RoundTimeout, |record| {
            RoundOutcome::Timeout {
                msg_id: record.msg_id(),
                record,
                missing,
            }
        })))
    }

    /// Give up on a round that no peripheral has answered.
    ///
    /// The coordinator watchdog only arms on the first response, so a round
    /// nobody answers would otherwise wait forever. Only valid while
    /// `Waiting` with an empty record; resolves as a timeout with every
    /// peripheral missing.
    pub fn abandon_round(&mut self) -> Result<RoundOutcome, Discard> {
        let Some(record) = self.record.as_ref() else {
            return Err(Discard::Stale);
        };
        if self.state != CoordinatorState::Waiting || !record.is_empty() {
            return Err(Discard::Busy);
        }

        let missing: Vec<NodeId> = self.peripherals.iter().copied().collect();
        warn!(msg_id = record.msg_id(), "No peripheral answered, abandoning round");

        Ok(self.resolve(CoordinatorState::RoundTimeout, |record| {
            RoundOutcome::Timeout {
                msg_id: record.msg_id(),
                record,
                missing,
            }
        }))
    }

    fn disarm<C: Timers>(&mut self, ctx: &mut C) {
        if let Some(handle) = self.watchdog.take() {
            ctx.cancel_timer(handle);
        }
    }

    fn resolve(
        &mut self,
        next: CoordinatorState,
        outcome: impl FnOnce(RoundRecord) -> RoundOutcome,
    ) -> RoundOutcome {
        let record = self
            .record
            .clone()
            .unwrap_or_else(|| RoundRecord::new(self.next_msg_id.wrapping_sub(1)));
        let outcome = outcome(record);

        self.transition(next);
        info!(msg_id = outcome.msg_id(), state = ?next, "Round resolved");
        self.last_outcome = Some(outcome.clone());
        outcome
    }

    fn transition(&mut self, next: CoordinatorState) {
        debug!(from = ?self.state, to = ?next, "Coordinator state change");
        self.state = next;
    }
}

/// Fold a complete, crisis-free round into one movement state.
pub fn aggregate(policy: AggregationPolicy, record: &RoundRecord) -> MovementState {
    let movement = record.count(MovementState::Movement);

    let moving = match policy {
        AggregationPolicy::AnyMovement => movement > 0,
        AggregationPolicy::Majority => movement * 2 > record.len(),
    };

    if moving {
        MovementState::Movement
    } else {
        MovementState::NoMovement
    }
}
