use bsn_core::{CoordinatorNode, NodeId, PeripheralNode};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::alarm::AlertLog;
use crate::config::{Config, SetupError};
use crate::node::{
    CoordinatorContext, NodeEvent, PeripheralContext, RoundSchedule, run_coordinator,
    run_peripheral,
};
use crate::radio::Radio;
use crate::sensor::MockSensor;
use crate::state::{NetworkReport, NetworkState};
use crate::timer::TokioTimers;

struct NodeSlot {
    id: NodeId,
    tx: mpsc::Sender<NodeEvent>,
    rx: mpsc::Receiver<NodeEvent>,
}

/// A whole body sensor network wired onto one in-process radio.
///
/// Every node is attached to the radio as soon as the simulation is built,
/// so frames can be injected before [`Simulation::run`] is called.
pub struct Simulation {
    config: Config,
    radio: Radio,
    state: NetworkState,
    coordinator: NodeSlot,
    peripherals: Vec<NodeSlot>,
}

impl Simulation {
    pub fn new(config: Config) -> Result<Self, SetupError> {
        config.validate()?;

        let state = NetworkState::new();
        let radio = Radio::new(config.network.link_loss, config.simulation.seed, state.clone())
            .with_links(config.network.link_losses());

        let slot = |id: NodeId| {
            let (tx, rx) = mpsc::channel(config.network.queue_depth);
            radio.attach(id, tx.clone());
            NodeSlot { id, tx, rx }
        };

        let coordinator = slot(config.network.coordinator);
        let peripherals = config.network.peripherals.iter().copied().map(slot).collect();

        if !config.protocol.window_fits_timeout() {
            warn!(
                buf_size = config.protocol.buf_size,
                acq_period_ms = config.protocol.acq_period_ms,
                pn_timeout_ms = config.protocol.pn_timeout_ms,
                "Acquisition window cannot fill before the peripheral watchdog"
            );
        }

        Ok(Self {
            config,
            radio,
            state,
            coordinator,
            peripherals,
        })
    }

    pub fn radio(&self) -> &Radio {
        &self.radio
    }

    pub fn state(&self) -> &NetworkState {
        &self.state
    }

    /// Run every node until `cancel` fires, then return what happened.
    pub async fn run(self, cancel: CancellationToken) -> Result<NetworkReport, SetupError> {
        let Simulation {
            config,
            radio,
            state,
            coordinator,
            peripherals,
        } = self;
        let protocol = &config.protocol;

        info!(
            coordinator = %coordinator.id,
            peripherals = peripherals.len(),
            link_loss = config.network.link_loss,
            link_overrides = config.network.links.len(),
            "Starting body sensor network"
        );

        let mut handles: Vec<JoinHandle<()>> = Vec::with_capacity(peripherals.len() + 1);

        for slot in peripherals {
            let sensor_config = config.sensor_for(slot.id);
            let seed = config
                .simulation
                .seed
                .map(|seed| seed.wrapping_add(u64::from(slot.id.0)));
            let sensor = MockSensor::new(sensor_config.profile, protocol.acq_period_ms, seed)
                .stall_after(sensor_config.stall_after);

            let ctx = PeripheralContext {
                transport: radio.transport(slot.id),
                timers: TokioTimers::new(slot.tx, cancel.clone()),
                sensor,
            };
            let node = PeripheralNode::new(slot.id, protocol);

            handles.push(tokio::spawn(run_peripheral(
                node,
                ctx,
                slot.rx,
                state.clone(),
                cancel.clone(),
            )));
        }

        let node = CoordinatorNode::new(
            coordinator.id,
            config.network.peripherals.iter().copied(),
            protocol,
        )?;
        let ctx = CoordinatorContext {
            transport: radio.transport(coordinator.id),
            timers: TokioTimers::new(coordinator.tx, cancel.clone()),
            alarm: AlertLog::new(state.clone()),
        };
        let schedule = RoundSchedule::new(
            config.simulation.round_interval(),
            config.simulation.silent_round(),
        );

        handles.push(tokio::spawn(run_coordinator(
            node,
            ctx,
            schedule,
            coordinator.rx,
            state.clone(),
            cancel.clone(),
        )));

        cancel.cancelled().await;

        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = ?e, "Node task failed");
            }
        }

        let report = state.report();
        info!(
            rounds = report.rounds.len(),
            alerts = report.alerts.len(),
            "Body sensor network stopped"
        );
        Ok(report)
    }
}
