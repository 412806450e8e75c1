use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;

use bsn_core::{BsnConfig, ConfigError, NodeId};
use serde::Deserialize;

use crate::sensor::MotionProfile;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub protocol: BsnConfig,
    pub network: NetworkConfig,
    pub simulation: SimulationConfig,
    /// Per-peripheral sensor overrides. Peripherals without an entry get a
    /// calm sensor.
    #[serde(rename = "sensor")]
    pub sensors: Vec<SensorConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address of the coordinator node
    pub coordinator: NodeId,
    /// Addresses of the peripheral nodes, one per body location
    pub peripherals: Vec<NodeId>,
    /// Probability that any single frame is lost in the air
    pub link_loss: f64,
    /// Per-link overrides of `link_loss`
    #[serde(rename = "link")]
    pub links: Vec<LinkConfig>,
    /// Depth of each node's event queue
    pub queue_depth: usize,
}

/// Loss on one directed link, replacing `link_loss` for frames from `from`
/// to `to`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LinkConfig {
    pub from: NodeId,
    pub to: NodeId,
    pub loss: f64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            coordinator: NodeId(0),
            peripherals: (1..=4).map(NodeId).collect(),
            link_loss: 0.0,
            links: Vec::new(),
            queue_depth: 64,
        }
    }
}

impl NetworkConfig {
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::once(self.coordinator).chain(self.peripherals.iter().copied())
    }

    /// Link overrides keyed by `(from, to)`. A later entry for the same
    /// link wins.
    pub fn link_losses(&self) -> BTreeMap<(NodeId, NodeId), f64> {
        self.links
            .iter()
            .map(|link| ((link.from, link.to), link.loss))
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SensorConfig {
    /// Peripheral this sensor is attached to
    pub node: NodeId,
    pub profile: MotionProfile,
    /// Stop producing samples after this many readings
    #[serde(default)]
    pub stall_after: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// How long the simulation runs before shutting down
    pub duration_secs: u64,
    /// Pause between a resolved round and the next request
    pub round_interval_ms: u64,
    /// How long the coordinator waits for a first response before giving
    /// up on a round nobody answered
    pub silent_round_ms: u64,
    /// Seed for sensor noise and link loss; random when absent
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            duration_secs: 130,
            round_interval_ms: 1_000,
            silent_round_ms: 20_000,
            seed: None,
        }
    }
}

impl SimulationConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    pub fn round_interval(&self) -> Duration {
        Duration::from_millis(self.round_interval_ms)
    }

    pub fn silent_round(&self) -> Duration {
        Duration::from_millis(self.silent_round_ms)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("invalid protocol configuration: {0}")]
    Protocol(#[from] ConfigError),
    #[error("link_loss must be within 0.0..=1.0, got {0}")]
    LinkLoss(f64),
    #[error("queue_depth must be at least 1")]
    QueueDepth,
    #[error("{0} is both coordinator and peripheral")]
    CoordinatorIsPeripheral(NodeId),
    #[error("{0} is listed more than once")]
    DuplicatePeripheral(NodeId),
    #[error("sensor configured for {0}, which is not a peripheral")]
    UnknownSensorNode(NodeId),
    #[error("link {from} -> {to} names a node that is not in the network")]
    UnknownLinkNode { from: NodeId, to: NodeId },
    #[error(
        "silent_round_ms ({silent_round_ms}) must exceed the acquisition window ({window_ms} ms)"
    )]
    SilentRound {
        silent_round_ms: u64,
        window_ms: u64,
    },
}

impl Config {
    pub fn load(path: &Path) -> color_eyre::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SetupError> {
        self.protocol.validate()?;

        let network = &self.network;
        for loss in std::iter::once(network.link_loss).chain(network.links.iter().map(|l| l.loss)) {
            if !(0.0..=1.0).contains(&loss) {
                return Err(SetupError::LinkLoss(loss));
            }
        }
        if network.queue_depth == 0 {
            return Err(SetupError::QueueDepth);
        }

        let mut seen = BTreeSet::new();
        for pn in &network.peripherals {
            if *pn == network.coordinator {
                return Err(SetupError::CoordinatorIsPeripheral(*pn));
            }
            if !seen.insert(*pn) {
                return Err(SetupError::DuplicatePeripheral(*pn));
            }
        }

        if seen.len() != self.protocol.n_pns {
            return Err(ConfigError::PeripheralCount {
                expected: self.protocol.n_pns,
                actual: seen.len(),
            }
            .into());
        }

        if let Some(sensor) = self.sensors.iter().find(|s| !seen.contains(&s.node)) {
            return Err(SetupError::UnknownSensorNode(sensor.node));
        }

        let nodes: BTreeSet<NodeId> = network.nodes().collect();
        if let Some(link) = network
            .links
            .iter()
            .find(|l| !nodes.contains(&l.from) || !nodes.contains(&l.to))
        {
            return Err(SetupError::UnknownLinkNode {
                from: link.from,
                to: link.to,
            });
        }

        // the round is abandoned at this deadline, so it must outlast the
        // time a peripheral needs to fill its window
        let window_ms = self.window_ms();
        if self.simulation.silent_round_ms <= window_ms {
            return Err(SetupError::SilentRound {
                silent_round_ms: self.simulation.silent_round_ms,
                window_ms,
            });
        }

        Ok(())
    }

    /// Time a peripheral needs to collect a full window.
    pub fn window_ms(&self) -> u64 {
        (self.protocol.buf_size as u64).saturating_mul(self.protocol.acq_period_ms)
    }

    /// Sensor setup for a peripheral, falling back to a calm, healthy sensor.
    pub fn sensor_for(&self, node: NodeId) -> SensorConfig {
        self.sensors
            .iter()
            .find(|s| s.node == node)
            .cloned()
            .unwrap_or(SensorConfig {
                node,
                profile: MotionProfile::Calm,
                stall_after: None,
            })
    }
}
