pub mod classifier;
pub mod config;
pub mod coordinator;
pub mod peripheral;
pub mod protocol;
pub mod sensor;
pub mod timer;
pub mod transport;
pub mod window;

#[cfg(test)]
mod testing;

pub use classifier::Classifier;
pub use config::{AggregationPolicy, BsnConfig, ConfigError, MotionMetric, PartialWindowPolicy};
pub use coordinator::{Alarm, CoordinatorNode, CoordinatorState, RoundOutcome, RoundRecord};
pub use peripheral::{PeripheralNode, PeripheralOutcome, PeripheralState};
pub use protocol::{Frame, Message, MsgType, MsgValue, ProtocolError};
pub use sensor::Sensor;
pub use timer::{TimerHandle, Timers};
pub use transport::{Destination, Transport};
pub use window::{AcquisitionWindow, Sample, WindowError};

use serde::{Deserialize, Serialize};

/// Radio address of a node. `0xFFFF` is reserved for broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u16);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

/// Round identifier shared by a REQ and its matching RES.
pub type RoundId = u16;

/// Result of classifying one acquisition window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementState {
    NoMovement,
    Movement,
    Crisis,
}

impl From<MovementState> for MsgValue {
    fn from(state: MovementState) -> Self {
        match state {
            MovementState::NoMovement => MsgValue::NoMovement,
            MovementState::Movement => MsgValue::Movement,
            MovementState::Crisis => MsgValue::Crisis,
        }
    }
}

impl TryFrom<MsgValue> for MovementState {
    type Error = MsgValue;

    /// `START` only ever travels in a REQ and has no movement meaning.
    fn try_from(value: MsgValue) -> Result<Self, Self::Error> {
        match value {
            MsgValue::NoMovement => Ok(MovementState::NoMovement),
            MsgValue::Movement => Ok(MovementState::Movement),
            MsgValue::Crisis => Ok(MovementState::Crisis),
            MsgValue::Start => Err(value),
        }
    }
}

/// Why an event was dropped by a node without changing its round.
///
/// None of these are errors: every node keeps running after a discard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discard {
    /// Wrong round id, duplicate sender, or unknown sender.
    Stale,
    /// Structurally valid but semantically meaningless for the receiver.
    Malformed,
    /// Valid message arriving while the node is busy with another round.
    Busy,
    /// A timer that is no longer armed.
    StaleTimer,
}
