use bsn_core::{Alarm, NodeId, RoundId};
use serde::{Deserialize, Serialize};
use tracing::warn;
use ulid::Ulid;

use crate::state::NetworkState;

/// Unique identifier for a raised crisis alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlertId(pub Ulid);

/// Escalation raised by the coordinator for a crisis report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrisisAlert {
    pub id: AlertId,
    /// Peripheral that reported the crisis
    pub source: NodeId,
    pub msg_id: RoundId,
    pub raised_at: jiff::Timestamp,
}

/// Alarm sink that logs each alert and keeps it in the network state.
#[derive(Clone)]
pub struct AlertLog {
    state: NetworkState,
}

impl AlertLog {
    pub fn new(state: NetworkState) -> Self {
        Self { state }
    }
}

impl Alarm for AlertLog {
    fn raise_crisis_alert(&mut self, source: NodeId, msg_id: RoundId) {
        let alert = CrisisAlert {
            id: AlertId(Ulid::new()),
            source,
            msg_id,
            raised_at: jiff::Timestamp::now(),
        };

        warn!(
            alert_id = %alert.id.0,
            %source,
            msg_id,
            "CRISIS ALERT"
        );
        self.state.record_alert(alert);
    }
}
