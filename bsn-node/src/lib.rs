pub mod alarm;
pub mod config;
pub mod node;
pub mod radio;
pub mod sensor;
pub mod simulation;
pub mod state;
pub mod timer;

pub use alarm::{AlertId, AlertLog, CrisisAlert};
pub use config::{Config, LinkConfig, NetworkConfig, SensorConfig, SetupError, SimulationConfig};
pub use node::{
    CoordinatorContext, NodeEvent, PeripheralContext, RoundSchedule, run_coordinator, run_peripheral,
};
pub use radio::{Radio, RadioTransport};
pub use sensor::{MockSensor, MotionProfile};
pub use simulation::Simulation;
pub use state::{FrameStats, NetworkReport, NetworkState, PeripheralStats, RoundSummary};
pub use timer::TokioTimers;
