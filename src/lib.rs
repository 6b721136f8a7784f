pub use config::{ControllerConfig, GroupsConfig, SignalConfig, SumoConfig, SyntheticConfig};
pub use controller::{PhaseController, SwitchRecord};
pub use driver::{Driver, RunSummary};
pub use error::{Error, ExitCode, Result};
pub use payoff::{ApproachGroup, PayoffAggregator, Payoffs};
pub use phase::{Approach, Aspect, Phase, PhaseIndices, Rule, Transition, TRANSITIONS};
pub use sensor::{Readings, SensorReader};
pub use simulation::{DetectorQuery, SignalActuator, Simulation, SimulationControl};
pub use synthetic::SyntheticSimulation;
pub use traci::TraciClient;

pub mod config;
mod controller;
pub mod convert;
mod driver;
mod error;
mod payoff;
mod phase;
mod sensor;
mod simulation;
mod synthetic;
pub mod traci;
