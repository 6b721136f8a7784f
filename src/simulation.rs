//! The interfaces through which the controller talks to a running simulation.
//!
//! [crate::TraciClient] implements these against SUMO and
//! [crate::SyntheticSimulation] implements them in-process.

use crate::Result;

/// Control over the simulation clock.
pub trait SimulationControl {
    /// Advances the simulation by one step.
    fn advance(&mut self) -> Result<()>;

    /// The number of vehicles which are still running or expected to depart.
    /// The simulation is finished once this reaches zero.
    fn pending_entities(&mut self) -> Result<u32>;

    /// Ends the simulation and releases the connection.
    fn close(&mut self) -> Result<()>;
}

/// Read access to the simulation's lane-area detectors.
pub trait DetectorQuery {
    /// Gets the number of vehicles seen by a detector in the last step.
    fn last_step_vehicle_count(&mut self, detector: &str) -> Result<u32>;
}

/// Read and write access to a traffic light.
pub trait SignalActuator {
    /// Gets the index of the signal's current phase.
    fn phase(&mut self, signal: &str) -> Result<i32>;

    /// Switches the signal to the given phase index.
    fn set_phase(&mut self, signal: &str, index: i32) -> Result<()>;
}

/// A simulation which can drive a controller end to end.
pub trait Simulation: SimulationControl + DetectorQuery + SignalActuator {}

impl<T: SimulationControl + DetectorQuery + SignalActuator> Simulation for T {}
