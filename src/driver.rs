use crate::config::ControllerConfig;
use crate::controller::{PhaseController, SwitchRecord};
use crate::payoff::PayoffAggregator;
use crate::sensor::SensorReader;
use crate::simulation::Simulation;
use crate::Result;
use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};

/// What happened during a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// The number of simulation steps taken.
    pub steps: u64,
    /// Every phase change, in order.
    pub switches: Vec<SwitchRecord>,
}

/// Runs the control loop against a simulation until it has no vehicles left.
pub struct Driver<S> {
    /// The simulation being controlled.
    sim: S,
    /// Reads every detector of both groups.
    sensors: SensorReader,
    /// Sums readings per approach.
    payoffs: PayoffAggregator,
    /// Decides and applies phase changes.
    controller: PhaseController,
    /// Read sensors on every step rather than only when a decision needs them.
    telemetry_every_step: bool,
}

impl<S: Simulation> Driver<S> {
    /// Creates a driver, failing if the configuration is invalid.
    pub fn new(sim: S, config: &ControllerConfig) -> Result<Self> {
        config.validate()?;
        let payoffs = PayoffAggregator::new(config.groups.a.clone(), config.groups.b.clone());
        let sensors = SensorReader::new(payoffs.detectors());
        Ok(Self {
            sim,
            sensors,
            payoffs,
            controller: PhaseController::from_config(&config.signal),
            telemetry_every_step: config.telemetry_every_step,
        })
    }

    /// The phase controller.
    pub fn controller(&self) -> &PhaseController {
        &self.controller
    }

    /// The controlled simulation.
    pub fn simulation(&self) -> &S {
        &self.sim
    }

    /// Gives back the simulation, e.g. to inspect it after a run.
    pub fn into_simulation(self) -> S {
        self.sim
    }

    /// Steps the simulation to completion, then closes it.
    ///
    /// Any failure ends the run. The simulation is still closed
    /// before the error is returned.
    pub fn run(&mut self) -> Result<RunSummary> {
        match self.run_loop() {
            Ok(summary) => {
                self.sim.close()?;
                info!(
                    "Simulation finished after {} steps with {} phase changes",
                    summary.steps,
                    summary.switches.len()
                );
                Ok(summary)
            }
            Err(err) => {
                if let Err(close_err) = self.sim.close() {
                    warn!("Failed to close simulation after error: {}", close_err);
                }
                Err(err)
            }
        }
    }

    fn run_loop(&mut self) -> Result<RunSummary> {
        self.controller.start(&mut self.sim)?;

        let mut summary = RunSummary::default();
        while self.sim.pending_entities()? > 0 {
            self.sim.advance()?;
            if let Some(record) = self.tick(summary.steps)? {
                summary.switches.push(record);
            }
            summary.steps += 1;
        }
        Ok(summary)
    }

    /// Runs the controller for a single step of an already advanced simulation.
    pub fn tick(&mut self, step: u64) -> Result<Option<SwitchRecord>> {
        let wants_payoffs = self.controller.needs_payoffs(step);

        let readings = if wants_payoffs || self.telemetry_every_step {
            let readings = self.sensors.read(&mut self.sim)?;
            trace!("Step {}: {:?}", step, readings);
            Some(readings)
        } else {
            None
        };

        if wants_payoffs && !self.controller.sync(&mut self.sim)? {
            debug!("Step {}: skipping decision", step);
            return Ok(None);
        }

        let payoffs = readings.map(|readings| self.payoffs.aggregate(&readings));
        self.controller.step(step, payoffs, &mut self.sim)
    }
}
