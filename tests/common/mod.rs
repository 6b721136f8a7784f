//! A scripted stand-in for SUMO shared by the integration tests.

#![allow(dead_code)]

use traffic_payoff::{DetectorQuery, Error, Result, SignalActuator, SimulationControl};

type CountFn = Box<dyn FnMut(u64, &str) -> u32>;

/// Plays out a fixed number of steps with detector counts from a closure.
pub struct ScriptedSimulation {
    /// Steps until the simulation reports no pending vehicles.
    pub steps_left: u32,
    /// Calls to `advance` so far.
    pub advances: u64,
    /// Gets the count for a detector at a controller step.
    pub counts: CountFn,
    /// Detectors which exist in the scenario; any other ID is rejected.
    pub known: Vec<String>,
    pub phase: i32,
    /// Every `set_phase`, as (advances so far, index).
    pub phase_changes: Vec<(u64, i32)>,
    /// Forces the signal into a phase after the given number of advances.
    pub external_change: Option<(u64, i32)>,
    pub detector_reads: u64,
    pub phase_reads: u64,
    pub fail_set_phase: bool,
    pub closed: bool,
}

impl ScriptedSimulation {
    pub fn new(steps: u32, counts: impl FnMut(u64, &str) -> u32 + 'static) -> Self {
        Self {
            steps_left: steps,
            advances: 0,
            counts: Box::new(counts),
            known: traffic_payoff::GroupsConfig::default()
                .a
                .detectors
                .into_iter()
                .chain(traffic_payoff::GroupsConfig::default().b.detectors)
                .collect(),
            phase: -1,
            phase_changes: vec![],
            external_change: None,
            detector_reads: 0,
            phase_reads: 0,
            fail_set_phase: false,
            closed: false,
        }
    }

    /// Counts where every A detector sees `a` vehicles and every B detector `b`.
    pub fn uniform(steps: u32, a: u32, b: u32) -> Self {
        Self::new(steps, move |_, id| if is_group_a(id) { a } else { b })
    }
}

/// Whether a default detector ID belongs to the north-south group.
pub fn is_group_a(id: &str) -> bool {
    id.starts_with("cam_N") || id.starts_with("cam_S")
}

impl SimulationControl for ScriptedSimulation {
    fn advance(&mut self) -> Result<()> {
        assert!(!self.closed, "advanced a closed simulation");
        self.advances += 1;
        self.steps_left = self.steps_left.saturating_sub(1);
        if let Some((at, index)) = self.external_change {
            if at == self.advances {
                self.phase = index;
            }
        }
        Ok(())
    }

    fn pending_entities(&mut self) -> Result<u32> {
        Ok(self.steps_left)
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

impl DetectorQuery for ScriptedSimulation {
    fn last_step_vehicle_count(&mut self, detector: &str) -> Result<u32> {
        if !self.known.iter().any(|id| id == detector) {
            return Err(Error::Command {
                command: 0xad,
                description: format!("Lane area detector '{detector}' is not known"),
            });
        }
        self.detector_reads += 1;
        let step = self.advances.saturating_sub(1);
        Ok((self.counts)(step, detector))
    }
}

impl SignalActuator for ScriptedSimulation {
    fn phase(&mut self, _signal: &str) -> Result<i32> {
        self.phase_reads += 1;
        Ok(self.phase)
    }

    fn set_phase(&mut self, _signal: &str, index: i32) -> Result<()> {
        if self.fail_set_phase && !self.phase_changes.is_empty() {
            return Err(Error::Command {
                command: 0xc2,
                description: "actuator offline".to_string(),
            });
        }
        self.phase = index;
        self.phase_changes.push((self.advances, index));
        Ok(())
    }
}
