use crate::config::SignalConfig;
use crate::payoff::Payoffs;
use crate::phase::{Phase, PhaseIndices, Rule};
use crate::simulation::SignalActuator;
use crate::Result;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

/// A phase change issued by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchRecord {
    /// The step at which the change was issued.
    pub step: u64,
    /// The phase which was left.
    pub from: Phase,
    /// The phase which was entered.
    pub to: Phase,
    /// The payoffs the decision was based on.
    /// Absent for the end of a yellow clearance, which ignores payoffs.
    pub payoffs: Option<Payoffs>,
}

/// A two-approach signal controller which hands right-of-way to
/// whichever approach has the longer queue, subject to a minimum green
/// time and a fixed yellow clearance.
#[derive(Debug, Clone)]
pub struct PhaseController {
    /// The ID of the controlled signal in the simulation.
    signal: String,
    /// The simulator's phase index for each phase.
    indices: PhaseIndices,
    /// Steps that must elapse in a green phase before it may be left.
    min_green: u64,
    /// Steps that must elapse in a yellow phase before it is left.
    yellow_clearance: u64,
    /// The current phase.
    phase: Phase,
    /// The step at which the current phase was entered.
    last_switch: u64,
}

impl PhaseController {
    /// Creates a controller in the A-Green phase.
    pub fn new(
        signal: impl Into<String>,
        indices: PhaseIndices,
        min_green: u64,
        yellow_clearance: u64,
    ) -> Self {
        Self {
            signal: signal.into(),
            indices,
            min_green,
            yellow_clearance,
            phase: Phase::AGreen,
            last_switch: 0,
        }
    }

    /// Creates a controller from the signal section of the config.
    pub fn from_config(config: &SignalConfig) -> Self {
        Self::new(
            &config.id,
            config.phases,
            config.min_green,
            config.yellow_clearance,
        )
    }

    /// The traffic light this controller drives.
    pub fn signal(&self) -> &str {
        &self.signal
    }

    /// The phase the controller believes the signal is in.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The step at which the current phase began.
    pub fn last_switch(&self) -> u64 {
        self.last_switch
    }

    /// The number of steps spent in the current phase.
    pub fn dwell(&self, step: u64) -> u64 {
        step.saturating_sub(self.last_switch)
    }

    /// Puts the signal into the initial A-Green phase.
    pub fn start(&mut self, actuator: &mut impl SignalActuator) -> Result<()> {
        self.phase = Phase::AGreen;
        self.last_switch = 0;
        actuator.set_phase(&self.signal, self.indices.index_of(self.phase))
    }

    /// Returns true if the current phase's exit rule is evaluated at `step`.
    pub fn decision_due(&self, step: u64) -> bool {
        let dwell = self.dwell(step);
        match self.phase.transition().rule {
            Rule::Challenge { .. } => dwell > self.min_green,
            Rule::Clearance => dwell > self.yellow_clearance,
        }
    }

    /// Returns true if a decision at `step` depends on the payoffs.
    pub fn needs_payoffs(&self, step: u64) -> bool {
        self.phase.is_green() && self.decision_due(step)
    }

    /// Works out which phase the signal should move to at `step`, if any.
    ///
    /// Ties keep the incumbent phase, as does a missing `payoffs`
    /// when the current phase needs them.
    pub fn decide(&self, step: u64, payoffs: Option<Payoffs>) -> Option<Phase> {
        if !self.decision_due(step) {
            return None;
        }
        let transition = self.phase.transition();
        match transition.rule {
            Rule::Clearance => Some(transition.to),
            Rule::Challenge { challenger } => payoffs
                .filter(|p| p.get(challenger) > p.get(self.phase.approach()))
                .map(|_| transition.to),
        }
    }

    /// Reconciles the controller's phase with the one reported by the signal.
    ///
    /// Returns false if the signal is in a phase the controller does not know,
    /// in which case no decision should be made.
    pub fn sync(&mut self, actuator: &mut impl SignalActuator) -> Result<bool> {
        let index = actuator.phase(&self.signal)?;
        match self.indices.phase_of(index) {
            Some(phase) if phase != self.phase => {
                warn!(
                    "Signal '{}' reports {} but controller expected {}",
                    self.signal, phase, self.phase
                );
                self.phase = phase;
                Ok(true)
            }
            Some(_) => Ok(true),
            None => {
                debug!(
                    "Signal '{}' is in unmapped phase index {}",
                    self.signal, index
                );
                Ok(false)
            }
        }
    }

    /// Evaluates the current phase's exit rule and, if it fires,
    /// switches the signal.
    pub fn step(
        &mut self,
        step: u64,
        payoffs: Option<Payoffs>,
        actuator: &mut impl SignalActuator,
    ) -> Result<Option<SwitchRecord>> {
        let Some(next) = self.decide(step, payoffs) else {
            return Ok(None);
        };
        actuator.set_phase(&self.signal, self.indices.index_of(next))?;

        let record = SwitchRecord {
            step,
            from: self.phase,
            to: next,
            payoffs: payoffs.filter(|_| self.phase.is_green()),
        };
        match record.payoffs {
            Some(p) => info!(
                "Step {}: {} -> {} (A score: {} vs B score: {})",
                step, record.from, record.to, p.a, p.b
            ),
            None => info!("Step {}: {} -> {}", step, record.from, record.to),
        }

        self.phase = next;
        self.last_switch = step;
        Ok(Some(record))
    }
}
