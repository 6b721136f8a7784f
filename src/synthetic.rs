//! A small stochastic queue model which stands in for SUMO.
//!
//! Each detector watches one queue. Vehicles join the queues at random
//! until the demand is used up, and the queues of whichever approach holds
//! a green phase drain at a fixed rate.

use crate::config::ControllerConfig;
use crate::phase::{Approach, PhaseIndices};
use crate::simulation::{DetectorQuery, SignalActuator, SimulationControl};
use crate::traci::codec::cmd;
use crate::{Error, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Poisson};

/// The queue in front of one detector.
#[derive(Debug, Clone)]
struct Lane {
    /// The detector watching this lane.
    detector: String,
    /// The approach the lane belongs to.
    approach: Approach,
    /// Vehicles waiting at the stop line.
    queued: u32,
}

/// An in-process simulation of queues at a signalised intersection.
#[derive(Debug, Clone)]
pub struct SyntheticSimulation {
    /// Source of arrivals and lane choice.
    rng: StdRng,
    /// Arrivals per lane per step. `None` if no vehicles arrive.
    arrivals: Option<Poisson<f64>>,
    /// Vehicles leaving each green lane per step.
    discharge: u32,
    /// Vehicles which have yet to arrive.
    remaining: u32,
    /// Every detector lane of both groups.
    lanes: Vec<Lane>,
    /// The only signal in the model.
    signal: String,
    /// Maps phase indices to approaches.
    indices: PhaseIndices,
    /// The phase index last set on the signal.
    phase_index: i32,
    /// Steps simulated so far.
    step: u64,
}

impl SyntheticSimulation {
    /// Builds the model described by a validated configuration.
    pub fn from_config(config: &ControllerConfig) -> Result<Self> {
        let synthetic = &config.synthetic;
        let arrivals = match synthetic.arrival_rate {
            rate if rate > 0.0 => Some(
                Poisson::new(rate)
                    .map_err(|e| Error::config(format!("invalid arrival rate {rate}: {e}")))?,
            ),
            _ => None,
        };
        let lanes = [
            (Approach::A, &config.groups.a),
            (Approach::B, &config.groups.b),
        ]
        .into_iter()
        .flat_map(|(approach, group)| {
            group.detectors.iter().map(move |detector| Lane {
                detector: detector.clone(),
                approach,
                queued: 0,
            })
        })
        .collect();

        Ok(Self {
            rng: StdRng::seed_from_u64(synthetic.seed),
            arrivals,
            discharge: synthetic.discharge_per_step,
            remaining: synthetic.vehicles,
            lanes,
            signal: config.signal.id.clone(),
            indices: config.signal.phases,
            phase_index: config.signal.phases.a_green,
            step: 0,
        })
    }

    /// The number of steps simulated so far.
    pub fn step(&self) -> u64 {
        self.step
    }

    /// The number of vehicles which have yet to arrive.
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// The total number of queued vehicles on an approach.
    pub fn queued(&self, approach: Approach) -> u32 {
        self.lanes
            .iter()
            .filter(|lane| lane.approach == approach)
            .map(|lane| lane.queued)
            .sum()
    }

    fn check_signal(&self, command: u8, signal: &str) -> Result<()> {
        if signal == self.signal {
            Ok(())
        } else {
            Err(Error::Command {
                command,
                description: format!("Traffic light '{signal}' is not known"),
            })
        }
    }
}

impl SimulationControl for SyntheticSimulation {
    fn advance(&mut self) -> Result<()> {
        let green = self
            .indices
            .phase_of(self.phase_index)
            .filter(|phase| phase.is_green())
            .map(|phase| phase.approach());

        for lane in &mut self.lanes {
            if Some(lane.approach) == green {
                lane.queued = lane.queued.saturating_sub(self.discharge);
            }
        }

        if let Some(arrivals) = &self.arrivals {
            for lane in &mut self.lanes {
                if self.remaining == 0 {
                    break;
                }
                let count = (arrivals.sample(&mut self.rng) as u32).min(self.remaining);
                lane.queued += count;
                self.remaining -= count;
            }
        }

        self.step += 1;
        Ok(())
    }

    fn pending_entities(&mut self) -> Result<u32> {
        let queued: u32 = self.lanes.iter().map(|lane| lane.queued).sum();
        // With no arrival process the outstanding demand can never show up.
        let remaining = if self.arrivals.is_some() { self.remaining } else { 0 };
        Ok(queued + remaining)
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

impl DetectorQuery for SyntheticSimulation {
    fn last_step_vehicle_count(&mut self, detector: &str) -> Result<u32> {
        self.lanes
            .iter()
            .find(|lane| lane.detector == detector)
            .map(|lane| lane.queued)
            .ok_or_else(|| Error::Command {
                command: cmd::GET_LANEAREA_VARIABLE,
                description: format!("Lane area detector '{detector}' is not known"),
            })
    }
}

impl SignalActuator for SyntheticSimulation {
    fn phase(&mut self, signal: &str) -> Result<i32> {
        self.check_signal(cmd::GET_TL_VARIABLE, signal)?;
        Ok(self.phase_index)
    }

    fn set_phase(&mut self, signal: &str, index: i32) -> Result<()> {
        self.check_signal(cmd::SET_TL_VARIABLE, signal)?;
        if self.indices.phase_of(index).is_none() {
            return Err(Error::Command {
                command: cmd::SET_TL_VARIABLE,
                description: format!("The phase index {index} is not in the allowed range"),
            });
        }
        self.phase_index = index;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyntheticConfig;

    fn config(vehicles: u32, arrival_rate: f64) -> ControllerConfig {
        ControllerConfig {
            synthetic: SyntheticConfig {
                seed: 7,
                vehicles,
                arrival_rate,
                discharge_per_step: 1,
            },
            ..Default::default()
        }
    }

    #[test]
    fn demand_is_conserved() {
        let mut sim = SyntheticSimulation::from_config(&config(100, 0.5)).unwrap();
        for _ in 0..20 {
            sim.advance().unwrap();
            let pending = sim.pending_entities().unwrap();
            assert!(pending <= 100);
            assert_eq!(
                pending,
                sim.remaining() + sim.queued(Approach::A) + sim.queued(Approach::B)
            );
        }
    }

    #[test]
    fn only_green_approach_drains() {
        let mut sim = SyntheticSimulation::from_config(&config(0, 0.0)).unwrap();
        for lane in &mut sim.lanes {
            lane.queued = 5;
        }
        sim.set_phase("Center", 2).unwrap();
        sim.advance().unwrap();
        assert_eq!(sim.queued(Approach::A), 30);
        assert_eq!(sim.queued(Approach::B), 24);

        sim.set_phase("Center", 3).unwrap();
        sim.advance().unwrap();
        assert_eq!(sim.queued(Approach::B), 24);
    }

    #[test]
    fn same_seed_same_queues() {
        let run = || {
            let mut sim = SyntheticSimulation::from_config(&config(500, 0.3)).unwrap();
            (0..50)
                .map(|_| {
                    sim.advance().unwrap();
                    sim.last_step_vehicle_count("cam_E_1").unwrap()
                })
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn rejects_unknown_ids() {
        let mut sim = SyntheticSimulation::from_config(&config(10, 0.1)).unwrap();
        assert!(matches!(
            sim.last_step_vehicle_count("cam_X_0"),
            Err(Error::Command { command: 0xad, .. })
        ));
        assert!(sim.phase("West").is_err());
        assert!(sim.set_phase("Center", 9).is_err());
        assert_eq!(sim.phase("Center").unwrap(), 0);
    }
}
