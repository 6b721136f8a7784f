use crate::simulation::DetectorQuery;
use crate::Result;
use std::collections::HashMap;

/// Vehicle counts by detector ID for a single step.
pub type Readings = HashMap<String, u32>;

/// Reads a fixed set of lane-area detectors.
#[derive(Debug, Clone)]
pub struct SensorReader {
    /// Detector IDs, in query order.
    detectors: Vec<String>,
}

impl SensorReader {
    /// Creates a reader for the given detectors.
    pub fn new<S: Into<String>>(detectors: impl IntoIterator<Item = S>) -> Self {
        Self {
            detectors: detectors.into_iter().map(Into::into).collect(),
        }
    }

    /// The detectors which are read.
    pub fn detectors(&self) -> &[String] {
        &self.detectors
    }

    /// Queries every detector once.
    /// The first failed query ends the read.
    pub fn read(&self, sim: &mut impl DetectorQuery) -> Result<Readings> {
        self.detectors
            .iter()
            .map(|id| Ok((id.clone(), sim.last_step_vehicle_count(id)?)))
            .collect()
    }
}
