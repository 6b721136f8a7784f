use crate::phase::Approach;
use crate::sensor::Readings;
use serde::{Deserialize, Serialize};

/// A named set of detectors belonging to one approach.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproachGroup {
    /// A label used in logs.
    pub name: String,
    /// Detector IDs, each read once per step.
    pub detectors: Vec<String>,
}

impl ApproachGroup {
    /// Creates a group from a name and detector IDs.
    pub fn new<S: Into<String>>(name: impl Into<String>, detectors: impl IntoIterator<Item = S>) -> Self {
        Self {
            name: name.into(),
            detectors: detectors.into_iter().map(Into::into).collect(),
        }
    }
}

/// The queue pressure on each approach.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payoffs {
    /// The payoff of approach A.
    pub a: u64,
    /// The payoff of approach B.
    pub b: u64,
}

impl Payoffs {
    /// Creates payoffs for A and B.
    pub const fn new(a: u64, b: u64) -> Self {
        Self { a, b }
    }

    /// Gets the payoff of the given approach.
    pub const fn get(&self, approach: Approach) -> u64 {
        match approach {
            Approach::A => self.a,
            Approach::B => self.b,
        }
    }
}

/// Reduces detector readings to one payoff per approach.
#[derive(Debug, Clone)]
pub struct PayoffAggregator {
    /// Group A.
    a: ApproachGroup,
    /// Group B.
    b: ApproachGroup,
}

impl PayoffAggregator {
    /// Creates an aggregator for the two groups.
    pub fn new(a: ApproachGroup, b: ApproachGroup) -> Self {
        Self { a, b }
    }

    /// Gets the group of the given approach.
    pub fn group(&self, approach: Approach) -> &ApproachGroup {
        match approach {
            Approach::A => &self.a,
            Approach::B => &self.b,
        }
    }

    /// Every detector of both groups, group A first.
    pub fn detectors(&self) -> impl Iterator<Item = &str> {
        self.a
            .detectors
            .iter()
            .chain(&self.b.detectors)
            .map(String::as_str)
    }

    /// Sums the readings of each group's detectors.
    ///
    /// Every detector of both groups must be present in `readings`.
    pub fn aggregate(&self, readings: &Readings) -> Payoffs {
        Payoffs {
            a: Self::sum(&self.a, readings),
            b: Self::sum(&self.b, readings),
        }
    }

    fn sum(group: &ApproachGroup, readings: &Readings) -> u64 {
        group
            .detectors
            .iter()
            .map(|id| {
                let count = readings.get(id);
                debug_assert!(count.is_some(), "no reading for detector {id}");
                count.copied().map_or(0, u64::from)
            })
            .sum()
    }
}
