use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the two competing approaches at the intersection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Approach {
    A,
    B,
}

impl Approach {
    /// The approach competing with this one.
    pub const fn opposite(self) -> Self {
        match self {
            Approach::A => Approach::B,
            Approach::B => Approach::A,
        }
    }
}

/// The colour shown to the approach that holds right-of-way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Aspect {
    Green,
    Yellow,
}

/// The state of the signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    AGreen,
    AYellow,
    BGreen,
    BYellow,
}

impl Phase {
    /// Every phase, in cycle order.
    pub const ALL: [Phase; 4] = [Phase::AGreen, Phase::AYellow, Phase::BGreen, Phase::BYellow];

    /// The approach which currently holds (or is clearing) right-of-way.
    pub const fn approach(self) -> Approach {
        match self {
            Phase::AGreen | Phase::AYellow => Approach::A,
            Phase::BGreen | Phase::BYellow => Approach::B,
        }
    }

    /// Whether this phase is green or yellow.
    pub const fn aspect(self) -> Aspect {
        match self {
            Phase::AGreen | Phase::BGreen => Aspect::Green,
            Phase::AYellow | Phase::BYellow => Aspect::Yellow,
        }
    }

    /// Returns true for the two green phases.
    pub const fn is_green(self) -> bool {
        matches!(self.aspect(), Aspect::Green)
    }

    /// Gets the transition which leaves this phase.
    pub const fn transition(self) -> Transition {
        // The table is indexed in the same order as `Phase::ALL`.
        TRANSITIONS[self as usize]
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::AGreen => "A-Green",
            Phase::AYellow => "A-Yellow",
            Phase::BGreen => "B-Green",
            Phase::BYellow => "B-Yellow",
        };
        f.write_str(name)
    }
}

/// The condition under which a phase is left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// Leave once the minimum green time has elapsed and the
    /// challenging approach's payoff strictly exceeds the incumbent's.
    Challenge { challenger: Approach },
    /// Leave once the yellow clearance time has elapsed.
    Clearance,
}

/// A single row of the phase transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// The phase being left.
    pub from: Phase,
    /// When the phase is left.
    pub rule: Rule,
    /// The phase entered.
    pub to: Phase,
}

/// The transition table of the controller.
/// Each phase has exactly one way out, so the signal always cycles
/// `A-Green -> A-Yellow -> B-Green -> B-Yellow -> A-Green`.
pub const TRANSITIONS: [Transition; 4] = [
    Transition {
        from: Phase::AGreen,
        rule: Rule::Challenge {
            challenger: Approach::B,
        },
        to: Phase::AYellow,
    },
    Transition {
        from: Phase::AYellow,
        rule: Rule::Clearance,
        to: Phase::BGreen,
    },
    Transition {
        from: Phase::BGreen,
        rule: Rule::Challenge {
            challenger: Approach::A,
        },
        to: Phase::BYellow,
    },
    Transition {
        from: Phase::BYellow,
        rule: Rule::Clearance,
        to: Phase::AGreen,
    },
];

/// Maps the controller's phases onto the simulator's integer phase indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseIndices {
    /// Index of A-Green.
    pub a_green: i32,
    /// Index of A-Yellow.
    pub a_yellow: i32,
    /// Index of B-Green.
    pub b_green: i32,
    /// Index of B-Yellow.
    pub b_yellow: i32,
}

impl Default for PhaseIndices {
    fn default() -> Self {
        Self {
            a_green: 0,
            a_yellow: 1,
            b_green: 2,
            b_yellow: 3,
        }
    }
}

impl PhaseIndices {
    /// Gets the simulator index of a phase.
    pub const fn index_of(&self, phase: Phase) -> i32 {
        match phase {
            Phase::AGreen => self.a_green,
            Phase::AYellow => self.a_yellow,
            Phase::BGreen => self.b_green,
            Phase::BYellow => self.b_yellow,
        }
    }

    /// Gets the phase with the given simulator index, if any.
    pub fn phase_of(&self, index: i32) -> Option<Phase> {
        Phase::ALL
            .into_iter()
            .find(|phase| self.index_of(*phase) == index)
    }

    /// Returns true if no two phases share an index.
    pub fn is_injective(&self) -> bool {
        use itertools::Itertools;
        Phase::ALL.iter().map(|p| self.index_of(*p)).all_unique()
    }
}
