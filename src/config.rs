//! Startup configuration, loaded from TOML and validated once before a run.

use crate::payoff::ApproachGroup;
use crate::phase::PhaseIndices;
use crate::{Error, Result};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// The environment variable naming the SUMO installation directory.
pub const SUMO_HOME_VAR: &str = "SUMO_HOME";

/// The complete configuration of a control run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Read the detectors on every step, not only when a green decision is due.
    pub telemetry_every_step: bool,
    /// How to launch SUMO.
    pub sumo: SumoConfig,
    /// The controlled signal.
    pub signal: SignalConfig,
    /// The detectors of each approach.
    pub groups: GroupsConfig,
    /// The built-in queue model.
    pub synthetic: SyntheticConfig,
}

/// How to start and reach SUMO.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SumoConfig {
    /// The SUMO installation directory. Falls back to `SUMO_HOME`.
    pub home: Option<PathBuf>,
    /// Run `sumo-gui` instead of `sumo`.
    pub gui: bool,
    /// The `.sumocfg` scenario to load.
    pub config_file: PathBuf,
    /// The TraCI port. A free port is chosen when absent.
    pub port: Option<u16>,
    /// How many times to try connecting, one second apart.
    pub connect_retries: u32,
    /// Extra command line arguments passed to SUMO.
    pub extra_args: Vec<String>,
}

impl Default for SumoConfig {
    fn default() -> Self {
        Self {
            home: None,
            gui: true,
            config_file: PathBuf::from("run.sumocfg"),
            port: None,
            connect_retries: 60,
            extra_args: vec![],
        }
    }
}

impl SumoConfig {
    /// Finds the SUMO binary, using `SUMO_HOME` when no home is configured.
    pub fn resolve_binary(&self) -> Result<PathBuf> {
        self.resolve_binary_with(|name| std::env::var_os(name))
    }

    fn resolve_binary_with(&self, env: impl Fn(&str) -> Option<OsString>) -> Result<PathBuf> {
        let home = match &self.home {
            Some(home) => home.clone(),
            None => env(SUMO_HOME_VAR).map(PathBuf::from).ok_or_else(|| {
                Error::config(format!(
                    "please declare environment variable '{SUMO_HOME_VAR}'"
                ))
            })?,
        };
        let name = if self.gui { "sumo-gui" } else { "sumo" };
        Ok(home.join("bin").join(name))
    }
}

/// The controlled signal and its timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// The traffic light ID in the scenario.
    pub id: String,
    /// Steps a green phase is held before it may yield.
    pub min_green: u64,
    /// Steps a yellow phase is held before the opposing green.
    pub yellow_clearance: u64,
    /// The simulator phase index of each controller phase.
    pub phases: PhaseIndices,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            id: "Center".to_string(),
            min_green: 10,
            yellow_clearance: 4,
            phases: PhaseIndices::default(),
        }
    }
}

/// The two competing approach groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupsConfig {
    /// The approach which starts with right-of-way.
    pub a: ApproachGroup,
    /// The approach which challenges it.
    pub b: ApproachGroup,
}

impl Default for GroupsConfig {
    fn default() -> Self {
        let cameras = |dirs: [char; 2]| {
            dirs.into_iter()
                .flat_map(|dir| (0..3).map(move |lane| format!("cam_{dir}_{lane}")))
                .collect::<Vec<_>>()
        };
        Self {
            a: ApproachGroup::new("north-south", cameras(['N', 'S'])),
            b: ApproachGroup::new("east-west", cameras(['E', 'W'])),
        }
    }
}

/// Parameters of the built-in queue simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    pub seed: u64,
    /// Total vehicles to generate over the run.
    pub vehicles: u32,
    /// Mean arrivals per detector per step, while demand remains.
    pub arrival_rate: f64,
    /// Vehicles leaving each detector per step on green.
    pub discharge_per_step: u32,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            vehicles: 2000,
            arrival_rate: 0.15,
            discharge_per_step: 1,
        }
    }
}

impl ControllerConfig {
    /// Loads a configuration file, or the defaults if it does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Serialises the configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Checks that the configuration describes a controllable intersection.
    /// This does not look for SUMO; see [SumoConfig::resolve_binary].
    pub fn validate(&self) -> Result<()> {
        if self.signal.id.trim().is_empty() {
            return Err(Error::config("signal id must not be empty"));
        }
        if !self.signal.phases.is_injective() {
            return Err(Error::config(format!(
                "phase indices must be distinct: {:?}",
                self.signal.phases
            )));
        }
        for group in [&self.groups.a, &self.groups.b] {
            if group.detectors.is_empty() {
                return Err(Error::config(format!(
                    "approach group '{}' has no detectors",
                    group.name
                )));
            }
        }
        let duplicates = self
            .groups
            .a
            .detectors
            .iter()
            .chain(&self.groups.b.detectors)
            .duplicates()
            .join(", ");
        if !duplicates.is_empty() {
            return Err(Error::config(format!(
                "detectors listed more than once: {duplicates}"
            )));
        }
        let synthetic = &self.synthetic;
        if !(synthetic.arrival_rate.is_finite() && synthetic.arrival_rate >= 0.0) {
            return Err(Error::config(format!(
                "arrival rate must be a non-negative number, got {}",
                synthetic.arrival_rate
            )));
        }
        if synthetic.discharge_per_step == 0 {
            return Err(Error::config("discharge per step must be at least 1"));
        }
        Ok(())
    }
}
