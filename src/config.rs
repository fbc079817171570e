use crate::agent::AgentKind;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, fs, ops::RangeBounds, path::Path};

/// Simulation configuration parameters.
///
/// Loaded from a TOML file and validated before use.
/// Every field has a default, so an empty file is a valid configuration.
/// See [`Config::from_file`] for loading.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub model: ModelConfig,
    pub init: InitConfig,
    pub output: OutputConfig,
}

/// Model parameters, fixed for the whole run.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
    /// Grid height.
    pub height: usize,
    /// Grid width.
    pub width: usize,
    /// Number of agents.
    pub n_agents: usize,
    /// Negative externality (crowding) coefficient.
    pub neg_coff: f64,
    /// Agent activation discipline.
    pub activation: Activation,
    /// Number of skill groups.
    pub n_groups: usize,
    /// Neighborhood radius as a fraction of the grid width.
    pub radius_coff: f64,
    /// Agent variant.
    pub agent_kind: AgentKind,
    /// Number of candidate cells sampled per relocation decision.
    pub n_candidates: usize,
    /// Fixed utility bonus of work-from-home agents.
    pub wfh_bonus: f64,
    /// Whether the grid wraps around its edges.
    pub torus: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            height: 20,
            width: 20,
            n_agents: 1000,
            neg_coff: 0.1,
            activation: Activation::RandomSequential,
            n_groups: 3,
            radius_coff: 0.5,
            agent_kind: AgentKind::Standard,
            n_candidates: 8,
            wfh_bonus: 0.0,
            torus: true,
        }
    }
}

impl ModelConfig {
    /// Neighborhood radius in cells.
    pub fn radius(&self) -> usize {
        (self.radius_coff * self.width as f64).floor() as usize
    }
}

/// Initial condition parameters.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InitConfig {
    /// Seed of the random number generator (taken from the OS if absent).
    pub seed: Option<u64>,
}

/// Output parameters.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Number of steps between progress messages.
    pub steps_per_log: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { steps_per_log: 10 }
    }
}

/// Order in which agents are activated each step.
///
/// Encoded as `0` (random-sequential) or `1` (simultaneous) in the
/// configuration file; any other value is rejected while parsing.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Activation {
    /// Agents act one at a time in a freshly shuffled order and see earlier moves.
    #[default]
    RandomSequential,
    /// Agents decide on the start-of-step state and all moves are applied together.
    Simultaneous,
}

impl TryFrom<u8> for Activation {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::RandomSequential),
            1 => Ok(Self::Simultaneous),
            _ => Err(format!(
                "activation must be 0 (random) or 1 (simultaneous), but is {value}"
            )),
        }
    }
}

impl From<Activation> for u8 {
    fn from(activation: Activation) -> Self {
        match activation {
            Activation::RandomSequential => 0,
            Activation::Simultaneous => 1,
        }
    }
}

impl Config {
    /// Load a [`Config`] from a file.
    ///
    /// The file must be TOML-encoded and contain a serialized [`Config`].
    /// Performs validation on all parameters before returning.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, deserialized,
    /// or if the configuration values are invalid.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let contents =
            fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;

        let config: Config = toml::from_str(&contents).context("failed to deserialize config")?;

        config.validate().context("failed to validate config")?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let model = &self.model;

        check_num(model.height, 1..10_000).context("invalid grid height")?;
        check_num(model.width, 1..10_000).context("invalid grid width")?;
        check_num(model.n_agents, 1..1_000_000).context("invalid number of agents")?;
        check_num(model.neg_coff, 0.0..1000.0).context("invalid negative externality coefficient")?;
        check_num(model.n_groups, 1..1000).context("invalid number of skill groups")?;
        check_num(model.radius_coff, 0.0..=1.0).context("invalid radius coefficient")?;
        check_num(model.n_candidates, 1..10_000).context("invalid number of candidates")?;
        check_num(model.wfh_bonus, 0.0..1000.0).context("invalid work-from-home bonus")?;

        check_num(self.output.steps_per_log, 1..1_000_000)
            .context("invalid number of steps per log")?;

        Ok(())
    }
}

fn check_num<T, R>(num: T, range: R) -> Result<()>
where
    T: PartialOrd + Debug,
    R: RangeBounds<T> + Debug,
{
    if !range.contains(&num) {
        bail!("number must be in the range {range:?}, but is {num:?}");
    }
    Ok(())
}
