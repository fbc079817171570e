use crate::agent::{Agent, Decision, StepContext};
use crate::analysis::Analyzer;
use crate::config::{Activation, Config};
use crate::grid::Grid;
use crate::model::State;
use anyhow::{Context, Result};
use rand::prelude::*;
use rand_chacha::ChaCha12Rng;
use rand_distr::Uniform;

/// Simulation engine.
///
/// Holds the configuration, current state, and random number generator,
/// and provides methods to initialize and advance the simulation.
#[derive(Clone)]
pub struct Engine {
    cfg: Config,
    state: State,
    rng: ChaCha12Rng,
    radius: usize,
    step: usize,
}

impl Engine {
    /// Create a new `Engine` with the given configuration and a random initial state.
    ///
    /// Every agent gets a uniform ability in `[0, 1)` and a uniform random cell.
    pub fn generate_initial_condition(cfg: Config) -> Result<Self> {
        cfg.validate().context("failed to validate config")?;

        let mut rng = match cfg.init.seed {
            Some(seed) => ChaCha12Rng::seed_from_u64(seed),
            None => ChaCha12Rng::try_from_os_rng()?,
        };

        let model = &cfg.model;
        let ability_dist = Uniform::new(0.0, 1.0)?;
        let x_dist = Uniform::new(0, model.width)?;
        let y_dist = Uniform::new(0, model.height)?;

        let mut grid = Grid::new(model.width, model.height, model.torus);
        let mut agents = Vec::with_capacity(model.n_agents);
        for id in 0..model.n_agents {
            let ability = ability_dist.sample(&mut rng);
            let pos = (x_dist.sample(&mut rng), y_dist.sample(&mut rng));
            grid.place_agent(id, pos)
                .with_context(|| format!("failed to place agent {id}"))?;
            agents.push(Agent::new(id, ability, model.n_groups, pos, model.agent_kind));
        }
        let radius = model.radius();

        let mut engine = Self {
            cfg,
            state: State { agents, grid },
            rng,
            radius,
            step: 0,
        };
        engine.init_utilities();

        Ok(engine)
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    /// Number of steps performed so far.
    pub fn step(&self) -> usize {
        self.step
    }

    /// Run `n_steps` steps, handing the state before each step to the analyzer.
    pub fn run(&mut self, n_steps: usize, analyzer: &mut Analyzer) -> Result<()> {
        let steps_per_log = self.cfg.output.steps_per_log;

        for i_step in 0..n_steps {
            analyzer
                .update(self.step, &self.state)
                .context("failed to update analyzer")?;

            self.perform_step()
                .with_context(|| format!("failed to perform step {}", self.step))?;

            if (i_step + 1) % steps_per_log == 0 || i_step + 1 == n_steps {
                let progress = 100.0 * (i_step + 1) as f64 / n_steps as f64;
                log::info!("completed {progress:06.2}%");
            }
        }

        Ok(())
    }

    /// Activate every agent exactly once.
    pub fn perform_step(&mut self) -> Result<()> {
        let tick_seed: u64 = self.rng.random();

        let n_moves = match self.cfg.model.activation {
            Activation::RandomSequential => self.step_random_sequential(tick_seed)?,
            Activation::Simultaneous => self.step_simultaneous(tick_seed)?,
        };

        self.step += 1;
        log::debug!("step {}: {n_moves} agents moved", self.step);

        Ok(())
    }

    /// Fresh random activation order, drawn from the engine generator.
    fn activation_order(&mut self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.state.agents.len()).collect();
        order.shuffle(&mut self.rng);
        order
    }

    fn step_random_sequential(&mut self, tick_seed: u64) -> Result<usize> {
        let order = self.activation_order();

        let mut n_moves = 0;
        for i_agt in order {
            // Later agents see the moves of earlier ones.
            let decision = self.state.agents[i_agt].decide(&self.context(tick_seed));
            if decision.moves() {
                n_moves += 1;
            }
            self.state.agents[i_agt]
                .commit(&decision, &mut self.state.grid)
                .context("failed to commit decision")?;
        }

        Ok(n_moves)
    }

    fn step_simultaneous(&mut self, tick_seed: u64) -> Result<usize> {
        let order: Vec<usize> = (0..self.state.agents.len()).collect();
        let decisions = self.decide_all(&order, tick_seed);
        let n_moves = decisions.iter().filter(|decision| decision.moves()).count();
        self.commit_all(&decisions)?;
        Ok(n_moves)
    }

    /// Decisions of the agents in `order`, all taken against the current grid.
    pub(crate) fn decide_all(&self, order: &[usize], tick_seed: u64) -> Vec<Decision> {
        let ctx = self.context(tick_seed);
        order
            .iter()
            .map(|&i_agt| self.state.agents[i_agt].decide(&ctx))
            .collect()
    }

    pub(crate) fn commit_all(&mut self, decisions: &[Decision]) -> Result<()> {
        for decision in decisions {
            self.state.agents[decision.id]
                .commit(decision, &mut self.state.grid)
                .context("failed to commit decision")?;
        }
        Ok(())
    }

    fn context(&self, tick_seed: u64) -> StepContext<'_> {
        StepContext {
            grid: &self.state.grid,
            model: &self.cfg.model,
            radius: self.radius,
            tick_seed,
        }
    }

    fn init_utilities(&mut self) {
        let ctx = self.context(0);
        let utilities: Vec<f64> = self
            .state
            .agents
            .iter()
            .map(|agt| agt.utility_at(&ctx, agt.pos()))
            .collect();
        for (agt, utility) in self.state.agents.iter_mut().zip(utilities) {
            agt.set_utility(utility);
        }
    }
}
