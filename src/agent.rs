use crate::config::ModelConfig;
use crate::grid::{Grid, Pos};
use anyhow::{Context, Result, ensure};
use rand::prelude::*;
use rand_chacha::ChaCha12Rng;
use serde::{Deserialize, Serialize};

/// 64-bit fractional part of the golden ratio, used to spread agent ids over the seed space.
const SEED_MIXING: u64 = 0x9e37_79b9_7f4a_7c15;

/// Agent variant, selecting the utility rule.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    /// Utility depends on own ability and local crowding.
    #[default]
    Standard,
    /// Utility depends on own ability only, so location never matters.
    WorkFromHome,
}

/// Read-only view of the model handed to an agent when it decides.
pub struct StepContext<'a> {
    pub grid: &'a Grid,
    pub model: &'a ModelConfig,
    /// Neighborhood radius in cells.
    pub radius: usize,
    /// Seed shared by all decisions of the current step.
    pub tick_seed: u64,
}

/// Outcome of an agent's decision, applied later by [`Agent::commit`].
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct Decision {
    pub id: usize,
    pub from: Pos,
    pub to: Pos,
    /// Utility evaluated at `to` against the grid the agent decided on.
    ///
    /// Under simultaneous activation this is the start-of-step estimate; moves
    /// committed later in the same step are not reflected.
    pub utility: f64,
}

impl Decision {
    pub fn moves(&self) -> bool {
        self.from != self.to
    }
}

/// Agent of the simulation.
///
/// The ability is drawn once at creation and never changes; only the
/// position and the utility evolve.
#[derive(Debug, Clone)]
pub struct Agent {
    id: usize,
    ability: f64,
    skill_group: usize,
    pos: Pos,
    utility: f64,
    kind: AgentKind,
}

impl Agent {
    pub fn new(id: usize, ability: f64, n_groups: usize, pos: Pos, kind: AgentKind) -> Self {
        Self {
            id,
            ability,
            skill_group: skill_group(ability, n_groups),
            pos,
            utility: f64::NAN,
            kind,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn ability(&self) -> f64 {
        self.ability
    }

    pub fn skill_group(&self) -> usize {
        self.skill_group
    }

    pub fn pos(&self) -> Pos {
        self.pos
    }

    pub fn utility(&self) -> f64 {
        self.utility
    }

    /// Number of other agents within the neighborhood of `pos`.
    pub fn count_neighbors(&self, ctx: &StepContext, pos: Pos) -> usize {
        ctx.grid
            .agents_within(pos, ctx.radius)
            .filter(|&other| other != self.id)
            .count()
    }

    /// Utility this agent would obtain on `pos`.
    pub fn utility_at(&self, ctx: &StepContext, pos: Pos) -> f64 {
        match self.kind {
            AgentKind::Standard => {
                let n_nbr = self.count_neighbors(ctx, pos);
                crowded_utility(self.ability, n_nbr, ctx.model.neg_coff)
            }
            AgentKind::WorkFromHome => 1.0 + self.ability + ctx.model.wfh_bonus,
        }
    }

    /// Choose where to be after this step without touching the grid.
    ///
    /// Candidate cells are drawn from a generator derived from the step seed and
    /// the agent id, so the result does not depend on when the agent is asked.
    /// The agent only moves to a candidate that strictly beats its current cell.
    pub fn decide(&self, ctx: &StepContext) -> Decision {
        let mut best_pos = self.pos;
        let mut best_utility = self.utility_at(ctx, self.pos);

        if self.kind == AgentKind::Standard {
            let mut rng = self.decision_rng(ctx.tick_seed);
            for _ in 0..ctx.model.n_candidates {
                let pos = (
                    rng.random_range(0..ctx.grid.width()),
                    rng.random_range(0..ctx.grid.height()),
                );
                let utility = self.utility_at(ctx, pos);
                if utility > best_utility {
                    best_pos = pos;
                    best_utility = utility;
                }
            }
        }

        Decision {
            id: self.id,
            from: self.pos,
            to: best_pos,
            utility: best_utility,
        }
    }

    /// Apply a decision of this agent to itself and to the grid.
    pub fn commit(&mut self, decision: &Decision, grid: &mut Grid) -> Result<()> {
        ensure!(
            decision.id == self.id && decision.from == self.pos,
            "decision of agent {} from {:?} does not match agent {} on {:?}",
            decision.id,
            decision.from,
            self.id,
            self.pos
        );
        if decision.moves() {
            grid.move_agent(self.id, self.pos, decision.to)
                .with_context(|| format!("failed to move agent {}", self.id))?;
            log::trace!(
                "agent {} moved {:?} -> {:?}",
                self.id,
                decision.from,
                decision.to
            );
            self.pos = decision.to;
        }
        self.utility = decision.utility;
        Ok(())
    }

    pub(crate) fn set_utility(&mut self, utility: f64) {
        self.utility = utility;
    }

    fn decision_rng(&self, tick_seed: u64) -> ChaCha12Rng {
        ChaCha12Rng::seed_from_u64(tick_seed ^ (self.id as u64).wrapping_mul(SEED_MIXING))
    }
}

/// Skill group of an ability when `[0, 1]` is split into `n_groups` equal bins.
pub fn skill_group(ability: f64, n_groups: usize) -> usize {
    ((ability * n_groups as f64).floor() as usize).min(n_groups - 1)
}

/// Utility of an agent of the given ability with `n_nbr` neighbors.
///
/// Increasing in the ability, decreasing in the number of neighbors when
/// `neg_coff > 0` and independent of it when `neg_coff == 0`.
pub fn crowded_utility(ability: f64, n_nbr: usize, neg_coff: f64) -> f64 {
    (1.0 + ability) / (1.0 + neg_coff * n_nbr as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(neg_coff: f64) -> ModelConfig {
        ModelConfig {
            height: 6,
            width: 6,
            n_agents: 4,
            neg_coff,
            radius_coff: 0.0,
            n_candidates: 36,
            ..ModelConfig::default()
        }
    }

    fn ctx<'a>(grid: &'a Grid, model: &'a ModelConfig) -> StepContext<'a> {
        StepContext {
            grid,
            model,
            radius: model.radius(),
            tick_seed: 11,
        }
    }

    #[test]
    fn skill_groups_partition_unit_interval() {
        assert_eq!(skill_group(0.0, 3), 0);
        assert_eq!(skill_group(0.33, 3), 0);
        assert_eq!(skill_group(0.34, 3), 1);
        assert_eq!(skill_group(0.99, 3), 2);
        assert_eq!(skill_group(1.0, 3), 2);
        assert_eq!(skill_group(0.5, 1), 0);
        assert_eq!(skill_group(0.7, 3), skill_group(0.7, 3));
    }

    #[test]
    fn utility_increases_with_ability() {
        for n_nbr in [0, 1, 10] {
            for neg_coff in [0.0, 0.1, 2.0] {
                assert!(crowded_utility(0.6, n_nbr, neg_coff) > crowded_utility(0.5, n_nbr, neg_coff));
            }
        }
    }

    #[test]
    fn utility_decreases_with_crowding() {
        let mut prev = crowded_utility(0.0, 0, 0.1);
        for n_nbr in 1..20 {
            let next = crowded_utility(0.0, n_nbr, 0.1);
            assert!(next < prev);
            prev = next;
        }
    }

    #[test]
    fn utility_ignores_crowding_without_externality() {
        assert_eq!(crowded_utility(0.3, 0, 0.0), crowded_utility(0.3, 50, 0.0));
        assert_eq!(crowded_utility(0.3, 7, 0.0), 1.0 + 0.3);
    }

    #[test]
    fn denser_cell_lowers_utility_at_current_position() {
        let model = model(0.1);
        let mut grid = Grid::new(6, 6, true);
        let agent = Agent::new(0, 0.5, 3, (2, 2), AgentKind::Standard);
        grid.place_agent(0, (2, 2)).unwrap();
        let sparse = agent.utility_at(&ctx(&grid, &model), (2, 2));

        grid.place_agent(1, (2, 2)).unwrap();
        let dense = agent.utility_at(&ctx(&grid, &model), (2, 2));
        assert!(dense < sparse);
        assert_eq!(agent.count_neighbors(&ctx(&grid, &model), (2, 2)), 1);
    }

    #[test]
    fn crowded_agent_moves_to_empty_cell() {
        let model = model(0.5);
        let mut grid = Grid::new(6, 6, true);
        let agent = Agent::new(0, 0.5, 3, (0, 0), AgentKind::Standard);
        for id in 0..4 {
            grid.place_agent(id, (0, 0)).unwrap();
        }

        let decision = agent.decide(&ctx(&grid, &model));
        assert!(decision.moves());
        assert!(grid.cell(decision.to).is_empty());
        assert_eq!(decision.utility, 1.5);
    }

    #[test]
    fn agent_stays_without_strict_improvement() {
        let model = model(0.5);
        let mut grid = Grid::new(6, 6, true);
        let agent = Agent::new(0, 0.5, 3, (3, 3), AgentKind::Standard);
        grid.place_agent(0, (3, 3)).unwrap();

        let decision = agent.decide(&ctx(&grid, &model));
        assert!(!decision.moves());
        assert_eq!(decision.to, (3, 3));
        assert_eq!(decision.utility, 1.5);
    }

    #[test]
    fn decision_ignores_neighbors_without_externality() {
        let model = model(0.0);
        let agent = Agent::new(0, 0.25, 3, (1, 1), AgentKind::Standard);

        let mut sparse = Grid::new(6, 6, true);
        sparse.place_agent(0, (1, 1)).unwrap();

        let mut dense = Grid::new(6, 6, true);
        dense.place_agent(0, (1, 1)).unwrap();
        for id in 1..10 {
            dense.place_agent(id, (1, 1)).unwrap();
        }

        let a = agent.decide(&ctx(&sparse, &model));
        let b = agent.decide(&ctx(&dense, &model));
        assert_eq!(a, b);
        assert!(!a.moves());
    }

    #[test]
    fn decision_is_reproducible_for_a_seed() {
        let model = model(0.5);
        let mut grid = Grid::new(6, 6, true);
        let agent = Agent::new(3, 0.9, 3, (4, 4), AgentKind::Standard);
        grid.place_agent(3, (4, 4)).unwrap();
        grid.place_agent(1, (4, 4)).unwrap();

        let ctx = ctx(&grid, &model);
        assert_eq!(agent.decide(&ctx), agent.decide(&ctx));
    }

    #[test]
    fn work_from_home_agent_never_moves() {
        let model = ModelConfig {
            wfh_bonus: 0.25,
            ..model(1.0)
        };
        let mut grid = Grid::new(6, 6, true);
        let agent = Agent::new(0, 0.5, 3, (0, 0), AgentKind::WorkFromHome);
        for id in 0..5 {
            grid.place_agent(id, (0, 0)).unwrap();
        }

        let decision = agent.decide(&ctx(&grid, &model));
        assert!(!decision.moves());
        assert_eq!(decision.utility, 1.75);
    }

    #[test]
    fn commit_updates_agent_and_grid() {
        let mut grid = Grid::new(4, 4, true);
        let mut agent = Agent::new(2, 0.4, 2, (0, 0), AgentKind::Standard);
        grid.place_agent(2, (0, 0)).unwrap();

        let decision = Decision {
            id: 2,
            from: (0, 0),
            to: (3, 1),
            utility: 1.2,
        };
        agent.commit(&decision, &mut grid).unwrap();
        assert_eq!(agent.pos(), (3, 1));
        assert_eq!(agent.utility(), 1.2);
        assert_eq!(grid.cell((3, 1)), &[2]);
        assert!(grid.cell((0, 0)).is_empty());
    }

    #[test]
    fn commit_rejects_foreign_or_stale_decision() {
        let mut grid = Grid::new(4, 4, true);
        let mut agent = Agent::new(2, 0.4, 2, (0, 0), AgentKind::Standard);
        grid.place_agent(2, (0, 0)).unwrap();
        grid.place_agent(3, (0, 0)).unwrap();

        let foreign = Decision {
            id: 3,
            from: (0, 0),
            to: (1, 1),
            utility: 1.0,
        };
        assert!(agent.commit(&foreign, &mut grid).is_err());

        let stale = Decision {
            id: 2,
            from: (2, 2),
            to: (1, 1),
            utility: 1.0,
        };
        assert!(agent.commit(&stale, &mut grid).is_err());

        assert_eq!(agent.pos(), (0, 0));
        assert!(agent.utility().is_nan());
        assert_eq!(grid.cell((0, 0)), &[2, 3]);
        assert!(grid.cell((1, 1)).is_empty());
    }
}
