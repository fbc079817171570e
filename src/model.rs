use crate::agent::Agent;
use crate::grid::{Grid, Pos};
use serde::{Deserialize, Serialize};

/// State of the simulation at a given step.
///
/// `agents[i]` is the agent with id `i`.
#[derive(Clone)]
pub struct State {
    pub agents: Vec<Agent>,

    pub grid: Grid,
}

/// Snapshot of one agent, as read by the reporter after each step.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: usize,
    pub ability: f64,
    pub skill_group: usize,
    pub pos: Pos,
    pub utility: f64,
}

impl From<&Agent> for AgentRecord {
    fn from(agent: &Agent) -> Self {
        Self {
            id: agent.id(),
            ability: agent.ability(),
            skill_group: agent.skill_group(),
            pos: agent.pos(),
            utility: agent.utility(),
        }
    }
}

impl State {
    pub fn snapshot(&self) -> Vec<AgentRecord> {
        self.agents.iter().map(AgentRecord::from).collect()
    }
}
