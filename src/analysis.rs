use crate::config::Config;
use crate::grid::Grid;
use crate::model::State;
use crate::stats::{Accumulator, LinearFit, TimeSeries, mean, shannon_entropy};
use anyhow::{Context, Result, bail};
use serde::Serialize;
use std::collections::VecDeque;

/// Agents of a connected group of occupied cells (8-cell adjacency).
#[derive(Debug, Clone, PartialEq)]
pub struct City {
    pub members: Vec<usize>,
}

impl City {
    pub fn size(&self) -> usize {
        self.members.len()
    }
}

/// Find all cities on the grid, largest first.
pub fn find_cities(grid: &Grid) -> Vec<City> {
    let width = grid.width();
    let mut visited = vec![false; width * grid.height()];
    let mut cities = Vec::new();
    let mut queue = VecDeque::new();

    for start in grid.positions() {
        if visited[start.1 * width + start.0] || grid.cell(start).is_empty() {
            continue;
        }
        visited[start.1 * width + start.0] = true;
        queue.push_back(start);

        let mut city = City {
            members: Vec::new(),
        };
        while let Some(pos) = queue.pop_front() {
            city.members.extend_from_slice(grid.cell(pos));
            for next in grid.neighborhood(pos, 1) {
                let idx = next.1 * width + next.0;
                if !visited[idx] && !grid.cell(next).is_empty() {
                    visited[idx] = true;
                    queue.push_back(next);
                }
            }
        }
        cities.push(city);
    }

    cities.sort_by(|a, b| b.size().cmp(&a.size()));
    cities
}

/// Statistics of the population at one step.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub step: usize,
    pub n_cities: usize,
    /// City sizes, largest first.
    pub city_sizes: Vec<usize>,
    /// Rank of each entry of `city_sizes`.
    pub ranks: Vec<usize>,
    /// Mean agent utility.
    pub utility: f64,
    /// Fraction of agents in each skill group.
    pub skill_dist: Vec<f64>,
    /// Rank-size power law fit quality.
    pub rsquare: f64,
    /// Slope of `ln(rank)` against `ln(size)`.
    pub beta: f64,
    /// Mean over cities of the skill group entropy of their members.
    pub mean_entropy: f64,
}

impl StepReport {
    pub fn new(step: usize, state: &State, n_groups: usize) -> Result<Self> {
        let records = state.snapshot();
        let cities = find_cities(&state.grid);

        let city_sizes: Vec<usize> = cities.iter().map(City::size).collect();
        let ranks: Vec<usize> = (1..=city_sizes.len()).collect();

        let utilities: Vec<f64> = records.iter().map(|rec| rec.utility).collect();

        let mut skill_dist = vec![0.0; n_groups];
        for rec in &records {
            let Some(share) = skill_dist.get_mut(rec.skill_group) else {
                bail!(
                    "agent {} has skill group {} but there are {n_groups} groups",
                    rec.id,
                    rec.skill_group
                );
            };
            *share += 1.0;
        }
        skill_dist
            .iter_mut()
            .for_each(|share| *share /= records.len() as f64);

        let log_sizes: Vec<f64> = city_sizes.iter().map(|&size| (size as f64).ln()).collect();
        let log_ranks: Vec<f64> = ranks.iter().map(|&rank| (rank as f64).ln()).collect();
        let fit = LinearFit::ols(&log_sizes, &log_ranks);

        let entropies: Vec<f64> = cities
            .iter()
            .map(|city| shannon_entropy(city.members.iter().map(|&id| records[id].skill_group)))
            .collect();

        Ok(Self {
            step,
            n_cities: cities.len(),
            city_sizes,
            ranks,
            utility: mean(&utilities),
            skill_dist,
            rsquare: fit.map_or(f64::NAN, |fit| fit.rsquare),
            beta: fit.map_or(f64::NAN, |fit| fit.slope),
            mean_entropy: mean(&entropies),
        })
    }
}

pub trait Obs {
    fn update(&mut self, report: &StepReport) -> Result<()>;
    fn report(&self) -> serde_json::Value;
}

/// Time series of one scalar of the step report.
pub struct Scalar {
    name: &'static str,
    extract: fn(&StepReport) -> f64,
    time_series: TimeSeries,
}

impl Scalar {
    pub fn new(name: &'static str, extract: fn(&StepReport) -> f64) -> Self {
        Self {
            name,
            extract,
            time_series: TimeSeries::new(),
        }
    }
}

impl Obs for Scalar {
    fn update(&mut self, report: &StepReport) -> Result<()> {
        self.time_series.push((self.extract)(report));
        Ok(())
    }

    fn report(&self) -> serde_json::Value {
        serde_json::json!({ self.name: self.time_series.report() })
    }
}

pub struct SkillDist {
    acc_vec: Vec<Accumulator>,
}

impl SkillDist {
    pub fn new(cfg: &Config) -> Self {
        let mut acc_vec = Vec::new();
        acc_vec.resize_with(cfg.model.n_groups, Accumulator::new);
        Self { acc_vec }
    }
}

impl Obs for SkillDist {
    fn update(&mut self, report: &StepReport) -> Result<()> {
        if report.skill_dist.len() != self.acc_vec.len() {
            bail!(
                "skill distribution has {} groups, expected {}",
                report.skill_dist.len(),
                self.acc_vec.len()
            );
        }
        for (acc, &share) in self.acc_vec.iter_mut().zip(&report.skill_dist) {
            acc.add(share);
        }
        Ok(())
    }

    fn report(&self) -> serde_json::Value {
        let reports: Vec<_> = self.acc_vec.iter().map(|acc| acc.report()).collect();
        serde_json::json!({ "skill_dist": reports })
    }
}

/// Collects a [`StepReport`] per step and feeds it to every observable.
pub struct Analyzer {
    n_groups: usize,
    keep_steps: bool,
    steps: Vec<StepReport>,
    obs_ptr_vec: Vec<Box<dyn Obs>>,
}

impl Analyzer {
    pub fn new(cfg: &Config, keep_steps: bool) -> Self {
        let obs_ptr_vec: Vec<Box<dyn Obs>> = vec![
            Box::new(Scalar::new("utility", |rep| rep.utility)),
            Box::new(Scalar::new("n_cities", |rep| rep.n_cities as f64)),
            Box::new(Scalar::new("largest_city", |rep| {
                rep.city_sizes.first().map_or(f64::NAN, |&size| size as f64)
            })),
            Box::new(Scalar::new("beta", |rep| rep.beta)),
            Box::new(Scalar::new("rsquare", |rep| rep.rsquare)),
            Box::new(Scalar::new("mean_entropy", |rep| rep.mean_entropy)),
            Box::new(SkillDist::new(cfg)),
        ];
        Self {
            n_groups: cfg.model.n_groups,
            keep_steps,
            steps: Vec::new(),
            obs_ptr_vec,
        }
    }

    pub fn update(&mut self, step: usize, state: &State) -> Result<()> {
        let report =
            StepReport::new(step, state, self.n_groups).context("failed to build step report")?;
        log::debug!(
            "step {step}: {} cities, utility {:.4}, beta {:.4}",
            report.n_cities,
            report.utility,
            report.beta
        );

        for obs in &mut self.obs_ptr_vec {
            obs.update(&report).context("failed to update observable")?;
        }
        if self.keep_steps {
            self.steps.push(report);
        }
        Ok(())
    }

    pub fn report(&self) -> serde_json::Value {
        let observables: Vec<_> = self.obs_ptr_vec.iter().map(|obs| obs.report()).collect();
        if self.keep_steps {
            serde_json::json!({ "observables": observables, "steps": self.steps })
        } else {
            serde_json::json!({ "observables": observables })
        }
    }
}
