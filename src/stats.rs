use serde::{Deserialize, Serialize};
use std::{collections::HashMap, hash::Hash};

/// Running mean and standard deviation (Welford's algorithm).
pub struct Accumulator {
    n_vals: usize,
    mean: f64,
    diff_2_sum: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccumulatorReport {
    pub mean: f64,
    pub std_dev: f64,
}

impl Accumulator {
    pub fn new() -> Self {
        Self {
            n_vals: 0,
            mean: 0.0,
            diff_2_sum: 0.0,
        }
    }

    pub fn add(&mut self, val: f64) {
        self.n_vals += 1;

        let diff_a = val - self.mean;
        self.mean += diff_a / self.n_vals as f64;

        let diff_b = val - self.mean;
        self.diff_2_sum += diff_a * diff_b;
    }

    pub fn report(&self) -> AccumulatorReport {
        AccumulatorReport {
            mean: if self.n_vals > 0 { self.mean } else { f64::NAN },
            std_dev: if self.n_vals > 1 {
                (self.diff_2_sum / (self.n_vals as f64 - 1.0)).sqrt()
            } else {
                f64::NAN
            },
        }
    }
}

/// Per-step values of one observable over a run.
///
/// The report discards the initial transient chosen by the marginal standard
/// error rule before computing the summary.
pub struct TimeSeries {
    vals: Vec<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TimeSeriesReport {
    pub mean: f64,
    pub std_dev: f64,
    pub sem: f64,
    pub is_equil: bool,
}

impl TimeSeries {
    pub fn new() -> Self {
        Self { vals: Vec::new() }
    }

    /// Record a value; non-finite values are skipped.
    pub fn push(&mut self, val: f64) {
        if val.is_finite() {
            self.vals.push(val);
        }
    }

    pub fn report(&self) -> TimeSeriesReport {
        if self.vals.is_empty() {
            return TimeSeriesReport {
                mean: f64::NAN,
                std_dev: f64::NAN,
                sem: f64::NAN,
                is_equil: false,
            };
        }
        let i_equil = opt_equil_index(&self.vals);
        let equil = &self.vals[i_equil..];
        TimeSeriesReport {
            mean: mean(equil),
            std_dev: sample_var(equil).sqrt(),
            sem: blocking_sem(equil),
            is_equil: i_equil != self.vals.len() / 2,
        }
    }
}

/// Shannon entropy `-sum(p ln p)` of the empirical label distribution.
///
/// Zero for an empty sequence or a single distinct label.
pub fn shannon_entropy<T, I>(labels: I) -> f64
where
    T: Eq + Hash,
    I: IntoIterator<Item = T>,
{
    let mut counts: HashMap<T, usize> = HashMap::new();
    let mut n = 0usize;
    for label in labels {
        *counts.entry(label).or_default() += 1;
        n += 1;
    }
    // Fixed summation order keeps the result reproducible across runs.
    let mut counts: Vec<usize> = counts.into_values().collect();
    counts.sort_unstable();
    counts
        .into_iter()
        .map(|count| {
            let p = count as f64 / n as f64;
            -p * p.ln()
        })
        .sum()
}

/// Ordinary least squares fit `y = intercept + slope * x`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    pub rsquare: f64,
}

impl LinearFit {
    /// Fit the points `(xs[i], ys[i])`.
    ///
    /// Returns `None` with fewer than two points, mismatched lengths or no
    /// spread in `xs`.
    pub fn ols(xs: &[f64], ys: &[f64]) -> Option<Self> {
        let n = xs.len();
        if n < 2 || ys.len() != n {
            return None;
        }
        let x_mean = mean(xs);
        let y_mean = mean(ys);

        let mut sxx = 0.0;
        let mut sxy = 0.0;
        let mut syy = 0.0;
        for (&x, &y) in xs.iter().zip(ys) {
            sxx += (x - x_mean).powi(2);
            sxy += (x - x_mean) * (y - y_mean);
            syy += (y - y_mean).powi(2);
        }
        if sxx <= 0.0 {
            return None;
        }

        let slope = sxy / sxx;
        let intercept = y_mean - slope * x_mean;
        let ss_res: f64 = xs
            .iter()
            .zip(ys)
            .map(|(&x, &y)| (y - intercept - slope * x).powi(2))
            .sum();
        let rsquare = if syy > 0.0 { 1.0 - ss_res / syy } else { 1.0 };

        Some(Self {
            slope,
            intercept,
            rsquare,
        })
    }
}

pub fn mean(vals: &[f64]) -> f64 {
    if vals.is_empty() {
        return f64::NAN;
    }
    vals.iter().sum::<f64>() / vals.len() as f64
}

fn sample_var(vals: &[f64]) -> f64 {
    let n_vals = vals.len();
    if n_vals < 2 {
        return f64::NAN;
    }
    let mean = mean(vals);
    vals.iter().map(|&val| (val - mean).powi(2)).sum::<f64>() / (n_vals - 1) as f64
}

/// Standard error of the mean by Flyvbjerg-Petersen blocking.
fn blocking_sem(vals: &[f64]) -> f64 {
    let mut blocks = vals.to_vec();
    let mut ests = Vec::new();
    let mut errs = Vec::new();

    while blocks.len() >= 2 {
        let n_blocks = blocks.len() as f64;
        let est = sample_var(&blocks) / n_blocks;
        ests.push(est);
        errs.push(est * (2.0 / (n_blocks - 1.0)).sqrt());

        blocks = blocks
            .chunks_exact(2)
            .map(|pair| (pair[0] + pair[1]) / 2.0)
            .collect();
    }

    // First blocking level whose estimate exceeds every later lower bound.
    for (idx, &est) in ests.iter().enumerate() {
        let max_low = ests[idx..]
            .iter()
            .zip(&errs[idx..])
            .map(|(est, err)| est - err)
            .fold(f64::NEG_INFINITY, f64::max);
        if est > max_low {
            return est.sqrt();
        }
    }

    ests.last().copied().unwrap_or(f64::NAN).sqrt()
}

/// Start of the equilibrated part of a non-empty series (marginal standard error rule).
///
/// Only truncation points `n / 2^k` are tried; `n / 2` is the fallback.
fn opt_equil_index(vals: &[f64]) -> usize {
    let n_vals = vals.len();
    let n_idxs = n_vals.ilog2() + 1;
    let mut min_mse = f64::INFINITY;
    let mut opt_i_equil = n_vals / 2;

    for k in (1..=n_idxs).rev() {
        let i_equil = n_vals / 2usize.pow(k);
        let tail = &vals[i_equil..];
        let n_tail = tail.len();
        let mse = sample_var(tail) * (n_tail - 1) as f64 / n_tail.pow(2) as f64;
        if mse < min_mse {
            min_mse = mse;
            opt_i_equil = i_equil;
        }
    }

    opt_i_equil
}
