//! Exhaustive grid search.

use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;

use sophia_core::params::{ParamValue, ParameterSet};
use sophia_core::strategy::{StrategyConfig, StrategyKind};

use super::{evaluate_batch, OptimizationReport, SearchMethod};
use crate::fitness::FitnessMetric;
use crate::runner::BacktestContext;

/// Discrete values to try per parameter name.
pub type ParamGrid = BTreeMap<String, Vec<ParamValue>>;

fn ints(values: &[i64]) -> Vec<ParamValue> {
    values.iter().map(|v| ParamValue::Int(*v)).collect()
}

/// Grid used when the config names none.
pub fn default_grid(kind: StrategyKind) -> ParamGrid {
    let entries = match kind {
        StrategyKind::Turtle => [
            ("entry_period", ints(&[10, 20, 30, 40])),
            ("exit_period", ints(&[5, 10, 15, 20])),
            ("atr_period", ints(&[10, 14, 20])),
        ],
        StrategyKind::EmaCrossover => [
            ("fast_ema", ints(&[5, 9, 12, 15])),
            ("slow_ema", ints(&[20, 25, 30])),
            ("signal_ema", ints(&[5, 7, 9])),
        ],
    };
    entries
        .into_iter()
        .map(|(name, values)| (name.to_string(), values))
        .collect()
}

/// Cartesian product of a grid, lazily.
///
/// Names go in key order and the last name varies fastest, like an odometer.
/// An empty grid yields a single empty set.
pub struct GridIter<'a> {
    names: Vec<&'a str>,
    values: Vec<&'a [ParamValue]>,
    digits: Vec<usize>,
    done: bool,
}

pub fn enumerate_grid(grid: &ParamGrid) -> GridIter<'_> {
    GridIter {
        names: grid.keys().map(String::as_str).collect(),
        values: grid.values().map(Vec::as_slice).collect(),
        digits: vec![0; grid.len()],
        done: grid.values().any(Vec::is_empty),
    }
}

impl Iterator for GridIter<'_> {
    type Item = ParameterSet;

    fn next(&mut self) -> Option<ParameterSet> {
        if self.done {
            return None;
        }
        let current = self
            .names
            .iter()
            .zip(&self.values)
            .zip(&self.digits)
            .map(|((name, values), &d)| (name.to_string(), values[d]))
            .collect();

        self.done = true;
        for pos in (0..self.digits.len()).rev() {
            self.digits[pos] += 1;
            if self.digits[pos] < self.values[pos].len() {
                self.done = false;
                break;
            }
            self.digits[pos] = 0;
        }
        Some(current)
    }
}

/// Valid candidates in enumeration order, at most `max`.
///
/// Each is the base config's full parameter set with the grid point applied.
/// Points the strategy rejects (out of domain, fast >= slow) are skipped and
/// do not count against `max`.
pub fn grid_candidates(base: &StrategyConfig, grid: &ParamGrid, max: usize) -> Vec<ParameterSet> {
    enumerate_grid(grid)
        .filter_map(|point| match base.with_overrides(&point) {
            Ok(cfg) => Some(cfg.to_parameter_set()),
            Err(e) => {
                tracing::debug!(error = %e, "grid point skipped");
                None
            }
        })
        .take(max)
        .collect()
}

pub fn run_grid(
    ctx: &BacktestContext,
    base: &StrategyConfig,
    grid: &ParamGrid,
    max_combinations: usize,
    metric: FitnessMetric,
    cancel: Option<&AtomicBool>,
) -> OptimizationReport {
    let candidates = grid_candidates(base, grid, max_combinations);
    tracing::info!(candidates = candidates.len(), "grid search");

    let outcomes = evaluate_batch(ctx, base, &candidates, metric, cancel);
    let cancelled = outcomes.iter().any(Option::is_none);
    let evaluations = outcomes.into_iter().flatten().collect();

    OptimizationReport::from_evaluations(
        base.kind(),
        SearchMethod::Grid,
        metric,
        evaluations,
        cancelled,
        Vec::new(),
        Vec::new(),
    )
}
