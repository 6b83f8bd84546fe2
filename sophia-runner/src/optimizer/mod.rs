//! Parameter search over one strategy family.
//!
//! Both methods share the same evaluation path: a candidate `ParameterSet` is
//! applied on top of the base strategy config, run through `run_backtest`, and
//! scored by the fitness metric. Failed candidates score `-inf` and the search
//! continues. Evaluation runs on rayon; every candidate owns its simulator.

mod genetic;
mod grid;

pub use genetic::{run_genetic, GeneticConfig};
pub use grid::{default_grid, enumerate_grid, grid_candidates, run_grid, GridIter, ParamGrid};

use rayon::prelude::*;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

use sophia_core::params::{ConfigError, ParameterDomain, ParameterSet};
use sophia_core::strategy::{StrategyConfig, StrategyKind};

use crate::config::OptimizerConfig;
use crate::fitness::FitnessMetric;
use crate::metrics::PerformanceMetrics;
use crate::runner::{run_backtest, BacktestContext, RunError, SCHEMA_VERSION};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMethod {
    #[default]
    Grid,
    Genetic,
}

/// Outcome of evaluating one candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub parameters: ParameterSet,
    pub score: f64,
    pub metrics: Option<PerformanceMetrics>,
    pub error: Option<String>,
}

/// One evaluated candidate with its position in the ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    /// 1-based position after ranking.
    pub rank: usize,
    /// Order in which the candidate was first evaluated.
    pub index: usize,
    pub fingerprint: String,
    pub parameters: ParameterSet,
    #[serde(deserialize_with = "score_or_neg_inf")]
    pub score: f64,
    pub metrics: Option<PerformanceMetrics>,
    pub error: Option<String>,
}

/// JSON writes `-inf` as `null`; read it back as a disqualified score.
fn score_or_neg_inf<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(d)?.unwrap_or(f64::NEG_INFINITY))
}

fn scores_or_neg_inf<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<f64>, D::Error> {
    let raw = Vec::<Option<f64>>::deserialize(d)?;
    Ok(raw.into_iter().map(|s| s.unwrap_or(f64::NEG_INFINITY)).collect())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationReport {
    pub schema_version: u32,
    pub strategy: StrategyKind,
    pub method: SearchMethod,
    pub metric: FitnessMetric,
    /// Best first. Ties keep evaluation order.
    pub candidates: Vec<RankedCandidate>,
    /// Best qualified candidate, if any run succeeded.
    pub best: Option<RankedCandidate>,
    pub evaluated: usize,
    pub cancelled: bool,
    /// Best score seen up to and including each generation. Empty for grid search.
    #[serde(deserialize_with = "scores_or_neg_inf")]
    pub generation_best: Vec<f64>,
    /// Highest score within each generation's population. Elitism keeps it
    /// from falling. Empty for grid search.
    #[serde(default, deserialize_with = "scores_or_neg_inf")]
    pub population_best: Vec<f64>,
}

impl OptimizationReport {
    pub(crate) fn from_evaluations(
        strategy: StrategyKind,
        method: SearchMethod,
        metric: FitnessMetric,
        evaluations: Vec<Evaluation>,
        cancelled: bool,
        generation_best: Vec<f64>,
        population_best: Vec<f64>,
    ) -> Self {
        let evaluated = evaluations.len();
        let candidates = rank(evaluations);
        let best = candidates
            .first()
            .filter(|c| c.score > f64::NEG_INFINITY)
            .cloned();
        Self {
            schema_version: SCHEMA_VERSION,
            strategy,
            method,
            metric,
            candidates,
            best,
            evaluated,
            cancelled,
            generation_best,
            population_best,
        }
    }

    /// Strategy config of the best candidate.
    pub fn best_config(&self) -> Result<Option<StrategyConfig>, ConfigError> {
        self.best
            .as_ref()
            .map(|b| StrategyConfig::from_parameter_set(self.strategy, &b.parameters))
            .transpose()
    }
}

/// Stable ranking: score descending, ties by evaluation index.
pub fn rank(evaluations: Vec<Evaluation>) -> Vec<RankedCandidate> {
    let mut ranked: Vec<RankedCandidate> = evaluations
        .into_iter()
        .enumerate()
        .map(|(index, e)| RankedCandidate {
            rank: 0,
            index,
            fingerprint: e.parameters.fingerprint(),
            parameters: e.parameters,
            score: e.score,
            metrics: e.metrics,
            error: e.error,
        })
        .collect();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.index.cmp(&b.index)));
    for (i, c) in ranked.iter_mut().enumerate() {
        c.rank = i + 1;
    }
    ranked
}

pub(crate) fn is_cancelled(cancel: Option<&AtomicBool>) -> bool {
    cancel.is_some_and(|f| f.load(Ordering::Relaxed))
}

/// Apply `params` to `base`, run, and score. Never fails: errors disqualify.
pub fn evaluate(
    ctx: &BacktestContext,
    base: &StrategyConfig,
    params: &ParameterSet,
    metric: FitnessMetric,
) -> Evaluation {
    let outcome = base
        .with_overrides(params)
        .map_err(RunError::from)
        .and_then(|cfg| run_backtest(ctx, &cfg));
    match outcome {
        Ok(result) => Evaluation {
            score: metric.score(Some(&result.metrics)),
            parameters: result.parameters,
            metrics: Some(result.metrics),
            error: None,
        },
        Err(e) => {
            tracing::warn!(fingerprint = %params.fingerprint(), error = %e, "candidate disqualified");
            Evaluation {
                parameters: params.clone(),
                score: f64::NEG_INFINITY,
                metrics: None,
                error: Some(e.to_string()),
            }
        }
    }
}

/// Evaluate a batch in parallel. Entries are `None` for candidates skipped
/// after cancellation; order matches `batch`.
pub(crate) fn evaluate_batch(
    ctx: &BacktestContext,
    base: &StrategyConfig,
    batch: &[ParameterSet],
    metric: FitnessMetric,
    cancel: Option<&AtomicBool>,
) -> Vec<Option<Evaluation>> {
    batch
        .par_iter()
        .map(|params| {
            if is_cancelled(cancel) {
                None
            } else {
                Some(evaluate(ctx, base, params, metric))
            }
        })
        .collect()
}

/// Domains the genetic search varies: the grid's names, or the default grid's.
pub fn search_space(kind: StrategyKind, grid: &ParamGrid) -> Vec<ParameterDomain> {
    let defaults;
    let names = if grid.is_empty() {
        defaults = default_grid(kind);
        &defaults
    } else {
        grid
    };
    kind.domains()
        .into_iter()
        .filter(|d| names.contains_key(&d.name))
        .collect()
}

/// Run the configured search for `base`'s strategy family.
pub fn optimize(
    ctx: &BacktestContext,
    base: &StrategyConfig,
    config: &OptimizerConfig,
    cancel: Option<&AtomicBool>,
) -> Result<OptimizationReport, RunError> {
    config.validate(base)?;
    let kind = base.kind();
    tracing::info!(
        strategy = %kind,
        method = ?config.method,
        metric = %config.metric,
        "optimization started"
    );

    let search = || match config.method {
        SearchMethod::Grid => {
            let grid = if config.grid.is_empty() {
                default_grid(kind)
            } else {
                config.grid.clone()
            };
            run_grid(ctx, base, &grid, config.max_combinations, config.metric, cancel)
        }
        SearchMethod::Genetic => run_genetic(
            ctx,
            base,
            &search_space(kind, &config.grid),
            &config.genetic,
            config.metric,
            cancel,
        ),
    };

    let report = match config.threads {
        Some(n) => rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .build()?
            .install(search),
        None => search(),
    };

    tracing::info!(
        evaluated = report.evaluated,
        cancelled = report.cancelled,
        best = report.best.as_ref().map(|b| b.score),
        "optimization finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sophia_core::params::ParamValue;

    fn eval(entry: usize, score: f64) -> Evaluation {
        Evaluation {
            parameters: ParameterSet::new().with("entry_period", entry),
            score,
            metrics: None,
            error: None,
        }
    }

    #[test]
    fn rank_is_descending_and_stable() {
        let ranked = rank(vec![
            eval(10, 0.5),
            eval(20, 1.5),
            eval(30, f64::NEG_INFINITY),
            eval(40, 1.5),
            eval(50, -0.2),
        ]);
        let order: Vec<usize> = ranked.iter().map(|c| c.index).collect();
        assert_eq!(order, vec![1, 3, 0, 4, 2]);
        let ranks: Vec<usize> = ranked.iter().map(|c| c.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn best_skips_disqualified() {
        let report = OptimizationReport::from_evaluations(
            StrategyKind::Turtle,
            SearchMethod::Grid,
            FitnessMetric::Sharpe,
            vec![eval(10, f64::NEG_INFINITY)],
            false,
            Vec::new(),
            Vec::new(),
        );
        assert_eq!(report.evaluated, 1);
        assert!(report.best.is_none());
        assert_eq!(report.best_config().unwrap(), None);
    }

    #[test]
    fn disqualified_scores_survive_json() {
        let report = OptimizationReport::from_evaluations(
            StrategyKind::Turtle,
            SearchMethod::Genetic,
            FitnessMetric::Sharpe,
            vec![eval(10, f64::NEG_INFINITY), eval(20, 0.25)],
            false,
            vec![f64::NEG_INFINITY, 0.25],
            vec![f64::NEG_INFINITY, 0.25],
        );
        let json = serde_json::to_string(&report).unwrap();
        let back: OptimizationReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.candidates[1].score, f64::NEG_INFINITY);
        assert_eq!(back.generation_best, vec![f64::NEG_INFINITY, 0.25]);
        assert_eq!(back.population_best, back.generation_best);
        assert_eq!(back.best.map(|b| b.index), Some(1));
    }

    #[test]
    fn best_config_rebuilds_strategy() {
        let report = OptimizationReport::from_evaluations(
            StrategyKind::Turtle,
            SearchMethod::Grid,
            FitnessMetric::Sharpe,
            vec![eval(10, 0.1), eval(30, 0.9)],
            false,
            Vec::new(),
            Vec::new(),
        );
        let best = report.best_config().unwrap().unwrap();
        assert_eq!(
            best.to_parameter_set().get("entry_period"),
            Some(&ParamValue::Int(30))
        );
    }

    #[test]
    fn search_space_follows_grid_names() {
        let space = search_space(StrategyKind::Turtle, &ParamGrid::new());
        let names: Vec<&str> = space.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names.len(), 3);
        assert!(names.contains(&"entry_period"));

        let grid = ParamGrid::from([("vol_threshold".to_string(), vec![ParamValue::Float(1.0)])]);
        let space = search_space(StrategyKind::Turtle, &grid);
        assert_eq!(space.len(), 1);
        assert_eq!(space[0].name, "vol_threshold");
    }

    #[test]
    fn method_serde() {
        assert_eq!(serde_json::to_string(&SearchMethod::Genetic).unwrap(), r#""genetic""#);
        assert_eq!(SearchMethod::default(), SearchMethod::Grid);
    }
}
