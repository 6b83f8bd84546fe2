//! Genetic search: tournament selection, uniform crossover, bounded mutation, elitism.
//!
//! Generation 0 is the base config plus random samples inside the declared
//! domains. Every random draw comes from `RngHierarchy` streams keyed by
//! generation, so a seed reproduces the same search on any thread count.
//! Evaluations are cached by parameter fingerprint; elites and repeated
//! children are never re-run.

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::AtomicBool;

use sophia_core::params::{ConfigError, ParameterDomain, ParameterSet};
use sophia_core::rng::RngHierarchy;
use sophia_core::strategy::StrategyConfig;

use super::{evaluate_batch, Evaluation, OptimizationReport, SearchMethod};
use crate::fitness::FitnessMetric;
use crate::runner::BacktestContext;

/// Mutation step as a fraction of the parameter's range.
const MUTATION_SCALE: f64 = 0.1;

/// Draws before a random candidate falls back to the base config.
const SAMPLE_ATTEMPTS: usize = 32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeneticConfig {
    pub population_size: usize,
    /// Generations including the initial population.
    pub generations: usize,
    pub crossover_rate: f64,
    /// Per-gene mutation probability.
    pub mutation_rate: f64,
    pub tournament_size: usize,
    pub elite_count: usize,
    pub seed: u64,
}

impl Default for GeneticConfig {
    fn default() -> Self {
        Self {
            population_size: 20,
            generations: 10,
            crossover_rate: 0.7,
            mutation_rate: 0.2,
            tournament_size: 3,
            elite_count: 2,
            seed: 42,
        }
    }
}

impl GeneticConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field, reason: &str| {
            Err(ConfigError::InvalidRisk {
                field,
                reason: reason.to_string(),
            })
        };
        if self.population_size < 2 {
            return invalid("population_size", "must be >= 2");
        }
        if self.generations == 0 {
            return invalid("generations", "must be >= 1");
        }
        if !(0.0..=1.0).contains(&self.crossover_rate) {
            return invalid("crossover_rate", "must be in [0, 1]");
        }
        if !(0.0..=1.0).contains(&self.mutation_rate) {
            return invalid("mutation_rate", "must be in [0, 1]");
        }
        if self.tournament_size == 0 {
            return invalid("tournament_size", "must be >= 1");
        }
        if self.elite_count == 0 {
            return invalid("elite_count", "must be >= 1");
        }
        if self.elite_count >= self.population_size {
            return invalid("elite_count", "must be below population_size");
        }
        Ok(())
    }
}

pub fn run_genetic(
    ctx: &BacktestContext,
    base: &StrategyConfig,
    space: &[ParameterDomain],
    config: &GeneticConfig,
    metric: FitnessMetric,
    cancel: Option<&AtomicBool>,
) -> OptimizationReport {
    let rngs = RngHierarchy::new(config.seed);
    let mut evaluations: Vec<Evaluation> = Vec::new();
    let mut cache: HashMap<String, usize> = HashMap::new();
    let mut generation_best = Vec::new();
    let mut population_best = Vec::new();
    let mut best = f64::NEG_INFINITY;
    let mut cancelled = false;

    let mut population = initial_population(base, space, config, &mut rngs.rng_for("init", 0));
    let mut scores: Vec<f64> = Vec::new();

    for generation in 0..config.generations {
        if generation > 0 {
            let mut rng = rngs.rng_for("breed", generation as u64);
            population = breed(&population, &scores, base, space, config, &mut rng);
        }

        let mut queued = HashSet::new();
        let fresh: Vec<ParameterSet> = population
            .iter()
            .filter(|p| {
                let fp = p.fingerprint();
                !cache.contains_key(&fp) && queued.insert(fp)
            })
            .cloned()
            .collect();

        for (params, outcome) in fresh
            .iter()
            .zip(evaluate_batch(ctx, base, &fresh, metric, cancel))
        {
            match outcome {
                Some(e) => {
                    cache.insert(params.fingerprint(), evaluations.len());
                    evaluations.push(e);
                }
                None => cancelled = true,
            }
        }
        if cancelled {
            break;
        }

        scores = population
            .iter()
            .map(|p| {
                cache
                    .get(&p.fingerprint())
                    .map_or(f64::NEG_INFINITY, |&i| evaluations[i].score)
            })
            .collect();
        let top = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        best = best.max(top);
        population_best.push(top);
        generation_best.push(best);
        tracing::info!(
            generation,
            best,
            population = top,
            evaluated = evaluations.len(),
            "generation complete"
        );
    }

    OptimizationReport::from_evaluations(
        base.kind(),
        SearchMethod::Genetic,
        metric,
        evaluations,
        cancelled,
        generation_best,
        population_best,
    )
}

/// Resolve `genes` against `base`; `None` when the strategy rejects them.
fn resolve(base: &StrategyConfig, genes: &ParameterSet) -> Option<ParameterSet> {
    base.with_overrides(genes).ok().map(|cfg| cfg.to_parameter_set())
}

fn initial_population(
    base: &StrategyConfig,
    space: &[ParameterDomain],
    config: &GeneticConfig,
    rng: &mut StdRng,
) -> Vec<ParameterSet> {
    let base_params = base.to_parameter_set();
    let mut population = vec![base_params.clone()];
    while population.len() < config.population_size {
        let sampled = (0..SAMPLE_ATTEMPTS).find_map(|_| {
            let genes: ParameterSet = space
                .iter()
                .map(|d| (d.name.clone(), d.sample(rng)))
                .collect();
            resolve(base, &genes)
        });
        population.push(sampled.unwrap_or_else(|| base_params.clone()));
    }
    population
}

fn breed(
    population: &[ParameterSet],
    scores: &[f64],
    base: &StrategyConfig,
    space: &[ParameterDomain],
    config: &GeneticConfig,
    rng: &mut StdRng,
) -> Vec<ParameterSet> {
    let mut order: Vec<usize> = (0..population.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]).then(a.cmp(&b)));

    let mut next: Vec<ParameterSet> = order
        .iter()
        .take(config.elite_count)
        .map(|&i| population[i].clone())
        .collect();

    while next.len() < config.population_size {
        let first = tournament(scores, config.tournament_size, rng);
        let second = tournament(scores, config.tournament_size, rng);
        let mut child = if rng.gen_bool(config.crossover_rate) {
            uniform_crossover(&population[first], &population[second], space, rng)
        } else {
            population[first].clone()
        };
        mutate(&mut child, space, config.mutation_rate, rng);
        next.push(resolve(base, &child).unwrap_or_else(|| population[first].clone()));
    }
    next
}

/// Best of `size` uniform draws. Ties go to the lower index.
fn tournament(scores: &[f64], size: usize, rng: &mut StdRng) -> usize {
    (0..size)
        .map(|_| rng.gen_range(0..scores.len()))
        .max_by(|&a, &b| scores[a].total_cmp(&scores[b]).then(b.cmp(&a)))
        .unwrap_or(0)
}

/// Each searched gene from either parent with equal probability.
fn uniform_crossover(
    a: &ParameterSet,
    b: &ParameterSet,
    space: &[ParameterDomain],
    rng: &mut StdRng,
) -> ParameterSet {
    let mut child = a.clone();
    for d in space {
        if rng.gen_bool(0.5) {
            if let Some(v) = b.get(&d.name) {
                child.insert(&d.name, *v);
            }
        }
    }
    child
}

fn mutate(child: &mut ParameterSet, space: &[ParameterDomain], rate: f64, rng: &mut StdRng) {
    for d in space {
        if rng.gen_bool(rate) {
            if let Some(v) = child.get(&d.name).copied() {
                child.insert(&d.name, d.perturb(&v, MUTATION_SCALE, rng));
            }
        }
    }
}
