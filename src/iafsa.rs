//! Improved Artificial Fish Swarm Algorithm: a population-based
//! metaheuristic seeded from the baseline tour, using prey/swarm/follow
//! behaviors with adaptive mutation intensity and a retry loop that
//! guarantees (modulo retry exhaustion) improvement on the dominant
//! objective.

use crate::fitness::{FitnessEvaluator, Priority, Weights};
use crate::matrix::Matrix;
use crate::operators::{diversity, greedy, perturb, random_tour, Tour};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// A candidate solution in the population. `visual_range` is carried for
/// compatibility with the original algorithm's fish model but consulted
/// by no operator here.
#[derive(Debug, Clone)]
pub struct Fish {
    pub tour: Tour,
    pub fitness: f64,
    pub visual_range: f64,
}

impl Fish {
    fn new(tour: Tour, fitness: f64, visual_range: f64) -> Self {
        Fish {
            tour,
            fitness,
            visual_range,
        }
    }
}

/// Tunable resource parameters for one IAFSA attempt, derived from the
/// dominant weight share and problem size.
#[derive(Debug, Clone, Copy)]
struct Resources {
    population_size: usize,
    max_iterations: usize,
    stagnation_interval: usize,
    mutation_intensity: f64,
    diversity_alpha: f64,
}

const BASE_POPULATION: usize = 40;
const BASE_ITERATIONS: usize = 200;
const EARLY_STOP_WINDOW: usize = 65;
const SIGNIFICANT_IMPROVEMENT_RATIO: f64 = 0.02;
const PREY_K: usize = 3;
const SWARM_EXTRA_K: usize = 2;
const FOLLOW_EXTRA_K: usize = 1;

fn resources(max_raw_share: f64, n: usize, retry_index: usize) -> Resources {
    let problem_factor = (1.0 + n as f64 / 20.0).min(2.0);

    let (pop_mult, iter_mult, stagnation_interval, mutation_intensity, diversity_alpha) =
        if max_raw_share >= 0.8 {
            (1.8, 2.0, 30, 2.0, 0.05)
        } else if max_raw_share >= 0.6 {
            (1.5, 1.5, 50, 1.5, 0.15)
        } else if max_raw_share <= 0.5 {
            (1.0, 1.0, 50, 1.0, 0.20)
        } else {
            (1.0, 1.0, 50, 1.0, 0.15)
        };

    let retry_scale = 1.0 + 0.6 * retry_index as f64;

    Resources {
        population_size: ((BASE_POPULATION as f64) * pop_mult * problem_factor * retry_scale)
            .round() as usize,
        max_iterations: ((BASE_ITERATIONS as f64) * iter_mult * problem_factor * retry_scale)
            .round() as usize,
        stagnation_interval,
        mutation_intensity,
        diversity_alpha,
    }
}

/// Configuration for one `optimize` call.
pub struct IafsaConfig {
    pub seed: u64,
    pub max_retries: usize,
    pub cancellation: Option<Arc<AtomicBool>>,
    pub deadline: Option<Instant>,
}

impl Default for IafsaConfig {
    fn default() -> Self {
        IafsaConfig {
            seed: 0,
            max_retries: 2,
            cancellation: None,
            deadline: None,
        }
    }
}

/// Outcome of a full IAFSA run (all retry attempts).
pub struct IafsaOutcome {
    pub best_tour: Tour,
    pub best_fitness: f64,
    pub beat_baseline_on_dominant: bool,
    pub attempts_used: usize,
}

fn is_cancelled(cancellation: &Option<Arc<AtomicBool>>) -> bool {
    cancellation
        .as_ref()
        .map(|c| c.load(Ordering::Relaxed))
        .unwrap_or(false)
}

fn deadline_exceeded(deadline: &Option<Instant>) -> bool {
    deadline.map(|d| Instant::now() >= d).unwrap_or(false)
}

/// Runs the full IAFSA optimization, seeded by `baseline_tour`, against
/// `time_matrix`/`distance_matrix` under `weights`.
#[allow(clippy::too_many_arguments)]
pub fn optimize(
    baseline_tour: &Tour,
    time_matrix: &Matrix,
    distance_matrix: &Matrix,
    weights: Weights,
    fuel_cost_per_km: f64,
    carbon_factor_per_km: f64,
    config: &IafsaConfig,
) -> IafsaOutcome {
    let n = time_matrix.size;
    let (dominant, max_raw_share) = weights.dominant();
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);

    let baseline_evaluator = FitnessEvaluator {
        time_matrix,
        distance_matrix,
        weights,
        fuel_cost_per_km,
        carbon_factor_per_km,
        reference_tour: None,
        diversity_alpha: DEFAULT_DIVERSITY_ALPHA_UNUSED,
    };
    let baseline_fitness = baseline_evaluator.evaluate(baseline_tour);
    let baseline_metric = dominant_metric(
        baseline_tour,
        time_matrix,
        distance_matrix,
        fuel_cost_per_km,
        carbon_factor_per_km,
        dominant,
    );

    let mut best_tour = baseline_tour.clone();
    let mut best_fitness = baseline_fitness;
    let mut priority_best_tour: Option<Tour> = None;
    let mut priority_best_metric: Option<f64> = None;
    let mut priority_best_fitness: Option<f64> = None;
    let mut beat_baseline = false;
    let mut attempts_used = 0;

    for retry_index in 0..=config.max_retries {
        if is_cancelled(&config.cancellation) || deadline_exceeded(&config.deadline) {
            break;
        }
        attempts_used += 1;

        let res = resources(max_raw_share, n, retry_index);
        let evaluator = FitnessEvaluator {
            time_matrix,
            distance_matrix,
            weights,
            fuel_cost_per_km,
            carbon_factor_per_km,
            reference_tour: Some(baseline_tour),
            diversity_alpha: res.diversity_alpha,
        };

        let attempt = run_attempt(
            baseline_tour,
            time_matrix,
            distance_matrix,
            dominant,
            &evaluator,
            &res,
            &mut rng,
            config,
        );

        if attempt.fitness < best_fitness {
            best_fitness = attempt.fitness;
            best_tour = attempt.tour.clone();
        }

        // Track the best tour seen for the dominant metric specifically,
        // across every attempt so far, not just the current one.
        let attempt_metric = dominant_metric(
            &attempt.tour,
            time_matrix,
            distance_matrix,
            fuel_cost_per_km,
            carbon_factor_per_km,
            dominant,
        );
        if let Some(am) = attempt_metric {
            if priority_best_metric.map_or(true, |best| am < best) {
                priority_best_metric = Some(am);
                priority_best_tour = Some(attempt.tour.clone());
                priority_best_fitness = Some(attempt.fitness);
            }
        }

        if let (Some(metric), Some(pm)) = (baseline_metric, priority_best_metric) {
            if pm < metric {
                beat_baseline = true;
                break;
            }
        }

        if is_cancelled(&config.cancellation) || deadline_exceeded(&config.deadline) {
            break;
        }
    }

    let (returned_tour, returned_fitness) = if beat_baseline {
        match (priority_best_tour, priority_best_fitness) {
            (Some(tour), Some(fitness)) => (tour, fitness),
            _ => (best_tour, best_fitness),
        }
    } else {
        (best_tour, best_fitness)
    };

    IafsaOutcome {
        best_tour: returned_tour,
        best_fitness: returned_fitness,
        beat_baseline_on_dominant: beat_baseline,
        attempts_used,
    }
}

// Placeholder alpha for the fitness evaluator used only to score the
// baseline once, outside any attempt; no reference tour is attached so
// the diversity penalty never applies regardless of this value.
const DEFAULT_DIVERSITY_ALPHA_UNUSED: f64 = 0.0;

fn dominant_metric(
    tour: &Tour,
    time_matrix: &Matrix,
    distance_matrix: &Matrix,
    fuel_cost_per_km: f64,
    carbon_factor_per_km: f64,
    dominant: Priority,
) -> Option<f64> {
    let metrics = crate::fitness::tour_metrics(
        tour,
        time_matrix,
        distance_matrix,
        fuel_cost_per_km,
        carbon_factor_per_km,
    )?;
    Some(match dominant {
        Priority::Time => metrics.time_s,
        Priority::Cost => metrics.cost,
        Priority::Carbon => metrics.carbon_kg,
    })
}

struct Attempt {
    tour: Tour,
    fitness: f64,
}

#[allow(clippy::too_many_arguments)]
fn run_attempt(
    baseline_tour: &Tour,
    time_matrix: &Matrix,
    distance_matrix: &Matrix,
    dominant: Priority,
    evaluator: &FitnessEvaluator,
    res: &Resources,
    rng: &mut ChaCha8Rng,
    config: &IafsaConfig,
) -> Attempt {
    let n = time_matrix.size;
    let mut population = initialize_population(
        baseline_tour,
        time_matrix,
        distance_matrix,
        dominant,
        res.population_size,
        rng,
        evaluator,
    );

    let mut global_best_idx = best_index(&population);
    let mut global_best = population[global_best_idx].clone();
    let mut no_improvement_streak = 0usize;
    let progress_interval = (res.max_iterations / 10).max(1);

    for iteration in 0..res.max_iterations {
        if is_cancelled(&config.cancellation) || deadline_exceeded(&config.deadline) {
            log::debug!("IAFSA attempt cancelled/deadline at iteration {iteration}");
            break;
        }

        let mean_fitness = population.iter().map(|f| f.fitness).sum::<f64>() / population.len() as f64;
        let k = (res.mutation_intensity * PREY_K as f64).round().max(1.0) as usize;
        let k_swarm = (res.mutation_intensity * (PREY_K + SWARM_EXTRA_K) as f64).round().max(1.0) as usize;
        let k_follow = (res.mutation_intensity * (2 + FOLLOW_EXTRA_K) as f64).round().max(1.0) as usize;

        for i in 0..population.len() {
            // Prey
            let candidate = perturb(&population[i].tour, k, rng);
            let candidate_fitness = evaluator.evaluate(&candidate);
            if candidate_fitness < population[i].fitness {
                population[i].tour = candidate;
                population[i].fitness = candidate_fitness;
            }

            // Swarm: move toward the population center if it's better.
            if mean_fitness < population[i].fitness {
                let candidate = perturb(&population[i].tour, k_swarm, rng);
                let candidate_fitness = evaluator.evaluate(&candidate);
                if candidate_fitness < population[i].fitness {
                    population[i].tour = candidate;
                    population[i].fitness = candidate_fitness;
                }
            }

            // Follow: move toward the global best if it's better.
            if global_best.fitness < population[i].fitness {
                let candidate = perturb(&population[i].tour, k_follow, rng);
                let candidate_fitness = evaluator.evaluate(&candidate);
                if candidate_fitness < population[i].fitness {
                    population[i].tour = candidate;
                    population[i].fitness = candidate_fitness;
                }
            }
        }

        let new_best_idx = best_index(&population);
        let improved = population[new_best_idx].fitness < global_best.fitness;
        let relative_drop = if global_best.fitness.is_finite() && global_best.fitness > 0.0 {
            (global_best.fitness - population[new_best_idx].fitness) / global_best.fitness
        } else {
            0.0
        };

        if improved {
            global_best_idx = new_best_idx;
            global_best = population[global_best_idx].clone();
        }

        if improved && relative_drop >= SIGNIFICANT_IMPROVEMENT_RATIO {
            no_improvement_streak = 0;
        } else {
            no_improvement_streak += 1;
        }

        if iteration > 0 && iteration % res.stagnation_interval == 0 {
            let worst_idx = population
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.fitness.partial_cmp(&b.1.fitness).unwrap())
                .map(|(i, _)| i)
                .unwrap_or(0);
            let fresh = random_tour(n, rng);
            let fresh_fitness = evaluator.evaluate(&fresh);
            population[worst_idx] = Fish::new(fresh, fresh_fitness, rng.gen_range(0.0..1.0));
            log::debug!("anti-stagnation replacement at iteration {iteration}");
        }

        if iteration % progress_interval == 0 {
            log::debug!(
                "IAFSA iteration {}/{}: best_fitness={:.4}",
                iteration,
                res.max_iterations,
                global_best.fitness
            );
        }

        if no_improvement_streak >= EARLY_STOP_WINDOW {
            log::debug!("early stop at iteration {iteration}: no significant improvement in {EARLY_STOP_WINDOW} iterations");
            break;
        }
    }

    let diversity_to_baseline = diversity(&global_best.tour, baseline_tour);
    log::debug!(
        "IAFSA attempt finished: best_fitness={:.4}, diversity_vs_baseline={:.2} ({})",
        global_best.fitness,
        diversity_to_baseline,
        qualitative_diversity(diversity_to_baseline)
    );

    Attempt {
        tour: global_best.tour,
        fitness: global_best.fitness,
    }
}

fn qualitative_diversity(score: f64) -> &'static str {
    if score < 0.3 {
        "significantly different"
    } else if score < 0.7 {
        "moderately different"
    } else {
        "similar"
    }
}

fn best_index(population: &[Fish]) -> usize {
    population
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.fitness.partial_cmp(&b.1.fitness).unwrap())
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Seed the population: baseline as fish #0, tiered perturbations (20%
/// each at 2/3/5/10-swap), 20% uniformly random, plus a handful of
/// priority-specific greedy seeds.
#[allow(clippy::too_many_arguments)]
fn initialize_population(
    baseline_tour: &Tour,
    time_matrix: &Matrix,
    distance_matrix: &Matrix,
    dominant: Priority,
    population_size: usize,
    rng: &mut ChaCha8Rng,
    evaluator: &FitnessEvaluator,
) -> Vec<Fish> {
    let n = time_matrix.size;
    let mut population = Vec::with_capacity(population_size.max(1));

    population.push(make_fish(baseline_tour.clone(), evaluator, rng));

    if population_size <= 1 {
        return population;
    }

    let remaining = population_size - 1;
    let tier_size = (remaining as f64 * 0.2).round() as usize;
    let tiers = [2usize, 3, 5, 10];

    for &swap_count in &tiers {
        for _ in 0..tier_size {
            if population.len() >= population_size {
                break;
            }
            let tour = perturb(baseline_tour, swap_count, rng);
            population.push(make_fish(tour, evaluator, rng));
        }
    }

    while population.len() < population_size {
        let tour = random_tour(n, rng);
        population.push(make_fish(tour, evaluator, rng));
    }

    // Priority-specific greedy seeds replace a few of the random/tail
    // entries so every attempt carries at least one metric-aligned seed:
    // time-metric nearest-neighbor tours when time dominates, distance-
    // metric ones when cost or carbon dominates (both derive from the
    // distance matrix since cost/carbon are themselves distance-linear).
    // Index 0 (the baseline seed) is never overwritten.
    let seed_matrix = match dominant {
        Priority::Time => time_matrix,
        Priority::Cost | Priority::Carbon => distance_matrix,
    };
    let greedy_seed_count = 3.min(population.len().saturating_sub(1));
    for i in 0..greedy_seed_count {
        let start = 1 + (i % n.saturating_sub(1).max(1));
        if let Some(tour) = greedy(seed_matrix, start) {
            let idx = population.len() - 1 - i;
            population[idx] = make_fish(tour, evaluator, rng);
        }
    }

    population
}

fn make_fish(tour: Tour, evaluator: &FitnessEvaluator, rng: &mut ChaCha8Rng) -> Fish {
    let fitness = evaluator.evaluate(&tour);
    Fish::new(tour, fitness, rng.gen_range(0.0..1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fitness::Weights;

    fn matrix_from_rows(rows: Vec<Vec<f64>>) -> Matrix {
        let size = rows.len();
        let mut cells = Vec::with_capacity(size * size);
        for row in rows {
            cells.extend(row);
        }
        Matrix { size, cells }
    }

    fn ring_matrix(n: usize) -> Matrix {
        // nodes on a circle, arc cost = shortest angular distance
        let rows = (0..n)
            .map(|i| {
                (0..n)
                    .map(|j| {
                        if i == j {
                            0.0
                        } else {
                            let d = (i as isize - j as isize).unsigned_abs();
                            d.min(n - d) as f64
                        }
                    })
                    .collect()
            })
            .collect();
        matrix_from_rows(rows)
    }

    #[test]
    fn outcome_is_always_a_valid_tour() {
        let m = ring_matrix(6);
        let baseline = crate::baseline::solve(&m).unwrap();
        let config = IafsaConfig {
            seed: 42,
            max_retries: 1,
            cancellation: None,
            deadline: None,
        };
        let weights = Weights::normalized(90.0, 5.0, 5.0);
        let outcome = optimize(&baseline, &m, &m, weights, 0.15, 0.12, &config);

        assert!(crate::fitness::is_valid_tour(&outcome.best_tour, m.size));
        assert!(outcome.best_fitness.is_finite());
        assert!(outcome.attempts_used >= 1);
    }

    #[test]
    fn reproducible_with_fixed_seed() {
        let m = ring_matrix(7);
        let baseline = crate::baseline::solve(&m).unwrap();
        let weights = Weights::normalized(40.0, 30.0, 30.0);

        let run = || {
            let config = IafsaConfig {
                seed: 1234,
                max_retries: 1,
                cancellation: None,
                deadline: None,
            };
            optimize(&baseline, &m, &m, weights, 0.15, 0.12, &config)
        };

        let a = run();
        let b = run();
        assert_eq!(a.best_tour, b.best_tour);
        assert_eq!(a.best_fitness, b.best_fitness);
    }

    #[test]
    fn cancellation_stops_before_exhausting_retries() {
        let m = ring_matrix(10);
        let baseline = crate::baseline::solve(&m).unwrap();
        let weights = Weights::normalized(80.0, 10.0, 10.0);
        let flag = Arc::new(AtomicBool::new(true));
        let config = IafsaConfig {
            seed: 5,
            max_retries: 5,
            cancellation: Some(flag),
            deadline: None,
        };
        let outcome = optimize(&baseline, &m, &m, weights, 0.15, 0.12, &config);
        assert_eq!(outcome.attempts_used, 0);
        assert_eq!(outcome.best_tour, baseline);
    }
}
