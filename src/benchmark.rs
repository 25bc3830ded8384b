//! Benchmarking: compare the baseline solver against IAFSA across a set
//! of synthetic instances and export the results as CSV.

use crate::fitness::{tour_metrics, Weights};
use crate::iafsa::{self, IafsaConfig};
use crate::provider::SyntheticProvider;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

/// Result of running one algorithm on one synthetic instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlgorithmResult {
    pub algorithm: String,
    pub instance: String,
    pub num_destinations: usize,
    pub feasible: bool,
    pub time_s: f64,
    pub distance_km: f64,
    pub cost: f64,
    pub carbon_kg: f64,
    pub fitness: f64,
    pub computation_time_s: f64,
}

/// Aggregated statistics for one algorithm across every instance it ran.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlgorithmStatistics {
    pub algorithm: String,
    pub num_instances: usize,
    pub num_feasible: usize,
    pub avg_fitness: f64,
    pub best_fitness: f64,
    pub worst_fitness: f64,
    pub std_fitness: f64,
    pub avg_computation_time_s: f64,
}

/// Benchmark run configuration.
#[derive(Debug, Clone)]
pub struct BenchmarkConfig {
    /// Number of destinations per synthetic instance.
    pub instance_sizes: Vec<usize>,
    /// Number of runs per instance size (different seeds).
    pub num_runs: usize,
    pub weights: Weights,
    pub fuel_cost_per_km: f64,
    pub carbon_factor_per_km: f64,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        BenchmarkConfig {
            instance_sizes: vec![5, 10, 20, 40],
            num_runs: 3,
            weights: Weights::normalized(1.0, 1.0, 1.0),
            fuel_cost_per_km: crate::fitness::DEFAULT_FUEL_COST_PER_KM,
            carbon_factor_per_km: crate::fitness::DEFAULT_CARBON_FACTOR_PER_KM,
        }
    }
}

/// Runs baseline and IAFSA across synthetic instances and accumulates
/// per-run results for later statistics and CSV export.
pub struct Benchmark {
    config: BenchmarkConfig,
    results: Vec<AlgorithmResult>,
}

impl Benchmark {
    pub fn new(config: BenchmarkConfig) -> Self {
        Benchmark {
            config,
            results: Vec::new(),
        }
    }

    /// Run every configured instance size for `num_runs` seeds each,
    /// recording both the baseline and IAFSA outcomes.
    pub fn run_all(&mut self) {
        for &size in &self.config.instance_sizes.clone() {
            for run in 0..self.config.num_runs {
                self.run_one(size, run as u64);
            }
        }
    }

    fn run_one(&mut self, num_destinations: usize, seed: u64) {
        let addresses: Vec<String> = (0..=num_destinations)
            .map(|i| if i == 0 { "depot".to_string() } else { format!("stop-{i}") })
            .collect();

        let provider = SyntheticProvider::new(&addresses, seed);
        let (time_build, distance_build) = match crate::matrix::build_matrices(&provider, &addresses)
        {
            Ok(m) => m,
            Err(e) => {
                log::error!("benchmark matrix build failed for size {num_destinations}: {e}");
                return;
            }
        };

        let instance_name = format!("synthetic-{num_destinations}-seed{seed}");

        let start = std::time::Instant::now();
        let baseline_tour = crate::baseline::solve(&time_build.matrix);
        let baseline_time = start.elapsed().as_secs_f64();

        let Some(baseline_tour) = baseline_tour else {
            log::warn!("baseline failed to find a tour for {instance_name}");
            return;
        };

        let baseline_metrics = tour_metrics(
            &baseline_tour,
            &time_build.matrix,
            &distance_build.matrix,
            self.config.fuel_cost_per_km,
            self.config.carbon_factor_per_km,
        );
        if let Some(m) = baseline_metrics {
            let fitness = crate::fitness::FitnessEvaluator {
                time_matrix: &time_build.matrix,
                distance_matrix: &distance_build.matrix,
                weights: self.config.weights,
                fuel_cost_per_km: self.config.fuel_cost_per_km,
                carbon_factor_per_km: self.config.carbon_factor_per_km,
                reference_tour: None,
                diversity_alpha: crate::fitness::DEFAULT_DIVERSITY_ALPHA,
            }
            .evaluate(&baseline_tour);

            self.results.push(AlgorithmResult {
                algorithm: "baseline".to_string(),
                instance: instance_name.clone(),
                num_destinations,
                feasible: true,
                time_s: m.time_s,
                distance_km: m.distance_km,
                cost: m.cost,
                carbon_kg: m.carbon_kg,
                fitness,
                computation_time_s: baseline_time,
            });
        }

        let start = std::time::Instant::now();
        let iafsa_config = IafsaConfig {
            seed,
            max_retries: 2,
            cancellation: None,
            deadline: None,
        };
        let outcome = iafsa::optimize(
            &baseline_tour,
            &time_build.matrix,
            &distance_build.matrix,
            self.config.weights,
            self.config.fuel_cost_per_km,
            self.config.carbon_factor_per_km,
            &iafsa_config,
        );
        let iafsa_time = start.elapsed().as_secs_f64();

        if let Some(m) = tour_metrics(
            &outcome.best_tour,
            &time_build.matrix,
            &distance_build.matrix,
            self.config.fuel_cost_per_km,
            self.config.carbon_factor_per_km,
        ) {
            self.results.push(AlgorithmResult {
                algorithm: "iafsa".to_string(),
                instance: instance_name,
                num_destinations,
                feasible: true,
                time_s: m.time_s,
                distance_km: m.distance_km,
                cost: m.cost,
                carbon_kg: m.carbon_kg,
                fitness: outcome.best_fitness,
                computation_time_s: iafsa_time,
            });
        }
    }

    /// Compute per-algorithm summary statistics over every recorded run.
    pub fn compute_statistics(&self) -> Vec<AlgorithmStatistics> {
        let mut by_algorithm: HashMap<String, Vec<&AlgorithmResult>> = HashMap::new();
        for result in &self.results {
            by_algorithm
                .entry(result.algorithm.clone())
                .or_default()
                .push(result);
        }

        let mut statistics: Vec<AlgorithmStatistics> = by_algorithm
            .into_iter()
            .map(|(algorithm, results)| {
                let fitnesses: Vec<f64> = results.iter().map(|r| r.fitness).collect();
                let avg_fitness = fitnesses.iter().sum::<f64>() / fitnesses.len() as f64;
                let best_fitness = fitnesses.iter().cloned().fold(f64::INFINITY, f64::min);
                let worst_fitness = fitnesses.iter().cloned().fold(0.0, f64::max);
                let variance = fitnesses
                    .iter()
                    .map(|f| (f - avg_fitness).powi(2))
                    .sum::<f64>()
                    / fitnesses.len() as f64;

                let times: Vec<f64> = results.iter().map(|r| r.computation_time_s).collect();
                let avg_computation_time_s = times.iter().sum::<f64>() / times.len() as f64;

                AlgorithmStatistics {
                    algorithm,
                    num_instances: results.len(),
                    num_feasible: results.iter().filter(|r| r.feasible).count(),
                    avg_fitness,
                    best_fitness,
                    worst_fitness,
                    std_fitness: variance.sqrt(),
                    avg_computation_time_s,
                }
            })
            .collect();

        statistics.sort_by(|a, b| a.avg_fitness.partial_cmp(&b.avg_fitness).unwrap());
        statistics
    }

    pub fn export_to_csv<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let file = File::create(path)?;
        let mut writer = csv::Writer::from_writer(file);
        for result in &self.results {
            writer.serialize(result)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn export_statistics_csv<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let file = File::create(path)?;
        let mut writer = csv::Writer::from_writer(file);
        for stat in self.compute_statistics() {
            writer.serialize(stat)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn results(&self) -> &[AlgorithmResult] {
        &self.results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn benchmark_records_both_algorithms_per_instance() {
        let config = BenchmarkConfig {
            instance_sizes: vec![5],
            num_runs: 1,
            ..BenchmarkConfig::default()
        };
        let mut bench = Benchmark::new(config);
        bench.run_all();

        let algorithms: Vec<&str> = bench.results().iter().map(|r| r.algorithm.as_str()).collect();
        assert!(algorithms.contains(&"baseline"));
        assert!(algorithms.contains(&"iafsa"));
    }

    #[test]
    fn statistics_are_sorted_by_average_fitness() {
        let config = BenchmarkConfig {
            instance_sizes: vec![5, 8],
            num_runs: 1,
            ..BenchmarkConfig::default()
        };
        let mut bench = Benchmark::new(config);
        bench.run_all();

        let stats = bench.compute_statistics();
        for pair in stats.windows(2) {
            assert!(pair[0].avg_fitness <= pair[1].avg_fitness);
        }
    }
}
