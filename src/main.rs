//! Last-Mile Optimizer - Command Line Interface
//!
//! Runs one optimization request end to end, or compares the baseline
//! solver against IAFSA across a set of synthetic instances.

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use last_mile_optimizer::benchmark::{Benchmark, BenchmarkConfig};
use last_mile_optimizer::config::RuntimeConfig;
use last_mile_optimizer::fitness::Weights;
use last_mile_optimizer::orchestrator::{OptimizationRequest, RawWeights};
use last_mile_optimizer::provider::{HttpRoutingProvider, SyntheticProvider};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "last-mile-optimizer")]
#[command(author = "Etudiant M2 AI2D")]
#[command(version = "1.0")]
#[command(about = "A multi-objective last-mile delivery route optimizer")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one optimization request
    Optimize {
        /// Depot address
        #[arg(long, default_value = "Bengaluru, Karnataka, India")]
        start: String,

        /// Destination addresses, comma-separated
        #[arg(long, value_delimiter = ',')]
        destinations: Vec<String>,

        /// Time weight (percentage or proportion)
        #[arg(long, default_value = "50")]
        weight_time: f64,

        /// Cost weight (percentage or proportion)
        #[arg(long, default_value = "30")]
        weight_cost: f64,

        /// Carbon weight (percentage or proportion)
        #[arg(long, default_value = "20")]
        weight_carbon: f64,

        /// Fuel cost per km
        #[arg(long, default_value = "0.15")]
        fuel_cost_per_km: f64,

        /// Carbon emission factor, kg CO2 per km
        #[arg(long, default_value = "0.12")]
        carbon_factor_per_km: f64,

        /// Random seed for the IAFSA engine
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Wall-clock budget in seconds
        #[arg(long, default_value = "30")]
        time_budget_secs: u64,

        /// Use the network-free synthetic provider instead of a live
        /// routing credential (demo mode).
        #[arg(long)]
        demo: bool,

        /// Verbose: show an IAFSA progress bar
        #[arg(short, long)]
        verbose: bool,
    },

    /// Compare baseline vs IAFSA across synthetic instances
    Compare {
        /// Destination counts to benchmark, comma-separated
        #[arg(long, value_delimiter = ',', default_value = "5,10,20,40")]
        sizes: Vec<usize>,

        /// Runs per instance size
        #[arg(long, default_value = "3")]
        runs: usize,

        /// Output CSV file for per-run results
        #[arg(long)]
        output: Option<PathBuf>,

        /// Output CSV file for aggregated statistics
        #[arg(long)]
        stats_output: Option<PathBuf>,
    },
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Optimize {
            start,
            destinations,
            weight_time,
            weight_cost,
            weight_carbon,
            fuel_cost_per_km,
            carbon_factor_per_km,
            seed,
            time_budget_secs,
            demo,
            verbose,
        } => run_optimize(
            start,
            destinations,
            weight_time,
            weight_cost,
            weight_carbon,
            fuel_cost_per_km,
            carbon_factor_per_km,
            seed,
            time_budget_secs,
            demo,
            verbose,
        ),
        Commands::Compare {
            sizes,
            runs,
            output,
            stats_output,
        } => run_compare(sizes, runs, output, stats_output),
    }
}

#[allow(clippy::too_many_arguments)]
fn run_optimize(
    start: String,
    destinations: Vec<String>,
    weight_time: f64,
    weight_cost: f64,
    weight_carbon: f64,
    fuel_cost_per_km: f64,
    carbon_factor_per_km: f64,
    seed: u64,
    time_budget_secs: u64,
    demo: bool,
    verbose: bool,
) {
    if destinations.is_empty() {
        eprintln!("error: at least one --destinations entry is required");
        std::process::exit(1);
    }

    let bar = if verbose {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner} optimizing... {elapsed}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(std::time::Duration::from_millis(100));
        Some(bar)
    } else {
        None
    };

    let request = OptimizationRequest {
        start_point: start.clone(),
        destinations: destinations.clone(),
        weights: RawWeights {
            time: weight_time,
            cost: weight_cost,
            carbon: weight_carbon,
        },
        fuel_cost_per_km,
        carbon_factor_per_km,
        comparison: vec![],
        time_budget_secs,
    };

    let mut all_addresses = vec![start];
    all_addresses.extend(destinations);

    let result = if demo {
        let provider = SyntheticProvider::new(&all_addresses, seed);
        last_mile_optimizer::orchestrator::optimize(&provider, &request, seed, None)
    } else {
        match RuntimeConfig::from_env() {
            Ok(config) => match HttpRoutingProvider::new(&config) {
                Ok(provider) => last_mile_optimizer::orchestrator::optimize(&provider, &request, seed, None),
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        }
    };

    if let Some(bar) = &bar {
        bar.finish_and_clear();
    }

    match result {
        Ok(response) => match serde_json::to_string_pretty(&response) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("error: failed to serialize response: {e}"),
        },
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}

fn run_compare(sizes: Vec<usize>, runs: usize, output: Option<PathBuf>, stats_output: Option<PathBuf>) {
    let config = BenchmarkConfig {
        instance_sizes: sizes,
        num_runs: runs,
        weights: Weights::normalized(50.0, 30.0, 20.0),
        ..BenchmarkConfig::default()
    };

    let mut benchmark = Benchmark::new(config);
    log::info!("running baseline vs IAFSA comparison");
    benchmark.run_all();

    for stat in benchmark.compute_statistics() {
        println!(
            "{:<12} instances={:<4} feasible={:<4} avg_fitness={:.4} best={:.4} worst={:.4} avg_time_s={:.4}",
            stat.algorithm,
            stat.num_instances,
            stat.num_feasible,
            stat.avg_fitness,
            stat.best_fitness,
            stat.worst_fitness,
            stat.avg_computation_time_s
        );
    }

    if let Some(path) = output {
        if let Err(e) = benchmark.export_to_csv(&path) {
            eprintln!("error: failed to export results CSV: {e}");
        }
    }
    if let Some(path) = stats_output {
        if let Err(e) = benchmark.export_statistics_csv(&path) {
            eprintln!("error: failed to export statistics CSV: {e}");
        }
    }
}
