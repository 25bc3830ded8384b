//! Last-Mile Optimizer
//!
//! A multi-objective last-mile delivery route optimizer. Given a single
//! depot and a list of delivery addresses, computes a tour minimizing a
//! user-weighted combination of travel time, fuel cost, and carbon
//! emissions.
//!
//! # Features
//!
//! - Batched geocoding and distance/time matrix construction with
//!   partial-failure tolerance
//! - A deterministic cheapest-arc TSP baseline
//! - An Improved Artificial Fish Swarm Algorithm (IAFSA) metaheuristic
//!   seeded from the baseline
//! - A pluggable `RoutingProvider` boundary for the external geocoding
//!   and matrix vendor
//!
//! # Example
//!
//! ```no_run
//! use last_mile_optimizer::config::RuntimeConfig;
//! use last_mile_optimizer::orchestrator::{OptimizationRequest, RawWeights};
//! use last_mile_optimizer::provider::HttpRoutingProvider;
//!
//! let config = RuntimeConfig::from_env().unwrap();
//! let provider = HttpRoutingProvider::new(&config).unwrap();
//!
//! let request = OptimizationRequest {
//!     start_point: "Bengaluru, Karnataka, India".to_string(),
//!     destinations: vec!["Koramangala".to_string(), "Indiranagar".to_string()],
//!     weights: RawWeights { time: 50.0, cost: 30.0, carbon: 20.0 },
//!     fuel_cost_per_km: 0.15,
//!     carbon_factor_per_km: 0.12,
//!     comparison: vec![],
//!     time_budget_secs: 30,
//! };
//!
//! let response = last_mile_optimizer::orchestrator::optimize(&provider, &request, 42, None);
//! ```

pub mod baseline;
pub mod benchmark;
pub mod config;
pub mod error;
pub mod fitness;
pub mod geocoding;
pub mod iafsa;
pub mod matrix;
pub mod operators;
pub mod orchestrator;
pub mod provider;

pub use error::OptimizerError;
pub use orchestrator::{optimize, OptimizationRequest, OptimizationResponse};
