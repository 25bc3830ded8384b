//! Weighted multi-objective fitness evaluation with non-linear priority
//! sharpening and an optional diversity penalty against a reference tour.

use crate::matrix::Matrix;
use crate::operators::{diversity, Tour};

/// Default fuel cost, currency units per km.
pub const DEFAULT_FUEL_COST_PER_KM: f64 = 0.15;
/// Default carbon emission factor, kg CO2 per km.
pub const DEFAULT_CARBON_FACTOR_PER_KM: f64 = 0.12;
/// Default diversity-penalty coefficient.
pub const DEFAULT_DIVERSITY_ALPHA: f64 = 0.15;

/// User-facing objective weights. May be supplied as percentages
/// (0-100) or proportions (0-1); the orchestrator normalizes before
/// these reach the evaluator, so by the time a `Weights` is built here
/// its fields are always proportions summing to 1 (or all-equal if the
/// caller supplied all zeros).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Weights {
    pub time: f64,
    pub cost: f64,
    pub carbon: f64,
}

impl Weights {
    /// Normalize arbitrary nonnegative weights to proportions summing to
    /// 1. Falls back to an equal split if all three are zero (or
    /// negative, which should never happen past input validation).
    pub fn normalized(time: f64, cost: f64, carbon: f64) -> Self {
        let sum = time + cost + carbon;
        if sum <= 0.0 {
            return Weights {
                time: 1.0 / 3.0,
                cost: 1.0 / 3.0,
                carbon: 1.0 / 3.0,
            };
        }
        Weights {
            time: time / sum,
            cost: cost / sum,
            carbon: carbon / sum,
        }
    }

    /// Which raw proportion is largest, and its value — used to detect
    /// the dominant priority and scale IAFSA's resources.
    pub fn dominant(&self) -> (Priority, f64) {
        let mut best = (Priority::Time, self.time);
        if self.cost > best.1 {
            best = (Priority::Cost, self.cost);
        }
        if self.carbon > best.1 {
            best = (Priority::Carbon, self.carbon);
        }
        best
    }

    /// Non-linear priority sharpening: raise each proportion to the 2.5
    /// power and renormalize, then amplify the dominant weight by 1.5x
    /// if it holds at least half the raw mass.
    fn sharpened(&self) -> Weights {
        const SHARPEN_EXPONENT: f64 = 2.5;
        const DOMINANT_AMPLIFICATION: f64 = 1.5;
        const DOMINANCE_THRESHOLD: f64 = 0.5;

        let raised = Weights {
            time: self.time.powf(SHARPEN_EXPONENT),
            cost: self.cost.powf(SHARPEN_EXPONENT),
            carbon: self.carbon.powf(SHARPEN_EXPONENT),
        };
        let mut sharpened = raised.renormalized();

        let (dominant, raw_share) = self.dominant();
        if raw_share >= DOMINANCE_THRESHOLD {
            match dominant {
                Priority::Time => sharpened.time *= DOMINANT_AMPLIFICATION,
                Priority::Cost => sharpened.cost *= DOMINANT_AMPLIFICATION,
                Priority::Carbon => sharpened.carbon *= DOMINANT_AMPLIFICATION,
            }
        }
        sharpened.renormalized()
    }

    fn renormalized(&self) -> Weights {
        let sum = self.time + self.cost + self.carbon;
        if sum <= 0.0 {
            return Weights {
                time: 1.0 / 3.0,
                cost: 1.0 / 3.0,
                carbon: 1.0 / 3.0,
            };
        }
        Weights {
            time: self.time / sum,
            cost: self.cost / sum,
            carbon: self.carbon / sum,
        }
    }
}

/// The objective weight that holds the largest raw share.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Time,
    Cost,
    Carbon,
}

/// Raw per-tour metrics before weighting, reused by the orchestrator for
/// the response's `{distance, time, cost, carbon}` fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct TourMetrics {
    pub time_s: f64,
    pub distance_km: f64,
    pub cost: f64,
    pub carbon_kg: f64,
}

/// Computes raw arc-sum metrics for a tour without applying any weights.
/// Returns `None` if the tour is structurally invalid.
pub fn tour_metrics(
    tour: &Tour,
    time_matrix: &Matrix,
    distance_matrix: &Matrix,
    fuel_cost_per_km: f64,
    carbon_factor_per_km: f64,
) -> Option<TourMetrics> {
    if !is_valid_tour(tour, time_matrix.size) {
        return None;
    }

    let mut time_s = 0.0;
    let mut distance_m = 0.0;
    for window in tour.windows(2) {
        let (a, b) = (window[0], window[1]);
        time_s += time_matrix.get(a, b);
        distance_m += distance_matrix.get(a, b);
    }

    let distance_km = distance_m / 1000.0;
    Some(TourMetrics {
        time_s,
        distance_km,
        cost: distance_km * fuel_cost_per_km,
        carbon_kg: distance_km * carbon_factor_per_km,
    })
}

/// A tour is valid iff it starts and ends at the depot and its interior
/// is exactly a permutation of `1..n`.
pub fn is_valid_tour(tour: &Tour, n: usize) -> bool {
    if n == 0 {
        return false;
    }
    if tour.len() != n + 1 {
        return false;
    }
    if tour.first() != Some(&0) || tour.last() != Some(&0) {
        return false;
    }
    let mut seen = vec![false; n];
    for &node in &tour[1..tour.len() - 1] {
        if node == 0 || node >= n || seen[node] {
            return false;
        }
        seen[node] = true;
    }
    true
}

/// Evaluates a candidate tour's weighted fitness. Invalid tours score
/// `f64::INFINITY` rather than raising — the search engine never
/// observes an error from candidate evaluation.
#[derive(Debug, Clone)]
pub struct FitnessEvaluator<'a> {
    pub time_matrix: &'a Matrix,
    pub distance_matrix: &'a Matrix,
    pub weights: Weights,
    pub fuel_cost_per_km: f64,
    pub carbon_factor_per_km: f64,
    pub reference_tour: Option<&'a Tour>,
    pub diversity_alpha: f64,
}

impl<'a> FitnessEvaluator<'a> {
    pub fn evaluate(&self, tour: &Tour) -> f64 {
        let metrics = match tour_metrics(
            tour,
            self.time_matrix,
            self.distance_matrix,
            self.fuel_cost_per_km,
            self.carbon_factor_per_km,
        ) {
            Some(m) => m,
            None => return f64::INFINITY,
        };

        let sharpened = self.weights.sharpened();
        let base = sharpened.time * metrics.time_s
            + sharpened.cost * metrics.cost
            + sharpened.carbon * metrics.carbon_kg;

        match self.reference_tour {
            Some(reference) if reference.len() == tour.len() => {
                let similarity = diversity(tour, reference);
                let (_, max_raw_share) = self.weights.dominant();
                let adjusted_alpha = if max_raw_share > 0.8 {
                    self.diversity_alpha * 0.3
                } else if max_raw_share > 0.6 {
                    self.diversity_alpha * 0.5
                } else {
                    self.diversity_alpha
                };
                base * (1.0 + adjusted_alpha * similarity)
            }
            _ => base,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix_from_rows(rows: Vec<Vec<f64>>) -> Matrix {
        let size = rows.len();
        let mut cells = Vec::with_capacity(size * size);
        for row in rows {
            cells.extend(row);
        }
        Matrix { size, cells }
    }

    #[test]
    fn invalid_tour_is_infinite_fitness() {
        let m = matrix_from_rows(vec![vec![0.0, 1.0], vec![1.0, 0.0]]);
        let evaluator = FitnessEvaluator {
            time_matrix: &m,
            distance_matrix: &m,
            weights: Weights::normalized(100.0, 0.0, 0.0),
            fuel_cost_per_km: DEFAULT_FUEL_COST_PER_KM,
            carbon_factor_per_km: DEFAULT_CARBON_FACTOR_PER_KM,
            reference_tour: None,
            diversity_alpha: DEFAULT_DIVERSITY_ALPHA,
        };
        // Missing the closing depot.
        assert_eq!(evaluator.evaluate(&vec![0, 1]), f64::INFINITY);
    }

    #[test]
    fn weight_normalization_is_scale_invariant() {
        let a = Weights::normalized(50.0, 30.0, 20.0);
        let b = Weights::normalized(5.0, 3.0, 2.0);
        assert!((a.time - b.time).abs() < 1e-12);
        assert!((a.cost - b.cost).abs() < 1e-12);
        assert!((a.carbon - b.carbon).abs() < 1e-12);
    }

    #[test]
    fn fitness_is_invariant_to_uniform_weight_scaling() {
        let m = matrix_from_rows(vec![
            vec![0.0, 1.0, 4.0],
            vec![1.0, 0.0, 2.0],
            vec![4.0, 2.0, 0.0],
        ]);
        let tour = vec![0, 1, 2, 0];

        let eval = |w: Weights| FitnessEvaluator {
            time_matrix: &m,
            distance_matrix: &m,
            weights: w,
            fuel_cost_per_km: DEFAULT_FUEL_COST_PER_KM,
            carbon_factor_per_km: DEFAULT_CARBON_FACTOR_PER_KM,
            reference_tour: None,
            diversity_alpha: DEFAULT_DIVERSITY_ALPHA,
        }
        .evaluate(&tour);

        let f1 = eval(Weights::normalized(50.0, 30.0, 20.0));
        let f2 = eval(Weights::normalized(5.0, 3.0, 2.0));
        assert!((f1 - f2).abs() < 1e-9);
    }

    #[test]
    fn all_zero_weights_fall_back_to_equal_split() {
        let w = Weights::normalized(0.0, 0.0, 0.0);
        assert!((w.time - 1.0 / 3.0).abs() < 1e-12);
        assert!((w.cost - 1.0 / 3.0).abs() < 1e-12);
        assert!((w.carbon - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn dominant_priority_detection() {
        let w = Weights::normalized(80.0, 10.0, 10.0);
        assert_eq!(w.dominant().0, Priority::Time);
    }
}
