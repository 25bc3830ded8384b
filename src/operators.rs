//! Pure, deterministic tour operators shared by the baseline solver and
//! the IAFSA engine. None of these touch fitness or I/O.

use crate::matrix::Matrix;
use ordered_float::OrderedFloat;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::collections::HashSet;

/// A closed tour: `tour[0] == tour[tour.len()-1] == 0` and every index in
/// `1..n` appears exactly once in between.
pub type Tour = Vec<usize>;

/// Swap `k` random disjoint interior positions. Returns the input
/// unchanged if fewer than two interior positions exist.
pub fn perturb(tour: &Tour, k: usize, rng: &mut ChaCha8Rng) -> Tour {
    let mut result = tour.clone();
    let interior_len = result.len().saturating_sub(2);
    if interior_len < 2 {
        return result;
    }

    let mut available: Vec<usize> = (1..result.len() - 1).collect();
    for _ in 0..k {
        if available.len() < 2 {
            break;
        }
        let a_pos = rng.gen_range(0..available.len());
        let a = available.remove(a_pos);
        let b_pos = rng.gen_range(0..available.len());
        let b = available.remove(b_pos);
        result.swap(a, b);
    }
    result
}

/// Depot + uniformly random permutation of `1..n` + depot.
pub fn random_tour(n: usize, rng: &mut ChaCha8Rng) -> Tour {
    let mut interior: Vec<usize> = (1..n).collect();
    interior.shuffle(rng);

    let mut tour = Vec::with_capacity(n + 1);
    tour.push(0);
    tour.extend(interior);
    tour.push(0);
    tour
}

/// Nearest-neighbor construction over `matrix`, visiting `start` right
/// after the depot, then greedily choosing the closest unvisited node at
/// each step, and closing back to the depot.
///
/// Returns `None` if some unvisited node becomes unreachable (all
/// candidate arcs are infinite) before the tour is complete.
pub fn greedy(matrix: &Matrix, start: usize) -> Option<Tour> {
    let n = matrix.size;
    if n < 2 {
        return None;
    }

    let mut visited = HashSet::new();
    visited.insert(0);
    let mut tour = vec![0];

    let current_start = start.clamp(1, n - 1);
    let mut current = current_start;
    tour.push(current);
    visited.insert(current);

    while visited.len() < n {
        let next = (1..n)
            .filter(|j| !visited.contains(j))
            .map(|j| (j, matrix.get(current, j)))
            .min_by_key(|&(_, d)| OrderedFloat(d));

        match next {
            Some((j, d)) if d.is_finite() => {
                tour.push(j);
                visited.insert(j);
                current = j;
            }
            _ => return None,
        }
    }

    tour.push(0);
    Some(tour)
}

/// Fraction of matching interior positions between two tours of equal
/// length. Returns 0.0 if either tour has no interior positions.
pub fn diversity(a: &Tour, b: &Tour) -> f64 {
    if a.len() != b.len() || a.len() <= 2 {
        return 0.0;
    }
    let interior_len = a.len() - 2;
    let matches = a[1..a.len() - 1]
        .iter()
        .zip(&b[1..b.len() - 1])
        .filter(|(x, y)| x == y)
        .count();
    matches as f64 / interior_len as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(7)
    }

    #[test]
    fn perturb_preserves_the_permutation() {
        let tour = vec![0, 1, 2, 3, 4, 0];
        let mut r = rng();
        let perturbed = perturb(&tour, 2, &mut r);

        let mut sorted = perturbed.clone();
        sorted.sort();
        assert_eq!(sorted, vec![0, 0, 1, 2, 3, 4]);
        assert_eq!(perturbed[0], 0);
        assert_eq!(*perturbed.last().unwrap(), 0);
    }

    #[test]
    fn perturb_noop_with_one_interior_position() {
        let tour = vec![0, 1, 0];
        let mut r = rng();
        assert_eq!(perturb(&tour, 3, &mut r), tour);
    }

    #[test]
    fn random_tour_is_a_valid_permutation() {
        let mut r = rng();
        let tour = random_tour(6, &mut r);
        assert_eq!(tour.first(), Some(&0));
        assert_eq!(tour.last(), Some(&0));
        let mut interior = tour[1..tour.len() - 1].to_vec();
        interior.sort();
        assert_eq!(interior, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn greedy_fails_on_unreachable_node() {
        let mut m = Matrix {
            size: 3,
            cells: vec![f64::INFINITY; 9],
        };
        m.set(0, 1, 1.0);
        m.set(1, 0, 1.0);
        // node 2 unreachable from everywhere but itself
        assert!(greedy(&m, 1).is_none());
    }

    #[test]
    fn diversity_is_fraction_of_equal_interior_slots() {
        let a = vec![0, 1, 2, 3, 0];
        let b = vec![0, 1, 4, 3, 0];
        assert!((diversity(&a, &b) - (2.0 / 3.0)).abs() < 1e-9);
    }
}
