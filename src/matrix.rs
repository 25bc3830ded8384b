//! Full NxN time/distance matrix construction over a list of addresses,
//! with batched provider calls and placeholder rows/columns for
//! addresses that failed to geocode.

use crate::error::{OptimizerError, Result};
use crate::geocoding::{geocode_addresses, Address, Coordinate};
use crate::provider::{MatrixMode, RoutingProvider};

/// Vendor limit: at most this many origins in a single matrix request.
const MAX_ORIGINS_PER_REQUEST: usize = 10;
/// Vendor limit: at most this many origin×destination elements per request.
const MAX_ELEMENTS_PER_REQUEST: usize = 100;

/// A square `N x N` matrix of nonnegative reals with `f64::INFINITY` for
/// unreachable or unresolved cells.
#[derive(Debug, Clone)]
pub struct Matrix {
    pub size: usize,
    pub(crate) cells: Vec<f64>,
}

impl Matrix {
    fn filled(size: usize, value: f64) -> Self {
        Matrix {
            size,
            cells: vec![value; size * size],
        }
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.cells[i * self.size + j]
    }

    pub(crate) fn set(&mut self, i: usize, j: usize, value: f64) {
        self.cells[i * self.size + j] = value;
    }
}

/// Result of building one matrix: the full matrix plus which addresses
/// never resolved, for the caller to surface as a warning.
pub struct MatrixBuildResult {
    pub matrix: Matrix,
    pub unresolved_addresses: Vec<String>,
}

/// The addresses geocoded once and shared by every matrix mode built
/// from them, so concurrent time/distance builds never re-issue the
/// same geocoding calls.
pub struct ResolvedAddresses {
    full_size: usize,
    resolved_indices: Vec<usize>,
    resolved_coords: Vec<Coordinate>,
    unresolved_addresses: Vec<String>,
}

impl ResolvedAddresses {
    /// The coordinate for a full-address index, or `None` if that
    /// address never resolved.
    pub fn coordinate_at(&self, full_index: usize) -> Option<Coordinate> {
        self.resolved_indices
            .iter()
            .position(|&i| i == full_index)
            .map(|pos| self.resolved_coords[pos])
    }
}

/// Geocode `addresses` once. Fails if fewer than two resolve.
pub fn resolve_addresses(
    provider: &dyn RoutingProvider,
    addresses: &[Address],
) -> Result<ResolvedAddresses> {
    let geocoded = geocode_addresses(provider, addresses);
    if geocoded.resolved_count() < 2 {
        return Err(OptimizerError::MatrixUnavailable(format!(
            "only {} of {} addresses resolved; at least 2 are required",
            geocoded.resolved_count(),
            addresses.len()
        )));
    }

    let resolved_indices = geocoded.resolved_indices();
    let resolved_coords = resolved_indices
        .iter()
        .map(|&i| geocoded.coordinates[i].expect("index came from resolved_indices"))
        .collect();

    Ok(ResolvedAddresses {
        full_size: addresses.len(),
        resolved_indices,
        resolved_coords,
        unresolved_addresses: geocoded.failed_addresses,
    })
}

/// Build the full matrix for one mode from an already-resolved address
/// set. Safe to call concurrently for different modes against the same
/// `ResolvedAddresses` since it only reads from it.
pub fn build_matrix(
    provider: &dyn RoutingProvider,
    resolved: &ResolvedAddresses,
    mode: MatrixMode,
) -> Result<MatrixBuildResult> {
    let compact = build_compact_matrix(provider, &resolved.resolved_coords, mode)?;
    let matrix = expand(resolved.full_size, &resolved.resolved_indices, &compact);
    Ok(MatrixBuildResult {
        matrix,
        unresolved_addresses: resolved.unresolved_addresses.clone(),
    })
}

/// Convenience wrapper for tests and the CLI: geocode once and build
/// both matrices sequentially.
pub fn build_matrices(
    provider: &dyn RoutingProvider,
    addresses: &[Address],
) -> Result<(MatrixBuildResult, MatrixBuildResult)> {
    let resolved = resolve_addresses(provider, addresses)?;
    let time = build_matrix(provider, &resolved, MatrixMode::Time)?;
    let distance = build_matrix(provider, &resolved, MatrixMode::Distance)?;
    Ok((time, distance))
}

/// Query the provider in batches and assemble a compact `n x n` matrix
/// over `coords` (no unresolved entries).
fn build_compact_matrix(
    provider: &dyn RoutingProvider,
    coords: &[Coordinate],
    mode: MatrixMode,
) -> Result<Matrix> {
    let n = coords.len();
    let mut matrix = Matrix::filled(n, f64::INFINITY);
    for i in 0..n {
        matrix.set(i, i, 0.0);
    }

    let mut origin_start = 0;
    while origin_start < n {
        let origins_in_batch = (n - origin_start).min(MAX_ORIGINS_PER_REQUEST);
        let destinations_per_batch = (MAX_ELEMENTS_PER_REQUEST / origins_in_batch).max(1);
        let origins = &coords[origin_start..origin_start + origins_in_batch];

        let mut dest_start = 0;
        while dest_start < n {
            let dest_count = (n - dest_start).min(destinations_per_batch);
            let destinations = &coords[dest_start..dest_start + dest_count];

            match provider.matrix_batch(origins, destinations, mode) {
                Ok(grid) => {
                    for (oi, row) in grid.iter().enumerate() {
                        for (dj, cell) in row.iter().enumerate() {
                            if let Some(value) = cell {
                                matrix.set(origin_start + oi, dest_start + dj, *value);
                            }
                        }
                    }
                }
                Err(e) => {
                    log::warn!(
                        "matrix batch failed (origins {}..{}, destinations {}..{}): {}",
                        origin_start,
                        origin_start + origins_in_batch,
                        dest_start,
                        dest_start + dest_count,
                        e
                    );
                }
            }

            dest_start += dest_count;
        }

        origin_start += origins_in_batch;
    }

    Ok(matrix)
}

/// Expand a compact matrix over resolved indices into the full
/// `full_size x full_size` matrix, leaving unresolved rows/columns at
/// infinity.
fn expand(full_size: usize, resolved_indices: &[usize], compact: &Matrix) -> Matrix {
    let mut full = Matrix::filled(full_size, f64::INFINITY);
    for (ci, &fi) in resolved_indices.iter().enumerate() {
        for (cj, &fj) in resolved_indices.iter().enumerate() {
            full.set(fi, fj, compact.get(ci, cj));
        }
    }
    full
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::test_support::StubProvider;

    #[test]
    fn unresolved_rows_and_columns_are_infinite() {
        let provider = StubProvider::new()
            .with_coord("depot", Coordinate::new(0.0, 0.0))
            .with_coord("a", Coordinate::new(0.0, 1.0))
            .with_coord("c", Coordinate::new(0.0, 2.0))
            .with_failure("b");

        let addresses = vec![
            "depot".to_string(),
            "a".to_string(),
            "b".to_string(),
            "c".to_string(),
        ];
        let (time, _distance) = build_matrices(&provider, &addresses).unwrap();

        assert_eq!(time.unresolved_addresses, vec!["b".to_string()]);
        for j in 0..4 {
            assert!(time.matrix.get(2, j).is_infinite());
            assert!(time.matrix.get(j, 2).is_infinite());
        }
        assert!(time.matrix.get(0, 1).is_finite());
        assert!(time.matrix.get(1, 3).is_finite());
    }

    #[test]
    fn too_few_resolved_addresses_is_an_error() {
        let provider = StubProvider::new().with_failure("a").with_failure("b");
        let addresses = vec!["a".to_string(), "b".to_string()];
        let result = build_matrices(&provider, &addresses);
        assert!(matches!(result, Err(OptimizerError::MatrixUnavailable(_))));
    }

    #[test]
    fn batches_respect_vendor_limits() {
        // 25 addresses forces 3 origin batches (10 + 10 + 5).
        let mut provider = StubProvider::new();
        let mut addresses = Vec::new();
        for i in 0..25 {
            let name = format!("addr-{i}");
            provider = provider.with_coord(&name, Coordinate::new(0.0, i as f64));
            addresses.push(name);
        }

        let (time, _distance) = build_matrices(&provider, &addresses).unwrap();
        assert_eq!(time.matrix.size, 25);
        assert_eq!(time.matrix.get(0, 0), 0.0);
        assert!(time.matrix.get(0, 24).is_finite());
    }
}
