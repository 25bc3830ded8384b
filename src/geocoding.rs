//! Address resolution: turning caller-supplied address strings into
//! coordinates, tolerating partial failure.

use serde::{Deserialize, Serialize};

/// A caller-supplied address string. Index 0 in a request's address list
/// is always the depot; indices `1..N` are destinations in request order.
pub type Address = String;

/// A resolved geographic point, or absence of one for an address that
/// failed to geocode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Self {
        Coordinate { lat, lng }
    }
}

/// Result of geocoding a batch of addresses: positional correspondence is
/// preserved, `coordinates[i]` corresponds to `addresses[i]` whether
/// resolved or not.
#[derive(Debug, Clone, Default)]
pub struct GeocodeResult {
    pub coordinates: Vec<Option<Coordinate>>,
    pub failed_addresses: Vec<String>,
}

impl GeocodeResult {
    /// Indices (into the original address list) that resolved successfully.
    pub fn resolved_indices(&self) -> Vec<usize> {
        self.coordinates
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.map(|_| i))
            .collect()
    }

    pub fn resolved_count(&self) -> usize {
        self.coordinates.iter().filter(|c| c.is_some()).count()
    }
}

/// Resolve a batch of addresses to coordinates via the given provider.
/// Individual failures are recorded in `failed_addresses` rather than
/// aborting the batch.
pub fn geocode_addresses(
    provider: &dyn crate::provider::RoutingProvider,
    addresses: &[Address],
) -> GeocodeResult {
    let mut coordinates = Vec::with_capacity(addresses.len());
    let mut failed_addresses = Vec::new();

    for address in addresses {
        match provider.geocode(address) {
            Ok(Some(coord)) => coordinates.push(Some(coord)),
            Ok(None) => {
                log::warn!("geocoding returned no results for address: '{}'", address);
                failed_addresses.push(address.clone());
                coordinates.push(None);
            }
            Err(e) => {
                log::error!("geocoding error for address '{}': {}", address, e);
                failed_addresses.push(address.clone());
                coordinates.push(None);
            }
        }
    }

    GeocodeResult {
        coordinates,
        failed_addresses,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::test_support::StubProvider;

    #[test]
    fn preserves_positional_correspondence_with_failures() {
        let provider = StubProvider::new()
            .with_coord("depot", Coordinate::new(0.0, 0.0))
            .with_coord("a", Coordinate::new(1.0, 1.0))
            .with_failure("b");

        let addresses = vec!["depot".to_string(), "a".to_string(), "b".to_string()];
        let result = geocode_addresses(&provider, &addresses);

        assert_eq!(result.coordinates.len(), 3);
        assert!(result.coordinates[0].is_some());
        assert!(result.coordinates[1].is_some());
        assert!(result.coordinates[2].is_none());
        assert_eq!(result.failed_addresses, vec!["b".to_string()]);
        assert_eq!(result.resolved_indices(), vec![0, 1]);
    }
}
