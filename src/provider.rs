//! `RoutingProvider`: the injected boundary for geocoding, matrix, and
//! directions calls against the external routing vendor.
//!
//! The orchestrator never talks to a concrete HTTP client directly — it
//! only ever holds a `&dyn RoutingProvider` built once by the caller at
//! startup and handed down through every request. This keeps the provider
//! swappable (a blocking HTTP client in production, a deterministic
//! in-memory double in tests) and avoids the module-level-singleton
//! pattern the original source used for its Google Maps client.

use crate::error::{OptimizerError, Result};
use crate::geocoding::Coordinate;
use std::time::Duration;

/// Which matrix a `matrix_batch` call is requesting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixMode {
    /// Travel time in seconds (`duration.value`).
    Time,
    /// Travel distance in meters (`distance.value`).
    Distance,
}

/// Geocoding, distance/time matrix, and turn-by-turn directions, batched
/// the way the upstream vendor API expects.
pub trait RoutingProvider: Send + Sync {
    /// Resolve a single address string. `Ok(None)` means the vendor
    /// returned zero results (not an error); `Err` means the call itself
    /// failed after retries.
    fn geocode(&self, address: &str) -> Result<Option<Coordinate>>;

    /// Fetch one batch of the requested matrix. The returned grid is
    /// `origins.len() x destinations.len()`; a `None` cell means the
    /// vendor reported a non-OK element status for that pair.
    fn matrix_batch(
        &self,
        origins: &[Coordinate],
        destinations: &[Coordinate],
        mode: MatrixMode,
    ) -> Result<Vec<Vec<Option<f64>>>>;

    /// Fetch an encoded polyline for a tour's waypoints, for visualization
    /// only. `Ok(None)` if the vendor has nothing to return; failures are
    /// logged and treated as `Ok(None)` by callers since directions are
    /// never load-bearing for the optimization result itself.
    fn directions(&self, waypoints: &[Coordinate]) -> Result<Option<String>>;
}

/// Blocking HTTP implementation against a Google-Maps-shaped routing API
/// (geocode / distancematrix / directions endpoints). Retries transient
/// failures up to `max_retries` times before giving up on a call.
pub struct HttpRoutingProvider {
    client: reqwest::blocking::Client,
    base_url: url::Url,
    api_key: String,
    max_retries: u32,
}

impl HttpRoutingProvider {
    pub fn new(config: &crate::config::RuntimeConfig) -> Result<Self> {
        Self::with_base_url(
            config,
            "https://maps.googleapis.com/maps/api/"
                .parse()
                .expect("hardcoded base URL is valid"),
        )
    }

    /// Constructs a provider against an arbitrary base URL, so tests can
    /// point it at a local `wiremock` server.
    pub fn with_base_url(config: &crate::config::RuntimeConfig, base_url: url::Url) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| OptimizerError::Provider(format!("failed to build HTTP client: {e}")))?;

        Ok(HttpRoutingProvider {
            client,
            base_url,
            api_key: config.routing_api_key.clone(),
            max_retries: config.max_retries_external,
        })
    }

    fn retrying<T>(&self, mut attempt: impl FnMut() -> Result<T>) -> Result<T> {
        let mut last_err = None;
        for attempt_no in 0..=self.max_retries {
            match attempt() {
                Ok(v) => return Ok(v),
                Err(e) => {
                    log::warn!(
                        "routing provider call failed (attempt {}/{}): {}",
                        attempt_no + 1,
                        self.max_retries + 1,
                        e
                    );
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| OptimizerError::Provider("no attempts made".to_string())))
    }
}

#[derive(serde::Deserialize)]
struct GeocodeResponse {
    results: Vec<GeocodeResultEntry>,
}

#[derive(serde::Deserialize)]
struct GeocodeResultEntry {
    geometry: GeocodeGeometry,
}

#[derive(serde::Deserialize)]
struct GeocodeGeometry {
    location: GeocodeLocation,
}

#[derive(serde::Deserialize)]
struct GeocodeLocation {
    lat: f64,
    lng: f64,
}

#[derive(serde::Deserialize)]
struct DistanceMatrixResponse {
    rows: Vec<DistanceMatrixRow>,
}

#[derive(serde::Deserialize)]
struct DistanceMatrixRow {
    elements: Vec<DistanceMatrixElement>,
}

#[derive(serde::Deserialize)]
struct DistanceMatrixElement {
    status: String,
    duration: Option<ValueField>,
    distance: Option<ValueField>,
}

#[derive(serde::Deserialize)]
struct ValueField {
    value: f64,
}

impl RoutingProvider for HttpRoutingProvider {
    fn geocode(&self, address: &str) -> Result<Option<Coordinate>> {
        self.retrying(|| {
            let url = self
                .base_url
                .join("geocode/json")
                .map_err(|e| OptimizerError::Provider(e.to_string()))?;

            let resp = self
                .client
                .get(url)
                .query(&[("address", address), ("key", self.api_key.as_str())])
                .send()
                .map_err(|e| OptimizerError::Provider(e.to_string()))?
                .error_for_status()
                .map_err(|e| OptimizerError::Provider(e.to_string()))?
                .json::<GeocodeResponse>()
                .map_err(|e| OptimizerError::Provider(e.to_string()))?;

            Ok(resp
                .results
                .first()
                .map(|r| Coordinate::new(r.geometry.location.lat, r.geometry.location.lng)))
        })
    }

    fn matrix_batch(
        &self,
        origins: &[Coordinate],
        destinations: &[Coordinate],
        mode: MatrixMode,
    ) -> Result<Vec<Vec<Option<f64>>>> {
        self.retrying(|| {
            let origins_param = origins
                .iter()
                .map(|c| format!("{},{}", c.lat, c.lng))
                .collect::<Vec<_>>()
                .join("|");
            let destinations_param = destinations
                .iter()
                .map(|c| format!("{},{}", c.lat, c.lng))
                .collect::<Vec<_>>()
                .join("|");

            let url = self
                .base_url
                .join("distancematrix/json")
                .map_err(|e| OptimizerError::Provider(e.to_string()))?;

            let resp = self
                .client
                .get(url)
                .query(&[
                    ("origins", origins_param.as_str()),
                    ("destinations", destinations_param.as_str()),
                    ("mode", "driving"),
                    ("key", self.api_key.as_str()),
                ])
                .send()
                .map_err(|e| OptimizerError::Provider(e.to_string()))?
                .error_for_status()
                .map_err(|e| OptimizerError::Provider(e.to_string()))?
                .json::<DistanceMatrixResponse>()
                .map_err(|e| OptimizerError::Provider(e.to_string()))?;

            let mut grid = vec![vec![None; destinations.len()]; origins.len()];
            for (i, row) in resp.rows.iter().enumerate().take(origins.len()) {
                for (j, element) in row.elements.iter().enumerate().take(destinations.len()) {
                    if element.status != "OK" {
                        continue;
                    }
                    grid[i][j] = match mode {
                        MatrixMode::Time => element.duration.as_ref().map(|v| v.value),
                        MatrixMode::Distance => element.distance.as_ref().map(|v| v.value),
                    };
                }
            }
            Ok(grid)
        })
    }

    fn directions(&self, waypoints: &[Coordinate]) -> Result<Option<String>> {
        if waypoints.len() < 2 {
            return Ok(None);
        }
        let origin = waypoints[0];
        let destination = *waypoints.last().expect("checked len >= 2");
        let via = waypoints[1..waypoints.len() - 1]
            .iter()
            .map(|c| format!("{},{}", c.lat, c.lng))
            .collect::<Vec<_>>()
            .join("|");

        let outcome = self.retrying(|| {
            let url = self
                .base_url
                .join("directions/json")
                .map_err(|e| OptimizerError::Provider(e.to_string()))?;

            let origin_s = format!("{},{}", origin.lat, origin.lng);
            let dest_s = format!("{},{}", destination.lat, destination.lng);
            let resp = self
                .client
                .get(url)
                .query(&[
                    ("origin", origin_s.as_str()),
                    ("destination", dest_s.as_str()),
                    ("waypoints", via.as_str()),
                    ("mode", "driving"),
                    ("key", self.api_key.as_str()),
                ])
                .send()
                .map_err(|e| OptimizerError::Provider(e.to_string()))?
                .error_for_status()
                .map_err(|e| OptimizerError::Provider(e.to_string()))?
                .json::<serde_json::Value>()
                .map_err(|e| OptimizerError::Provider(e.to_string()))?;

            Ok(resp["routes"][0]["overview_polyline"]["points"]
                .as_str()
                .map(|s| s.to_string()))
        });

        // Directions are visualization-only: log and swallow failures
        // rather than failing the whole optimization.
        match outcome {
            Ok(p) => Ok(p),
            Err(e) => {
                log::error!("directions fetch failed, continuing without polyline: {}", e);
                Ok(None)
            }
        }
    }
}

/// A deterministic, network-free provider over Euclidean coordinates,
/// used by the CLI demo mode and by benchmarking so the crate is usable
/// without a live credential.
pub struct SyntheticProvider {
    coordinates: std::collections::HashMap<String, Coordinate>,
}

impl SyntheticProvider {
    pub fn new(addresses: &[String], rng_seed: u64) -> Self {
        use rand::prelude::*;
        use rand_chacha::ChaCha8Rng;

        let mut rng = ChaCha8Rng::seed_from_u64(rng_seed);
        let coordinates = addresses
            .iter()
            .map(|a| {
                let lat = rng.gen_range(-1.0..1.0) * 0.2 + 12.97; // roughly Bengaluru
                let lng = rng.gen_range(-1.0..1.0) * 0.2 + 77.59;
                (a.clone(), Coordinate::new(lat, lng))
            })
            .collect();

        SyntheticProvider { coordinates }
    }

    fn haversine_meters(a: Coordinate, b: Coordinate) -> f64 {
        const EARTH_RADIUS_M: f64 = 6_371_000.0;
        let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
        let d_lat = (b.lat - a.lat).to_radians();
        let d_lng = (b.lng - a.lng).to_radians();
        let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * h.sqrt().asin()
    }
}

impl RoutingProvider for SyntheticProvider {
    fn geocode(&self, address: &str) -> Result<Option<Coordinate>> {
        Ok(self.coordinates.get(address).copied())
    }

    fn matrix_batch(
        &self,
        origins: &[Coordinate],
        destinations: &[Coordinate],
        mode: MatrixMode,
    ) -> Result<Vec<Vec<Option<f64>>>> {
        let avg_speed_mps = 11.0; // ~40 km/h average urban driving speed
        Ok(origins
            .iter()
            .map(|o| {
                destinations
                    .iter()
                    .map(|d| {
                        let meters = Self::haversine_meters(*o, *d);
                        Some(match mode {
                            MatrixMode::Distance => meters,
                            MatrixMode::Time => meters / avg_speed_mps,
                        })
                    })
                    .collect()
            })
            .collect())
    }

    fn directions(&self, _waypoints: &[Coordinate]) -> Result<Option<String>> {
        Ok(None)
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use std::collections::HashMap;

    /// An in-memory provider for unit tests: addresses map to fixed
    /// coordinates or explicit failures, and matrix cells are derived
    /// from Euclidean distance over those coordinates.
    pub struct StubProvider {
        coords: HashMap<String, Coordinate>,
        failures: std::collections::HashSet<String>,
        pub directions_response: Option<String>,
    }

    impl StubProvider {
        pub fn new() -> Self {
            StubProvider {
                coords: HashMap::new(),
                failures: std::collections::HashSet::new(),
                directions_response: None,
            }
        }

        pub fn with_coord(mut self, address: &str, coord: Coordinate) -> Self {
            self.coords.insert(address.to_string(), coord);
            self
        }

        pub fn with_failure(mut self, address: &str) -> Self {
            self.failures.insert(address.to_string());
            self
        }

        fn distance(a: Coordinate, b: Coordinate) -> f64 {
            let dx = a.lat - b.lat;
            let dy = a.lng - b.lng;
            (dx * dx + dy * dy).sqrt() * 100_000.0
        }
    }

    impl Default for StubProvider {
        fn default() -> Self {
            Self::new()
        }
    }

    impl RoutingProvider for StubProvider {
        fn geocode(&self, address: &str) -> Result<Option<Coordinate>> {
            if self.failures.contains(address) {
                return Ok(None);
            }
            Ok(self.coords.get(address).copied())
        }

        fn matrix_batch(
            &self,
            origins: &[Coordinate],
            destinations: &[Coordinate],
            mode: MatrixMode,
        ) -> Result<Vec<Vec<Option<f64>>>> {
            Ok(origins
                .iter()
                .map(|o| {
                    destinations
                        .iter()
                        .map(|d| {
                            let meters = Self::distance(*o, *d);
                            Some(match mode {
                                MatrixMode::Distance => meters,
                                MatrixMode::Time => meters / 10.0,
                            })
                        })
                        .collect()
                })
                .collect())
        }

        fn directions(&self, _waypoints: &[Coordinate]) -> Result<Option<String>> {
            Ok(self.directions_response.clone())
        }
    }
}

#[cfg(test)]
mod http_provider_tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config() -> RuntimeConfig {
        RuntimeConfig {
            routing_api_key: "test-key".to_string(),
            http_timeout: Duration::from_secs(5),
            max_retries_external: 0,
        }
    }

    // `HttpRoutingProvider` uses a blocking client, so the call runs on a
    // dedicated blocking thread while the mock server runs on the async
    // runtime underneath this test.
    #[tokio::test]
    async fn geocode_parses_the_first_result() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/geocode/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [{"geometry": {"location": {"lat": 12.97, "lng": 77.59}}}]
            })))
            .mount(&server)
            .await;

        let base_url: url::Url = format!("{}/", server.uri()).parse().unwrap();
        let provider = HttpRoutingProvider::with_base_url(&config(), base_url).unwrap();

        let coord = tokio::task::spawn_blocking(move || provider.geocode("Bengaluru"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(coord, Some(Coordinate::new(12.97, 77.59)));
    }

    #[tokio::test]
    async fn geocode_with_no_results_is_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/geocode/json"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"results": []})),
            )
            .mount(&server)
            .await;

        let base_url: url::Url = format!("{}/", server.uri()).parse().unwrap();
        let provider = HttpRoutingProvider::with_base_url(&config(), base_url).unwrap();

        let coord = tokio::task::spawn_blocking(move || provider.geocode("Nowhere"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(coord, None);
    }

    #[tokio::test]
    async fn server_error_exhausts_retries_and_surfaces_a_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/geocode/json"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let base_url: url::Url = format!("{}/", server.uri()).parse().unwrap();
        let provider = HttpRoutingProvider::with_base_url(&config(), base_url).unwrap();

        let result = tokio::task::spawn_blocking(move || provider.geocode("Bengaluru"))
            .await
            .unwrap();

        assert!(matches!(result, Err(OptimizerError::Provider(_))));
    }
}
