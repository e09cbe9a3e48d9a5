//! Travel matrices and the provider chosen for a run.
//!
//! [`TravelProvider`] is fixed at construction: either a live OSRM client
//! backed by a haversine fallback, or haversine estimates only. Callers never
//! check for a missing client; they inspect [`Precision`] on the result.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::EngineConfig;
use crate::error::ProviderError;
use crate::haversine::HaversineMatrix;
use crate::osrm::OsrmClient;
use crate::polyline::Polyline;
use crate::traits::DistanceProvider;

/// Whether distances came from the road network or a geometric estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precision {
    Live,
    Estimated,
}

/// Distance (km) and duration (min) cells, row per origin.
///
/// Unreachable live cells hold `f64::INFINITY`.
#[derive(Debug, Clone, PartialEq)]
pub struct TravelMatrix {
    distances_km: Vec<Vec<f64>>,
    durations_min: Vec<Vec<f64>>,
    precision: Precision,
}

impl TravelMatrix {
    pub fn new(
        distances_km: Vec<Vec<f64>>,
        durations_min: Vec<Vec<f64>>,
        precision: Precision,
    ) -> Self {
        Self {
            distances_km,
            durations_min,
            precision,
        }
    }

    pub fn rows(&self) -> usize {
        self.distances_km.len()
    }

    pub fn cols(&self) -> usize {
        self.distances_km.first().map_or(0, Vec::len)
    }

    pub fn distance_km(&self, from: usize, to: usize) -> f64 {
        self.distances_km[from][to]
    }

    pub fn duration_min(&self, from: usize, to: usize) -> f64 {
        self.durations_min[from][to]
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    pub fn is_reachable(&self, from: usize, to: usize) -> bool {
        self.distances_km[from][to].is_finite() && self.durations_min[from][to].is_finite()
    }
}

/// Path geometry and totals for a sequence of points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteGeometry {
    pub polyline: Polyline,
    pub distance_km: f64,
    pub duration_min: f64,
    pub precision: Precision,
}

/// Distance backend selected for a run.
#[derive(Debug, Clone)]
pub enum TravelProvider {
    /// Road-network queries; any failure degrades to `fallback` for the whole request.
    Live {
        client: OsrmClient,
        fallback: HaversineMatrix,
    },
    Estimated(HaversineMatrix),
}

impl TravelProvider {
    /// Picks the live provider when OSRM is configured and the client builds.
    pub fn from_config(config: &EngineConfig) -> Self {
        let fallback = HaversineMatrix::new(config.fallback_speed_kmh);
        let Some(osrm) = config.osrm.clone() else {
            return Self::Estimated(fallback);
        };
        match OsrmClient::new(osrm) {
            Ok(client) => Self::Live { client, fallback },
            Err(err) => {
                warn!(error = %err, "OSRM client could not be built; using estimated distances");
                Self::Estimated(fallback)
            }
        }
    }

    pub fn estimated(speed_kmh: f64) -> Self {
        Self::Estimated(HaversineMatrix::new(speed_kmh))
    }

    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live { .. })
    }
}

impl DistanceProvider for TravelProvider {
    fn table(
        &self,
        origins: &[(f64, f64)],
        destinations: &[(f64, f64)],
    ) -> Result<TravelMatrix, ProviderError> {
        match self {
            Self::Estimated(estimate) => estimate.table(origins, destinations),
            Self::Live { client, fallback } => {
                if origins.is_empty() || destinations.is_empty() {
                    return Err(ProviderError::EmptyInput);
                }
                client.table(origins, destinations).or_else(|err| {
                    warn!(
                        error = %err,
                        origins = origins.len(),
                        destinations = destinations.len(),
                        "live distance table failed; falling back to estimates"
                    );
                    fallback.table(origins, destinations)
                })
            }
        }
    }

    fn route(&self, points: &[(f64, f64)]) -> Result<RouteGeometry, ProviderError> {
        match self {
            Self::Estimated(estimate) => estimate.route(points),
            Self::Live { client, fallback } => {
                if points.len() < 2 {
                    return Err(ProviderError::EmptyInput);
                }
                client.route(points).or_else(|err| {
                    warn!(
                        error = %err,
                        points = points.len(),
                        "live route failed; falling back to estimates"
                    );
                    fallback.route(points)
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::osrm::OsrmConfig;

    #[test]
    fn test_unconfigured_provider_is_estimated() {
        let provider = TravelProvider::from_config(&EngineConfig::default());
        assert!(!provider.is_live());
        let matrix = provider.square(&[(24.7, 46.6), (24.8, 46.7)]).unwrap();
        assert_eq!(matrix.precision(), Precision::Estimated);
    }

    #[test]
    fn test_unreachable_live_service_falls_back() {
        let config = EngineConfig {
            osrm: Some(OsrmConfig {
                // Port 9 (discard) on loopback refuses connections.
                base_url: "http://127.0.0.1:9".to_string(),
                max_retries: 0,
                backoff_ms: 1,
                timeout_secs: 2,
                ..OsrmConfig::default()
            }),
            ..EngineConfig::default()
        };
        let provider = TravelProvider::from_config(&config);
        assert!(provider.is_live());

        let matrix = provider.square(&[(24.7, 46.6), (24.8, 46.7)]).unwrap();
        assert_eq!(matrix.precision(), Precision::Estimated);
        assert!(matrix.distance_km(0, 1) > 0.0);

        let route = provider.route(&[(24.7, 46.6), (24.8, 46.7)]).unwrap();
        assert_eq!(route.precision, Precision::Estimated);
    }

    #[test]
    fn test_empty_request_fails_atomically() {
        let provider = TravelProvider::estimated(40.0);
        assert!(matches!(provider.table(&[], &[]), Err(ProviderError::EmptyInput)));
    }
}
