//! Haversine distance provider (fallback when OSRM unavailable).
//!
//! Uses great-circle distance and a constant speed to estimate travel time.
//! Less accurate than OSRM (ignores roads) but always available.

use rayon::prelude::*;

use crate::distance::{Precision, RouteGeometry, TravelMatrix};
use crate::error::ProviderError;
use crate::polyline::Polyline;
use crate::traits::DistanceProvider;

/// Average driving speed assumption for time estimation.
pub const DEFAULT_SPEED_KMH: f64 = 40.0;

/// Earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two `(lat, lng)` points in kilometers.
pub fn haversine_km(from: (f64, f64), to: (f64, f64)) -> f64 {
    let (lat1, lng1) = from;
    let (lat2, lng2) = to;

    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lng = (lng2 - lng1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().min(1.0).asin();

    EARTH_RADIUS_KM * c
}

/// Haversine-based distance provider.
///
/// Every result it returns is tagged [`Precision::Estimated`].
#[derive(Debug, Clone)]
pub struct HaversineMatrix {
    /// Assumed average driving speed in km/h.
    pub speed_kmh: f64,
}

impl Default for HaversineMatrix {
    fn default() -> Self {
        Self {
            speed_kmh: DEFAULT_SPEED_KMH,
        }
    }
}

impl HaversineMatrix {
    pub fn new(speed_kmh: f64) -> Self {
        Self { speed_kmh }
    }

    /// Convert distance in km to travel time in minutes.
    pub fn km_to_minutes(&self, km: f64) -> f64 {
        km / self.speed_kmh * 60.0
    }
}

impl DistanceProvider for HaversineMatrix {
    fn table(
        &self,
        origins: &[(f64, f64)],
        destinations: &[(f64, f64)],
    ) -> Result<TravelMatrix, ProviderError> {
        if origins.is_empty() || destinations.is_empty() {
            return Err(ProviderError::EmptyInput);
        }

        let distances: Vec<Vec<f64>> = origins
            .par_iter()
            .map(|from| {
                destinations
                    .iter()
                    .map(|to| haversine_km(*from, *to))
                    .collect()
            })
            .collect();
        let durations = distances
            .iter()
            .map(|row| row.iter().map(|km| self.km_to_minutes(*km)).collect())
            .collect();

        Ok(TravelMatrix::new(distances, durations, Precision::Estimated))
    }

    fn route(&self, points: &[(f64, f64)]) -> Result<RouteGeometry, ProviderError> {
        if points.len() < 2 {
            return Err(ProviderError::EmptyInput);
        }
        let distance_km: f64 = points.windows(2).map(|pair| haversine_km(pair[0], pair[1])).sum();
        Ok(RouteGeometry {
            polyline: Polyline::new(points.to_vec()),
            distance_km,
            duration_min: self.km_to_minutes(distance_km),
            precision: Precision::Estimated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_same_point() {
        let dist = haversine_km((24.7, 46.7), (24.7, 46.7));
        assert!(dist < 0.001, "Same point should have ~0 distance");
    }

    #[test]
    fn test_haversine_known_distance() {
        // Riyadh (24.7136, 46.6753) to Jeddah (21.4858, 39.1925)
        // Great-circle distance ~845 km
        let dist = haversine_km((24.7136, 46.6753), (21.4858, 39.1925));
        assert!(dist > 820.0 && dist < 870.0, "Riyadh to Jeddah should be ~845km, got {}", dist);
    }

    #[test]
    fn test_matrix_diagonal_is_zero() {
        let provider = HaversineMatrix::default();
        let locations = vec![(24.70, 46.60), (24.72, 46.65), (24.75, 46.70)];
        let matrix = provider.square(&locations).unwrap();

        for i in 0..locations.len() {
            assert_eq!(matrix.distance_km(i, i), 0.0, "Diagonal should be zero");
        }
    }

    #[test]
    fn test_matrix_symmetric() {
        let provider = HaversineMatrix::default();
        let locations = vec![(24.70, 46.60), (24.72, 46.65)];
        let matrix = provider.square(&locations).unwrap();

        assert_eq!(matrix.duration_min(0, 1), matrix.duration_min(1, 0));
        assert_eq!(matrix.precision(), Precision::Estimated);
    }

    #[test]
    fn test_rectangular_table() {
        let provider = HaversineMatrix::default();
        let matrix = provider
            .table(&[(24.70, 46.60)], &[(24.72, 46.65), (24.75, 46.70), (24.80, 46.80)])
            .unwrap();
        assert_eq!(matrix.rows(), 1);
        assert_eq!(matrix.cols(), 3);
    }

    #[test]
    fn test_reasonable_travel_time() {
        let provider = HaversineMatrix::new(40.0);
        // 10 km at 40 km/h = 15 minutes
        assert!((provider.km_to_minutes(10.0) - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_input_is_rejected() {
        let provider = HaversineMatrix::default();
        assert!(matches!(provider.table(&[], &[(0.0, 0.0)]), Err(ProviderError::EmptyInput)));
    }
}
