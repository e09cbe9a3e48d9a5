//! Test fixtures for zone-planner.
//!
//! Provides realistic test data including:
//! - Riyadh neighbourhood locations
//! - Builders for customers, depots and polygons
//! - Distance providers with controlled behaviour
#![allow(dead_code)]

pub mod riyadh_locations;

pub use riyadh_locations::*;

use zone_planner::distance::{RouteGeometry, TravelMatrix};
use zone_planner::error::ProviderError;
use zone_planner::haversine::HaversineMatrix;
use zone_planner::model::{Customer, Depot, ZonePolygon};
use zone_planner::traits::DistanceProvider;

pub fn depot() -> Depot {
    Depot::new("Riyadh", DEPOT.lat, DEPOT.lng)
}

/// One customer per neighbourhood, ids `C01`, `C02`, ...
pub fn customers() -> Vec<Customer> {
    all_locations()
        .into_iter()
        .enumerate()
        .map(|(i, location)| {
            let id = format!("C{:02}", i + 1);
            let mut customer = Customer::new(id, location.lat, location.lng).with_city("Riyadh");
            customer.name = Some(location.name.to_string());
            customer
        })
        .collect()
}

/// Axis-aligned square ring with its south-west corner at `(lat, lng)`.
pub fn square(zone: &str, lat: f64, lng: f64, size: f64) -> ZonePolygon {
    ZonePolygon::new(
        zone,
        vec![(lat, lng), (lat + size, lng), (lat + size, lng + size), (lat, lng + size)],
    )
}

/// Haversine estimates, except that any cell touching a blocked point is
/// unreachable.
pub struct BlockedProvider {
    pub inner: HaversineMatrix,
    pub blocked: Vec<(f64, f64)>,
}

impl BlockedProvider {
    pub fn new(blocked: Vec<(f64, f64)>) -> Self {
        Self {
            inner: HaversineMatrix::default(),
            blocked,
        }
    }
}

impl DistanceProvider for BlockedProvider {
    fn table(
        &self,
        origins: &[(f64, f64)],
        destinations: &[(f64, f64)],
    ) -> Result<TravelMatrix, ProviderError> {
        let estimate = self.inner.table(origins, destinations)?;
        let mut distances = Vec::with_capacity(origins.len());
        let mut durations = Vec::with_capacity(origins.len());
        for (i, origin) in origins.iter().enumerate() {
            let mut distance_row = Vec::with_capacity(destinations.len());
            let mut duration_row = Vec::with_capacity(destinations.len());
            for (j, destination) in destinations.iter().enumerate() {
                let touches_blocked =
                    self.blocked.contains(origin) || self.blocked.contains(destination);
                let blocked = origin != destination && touches_blocked;
                if blocked {
                    distance_row.push(f64::INFINITY);
                    duration_row.push(f64::INFINITY);
                } else {
                    distance_row.push(estimate.distance_km(i, j));
                    duration_row.push(estimate.duration_min(i, j));
                }
            }
            distances.push(distance_row);
            durations.push(duration_row);
        }
        Ok(TravelMatrix::new(distances, durations, estimate.precision()))
    }

    fn route(&self, points: &[(f64, f64)]) -> Result<RouteGeometry, ProviderError> {
        self.inner.route(points)
    }
}
