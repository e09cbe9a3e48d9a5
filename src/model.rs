//! Domain records consumed and produced by the engine.
//!
//! Coordinates are `(lat, lng)` tuples throughout, matching the rest of the
//! crate.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::distance::Precision;
use crate::error::InputError;

/// Customer identifier.
pub type CustomerId = String;

/// Zone identifier.
pub type ZoneId = String;

/// A geolocated customer. Read-only for the duration of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub area: Option<String>,
    /// Zone tag carried over from the source dataset, if any.
    #[serde(default)]
    pub zone: Option<ZoneId>,
}

impl Customer {
    pub fn new(id: impl Into<CustomerId>, lat: f64, lng: f64) -> Self {
        Self {
            id: id.into(),
            lat,
            lng,
            name: None,
            city: None,
            area: None,
            zone: None,
        }
    }

    pub fn with_zone(mut self, zone: impl Into<ZoneId>) -> Self {
        self.zone = Some(zone.into());
        self
    }

    pub fn with_city(mut self, city: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self
    }

    pub fn location(&self) -> (f64, f64) {
        (self.lat, self.lng)
    }
}

/// Start/end anchor for routes and origin for polar sectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Depot {
    pub code: String,
    pub lat: f64,
    pub lng: f64,
}

impl Depot {
    pub fn new(code: impl Into<String>, lat: f64, lng: f64) -> Self {
        Self {
            code: code.into(),
            lat,
            lng,
        }
    }

    pub fn location(&self) -> (f64, f64) {
        (self.lat, self.lng)
    }

    /// Upper-cased first three characters of the depot code, used in zone ids.
    pub fn zone_prefix(&self) -> String {
        self.code.chars().take(3).collect::<String>().to_uppercase()
    }

    pub fn validate(&self) -> Result<(), InputError> {
        if !valid_coordinate(self.lat, self.lng) {
            return Err(InputError::InvalidDepot {
                code: self.code.clone(),
                lat: self.lat,
                lng: self.lng,
            });
        }
        Ok(())
    }
}

/// True when the pair is finite and within the WGS84 ranges.
pub fn valid_coordinate(lat: f64, lng: f64) -> bool {
    lat.is_finite()
        && lng.is_finite()
        && (-90.0..=90.0).contains(&lat)
        && (-180.0..=180.0).contains(&lng)
}

/// Rejects empty sets, bad coordinates and duplicate ids.
pub fn validate_customers(customers: &[Customer]) -> Result<(), InputError> {
    if customers.is_empty() {
        return Err(InputError::EmptyCustomers);
    }
    let mut seen = HashSet::with_capacity(customers.len());
    for customer in customers {
        if !valid_coordinate(customer.lat, customer.lng) {
            return Err(InputError::InvalidCoordinate {
                id: customer.id.clone(),
                lat: customer.lat,
                lng: customer.lng,
            });
        }
        if !seen.insert(customer.id.as_str()) {
            return Err(InputError::DuplicateCustomer(customer.id.clone()));
        }
    }
    Ok(())
}

/// Customer → zone mapping produced by a zoning strategy.
///
/// Every customer of a run is either in `zones` or in `unassigned`, never both.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZoneAssignment {
    zones: BTreeMap<CustomerId, ZoneId>,
    unassigned: Vec<CustomerId>,
}

impl ZoneAssignment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&mut self, customer: impl Into<CustomerId>, zone: impl Into<ZoneId>) {
        let customer = customer.into();
        self.unassigned.retain(|id| *id != customer);
        self.zones.insert(customer, zone.into());
    }

    pub fn mark_unassigned(&mut self, customer: impl Into<CustomerId>) {
        let customer = customer.into();
        self.zones.remove(&customer);
        if !self.unassigned.contains(&customer) {
            self.unassigned.push(customer);
        }
    }

    pub fn zone_of(&self, customer: &str) -> Option<&ZoneId> {
        self.zones.get(customer)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CustomerId, &ZoneId)> {
        self.zones.iter()
    }

    pub fn unassigned(&self) -> &[CustomerId] {
        &self.unassigned
    }

    /// Number of customers with a zone.
    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty() && self.unassigned.is_empty()
    }

    /// Per-zone customer counts, ordered by zone id.
    pub fn counts(&self) -> BTreeMap<ZoneId, usize> {
        let mut counts = BTreeMap::new();
        for zone in self.zones.values() {
            *counts.entry(zone.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Customers of `zone`, in input order.
    pub fn customers_in<'a>(&self, zone: &str, customers: &'a [Customer]) -> Vec<&'a Customer> {
        customers
            .iter()
            .filter(|customer| self.zone_of(&customer.id).map(String::as_str) == Some(zone))
            .collect()
    }
}

/// Closed ring of `(lat, lng)` vertices bounding a zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZonePolygon {
    pub zone_id: ZoneId,
    pub ring: Vec<(f64, f64)>,
    #[serde(default)]
    pub color: Option<String>,
}

impl ZonePolygon {
    /// Builds a polygon, closing the ring if the caller left it open.
    pub fn new(zone_id: impl Into<ZoneId>, ring: Vec<(f64, f64)>) -> Self {
        Self {
            zone_id: zone_id.into(),
            ring: crate::geometry::close_ring(ring),
            color: None,
        }
    }
}

/// Where a zone boundary came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundarySource {
    Sector,
    Isochrone,
    ConvexHull,
    Manual,
}

/// Rendered zone boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneBoundary {
    pub polygon: ZonePolygon,
    pub centroid: (f64, f64),
    pub source: BoundarySource,
}

/// Partial override of route constraints, e.g. for a single city.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstraintOverrides {
    pub max_customers_per_route: Option<usize>,
    pub min_customers_per_route: Option<usize>,
    pub max_route_duration_minutes: Option<f64>,
    pub max_distance_per_route_km: Option<f64>,
    pub time_budget_secs: Option<u64>,
}

/// Limits applied to the routes of one zone.
///
/// Capacity and duration are hard; distance and minimum size are soft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintSet {
    pub max_customers_per_route: usize,
    pub min_customers_per_route: usize,
    pub max_route_duration_minutes: f64,
    pub max_distance_per_route_km: f64,
    pub time_budget_secs: u64,
}

impl Default for ConstraintSet {
    fn default() -> Self {
        Self {
            max_customers_per_route: 25,
            min_customers_per_route: 10,
            max_route_duration_minutes: 600.0,
            max_distance_per_route_km: 50.0,
            time_budget_secs: 30,
        }
    }
}

impl ConstraintSet {
    pub fn with_overrides(&self, overrides: &ConstraintOverrides) -> Self {
        Self {
            max_customers_per_route: overrides
                .max_customers_per_route
                .unwrap_or(self.max_customers_per_route),
            min_customers_per_route: overrides
                .min_customers_per_route
                .unwrap_or(self.min_customers_per_route),
            max_route_duration_minutes: overrides
                .max_route_duration_minutes
                .unwrap_or(self.max_route_duration_minutes),
            max_distance_per_route_km: overrides
                .max_distance_per_route_km
                .unwrap_or(self.max_distance_per_route_km),
            time_budget_secs: overrides.time_budget_secs.unwrap_or(self.time_budget_secs),
        }
    }

    pub fn validate(&self) -> Result<(), InputError> {
        if self.max_customers_per_route == 0 {
            return Err(InputError::InvalidConstraints(
                "max_customers_per_route must be >= 1".to_string(),
            ));
        }
        if !(self.max_route_duration_minutes > 0.0) {
            return Err(InputError::InvalidConstraints(
                "max_route_duration_minutes must be > 0".to_string(),
            ));
        }
        if !(self.max_distance_per_route_km >= 0.0) {
            return Err(InputError::InvalidConstraints(
                "max_distance_per_route_km must be >= 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// One customer visit within a route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub customer_id: CustomerId,
    /// 1-based, contiguous within a route.
    pub sequence: usize,
    /// Minutes since leaving the depot.
    pub arrival_min: f64,
    pub distance_from_prev_km: f64,
}

/// Soft or forced constraint breaches of a single route.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstraintViolations {
    /// Kilometres above the soft distance limit.
    pub distance_km: Option<f64>,
    /// Minutes above the duration limit (only when a lone stop cannot fit).
    pub duration_min: Option<f64>,
    /// Customers short of the soft minimum.
    pub min_customers: Option<usize>,
}

impl ConstraintViolations {
    pub fn is_empty(&self) -> bool {
        self.distance_km.is_none() && self.duration_min.is_none() && self.min_customers.is_none()
    }
}

/// Ordered stops for one vehicle trip on one working day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutePlan {
    pub zone_id: ZoneId,
    pub route_id: String,
    pub day: String,
    pub total_distance_km: f64,
    pub total_duration_min: f64,
    pub customer_count: usize,
    pub stops: Vec<Stop>,
    pub violations: ConstraintViolations,
}

/// How the refinement phase ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveStatus {
    /// No improving move was left.
    Converged,
    /// The time budget ran out; the plans are the best found, not optimal.
    TimeLimit,
}

/// Routes for one zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingResult {
    pub zone_id: ZoneId,
    pub plans: Vec<RoutePlan>,
    /// Customers the depot cannot reach (or be reached from); left unrouted.
    pub unreachable: Vec<CustomerId>,
    pub status: SolveStatus,
    /// `None` when nothing needed a travel matrix.
    pub precision: Option<Precision>,
}

impl RoutingResult {
    pub fn total_distance_km(&self) -> f64 {
        self.plans.iter().map(|plan| plan.total_distance_km).sum()
    }

    pub fn routed_customers(&self) -> usize {
        self.plans.iter().map(|plan| plan.customer_count).sum()
    }

    pub fn has_violations(&self) -> bool {
        self.plans.iter().any(|plan| !plan.violations.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assignment_moves_between_zone_and_unassigned() {
        let mut assignment = ZoneAssignment::new();
        assignment.mark_unassigned("c1");
        assignment.assign("c1", "A");
        assignment.assign("c2", "A");
        assignment.assign("c3", "B");

        assert!(assignment.unassigned().is_empty());
        assert_eq!(
            assignment.counts(),
            BTreeMap::from([("A".to_string(), 2), ("B".to_string(), 1)])
        );

        assignment.mark_unassigned("c3");
        assert_eq!(assignment.zone_of("c3"), None);
        assert_eq!(assignment.unassigned(), ["c3".to_string()]);
        assert_eq!(assignment.len(), 2);
    }

    #[test]
    fn test_duplicate_customer_is_rejected() {
        let customers = [Customer::new("c1", 24.7, 46.6), Customer::new("c1", 24.8, 46.7)];
        assert_eq!(
            validate_customers(&customers),
            Err(InputError::DuplicateCustomer("c1".to_string()))
        );
    }

    #[test]
    fn test_overrides_replace_only_given_fields() {
        let overrides = ConstraintOverrides {
            max_customers_per_route: Some(12),
            ..ConstraintOverrides::default()
        };
        let merged = ConstraintSet::default().with_overrides(&overrides);

        assert_eq!(merged.max_customers_per_route, 12);
        assert_eq!(merged.min_customers_per_route, 10);
        assert!(merged.validate().is_ok());
        assert!(ConstraintSet {
            max_route_duration_minutes: 0.0,
            ..merged
        }
        .validate()
        .is_err());
    }
}
