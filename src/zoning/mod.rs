//! Zone generation.
//!
//! A [`ZoneStrategy`] is a closed set of variants sharing one contract:
//! customers and a depot in, a [`ZoningResult`] out. [`generate_zones`]
//! validates input, runs the strategy and optionally hands the assignment to
//! the balancer.

pub mod clustering;
pub mod isochrone;
pub mod manual;
pub mod polar;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::balancer::{self, BalanceOptions, BalanceReport};
use crate::config::EngineConfig;
use crate::distance::Precision;
use crate::error::{EngineError, InputError};
use crate::geometry;
use crate::model::{
    validate_customers, BoundarySource, Customer, CustomerId, Depot, ZoneAssignment, ZoneBoundary,
    ZoneId, ZonePolygon,
};
use crate::traits::DistanceProvider;

pub use clustering::{ClusterAction, ClusteringParams, ClusteringReport};
pub use isochrone::IsochroneParams;
pub use manual::{preview_counts, validate_polygons, ManualParams};
pub use polar::PolarParams;

/// Radius of the small buffer drawn around zones too small for a hull.
const POINT_BUFFER_KM: f64 = 0.25;

/// Strategy names as accepted from callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Polar,
    Isochrone,
    Clustering,
    Manual,
}

impl FromStr for StrategyKind {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "polar" => Ok(Self::Polar),
            "isochrone" => Ok(Self::Isochrone),
            "clustering" => Ok(Self::Clustering),
            "manual" => Ok(Self::Manual),
            _ => Err(InputError::UnknownStrategy(s.to_string())),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Polar => "polar",
            Self::Isochrone => "isochrone",
            Self::Clustering => "clustering",
            Self::Manual => "manual",
        };
        f.write_str(name)
    }
}

/// Zoning strategy together with its parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum ZoneStrategy {
    Polar(PolarParams),
    Isochrone(IsochroneParams),
    Clustering(ClusteringParams),
    Manual(ManualParams),
}

impl ZoneStrategy {
    pub fn kind(&self) -> StrategyKind {
        match self {
            Self::Polar(_) => StrategyKind::Polar,
            Self::Isochrone(_) => StrategyKind::Isochrone,
            Self::Clustering(_) => StrategyKind::Clustering,
            Self::Manual(_) => StrategyKind::Manual,
        }
    }

    /// Runs the strategy on already validated input.
    pub fn generate<P: DistanceProvider + ?Sized>(
        &self,
        depot: &Depot,
        customers: &[Customer],
        provider: &P,
        config: &EngineConfig,
    ) -> Result<ZoningResult, EngineError> {
        match self {
            Self::Polar(params) => Ok(polar::generate(depot, customers, params, config)?),
            Self::Isochrone(params) => {
                isochrone::generate(depot, customers, params, provider, config)
            }
            Self::Clustering(params) => Ok(clustering::generate(depot, customers, params)?),
            Self::Manual(params) => Ok(manual::generate(customers, params)?),
        }
    }
}

/// A zoning run: strategy plus optional balancing.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoningRequest {
    pub strategy: ZoneStrategy,
    /// Balance tolerance ratio; `None` skips balancing.
    pub balance_tolerance: Option<f64>,
}

impl ZoningRequest {
    pub fn new(strategy: ZoneStrategy) -> Self {
        Self {
            strategy,
            balance_tolerance: None,
        }
    }

    pub fn balanced(mut self, tolerance: f64) -> Self {
        self.balance_tolerance = Some(tolerance);
        self
    }

    /// Enables balancing with the configured tolerance.
    pub fn balanced_from(self, config: &EngineConfig) -> Self {
        self.balanced(config.balance_tolerance)
    }
}

/// Strategy-specific details of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum StrategyReport {
    Polar {
        sector_size_degrees: f64,
        rotation_offset: f64,
    },
    Isochrone {
        thresholds: Vec<u32>,
        overflow_customers: usize,
    },
    Clustering(ClusteringReport),
    Manual {
        zone_ids: Vec<ZoneId>,
        unassigned_customers: Vec<CustomerId>,
    },
}

/// Output of the zoning phase.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoningResult {
    pub strategy: StrategyKind,
    pub assignment: ZoneAssignment,
    pub counts: BTreeMap<ZoneId, usize>,
    pub boundaries: Vec<ZoneBoundary>,
    /// Precision of travel data used, when the strategy queried a provider.
    pub precision: Option<Precision>,
    pub report: StrategyReport,
    pub balance: Option<BalanceReport>,
}

impl ZoningResult {
    pub(crate) fn new(
        strategy: StrategyKind,
        assignment: ZoneAssignment,
        boundaries: Vec<ZoneBoundary>,
        report: StrategyReport,
    ) -> Self {
        let counts = assignment.counts();
        Self {
            strategy,
            assignment,
            counts,
            boundaries,
            precision: None,
            report,
            balance: None,
        }
    }

    /// Boundary of `zone`, if one was produced.
    pub fn boundary(&self, zone: &str) -> Option<&ZoneBoundary> {
        self.boundaries.iter().find(|boundary| boundary.polygon.zone_id == zone)
    }
}

/// Validates input, runs the strategy and applies optional balancing.
pub fn generate_zones<P: DistanceProvider + ?Sized>(
    depot: &Depot,
    customers: &[Customer],
    request: &ZoningRequest,
    provider: &P,
    config: &EngineConfig,
) -> Result<ZoningResult, EngineError> {
    depot.validate()?;
    validate_customers(customers)?;
    if let Some(tolerance) = request.balance_tolerance {
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(InputError::InvalidTolerance(tolerance).into());
        }
    }

    let mut result = request.strategy.generate(depot, customers, provider, config)?;

    if let Some(tolerance) = request.balance_tolerance {
        let polygons: Vec<ZonePolygon> = result
            .boundaries
            .iter()
            .map(|boundary| boundary.polygon.clone())
            .collect();
        let options = BalanceOptions {
            tolerance,
            max_iterations: None,
        };
        let report =
            balancer::balance(&mut result.assignment, customers, &polygons, &options, provider)?;
        result.counts = result.assignment.counts();
        // Manual polygons are the caller's; derived shapes follow the new members.
        if result.strategy != StrategyKind::Manual && !report.transfers.is_empty() {
            result.boundaries =
                redraw_boundaries(&result.boundaries, &result.assignment, customers);
        }
        result.balance = Some(report);
    }

    info!(
        strategy = %result.strategy,
        customers = customers.len(),
        zones = result.counts.len(),
        unassigned = result.assignment.unassigned().len(),
        balanced = result.balance.is_some(),
        "zoning run complete"
    );

    Ok(result)
}

/// Convex hull per zone; zones with fewer than three distinct points get a
/// small buffer around their members instead.
pub(crate) fn hull_boundaries(
    assignment: &ZoneAssignment,
    customers: &[Customer],
) -> Vec<ZoneBoundary> {
    let mut members: BTreeMap<&ZoneId, Vec<(f64, f64)>> = BTreeMap::new();
    for customer in customers {
        if let Some(zone) = assignment.zone_of(&customer.id) {
            members.entry(zone).or_default().push(customer.location());
        }
    }

    members
        .into_iter()
        .map(|(zone, points)| {
            let ring = geometry::convex_hull(&points)
                .unwrap_or_else(|| buffered_hull(&points, POINT_BUFFER_KM));
            let centroid = geometry::centroid(&ring);
            ZoneBoundary {
                polygon: ZonePolygon::new(zone.clone(), ring),
                centroid,
                source: BoundarySource::ConvexHull,
            }
        })
        .collect()
}

/// Replaces each populated zone's boundary with the hull of its current
/// members. Zones left without members keep their previous boundary.
fn redraw_boundaries(
    previous: &[ZoneBoundary],
    assignment: &ZoneAssignment,
    customers: &[Customer],
) -> Vec<ZoneBoundary> {
    let mut hulls: BTreeMap<ZoneId, ZoneBoundary> = hull_boundaries(assignment, customers)
        .into_iter()
        .map(|boundary| (boundary.polygon.zone_id.clone(), boundary))
        .collect();
    let mut redrawn: Vec<ZoneBoundary> = previous
        .iter()
        .map(|boundary| {
            hulls
                .remove(&boundary.polygon.zone_id)
                .unwrap_or_else(|| boundary.clone())
        })
        .collect();
    redrawn.extend(hulls.into_values());
    redrawn
}

/// Hull of circles drawn around each point.
pub(crate) fn buffered_hull(points: &[(f64, f64)], radius_km: f64) -> Vec<(f64, f64)> {
    let buffered: Vec<(f64, f64)> = points
        .iter()
        .flat_map(|point| geometry::circle(*point, radius_km, 8))
        .collect();
    geometry::convex_hull(&buffered).unwrap_or_default()
}
