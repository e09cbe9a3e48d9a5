//! Travel-time bands around the depot.

use rayon::prelude::*;

use crate::config::EngineConfig;
use crate::error::{EngineError, InputError};
use crate::geometry;
use crate::model::{BoundarySource, Customer, Depot, ZoneAssignment, ZoneBoundary, ZonePolygon};
use crate::traits::DistanceProvider;

use super::{buffered_hull, StrategyKind, StrategyReport, ZoningResult, POINT_BUFFER_KM};

/// Zone id for customers beyond the last threshold or unreachable.
pub const OVERFLOW_ZONE: &str = "ISO_OUT_OF_RANGE";

/// Cap on the slack buffer drawn around a reachable point.
const MAX_BUFFER_KM: f64 = 5.0;

const CIRCLE_SEGMENTS: usize = 12;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IsochroneParams {
    /// Band thresholds in minutes; `None` uses the configured defaults.
    pub thresholds: Option<Vec<u32>>,
}

impl IsochroneParams {
    pub fn new(thresholds: Vec<u32>) -> Self {
        Self {
            thresholds: Some(thresholds),
        }
    }
}

pub fn zone_id(threshold: u32) -> String {
    format!("ISO{threshold:03}")
}

/// Index of the first band whose threshold covers `duration_min`.
pub fn band_index(duration_min: f64, thresholds: &[u32]) -> Option<usize> {
    if !duration_min.is_finite() {
        return None;
    }
    thresholds
        .iter()
        .position(|threshold| duration_min <= f64::from(*threshold))
}

/// Thresholds must be non-empty, positive and strictly ascending.
fn validate(thresholds: &[u32]) -> Result<(), InputError> {
    if thresholds.is_empty() {
        return Err(InputError::InvalidThresholds("no thresholds given".to_string()));
    }
    if thresholds.contains(&0) {
        return Err(InputError::InvalidThresholds("thresholds must be > 0".to_string()));
    }
    if thresholds.windows(2).any(|pair| pair[0] >= pair[1]) {
        return Err(InputError::InvalidThresholds(format!(
            "thresholds must be strictly ascending, got {thresholds:?}"
        )));
    }
    Ok(())
}

pub(crate) fn generate<P: DistanceProvider + ?Sized>(
    depot: &Depot,
    customers: &[Customer],
    params: &IsochroneParams,
    provider: &P,
    config: &EngineConfig,
) -> Result<ZoningResult, EngineError> {
    let thresholds = params
        .thresholds
        .clone()
        .unwrap_or_else(|| config.default_isochrones.clone());
    validate(&thresholds)?;

    let origin = depot.location();
    let points: Vec<(f64, f64)> = customers.iter().map(Customer::location).collect();
    let matrix = provider.table(&[origin], &points)?;

    let legs: Vec<(f64, f64)> = (0..points.len())
        .map(|j| (matrix.distance_km(0, j), matrix.duration_min(0, j)))
        .collect();
    let bands: Vec<Option<usize>> = legs
        .par_iter()
        .map(|(_, duration)| band_index(*duration, &thresholds))
        .collect();

    let mut assignment = ZoneAssignment::new();
    let mut overflow = Vec::new();
    for (customer, band) in customers.iter().zip(&bands) {
        match band {
            Some(index) => assignment.assign(customer.id.clone(), zone_id(thresholds[*index])),
            None => {
                assignment.assign(customer.id.clone(), OVERFLOW_ZONE);
                overflow.push(customer.location());
            }
        }
    }

    let mut boundaries = Vec::new();
    for (index, threshold) in thresholds.iter().enumerate() {
        if !bands.contains(&Some(index)) {
            continue;
        }
        let limit = f64::from(*threshold);
        let mut buffered = vec![origin];
        for ((point, (distance, duration)), band) in points.iter().zip(&legs).zip(&bands) {
            if band.is_none_or(|b| b > index) {
                continue;
            }
            let radius =
                slack_radius_km(limit - duration, *distance, *duration, config.fallback_speed_kmh);
            if radius > 0.0 {
                buffered.extend(geometry::circle(*point, radius, CIRCLE_SEGMENTS));
            } else {
                buffered.push(*point);
            }
        }
        let ring = geometry::convex_hull(&buffered)
            .unwrap_or_else(|| buffered_hull(&buffered, POINT_BUFFER_KM));
        boundaries.push(ZoneBoundary {
            centroid: geometry::centroid(&ring),
            polygon: ZonePolygon::new(zone_id(*threshold), ring),
            source: BoundarySource::Isochrone,
        });
    }

    if !overflow.is_empty() {
        let ring = geometry::convex_hull(&overflow)
            .unwrap_or_else(|| buffered_hull(&overflow, POINT_BUFFER_KM));
        boundaries.push(ZoneBoundary {
            centroid: geometry::centroid(&ring),
            polygon: ZonePolygon::new(OVERFLOW_ZONE, ring),
            source: BoundarySource::ConvexHull,
        });
    }

    let mut result = ZoningResult::new(
        StrategyKind::Isochrone,
        assignment,
        boundaries,
        StrategyReport::Isochrone {
            thresholds,
            overflow_customers: overflow.len(),
        },
    );
    result.precision = Some(matrix.precision());
    Ok(result)
}

/// Distance still coverable in `slack_min`, at the speed observed on the
/// depot leg (or `fallback_kmh` when that leg took no time).
fn slack_radius_km(slack_min: f64, distance_km: f64, duration_min: f64, fallback_kmh: f64) -> f64 {
    if slack_min <= 0.0 {
        return 0.0;
    }
    let km_per_min = if duration_min > 0.0 && distance_km.is_finite() {
        distance_km / duration_min
    } else {
        fallback_kmh / 60.0
    };
    (slack_min * km_per_min).min(MAX_BUFFER_KM)
}
