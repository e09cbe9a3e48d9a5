//! User-drawn polygons.

use std::collections::HashSet;

use crate::error::InputError;
use crate::geometry;
use crate::model::{
    valid_coordinate, BoundarySource, Customer, CustomerId, ZoneAssignment, ZoneBoundary, ZoneId,
    ZonePolygon,
};

use super::{StrategyKind, StrategyReport, ZoningResult};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ManualParams {
    pub polygons: Vec<ZonePolygon>,
}

impl ManualParams {
    pub fn new(polygons: Vec<ZonePolygon>) -> Self {
        Self { polygons }
    }
}

/// Rejects empty sets, duplicate ids, degenerate or self-intersecting rings
/// and any overlapping pair.
pub fn validate_polygons(polygons: &[ZonePolygon]) -> Result<(), InputError> {
    if polygons.is_empty() {
        return Err(InputError::MissingPolygons);
    }

    let mut seen = HashSet::with_capacity(polygons.len());
    for polygon in polygons {
        let invalid = |reason: &str| InputError::InvalidPolygon {
            zone_id: polygon.zone_id.clone(),
            reason: reason.to_string(),
        };
        if polygon.zone_id.trim().is_empty() {
            return Err(invalid("zone id is empty"));
        }
        if !seen.insert(polygon.zone_id.as_str()) {
            return Err(InputError::DuplicateZone(polygon.zone_id.clone()));
        }
        if polygon.ring.iter().any(|(lat, lng)| !valid_coordinate(*lat, *lng)) {
            return Err(invalid("vertex outside valid coordinate range"));
        }
        if geometry::distinct_vertex_count(&polygon.ring) < 3 {
            return Err(invalid("ring needs at least 3 distinct vertices"));
        }
        if !geometry::is_simple(&polygon.ring) {
            return Err(invalid("ring intersects itself"));
        }
    }

    for (i, first) in polygons.iter().enumerate() {
        for second in &polygons[i + 1..] {
            if geometry::polygons_overlap(&first.ring, &second.ring) {
                return Err(InputError::OverlappingPolygons {
                    first: first.zone_id.clone(),
                    second: second.zone_id.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Customer count per polygon, in polygon order, for previewing a drawing.
pub fn preview_counts(polygons: &[ZonePolygon], customers: &[Customer]) -> Vec<(ZoneId, usize)> {
    let points: Vec<(f64, f64)> = customers.iter().map(Customer::location).collect();
    polygons
        .iter()
        .map(|polygon| {
            (
                polygon.zone_id.clone(),
                geometry::count_points_in_polygon(&points, &polygon.ring),
            )
        })
        .collect()
}

pub(crate) fn generate(
    customers: &[Customer],
    params: &ManualParams,
) -> Result<ZoningResult, InputError> {
    validate_polygons(&params.polygons)?;

    let mut assignment = ZoneAssignment::new();
    let mut unassigned: Vec<CustomerId> = Vec::new();
    for customer in customers {
        let containing = params
            .polygons
            .iter()
            .find(|polygon| geometry::point_in_polygon(customer.location(), &polygon.ring));
        match containing {
            Some(polygon) => assignment.assign(customer.id.clone(), polygon.zone_id.clone()),
            None => {
                assignment.mark_unassigned(customer.id.clone());
                unassigned.push(customer.id.clone());
            }
        }
    }

    let boundaries = params
        .polygons
        .iter()
        .map(|polygon| ZoneBoundary {
            centroid: geometry::centroid(&polygon.ring),
            polygon: ZonePolygon {
                ring: geometry::close_ring(polygon.ring.clone()),
                ..polygon.clone()
            },
            source: BoundarySource::Manual,
        })
        .collect();

    Ok(ZoningResult::new(
        StrategyKind::Manual,
        assignment,
        boundaries,
        StrategyReport::Manual {
            zone_ids: params.polygons.iter().map(|polygon| polygon.zone_id.clone()).collect(),
            unassigned_customers: unassigned,
        },
    ))
}
