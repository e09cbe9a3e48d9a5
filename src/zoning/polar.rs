//! Angular sectors around the depot.

use rayon::prelude::*;

use crate::config::EngineConfig;
use crate::error::InputError;
use crate::geometry;
use crate::haversine::haversine_km;
use crate::model::{BoundarySource, Customer, Depot, ZoneAssignment, ZoneBoundary, ZonePolygon};

use super::{StrategyKind, StrategyReport, ZoningResult};

/// Radius drawn for sectors without members.
const EMPTY_SECTOR_RADIUS_KM: f64 = 50.0;

/// Largest angular step between arc vertices.
const ARC_STEP_DEGREES: f64 = 5.0;

/// Members on the outer arc stay inside the chorded ring.
const RADIUS_MARGIN: f64 = 1.05;

#[derive(Debug, Clone, PartialEq)]
pub struct PolarParams {
    pub sectors: usize,
    /// Rotation of sector 0's leading edge, degrees clockwise from north.
    pub rotation_offset: f64,
}

impl PolarParams {
    pub fn new(sectors: usize) -> Self {
        Self {
            sectors,
            rotation_offset: 0.0,
        }
    }

    pub fn rotated(mut self, degrees: f64) -> Self {
        self.rotation_offset = degrees;
        self
    }
}

/// Sector of a bearing: `floor(((bearing - rotation) mod 360) / (360 / sectors))`.
///
/// Bearings exactly on an edge fall in the sector that edge opens.
pub fn sector_index(bearing: f64, sectors: usize, rotation_offset: f64) -> usize {
    let size = 360.0 / sectors as f64;
    let relative = (bearing - rotation_offset).rem_euclid(360.0);
    ((relative / size).floor() as usize).min(sectors - 1)
}

pub fn zone_id(depot: &Depot, sector: usize) -> String {
    format!("{}{:03}", depot.zone_prefix(), sector + 1)
}

pub(crate) fn generate(
    depot: &Depot,
    customers: &[Customer],
    params: &PolarParams,
    config: &EngineConfig,
) -> Result<ZoningResult, InputError> {
    if params.sectors == 0 || params.sectors > config.max_polar_sectors {
        return Err(InputError::InvalidSectorCount {
            got: params.sectors,
            max: config.max_polar_sectors,
        });
    }
    if !params.rotation_offset.is_finite() {
        return Err(InputError::InvalidRotation(params.rotation_offset));
    }

    let origin = depot.location();
    let sectors: Vec<usize> = customers
        .par_iter()
        .map(|customer| {
            let bearing = geometry::bearing_degrees(origin, customer.location());
            sector_index(bearing, params.sectors, params.rotation_offset)
        })
        .collect();

    let mut assignment = ZoneAssignment::new();
    let mut radius_km = vec![0.0_f64; params.sectors];
    for (customer, sector) in customers.iter().zip(&sectors) {
        assignment.assign(customer.id.clone(), zone_id(depot, *sector));
        radius_km[*sector] = radius_km[*sector].max(haversine_km(origin, customer.location()));
    }

    let size = 360.0 / params.sectors as f64;
    let boundaries = (0..params.sectors)
        .map(|sector| {
            let radius = if radius_km[sector] > 0.0 {
                radius_km[sector] * RADIUS_MARGIN
            } else {
                EMPTY_SECTOR_RADIUS_KM
            };
            let start = params.rotation_offset + sector as f64 * size;
            let ring = sector_ring(origin, start, size, radius, params.sectors == 1);
            ZoneBoundary {
                centroid: geometry::centroid(&ring),
                polygon: ZonePolygon::new(zone_id(depot, sector), ring),
                source: BoundarySource::Sector,
            }
        })
        .collect();

    Ok(ZoningResult::new(
        StrategyKind::Polar,
        assignment,
        boundaries,
        StrategyReport::Polar {
            sector_size_degrees: size,
            rotation_offset: params.rotation_offset,
        },
    ))
}

/// Pie slice from the origin; a full circle when there is a single sector.
fn sector_ring(
    origin: (f64, f64),
    start: f64,
    sweep: f64,
    radius_km: f64,
    full: bool,
) -> Vec<(f64, f64)> {
    let steps = (sweep / ARC_STEP_DEGREES).ceil().max(1.0) as usize;
    let arc = (0..=steps).map(|i| {
        let bearing = start + sweep * i as f64 / steps as f64;
        geometry::destination_point(origin, bearing, radius_km)
    });

    if full {
        let mut ring: Vec<(f64, f64)> = arc.collect();
        ring.pop();
        return geometry::close_ring(ring);
    }

    let mut ring = vec![origin];
    ring.extend(arc);
    geometry::close_ring(ring)
}
