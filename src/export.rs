//! Serialization targets for downstream collaborators: assignment and route
//! tables (CSV), styled zone polygons and styled route lines (WKT).

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ExportError;
use crate::geometry;
use crate::model::{Customer, RoutePlan, ZoneAssignment, ZoneBoundary, ZonePolygon};

/// Fill colours cycled over zones in export order.
pub const ZONE_PALETTE: [&str; 20] = [
    "#02d8e0", "#e0003e", "#38e000", "#0000c1", "#e0e005", "#611cc7", "#e0af00", "#13aae0",
    "#a4d819", "#00e0bb", "#e000a2", "#e000e0", "#09e0e0", "#e0002f", "#22e000", "#15dde0",
    "#e00017", "#08e000", "#3100e0", "#e0bb0b",
];

const FILL_OPACITY: f64 = 0.33;
const LINE_OPACITY: f64 = 0.5;
const LINE_WIDTH: u32 = 2;

const ROUTE_FILL_OPACITY: f64 = 0.5;
const ROUTE_LINE_OPACITY: f64 = 0.8;
const ROUTE_LINE_WIDTH: u32 = 3;

pub fn zone_color(index: usize) -> &'static str {
    ZONE_PALETTE[index % ZONE_PALETTE.len()]
}

#[derive(Debug, Serialize, Deserialize)]
struct AssignmentRow {
    customer_id: String,
    zone_id: Option<String>,
}

/// `customer_id,zone_id` rows, ordered by customer id; unassigned customers
/// follow with an empty zone.
pub fn assignments_to_csv(assignment: &ZoneAssignment) -> Result<String, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for (customer, zone) in assignment.iter() {
        writer.serialize(AssignmentRow {
            customer_id: customer.clone(),
            zone_id: Some(zone.clone()),
        })?;
    }
    for customer in assignment.unassigned() {
        writer.serialize(AssignmentRow {
            customer_id: customer.clone(),
            zone_id: None,
        })?;
    }
    finish(writer)
}

/// Reads a table written by [`assignments_to_csv`].
pub fn assignments_from_csv(data: &str) -> Result<ZoneAssignment, ExportError> {
    let mut reader = csv::Reader::from_reader(data.as_bytes());
    let mut assignment = ZoneAssignment::new();
    let mut seen = HashSet::new();
    for row in reader.deserialize() {
        let row: AssignmentRow = row?;
        if !seen.insert(row.customer_id.clone()) {
            return Err(ExportError::DuplicateRow(row.customer_id));
        }
        match row.zone_id.filter(|zone| !zone.is_empty()) {
            Some(zone) => assignment.assign(row.customer_id, zone),
            None => assignment.mark_unassigned(row.customer_id),
        }
    }
    Ok(assignment)
}

#[derive(Debug, Serialize)]
struct RouteRow<'a> {
    route_id: &'a str,
    day: &'a str,
    sequence: usize,
    customer_id: &'a str,
    arrival_min: f64,
    distance_from_prev_km: f64,
    total_distance_km: f64,
    total_duration_min: f64,
    customer_count: usize,
}

/// One row per stop, plans in the given order.
pub fn routes_to_csv(plans: &[RoutePlan]) -> Result<String, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for plan in plans {
        for stop in &plan.stops {
            writer.serialize(RouteRow {
                route_id: &plan.route_id,
                day: &plan.day,
                sequence: stop.sequence,
                customer_id: &stop.customer_id,
                arrival_min: stop.arrival_min,
                distance_from_prev_km: stop.distance_from_prev_km,
                total_distance_km: plan.total_distance_km,
                total_duration_min: plan.total_duration_min,
                customer_count: plan.customer_count,
            })?;
        }
    }
    finish(writer)
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<String, ExportError> {
    let bytes = writer.into_inner().map_err(|err| ExportError::Flush(err.to_string()))?;
    Ok(String::from_utf8(bytes)?)
}

/// `POLYGON((lng lat, ...))`, closed.
pub fn polygon_to_wkt(polygon: &ZonePolygon) -> Result<String, ExportError> {
    if geometry::open_vertices(&polygon.ring).len() < 3 {
        return Err(ExportError::RingTooShort(polygon.zone_id.clone()));
    }
    let ring = geometry::close_ring(polygon.ring.clone());
    Ok(format!("POLYGON(({}))", wkt_pairs(&ring)))
}

/// `LINESTRING(lng lat, ...)`.
pub fn linestring_to_wkt(points: &[(f64, f64)]) -> Option<String> {
    (points.len() >= 2).then(|| format!("LINESTRING({})", wkt_pairs(points)))
}

fn wkt_pairs(points: &[(f64, f64)]) -> String {
    points
        .iter()
        .map(|(lat, lng)| format!("{lng} {lat}"))
        .collect::<Vec<_>>()
        .join(",")
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Symbology {
    pub fill_color: String,
    pub fill_opacity: f64,
    pub line_color: String,
    pub line_width: u32,
    pub line_opacity: f64,
}

/// A zone polygon ready for a territory-mapping tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolygonFeature {
    /// `{method}-{zone}`; stable across exports of the same run.
    pub id: String,
    pub name: String,
    pub group: String,
    pub feature_class: String,
    pub wkt: String,
    /// Embedded JSON document with the strategy and label point.
    pub json: String,
    pub visible: bool,
    pub symbology: Symbology,
    pub notes: String,
}

/// Styled features for every boundary with a usable ring.
pub fn polygon_features(
    boundaries: &[ZoneBoundary],
    city: &str,
    method: &str,
) -> Vec<PolygonFeature> {
    let group = city.to_uppercase();
    boundaries
        .iter()
        .enumerate()
        .filter_map(|(index, boundary)| {
            let polygon = &boundary.polygon;
            let wkt = match polygon_to_wkt(polygon) {
                Ok(wkt) => wkt,
                Err(err) => {
                    warn!(zone = %polygon.zone_id, error = %err, "boundary skipped in export");
                    return None;
                }
            };
            let (label_lat, label_lng) = boundary.centroid;
            let json = serde_json::json!({
                "type": method,
                "subType": null,
                "labelPoint": { "_x": label_lng, "_y": label_lat },
            })
            .to_string();
            let fill_color = polygon
                .color
                .clone()
                .unwrap_or_else(|| zone_color(index).to_string());

            Some(PolygonFeature {
                id: format!("{method}-{}", polygon.zone_id),
                name: polygon.zone_id.clone(),
                group: group.clone(),
                feature_class: "2".to_string(),
                wkt,
                json,
                visible: true,
                symbology: Symbology {
                    fill_color,
                    fill_opacity: FILL_OPACITY,
                    line_color: "black".to_string(),
                    line_width: LINE_WIDTH,
                    line_opacity: LINE_OPACITY,
                },
                notes: format!(
                    "tag : {group}|{zone}\ngroup : {group}\nname : {zone}\nmethod : {method}\n",
                    zone = polygon.zone_id
                ),
            })
        })
        .collect()
}

/// A planned route drawn as a line through its stops.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteFeature {
    /// The plan's route id.
    pub id: String,
    /// `Route {n}`, numbered in plan order.
    pub name: String,
    pub group: String,
    pub feature_class: String,
    pub wkt: String,
    /// Embedded JSON document with the label point and route metrics.
    pub json: String,
    pub visible: bool,
    pub symbology: Symbology,
    pub notes: String,
}

/// Styled line features for every plan with at least two locatable stops.
///
/// Lines follow the stop sequence through customer locations; the depot is
/// not drawn. Stops whose customer is missing from `customers` are left out.
pub fn route_features(
    plans: &[RoutePlan],
    customers: &[Customer],
    zone: &str,
) -> Vec<RouteFeature> {
    let locations: HashMap<&str, (f64, f64)> = customers
        .iter()
        .map(|customer| (customer.id.as_str(), customer.location()))
        .collect();
    let group = zone.to_uppercase();

    plans
        .iter()
        .enumerate()
        .filter_map(|(index, plan)| {
            let points: Vec<(f64, f64)> = plan
                .stops
                .iter()
                .filter_map(|stop| locations.get(stop.customer_id.as_str()).copied())
                .collect();
            let Some(wkt) = linestring_to_wkt(&points) else {
                warn!(route = %plan.route_id, points = points.len(), "route skipped in export");
                return None;
            };
            let (label_lat, label_lng) = points[points.len() / 2];
            let json = serde_json::json!({
                "type": "optimized",
                "subType": "vehicle_route",
                "labelPoint": { "_x": label_lng, "_y": label_lat },
                "metrics": {
                    "totalDistance": plan.total_distance_km,
                    "totalDuration": plan.total_duration_min,
                    "stopCount": plan.stops.len(),
                },
            })
            .to_string();
            let color = zone_color(index).to_string();
            let name = format!("Route {}", index + 1);

            Some(RouteFeature {
                id: plan.route_id.clone(),
                group: group.clone(),
                feature_class: "1".to_string(),
                wkt,
                json,
                visible: true,
                symbology: Symbology {
                    fill_color: color.clone(),
                    fill_opacity: ROUTE_FILL_OPACITY,
                    line_color: color,
                    line_width: ROUTE_LINE_WIDTH,
                    line_opacity: ROUTE_LINE_OPACITY,
                },
                notes: format!(
                    "tag : {group}|{name}\ngroup : {group}\nname : {name}\n\
                     stops : {stops}\ndistance : {distance:.2} km\n",
                    stops = plan.stops.len(),
                    distance = plan.total_distance_km,
                ),
                name,
            })
        })
        .collect()
}
